use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use hearth_graphics::{
    ContentHash, DeviceParameters, DummyBackend, GraphicsDevice, RingBufferConfig, RootParameter,
    RootSignatureDescriptor, UploadRingBuffer,
};

fn create_device() -> Arc<GraphicsDevice> {
    GraphicsDevice::new(Arc::new(DummyBackend::new()), DeviceParameters::default())
        .expect("Failed to create device")
}

fn layout_descriptor(extra: usize) -> RootSignatureDescriptor {
    let mut desc = RootSignatureDescriptor::new()
        .with_parameter(RootParameter::constant_buffer("camera", 0))
        .with_parameter(RootParameter::constant_buffer("object", 1));
    for i in 0..extra {
        desc = desc.with_parameter(RootParameter::shader_resource(format!("srv_{i}"), i as u32));
    }
    desc
}

// ---------------------------------------------------------------------------
// Upload ring
// ---------------------------------------------------------------------------

fn bench_ring_allocate_small(c: &mut Criterion) {
    let device = create_device();
    let ring = UploadRingBuffer::new(&device, RingBufferConfig::new(1 << 20)).unwrap();
    let constants = [0u8; 64];

    c.bench_function("ring_allocate_64b_per_frame_16", |b| {
        b.iter(|| {
            ring.begin_new_frame();
            for _ in 0..16 {
                black_box(ring.allocate(&constants).unwrap());
            }
        });
    });
}

fn bench_ring_allocate_large(c: &mut Criterion) {
    let device = create_device();
    let ring = UploadRingBuffer::new(&device, RingBufferConfig::new(4 << 20)).unwrap();
    let mesh = vec![0u8; 64 * 1024];

    c.bench_function("ring_allocate_64kb", |b| {
        b.iter(|| {
            ring.begin_new_frame();
            black_box(ring.allocate(&mesh).unwrap());
        });
    });
}

// ---------------------------------------------------------------------------
// Root signature cache
// ---------------------------------------------------------------------------

fn bench_content_hash(c: &mut Criterion) {
    let desc = layout_descriptor(8);
    c.bench_function("content_hash_root_signature_10_params", |b| {
        b.iter(|| black_box(ContentHash::from_key(black_box(&desc))));
    });
}

fn bench_cache_hit(c: &mut Criterion) {
    let device = create_device();
    let desc = layout_descriptor(4);
    let _held = device.create_root_signature(&desc).unwrap();

    c.bench_function("root_signature_cache_hit", |b| {
        b.iter(|| black_box(device.create_root_signature(&desc).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_ring_allocate_small,
    bench_ring_allocate_large,
    bench_content_hash,
    bench_cache_hit,
);
criterion_main!(benches);
