//! Upload ring buffer integration tests.
//!
//! These drive the ring through a [`FramePipeline`] and verify, by reading the
//! simulated GPU memory back, that data inside the frame window is never
//! overwritten.

mod common;

use std::sync::Arc;

use rstest::rstest;

use common::{GpuMode, TestContext, small_ring_parameters, test_pattern};
use hearth_graphics::{
    BufferDescriptor, BufferUsage, FramePipeline, GpuBackend, GraphicsError, RingBufferConfig,
    RingBufferRegion, UploadRingBuffer,
};

/// Allocate 100, begin a frame, allocate 200, begin a frame: the first region
/// is outside the window and gets reused without growth.
#[test]
fn test_first_frame_region_reused() {
    let ctx = TestContext::with_parameters(GpuMode::Immediate, small_ring_parameters(1024));
    let ring = ctx.device.create_upload_ring().unwrap();

    let first = ring.allocate(&test_pattern(100, 1)).unwrap();
    ring.begin_new_frame();
    let second = ring.allocate(&test_pattern(200, 2)).unwrap();
    ring.begin_new_frame();

    assert_eq!(ring.prev_head(), second.offset);
    assert_eq!(ring.head(), second.end());

    let fill = ring.allocate(&test_pattern(724, 3)).unwrap();
    assert_eq!(fill.end(), ring.capacity());

    let reused = ring.allocate(&test_pattern(64, 4)).unwrap();
    assert_eq!(reused.offset, first.offset);
    assert_eq!(ring.grow_count(), 0);

    // The previous frame's data is intact
    assert_eq!(
        ctx.backend
            .read_buffer(second.buffer, second.offset, second.size)
            .unwrap(),
        test_pattern(200, 2)
    );
}

/// Streams frames of varying sizes and checks that every region of the
/// protected frames still holds what was written.
#[rstest]
#[case::latency_two(2)]
#[case::latency_three(3)]
fn test_window_never_overwritten(#[case] frames_in_flight: usize) {
    let ctx = TestContext::with_parameters(
        GpuMode::Immediate,
        small_ring_parameters(512).with_frames_in_flight(frames_in_flight),
    );
    let mut pipeline = FramePipeline::new(Arc::clone(&ctx.device)).unwrap();

    let mut window: Vec<Vec<(RingBufferRegion, Vec<u8>)>> = Vec::new();
    for frame in 0..40usize {
        pipeline.begin_frame();
        if window.len() == frames_in_flight {
            window.remove(0);
        }

        let mut regions = Vec::new();
        for i in 0..(frame % 5 + 1) {
            let data = test_pattern(17 + (frame * 13 + i * 7) % 60, (frame + i) as u8);
            let region = pipeline.upload_ring().allocate(&data).unwrap();
            regions.push((region, data));
        }
        window.push(regions);

        for (region, data) in window.iter().flatten() {
            // Regions from before a growth live in a retired buffer
            if region.buffer != pipeline.upload_ring().buffer() {
                continue;
            }
            assert_eq!(
                &ctx.backend
                    .read_buffer(region.buffer, region.offset, region.size)
                    .unwrap(),
                data,
                "frame {frame}: region at {} overwritten",
                region.offset
            );
        }
        pipeline.end_frame();
    }
}

#[test]
fn test_growth_doubles_to_fit() {
    let ctx = TestContext::new(GpuMode::Immediate);
    let ring = UploadRingBuffer::new(
        &ctx.device,
        RingBufferConfig::new(256).with_alignment(1).with_watermark(0),
    )
    .unwrap();

    ring.allocate(&[0; 1500]).unwrap();
    assert_eq!(ring.capacity(), 2048);
    assert_eq!(ring.grow_count(), 1);

    // Steady state: no further growth once the large frame is retired
    ring.begin_new_frame();
    for _ in 0..10 {
        ring.begin_new_frame();
        ring.allocate(&[0; 600]).unwrap();
    }
    assert_eq!(ring.capacity(), 2048);
    assert_eq!(ring.grow_count(), 1);
}

#[test]
fn test_retired_buffer_waits_for_gpu() {
    let ctx = TestContext::with_parameters(GpuMode::Lagging, small_ring_parameters(256));
    let ring = ctx.device.create_upload_ring().unwrap();
    let old = ring.buffer();

    ring.allocate(&[1; 200]).unwrap();
    ctx.device.signal_frame();
    ring.allocate(&[2; 200]).unwrap();
    assert_ne!(ring.buffer(), old);
    ctx.device.signal_frame();

    ctx.device.collect_garbage();
    assert!(ctx.backend.buffer_exists(old));

    ctx.gpu_catch_up();
    ctx.device.collect_garbage();
    assert!(!ctx.backend.buffer_exists(old));
}

#[test]
fn test_growth_failure_fails_only_that_upload() {
    let ctx = TestContext::with_parameters(GpuMode::Immediate, small_ring_parameters(256));
    let ring = ctx.device.create_upload_ring().unwrap();
    ring.allocate(&[0; 100]).unwrap();

    ctx.backend.set_memory_budget(Some(ctx.backend.allocated_bytes()));
    assert_eq!(ring.allocate(&[0; 400]), Err(GraphicsError::OutOfMemory));
    assert_eq!(ring.tail(), 100);

    let small = ring.allocate(&test_pattern(50, 9)).unwrap();
    assert_eq!(small.offset, 100);
}

#[rstest]
#[case::immediate(GpuMode::Immediate)]
#[case::lagging(GpuMode::Lagging)]
fn test_copy_into_buffer_end_to_end(#[case] mode: GpuMode) {
    let ctx = TestContext::with_parameters(mode, small_ring_parameters(1024));
    let ring = ctx.device.create_upload_ring().unwrap();
    let vertices = ctx
        .device
        .create_buffer(&BufferDescriptor::new(256, BufferUsage::VERTEX | BufferUsage::COPY_DST))
        .unwrap();

    let data = test_pattern(96, 5);
    let mut list = ctx.device.create_command_list();
    ring.copy_into_buffer(&mut list, &vertices, 32, &data).unwrap();
    ctx.device.execute(list).unwrap();
    let value = ctx.device.signal_frame();

    if mode == GpuMode::Lagging {
        // Not copied until the GPU runs
        assert_eq!(vertices.read(32, 96).unwrap(), vec![0; 96]);
        ctx.gpu_catch_up();
    }

    ctx.device.frame_fence().wait_for_value(value);
    assert_eq!(vertices.read(32, 96).unwrap(), data);
}

#[test]
fn test_concurrent_allocations_are_disjoint() {
    let ctx = TestContext::with_parameters(GpuMode::Immediate, small_ring_parameters(64 * 1024));
    let ring = Arc::new(ctx.device.create_upload_ring().unwrap());

    let results: Vec<Vec<(RingBufferRegion, Vec<u8>)>> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..4u8)
            .map(|t| {
                let ring = Arc::clone(&ring);
                s.spawn(move || {
                    (0..64u8)
                        .map(|i| {
                            let data = test_pattern(32 + i as usize, t.wrapping_mul(64).wrapping_add(i));
                            (ring.allocate(&data).unwrap(), data)
                        })
                        .collect()
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(ring.grow_count(), 0);
    let mut regions: Vec<_> = results.iter().flatten().collect();
    regions.sort_by_key(|(region, _)| region.offset);
    for pair in regions.windows(2) {
        assert!(pair[0].0.end() <= pair[1].0.offset, "regions overlap");
    }
    for (region, data) in regions {
        assert_eq!(
            &ctx.backend
                .read_buffer(region.buffer, region.offset, region.size)
                .unwrap(),
            data
        );
    }
}
