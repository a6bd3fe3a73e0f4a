//! Fence, deferred reclamation and frame pacing integration tests.
//!
//! Parameterized with `rstest` over the simulated GPU modes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;

use common::{GpuMode, TestContext};
use hearth_graphics::{
    BufferDescriptor, BufferUsage, DeviceParameters, Fence, FramePipeline, GpuBackend, QueueType,
};

#[rstest]
#[case::immediate(GpuMode::Immediate)]
#[case::lagging(GpuMode::Lagging)]
fn test_check_signal_after_gpu_completion(#[case] mode: GpuMode) {
    let ctx = TestContext::new(mode);
    let fence = ctx.device.frame_fence();

    let value = ctx.device.signal_frame();
    assert_eq!(fence.wait_value(), value);
    assert_eq!(fence.check_signal(), mode == GpuMode::Immediate);

    ctx.gpu_catch_up();
    assert!(fence.check_signal());
    assert!(fence.completed_value() >= fence.wait_value());
}

#[test]
fn test_cross_queue_wait() {
    let ctx = TestContext::new(GpuMode::Lagging);
    let copy_queue = ctx.backend.create_command_queue(QueueType::Copy).unwrap();
    let upload_fence = Fence::new(ctx.backend.clone()).unwrap();

    // Frame work on the direct queue waits for the copy queue
    upload_fence.signal(copy_queue.as_ref());
    upload_fence.wait_on_queue(ctx.device.direct_queue().as_ref());
    let frame = ctx.device.signal_frame();

    ctx.gpu_catch_up();
    assert!(upload_fence.check_signal());
    assert!(ctx.device.frame_fence().is_value_reached(frame));
}

#[test]
fn test_waiting_thread_released_by_gpu() {
    let ctx = TestContext::new(GpuMode::Lagging);
    let value = ctx.device.signal_frame();

    let backend = Arc::clone(&ctx.backend);
    let gpu = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        backend.flush_queues();
    });

    ctx.device.frame_fence().wait_for_value(value);
    assert!(ctx.device.frame_fence().check_signal());
    gpu.join().unwrap();
}

/// Objects released while the GPU lags are never destroyed early and all of
/// them drain once the fence catches up.
#[test]
fn test_reclaimer_never_destroys_early() {
    let ctx = TestContext::new(GpuMode::Lagging);
    let mut raws = Vec::new();

    for frame in 0..8u64 {
        let buffer = ctx
            .device
            .create_buffer(&BufferDescriptor::new(256, BufferUsage::VERTEX))
            .unwrap();
        raws.push((buffer.raw(), ctx.device.frame_fence().next_value()));
        drop(buffer);
        ctx.device.signal_frame();

        // Let the GPU finish only every other frame
        if frame % 2 == 1 {
            ctx.gpu_catch_up();
        }
        ctx.device.collect_garbage();

        let completed = ctx.device.frame_fence().completed_value();
        for &(raw, value) in &raws {
            assert_eq!(
                ctx.backend.buffer_exists(raw),
                value > completed,
                "buffer released at {value} with fence at {completed}"
            );
        }
    }

    ctx.gpu_catch_up();
    ctx.device.collect_garbage();
    assert_eq!(ctx.device.reclaimer().pending_count(), 0);
    assert_eq!(ctx.backend.live_buffer_count(), 0);
}

#[test]
fn test_stalled_fence_accumulates() {
    let ctx = TestContext::new(GpuMode::Lagging);
    for _ in 0..32 {
        drop(
            ctx.device
                .create_buffer(&BufferDescriptor::new(64, BufferUsage::CONSTANT))
                .unwrap(),
        );
        ctx.device.signal_frame();
        assert_eq!(ctx.device.collect_garbage(), 0);
    }
    assert_eq!(ctx.device.reclaimer().pending_count(), 32);

    ctx.gpu_catch_up();
    assert_eq!(ctx.device.collect_garbage(), 32);
}

#[rstest]
#[case::one_frame(1)]
#[case::two_frames(2)]
#[case::three_frames(3)]
fn test_pipeline_limits_frames_in_flight(#[case] frames_in_flight: usize) {
    let ctx = TestContext::with_parameters(
        GpuMode::Lagging,
        DeviceParameters::default().with_frames_in_flight(frames_in_flight),
    );
    let mut pipeline = FramePipeline::new(Arc::clone(&ctx.device)).unwrap();

    for _ in 0..frames_in_flight {
        assert!(pipeline.begin_frame_timeout(Duration::from_millis(5)));
        pipeline.end_frame();
    }

    // Every slot holds an unfinished frame
    assert!(!pipeline.begin_frame_timeout(Duration::from_millis(5)));

    ctx.gpu_catch_up();
    assert!(pipeline.begin_frame_timeout(Duration::from_millis(5)));
    pipeline.end_frame();
    pipeline.wait_for_present(Duration::from_millis(1));

    ctx.gpu_catch_up();
    assert!(pipeline.is_idle());
}

#[test]
fn test_wait_idle_reclaims_everything() {
    let ctx = TestContext::new(GpuMode::Immediate);
    let pipeline = FramePipeline::new(Arc::clone(&ctx.device)).unwrap();

    let buffers: Vec<_> = (0..4)
        .map(|_| {
            ctx.device
                .create_buffer(&BufferDescriptor::new(32, BufferUsage::STORAGE))
                .unwrap()
        })
        .collect();
    drop(buffers);

    pipeline.wait_idle();
    // Only the upload ring's buffer remains
    assert_eq!(ctx.backend.live_buffer_count(), 1);
    assert_eq!(ctx.device.reclaimer().pending_count(), 0);
}
