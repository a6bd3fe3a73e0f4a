//! Common utilities for integration tests.
//!
//! Tests run against the dummy backend in two modes: queues that complete
//! work on submission, and queues that hold work until explicitly flushed so
//! the GPU lags behind the CPU.

#![allow(dead_code)]

use std::sync::Arc;

use hearth_graphics::{DeviceParameters, DummyBackend, GraphicsDevice};

/// How the simulated GPU keeps up with submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuMode {
    /// Work completes as soon as it is submitted.
    Immediate,
    /// Work completes only when the test flushes the queues.
    Lagging,
}

impl GpuMode {
    fn create_backend(self) -> DummyBackend {
        match self {
            GpuMode::Immediate => DummyBackend::new(),
            GpuMode::Lagging => DummyBackend::manual(),
        }
    }
}

/// Install the test logger once.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Test context holding a backend and a device created on it.
pub struct TestContext {
    pub mode: GpuMode,
    pub backend: Arc<DummyBackend>,
    pub device: Arc<GraphicsDevice>,
}

impl TestContext {
    pub fn new(mode: GpuMode) -> Self {
        Self::with_parameters(mode, DeviceParameters::default())
    }

    pub fn with_parameters(mode: GpuMode, parameters: DeviceParameters) -> Self {
        init_logging();
        let backend = Arc::new(mode.create_backend());
        let device = GraphicsDevice::new(backend.clone(), parameters)
            .expect("Failed to create graphics device");
        Self {
            mode,
            backend,
            device,
        }
    }

    /// Let the simulated GPU execute everything submitted so far.
    pub fn gpu_catch_up(&self) {
        self.backend.flush_queues();
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        self.backend.flush_queues();
    }
}

/// Parameters with a small upload ring, byte alignment and a 16 byte
/// watermark, so ring arithmetic in tests stays readable.
pub fn small_ring_parameters(capacity: u64) -> DeviceParameters {
    DeviceParameters::default()
        .with_upload_ring_capacity(capacity)
        .with_upload_ring_alignment(1)
        .with_upload_ring_watermark(16)
}

/// Generate a recognizable byte pattern.
pub fn test_pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
