//! # Hearth Graphics
//!
//! GPU resource lifetime and command submission synchronization core.
//!
//! ## Overview
//!
//! This crate provides the machinery that lets CPU-side code recycle and
//! upload to GPU-owned memory across overlapping frames without stalling the
//! pipeline or corrupting in-flight data:
//!
//! - [`Fence`] - timeline fence shared between the CPU and GPU queues
//! - [`DeferredReclaimer`] - destroys released GPU objects once the GPU is done
//!   with them
//! - [`UploadRingBuffer`] - growable, frame-aware upload ring
//! - [`SharedHandleCache`] / [`RootSignatureCache`] - deduplicating,
//!   reference-counted caches of expensive GPU objects
//! - [`GraphicsDevice`] and [`FramePipeline`] - the owning device and the
//!   per-frame driver
//!
//! The native graphics API sits behind the [`GpuBackend`] trait. The crate
//! ships [`DummyBackend`], an in-process simulated GPU.
//!
//! ## Example
//!
//! ```ignore
//! use hearth_graphics::{DeviceParameters, FramePipeline, GraphicsDevice};
//!
//! let device = GraphicsDevice::with_default_backend(DeviceParameters::from_env()?)?;
//! let mut pipeline = FramePipeline::new(device.clone())?;
//!
//! pipeline.begin_frame();
//! let constants = pipeline.upload_ring().allocate_pod(&camera)?;
//! // record and execute command lists...
//! pipeline.end_frame();
//! ```

pub mod backend;
pub mod cache;
pub mod command;
pub mod device;
pub mod error;
pub mod parameters;
pub mod pipeline;
pub mod resources;
pub mod sync;
pub mod types;

// Re-export main types for convenience
pub use backend::{CommandQueue, DummyBackend, GpuBackend, QueueType};
pub use cache::{
    ContentHash, RootSignature, RootSignatureCache, RootSignatureHandle, SharedHandle,
    SharedHandleCache,
};
pub use command::CommandList;
pub use device::GraphicsDevice;
pub use error::GraphicsError;
pub use parameters::DeviceParameters;
pub use pipeline::FramePipeline;
pub use resources::{
    Buffer, DeferredReclaimer, Reclaimable, RingBufferConfig, RingBufferRegion, UploadRingBuffer,
};
pub use sync::{Fence, FenceStatus};
pub use types::{
    BufferDescriptor, BufferUsage, HeapType, RootParameter, RootSignatureDescriptor, ShaderStages,
};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// This should be called before using any graphics functionality.
pub fn init() {
    log::info!("Hearth Graphics v{} initialized", VERSION);
}
