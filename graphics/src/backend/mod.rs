//! GPU backend abstraction layer.
//!
//! This module provides a trait-based abstraction over the native graphics
//! API. The synchronization core only talks to the GPU through these traits:
//!
//! - [`GpuBackend`]: device-level object creation, fence queries and waits,
//!   mapped buffer writes.
//! - [`CommandQueue`]: ordered submission channel (signal, GPU-side wait,
//!   command list execution).
//!
//! GPU objects are referred to by opaque `Copy` handles ([`RawBuffer`],
//! [`RawFence`], [`RawRootSignature`]) that only the creating backend can
//! resolve. Ownership of what a handle names lives one level up, in
//! [`Buffer`](crate::resources::Buffer), [`Fence`](crate::sync::Fence) and the
//! [`DeferredReclaimer`](crate::resources::DeferredReclaimer).
//!
//! # Available Backends
//!
//! - `dummy`: in-process simulated GPU for tests and tooling

pub mod dummy;

use std::sync::Arc;
use std::time::Duration;

pub use dummy::{DummyBackend, DummyQueue};

use crate::command::CommandList;
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, RootSignatureDescriptor};

macro_rules! raw_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a backend-specific id.
            pub fn from_raw(id: u64) -> Self {
                Self(id)
            }

            /// The backend-specific id.
            pub fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

raw_handle!(
    /// Opaque handle to a backend buffer object.
    RawBuffer
);
raw_handle!(
    /// Opaque handle to a backend timeline fence.
    RawFence
);
raw_handle!(
    /// Opaque handle to a backend root signature.
    RawRootSignature
);

/// Kind of work a command queue accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    /// Graphics, compute and copy.
    Direct,
    /// Compute and copy.
    Compute,
    /// Copy only.
    Copy,
}

/// An ordered submission channel for GPU work.
///
/// Operations are executed by the GPU in the order they were enqueued.
pub trait CommandQueue: Send + Sync + std::fmt::Debug {
    /// The queue type.
    fn queue_type(&self) -> QueueType;

    /// Set `fence` to `value` once all previously enqueued work completes.
    fn signal(&self, fence: RawFence, value: u64);

    /// Hold back subsequent work on this queue until `fence` reaches `value`.
    ///
    /// This never blocks the calling thread.
    fn wait(&self, fence: RawFence, value: u64);

    /// Submit a closed command list.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::InvalidParameter`] if the list is still open.
    fn execute(&self, list: CommandList) -> Result<(), GraphicsError>;
}

/// GPU backend trait for abstracting different GPU APIs.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Create a command queue.
    fn create_command_queue(
        &self,
        queue_type: QueueType,
    ) -> Result<Arc<dyn CommandQueue>, GraphicsError>;

    /// Create an empty, open command list.
    fn create_command_list(&self) -> CommandList {
        CommandList::new()
    }

    /// Create a timeline fence starting at `initial_value`, together with the
    /// CPU wait primitive used by [`wait_fence`](Self::wait_fence).
    fn create_fence(&self, initial_value: u64) -> Result<RawFence, GraphicsError>;

    /// The last value the GPU reported as completed.
    fn fence_completed_value(&self, fence: RawFence) -> u64;

    /// Block until `fence` reaches `value` or `timeout` elapses.
    ///
    /// Returns `true` if the value was reached. `None` waits forever.
    fn wait_fence(&self, fence: RawFence, value: u64, timeout: Option<Duration>) -> bool;

    /// Release a fence object.
    fn destroy_fence(&self, fence: RawFence);

    /// Create a buffer.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<RawBuffer, GraphicsError>;

    /// Map `buffer`, copy `data` in at `offset`, unmap.
    ///
    /// The write is visible to any command list submitted after this returns.
    fn write_buffer(&self, buffer: RawBuffer, offset: u64, data: &[u8])
    -> Result<(), GraphicsError>;

    /// Read back buffer contents.
    fn read_buffer(&self, buffer: RawBuffer, offset: u64, size: u64)
    -> Result<Vec<u8>, GraphicsError>;

    /// Release a buffer object. The GPU must no longer reference it.
    fn destroy_buffer(&self, buffer: RawBuffer);

    /// Build a root signature.
    fn create_root_signature(
        &self,
        descriptor: &RootSignatureDescriptor,
    ) -> Result<RawRootSignature, GraphicsError>;

    /// Release a root signature. The GPU must no longer reference it.
    fn destroy_root_signature(&self, root_signature: RawRootSignature);
}

/// Selects and creates the appropriate backend.
pub fn create_backend() -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    log::info!("Using dummy backend");
    Ok(Arc::new(DummyBackend::new()))
}
