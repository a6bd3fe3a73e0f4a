//! GPU buffer resource.

use std::sync::Arc;

use crate::backend::RawBuffer;
use crate::error::GraphicsError;
use crate::resources::{DeferredReclaimer, Reclaimable};
use crate::types::BufferDescriptor;

/// A GPU buffer resource.
///
/// Buffers are created by [`GraphicsDevice::create_buffer`] and own their
/// backend object. Dropping a buffer does not destroy it immediately: the
/// backend object is handed to the [`DeferredReclaimer`] and destroyed once
/// the GPU has finished all work submitted before the drop.
///
/// # Example
///
/// ```ignore
/// let buffer = device.create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX))?;
/// println!("Buffer size: {}", buffer.size());
/// ```
///
/// [`GraphicsDevice::create_buffer`]: crate::GraphicsDevice::create_buffer
pub struct Buffer {
    raw: RawBuffer,
    descriptor: BufferDescriptor,
    reclaimer: Arc<DeferredReclaimer>,
}

impl Buffer {
    /// Create a buffer whose destruction is routed through `reclaimer`.
    pub(crate) fn new(
        reclaimer: Arc<DeferredReclaimer>,
        descriptor: BufferDescriptor,
    ) -> Result<Self, GraphicsError> {
        let raw = reclaimer.backend().create_buffer(&descriptor)?;
        Ok(Self {
            raw,
            descriptor,
            reclaimer,
        })
    }

    /// The backend buffer object.
    pub fn raw(&self) -> RawBuffer {
        self.raw
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    /// Get the buffer label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Write `data` at `offset` through a CPU mapping.
    ///
    /// # Errors
    ///
    /// Fails if the buffer does not live in a CPU-writable heap or the range
    /// is out of bounds.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<(), GraphicsError> {
        self.reclaimer.backend().write_buffer(self.raw, offset, data)
    }

    /// Read `size` bytes back from `offset`.
    pub fn read(&self, offset: u64, size: u64) -> Result<Vec<u8>, GraphicsError> {
        self.reclaimer.backend().read_buffer(self.raw, offset, size)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.reclaimer.enqueue(Reclaimable::Buffer(self.raw));
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("raw", &self.raw)
            .field("size", &self.descriptor.size)
            .field("usage", &self.descriptor.usage)
            .field("heap", &self.descriptor.heap)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Buffer: Send, Sync);
