//! Backend-agnostic command recording.
//!
//! A [`CommandList`] records GPU commands without touching the GPU. It is
//! closed and handed to a [`CommandQueue`](crate::backend::CommandQueue),
//! which translates the recorded commands for its backend. The core never
//! submits lists itself; it only records into lists supplied by the caller.

use crate::backend::RawBuffer;

/// A region within a buffer for copy operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferCopyRegion {
    /// Offset in bytes from the start of the source buffer.
    pub src_offset: u64,
    /// Offset in bytes from the start of the destination buffer.
    pub dst_offset: u64,
    /// Number of bytes to copy.
    pub size: u64,
}

impl BufferCopyRegion {
    /// Create a new buffer copy region.
    pub fn new(src_offset: u64, dst_offset: u64, size: u64) -> Self {
        Self {
            src_offset,
            dst_offset,
            size,
        }
    }
}

/// A recorded GPU command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuCommand {
    /// Copy bytes between two buffers.
    CopyBufferRegion {
        src: RawBuffer,
        dst: RawBuffer,
        region: BufferCopyRegion,
    },
}

/// A list of GPU commands waiting to be executed on a queue.
#[derive(Debug, Default)]
pub struct CommandList {
    label: Option<String>,
    commands: Vec<GpuCommand>,
    closed: bool,
}

impl CommandList {
    /// Create an empty, open command list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Get the debug label, if set.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Record a buffer-to-buffer copy.
    ///
    /// # Panics
    ///
    /// Panics if the list has already been closed.
    pub fn copy_buffer_region(
        &mut self,
        dst: RawBuffer,
        dst_offset: u64,
        src: RawBuffer,
        src_offset: u64,
        size: u64,
    ) {
        assert!(!self.closed, "recording into a closed command list");
        self.commands.push(GpuCommand::CopyBufferRegion {
            src,
            dst,
            region: BufferCopyRegion::new(src_offset, dst_offset, size),
        });
    }

    /// Finish recording. A list must be closed before it is executed.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Whether recording has finished.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Recorded commands in submission order.
    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Reopen the list for recording, keeping the allocation.
    pub fn reset(&mut self) {
        self.commands.clear();
        self.closed = false;
    }
}
