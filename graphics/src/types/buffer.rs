//! Buffer types and descriptors.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be used as a constant (uniform) buffer.
        const CONSTANT = 1 << 2;
        /// Buffer can be used as a structured / storage buffer.
        const STORAGE = 1 << 3;
        /// Buffer can be used for indirect arguments.
        const INDIRECT = 1 << 4;
        /// Buffer can be the source of a copy.
        const COPY_SRC = 1 << 5;
        /// Buffer can be the destination of a copy.
        const COPY_DST = 1 << 6;
        /// Buffer backs an upload ring.
        const RING = 1 << 7;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Memory heap a buffer is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HeapType {
    /// GPU-local memory. Not CPU visible; filled through copies.
    #[default]
    Default,
    /// CPU-writable, GPU-readable staging memory.
    Upload,
    /// GPU-writable, CPU-readable memory for readback.
    Readback,
}

impl HeapType {
    /// Whether the CPU may map and write this heap.
    pub fn is_cpu_writable(self) -> bool {
        matches!(self, Self::Upload)
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
    /// Heap the buffer lives in.
    pub heap: HeapType,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor in the default heap.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
            heap: HeapType::Default,
        }
    }

    /// Create a descriptor for a CPU-writable upload buffer.
    pub fn upload(size: u64) -> Self {
        Self {
            label: None,
            size,
            usage: BufferUsage::COPY_SRC,
            heap: HeapType::Upload,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the heap type.
    pub fn with_heap(mut self, heap: HeapType) -> Self {
        self.heap = heap;
        self
    }
}
