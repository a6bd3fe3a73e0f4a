//! Upload ring buffer for streaming data to the GPU.
//!
//! A ring buffer (also called a circular buffer) serves transient upload
//! memory for per-frame data: constants, dynamic vertices, staging copies.
//! Instead of creating a buffer per upload, one CPU-writable buffer is carved
//! into consecutive regions and the write cursor wraps to the start when it
//! reaches the end.
//!
//! # Frame window
//!
//! Regions written in a frame may still be read by the GPU for the next
//! `frame_latency - 1` frames. The ring remembers where each of the last
//! `frame_latency` frames started (the current frame included) and never hands
//! out memory inside that window:
//!
//! ```text
//!  unwrapped                         wrapped
//!  |....[oldest ... tail)....|       |.. tail)....[oldest ......|
//!        protected                       free      protected
//! ```
//!
//! With the default latency of 2 the window boundaries are `prev_head` (start
//! of the previous frame) and `head` (start of the current one). The caller
//! guarantees that work older than the window has completed on the GPU; the
//! [`FramePipeline`](crate::pipeline::FramePipeline) does so by waiting on the
//! frame fence before calling [`begin_new_frame`](UploadRingBuffer::begin_new_frame).
//!
//! # Growth
//!
//! When a request does not fit, even after wrapping and keeping `watermark`
//! bytes clear of the oldest boundary, the ring grows: capacity doubles until
//! the request fits, the old buffer is handed to the deferred reclaimer (the GPU
//! may still read it) and all cursors restart at 0. Memory therefore settles at
//! the high-water mark of a frame window.
//!
//! # Example
//!
//! ```ignore
//! let ring = UploadRingBuffer::new(&device, RingBufferConfig::new(64 * 1024))?;
//!
//! ring.begin_new_frame();
//! let region = ring.allocate_pod(&camera_uniforms)?;
//! // bind region.buffer at region.offset
//!
//! // or stage a copy into a GPU-local buffer
//! ring.copy_into_buffer(&mut cmd_list, &vertex_buffer, 0, bytemuck::cast_slice(&vertices))?;
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::RawBuffer;
use crate::command::CommandList;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::{Buffer, DeferredReclaimer};
use crate::types::{BufferDescriptor, BufferUsage, HeapType};

/// A region handed out by the ring.
///
/// `offset + size <= capacity` of the buffer it was carved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RingBufferRegion {
    /// The buffer the region lives in.
    pub buffer: RawBuffer,
    /// Byte offset into the buffer.
    pub offset: u64,
    /// Size of the region in bytes.
    pub size: u64,
}

impl RingBufferRegion {
    /// Get the end offset (offset + size).
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Configuration of an [`UploadRingBuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingBufferConfig {
    /// Initial capacity in bytes.
    pub capacity: u64,
    /// Default allocation alignment. Must be a power of two.
    pub alignment: u64,
    /// Bytes kept clear between a wrapped write and the oldest in-flight
    /// region.
    pub watermark: u64,
    /// Number of frames whose allocations stay protected, the current frame
    /// included.
    pub frame_latency: usize,
    /// Debug label of the backing buffer.
    pub label: Option<String>,
}

impl RingBufferConfig {
    /// Default alignment for allocations (256 bytes).
    ///
    /// This matches the constant buffer placement alignment most GPUs require.
    pub const DEFAULT_ALIGNMENT: u64 = 256;
    pub const DEFAULT_WATERMARK: u64 = 256;
    pub const DEFAULT_FRAME_LATENCY: usize = 2;

    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            alignment: Self::DEFAULT_ALIGNMENT,
            watermark: Self::DEFAULT_WATERMARK,
            frame_latency: Self::DEFAULT_FRAME_LATENCY,
            label: None,
        }
    }

    pub fn with_alignment(mut self, alignment: u64) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_watermark(mut self, watermark: u64) -> Self {
        self.watermark = watermark;
        self
    }

    pub fn with_frame_latency(mut self, frame_latency: usize) -> Self {
        self.frame_latency = frame_latency;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    fn validate(&self) -> Result<(), GraphicsError> {
        if !self.alignment.is_power_of_two() {
            return Err(GraphicsError::InvalidParameter(format!(
                "alignment must be a power of 2, got {}",
                self.alignment
            )));
        }
        if self.capacity == 0 {
            return Err(GraphicsError::InvalidParameter(
                "ring buffer capacity cannot be zero".to_string(),
            ));
        }
        if self.frame_latency == 0 {
            return Err(GraphicsError::InvalidParameter(
                "ring buffer frame latency cannot be zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RingBufferConfig {
    fn default() -> Self {
        Self::new(4 * 1024 * 1024)
    }
}

/// Allocations made during one frame.
#[derive(Debug, Clone, Copy)]
struct FrameSpan {
    start: u64,
    bytes: u64,
}

impl FrameSpan {
    fn empty(start: u64) -> Self {
        Self { start, bytes: 0 }
    }
}

struct RingState {
    buffer: Buffer,
    capacity: u64,
    tail: u64,
    /// Oldest protected frame at the front, current frame at the back.
    frames: VecDeque<FrameSpan>,
    grow_count: u64,
}

impl RingState {
    /// Start of the oldest frame that still owns bytes.
    fn oldest_live(&self) -> Option<u64> {
        self.frames.iter().find(|f| f.bytes > 0).map(|f| f.start)
    }

    /// Offset where `size` bytes fit without growth, if any.
    fn place(&self, size: u64, alignment: u64, watermark: u64) -> Option<u64> {
        let Some(oldest) = self.oldest_live() else {
            return (size <= self.capacity).then_some(0);
        };

        let aligned_tail = align_up(self.tail, alignment);
        if self.tail > oldest {
            if aligned_tail + size <= self.capacity {
                return Some(aligned_tail);
            }
            // Wrap to the start, stopping short of the oldest live frame
            return (size + watermark <= oldest).then_some(0);
        }

        // Already wrapped: free space is [tail, oldest)
        (aligned_tail + size + watermark <= oldest).then_some(aligned_tail)
    }

    fn commit(&mut self, offset: u64, size: u64) {
        if let Some(current) = self.frames.back_mut() {
            if current.bytes == 0 {
                current.start = offset;
            }
            current.bytes += size;
        }
        self.tail = offset + size;
    }
}

/// A growable, thread-safe upload ring buffer.
///
/// Allocation copies the caller's data into the region before returning, so
/// a region is ready to be read by any command list submitted afterwards.
pub struct UploadRingBuffer {
    reclaimer: Arc<DeferredReclaimer>,
    state: Mutex<RingState>,
    alignment: u64,
    watermark: u64,
    frame_latency: usize,
    label: Option<String>,
}

impl UploadRingBuffer {
    /// Create a ring buffer backed by an upload-heap buffer of `device`.
    ///
    /// The capacity is rounded up to the alignment.
    pub fn new(device: &GraphicsDevice, config: RingBufferConfig) -> Result<Self, GraphicsError> {
        config.validate()?;
        let capacity = align_up(config.capacity, config.alignment);
        let reclaimer = Arc::clone(device.reclaimer());
        let buffer = create_ring_buffer(&reclaimer, capacity, config.label.as_deref())?;

        log::info!(
            "Created upload ring buffer {:?} ({} bytes, frame latency {})",
            config.label,
            capacity,
            config.frame_latency
        );

        Ok(Self {
            reclaimer,
            state: Mutex::new(RingState {
                buffer,
                capacity,
                tail: 0,
                frames: VecDeque::from([FrameSpan::empty(0)]),
                grow_count: 0,
            }),
            alignment: config.alignment,
            watermark: config.watermark,
            frame_latency: config.frame_latency,
            label: config.label,
        })
    }

    /// Start a new frame generation.
    ///
    /// Allocations made `frame_latency` frames ago become reusable. Call once
    /// per frame before that frame's allocations, after the GPU is known to
    /// have finished them.
    pub fn begin_new_frame(&self) {
        let mut state = self.state.lock();
        let tail = state.tail;
        state.frames.push_back(FrameSpan::empty(tail));
        while state.frames.len() > self.frame_latency {
            state.frames.pop_front();
        }
    }

    /// Allocate a region with the default alignment and copy `data` into it.
    ///
    /// # Errors
    ///
    /// Fails only if the ring has to grow and the new buffer cannot be
    /// created. The ring is left unchanged in that case.
    pub fn allocate(&self, data: &[u8]) -> Result<RingBufferRegion, GraphicsError> {
        self.allocate_aligned(data, self.alignment)
    }

    /// Allocate a region aligned to `alignment` and copy `data` into it.
    pub fn allocate_aligned(
        &self,
        data: &[u8],
        alignment: u64,
    ) -> Result<RingBufferRegion, GraphicsError> {
        debug_assert!(alignment.is_power_of_two(), "alignment must be power of 2");
        let size = data.len() as u64;

        let mut state = self.state.lock();
        if size == 0 {
            return Ok(RingBufferRegion {
                buffer: state.buffer.raw(),
                offset: state.tail,
                size: 0,
            });
        }

        let offset = match state.place(size, alignment, self.watermark) {
            Some(offset) => offset,
            None => {
                self.grow(&mut state, size)?;
                0
            }
        };

        state.buffer.write(offset, data)?;
        state.commit(offset, size);
        log::trace!("Ring allocation: offset={} size={}", offset, size);

        Ok(RingBufferRegion {
            buffer: state.buffer.raw(),
            offset,
            size,
        })
    }

    /// Allocate a region holding `value`.
    pub fn allocate_pod<T: bytemuck::Pod>(
        &self,
        value: &T,
    ) -> Result<RingBufferRegion, GraphicsError> {
        self.allocate(bytemuck::bytes_of(value))
    }

    /// Stage `data` in the ring and record a copy of it into `dst` at
    /// `dst_offset`.
    pub fn copy_into_buffer(
        &self,
        cmd_list: &mut CommandList,
        dst: &Buffer,
        dst_offset: u64,
        data: &[u8],
    ) -> Result<RingBufferRegion, GraphicsError> {
        if cmd_list.is_closed() {
            return Err(GraphicsError::InvalidParameter(
                "cannot record an upload into a closed command list".to_string(),
            ));
        }
        let size = data.len() as u64;
        if dst_offset.checked_add(size).is_none_or(|end| end > dst.size()) {
            return Err(GraphicsError::InvalidParameter(format!(
                "copy of {} bytes at {} exceeds destination size {}",
                size,
                dst_offset,
                dst.size()
            )));
        }
        let region = self.allocate(data)?;
        if size > 0 {
            cmd_list.copy_buffer_region(dst.raw(), dst_offset, region.buffer, region.offset, size);
        }
        Ok(region)
    }

    fn grow(&self, state: &mut RingState, size: u64) -> Result<(), GraphicsError> {
        let mut new_capacity = state.capacity;
        loop {
            new_capacity = new_capacity
                .checked_mul(2)
                .ok_or(GraphicsError::OutOfMemory)?;
            if new_capacity >= size {
                break;
            }
        }

        let buffer = match create_ring_buffer(&self.reclaimer, new_capacity, self.label.as_deref())
        {
            Ok(buffer) => buffer,
            Err(e) => {
                log::error!(
                    "Failed to grow upload ring {:?} to {} bytes: {}",
                    self.label,
                    new_capacity,
                    e
                );
                return Err(e);
            }
        };

        log::debug!(
            "Upload ring {:?} grew {} -> {} bytes for a {} byte request",
            self.label,
            state.capacity,
            new_capacity,
            size
        );

        // The old buffer's drop hands it to the reclaimer.
        state.buffer = buffer;
        state.capacity = new_capacity;
        state.tail = 0;
        state.frames.clear();
        state.frames.push_back(FrameSpan::empty(0));
        state.grow_count += 1;
        Ok(())
    }

    /// The current backing buffer.
    pub fn buffer(&self) -> RawBuffer {
        self.state.lock().buffer.raw()
    }

    /// Current capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.state.lock().capacity
    }

    /// The write cursor.
    pub fn tail(&self) -> u64 {
        self.state.lock().tail
    }

    /// Start of the current frame's allocations.
    pub fn head(&self) -> u64 {
        let state = self.state.lock();
        state.frames.back().map_or(state.tail, |f| f.start)
    }

    /// Start of the previous frame's allocations.
    pub fn prev_head(&self) -> u64 {
        let state = self.state.lock();
        let len = state.frames.len();
        match len {
            0 => state.tail,
            1 => state.frames[0].start,
            _ => state.frames[len - 2].start,
        }
    }

    /// Number of times the ring has grown.
    pub fn grow_count(&self) -> u64 {
        self.state.lock().grow_count
    }

    /// Number of protected frames, the current one included.
    pub fn frame_latency(&self) -> usize {
        self.frame_latency
    }

    /// Default allocation alignment.
    pub fn alignment(&self) -> u64 {
        self.alignment
    }
}

impl std::fmt::Debug for UploadRingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("UploadRingBuffer")
            .field("label", &self.label)
            .field("capacity", &state.capacity)
            .field("tail", &state.tail)
            .field("frames", &state.frames)
            .field("alignment", &self.alignment)
            .field("watermark", &self.watermark)
            .field("grow_count", &state.grow_count)
            .finish()
    }
}

static_assertions::assert_impl_all!(UploadRingBuffer: Send, Sync);

fn create_ring_buffer(
    reclaimer: &Arc<DeferredReclaimer>,
    capacity: u64,
    label: Option<&str>,
) -> Result<Buffer, GraphicsError> {
    let mut descriptor = BufferDescriptor::new(capacity, BufferUsage::RING | BufferUsage::COPY_SRC)
        .with_heap(HeapType::Upload);
    if let Some(label) = label {
        descriptor = descriptor.with_label(format!("{label}_ring"));
    }
    Buffer::new(Arc::clone(reclaimer), descriptor)
}

/// Align a value up to the given alignment.
#[inline]
fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}
