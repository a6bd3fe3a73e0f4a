//! Frame pipeline for managing multiple frames in flight.
//!
//! This module provides [`FramePipeline`], the per-frame orchestrator of the
//! synchronization core. It paces the CPU against the GPU with the device's
//! frame fence and drives everything that advances on frame boundaries:
//!
//! - waits for the oldest frame slot before reusing it;
//! - destroys released GPU objects whose fence value was reached;
//! - sweeps dead root signature cache slots;
//! - starts a new generation in the frame upload ring.
//!
//! # Frame Overlap (Pipelining)
//!
//! With 2 frames in flight, the CPU and GPU work in parallel:
//!
//! ```text
//! Frame 0: [CPU build] [submit] ─────────────────────────────────────────────►
//!                               [GPU execute frame 0] ───────────────────────►
//!
//! Frame 1:              [CPU build] [submit] ────────────────────────────────►
//!                                            [GPU execute frame 1] ──────────►
//!
//! Frame 2:                          [wait F0] [CPU build] [submit] ──────────►
//!                                                         [GPU execute F2] ──►
//!
//! Time ──────────────────────────────────────────────────────────────────────►
//! ```
//!
//! The upload ring protects exactly `frames_in_flight` generations, so by the
//! time `begin_frame` has waited for a slot, the ring space that slot's frame
//! used is free again.
//!
//! # Example
//!
//! ```ignore
//! let device = GraphicsDevice::new(backend, DeviceParameters::default())?;
//! let mut pipeline = FramePipeline::new(Arc::clone(&device))?;
//!
//! while !window.should_close() {
//!     pipeline.begin_frame();  // May block if GPU is behind
//!
//!     let mut list = device.create_command_list();
//!     pipeline.upload_ring().copy_into_buffer(&mut list, &vertex_buffer, 0, bytes)?;
//!     device.execute(list)?;
//!
//!     pipeline.end_frame();
//!     pipeline.wait_for_present(Duration::from_millis(16));
//! }
//!
//! // Graceful shutdown - wait for all GPU work
//! pipeline.wait_idle();
//! ```
//!
//! # Choosing Frames in Flight
//!
//! | Count | Behavior |
//! |-------|----------|
//! | 1 | CPU waits for GPU every frame. Simple but slow. |
//! | 2 | Good balance. CPU can work on N+1 while GPU renders N. |
//! | 3 | More overlap, higher latency. Useful for heavy CPU work. |

use std::sync::Arc;
use std::time::Duration;

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::UploadRingBuffer;

/// Manages multiple frames in flight for CPU-GPU parallelism.
///
/// # Frame Slots
///
/// With N frames in flight, there are N "slots". Each slot remembers the
/// frame fence value signaled at the end of the frame that last used it. When
/// all slots are full, [`begin_frame`](Self::begin_frame) blocks until the
/// oldest frame completes.
///
/// ```text
/// frames_in_flight = 2
///
/// Slot 0: [Frame 0] ──► [Frame 2] ──► [Frame 4] ──►
/// Slot 1: [Frame 1] ──► [Frame 3] ──► [Frame 5] ──►
/// ```
///
/// # Thread Safety
///
/// `FramePipeline` should be owned by a single thread (typically the render
/// thread). Its upload ring may be shared with worker threads.
#[derive(Debug)]
pub struct FramePipeline {
    device: Arc<GraphicsDevice>,
    upload_ring: UploadRingBuffer,

    /// Frame fence value of each slot. `None` if the slot hasn't been used yet.
    frame_values: Vec<Option<u64>>,

    /// Current frame slot index (0 to frames_in_flight - 1).
    current_slot: usize,

    /// Total number of frames started.
    frame_count: u64,

    /// Fence value of the most recently ended frame.
    last_value: Option<u64>,
}

impl FramePipeline {
    /// Create a pipeline with the device's `frames_in_flight` and a new
    /// upload ring.
    pub fn new(device: Arc<GraphicsDevice>) -> Result<Self, GraphicsError> {
        let frames_in_flight = device.parameters().frames_in_flight;
        let upload_ring = device.create_upload_ring()?;
        Ok(Self {
            device,
            upload_ring,
            frame_values: vec![None; frames_in_flight],
            current_slot: 0,
            frame_count: 0,
            last_value: None,
        })
    }

    /// Begin a new frame.
    ///
    /// Waits for the current frame slot to become available, reclaims what
    /// the GPU has finished with and opens a new upload ring generation.
    pub fn begin_frame(&mut self) {
        if let Some(value) = self.frame_values[self.current_slot] {
            self.device.frame_fence().wait_for_value(value);
        }
        self.start_frame();
    }

    /// Like [`begin_frame`](Self::begin_frame), but returns `false` without
    /// starting a frame if the slot is not free within `timeout`.
    pub fn begin_frame_timeout(&mut self, timeout: Duration) -> bool {
        if let Some(value) = self.frame_values[self.current_slot]
            && !self.device.frame_fence().wait_for_value_timeout(value, timeout)
        {
            return false;
        }
        self.start_frame();
        true
    }

    fn start_frame(&mut self) {
        self.device.collect_garbage();
        self.device.root_signatures().sweep();
        self.upload_ring.begin_new_frame();
        self.frame_count += 1;

        log::trace!(
            "Begin frame {} (slot {})",
            self.frame_count,
            self.current_slot
        );
    }

    /// End the current frame.
    ///
    /// Signals the frame fence after all work submitted so far, records the
    /// value for this slot and advances to the next slot. Returns the value.
    pub fn end_frame(&mut self) -> u64 {
        let value = self.device.signal_frame();
        log::trace!(
            "End frame {} (slot {}, fence value {})",
            self.frame_count,
            self.current_slot,
            value
        );

        self.frame_values[self.current_slot] = Some(value);
        self.last_value = Some(value);
        self.current_slot = (self.current_slot + 1) % self.frame_values.len();
        value
    }

    /// Best-effort pacing on the most recently ended frame.
    ///
    /// Returns `true` if that frame completed within `timeout`. Expiry is not
    /// an error.
    pub fn wait_for_present(&self, timeout: Duration) -> bool {
        let Some(value) = self.last_value else {
            return true;
        };
        let reached = self
            .device
            .frame_fence()
            .wait_for_value_timeout(value, timeout);
        if !reached {
            log::warn!(
                "Present wait for fence value {} timed out after {:?}",
                value,
                timeout
            );
        }
        reached
    }

    /// Wait for all in-flight GPU work to complete and destroy everything
    /// released so far.
    pub fn wait_idle(&self) {
        log::trace!("Waiting for GPU idle ({} slots)", self.frame_values.len());
        self.device.wait_idle();
        log::trace!("GPU idle");
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    /// The upload ring whose generations follow this pipeline's frames.
    pub fn upload_ring(&self) -> &UploadRingBuffer {
        &self.upload_ring
    }

    /// Get the number of frames in flight.
    pub fn frames_in_flight(&self) -> usize {
        self.frame_values.len()
    }

    /// Get the current frame slot index.
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Get the total number of frames started.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Check if a specific frame slot is ready (non-blocking).
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range.
    pub fn is_slot_ready(&self, slot: usize) -> bool {
        assert!(slot < self.frame_values.len(), "Invalid slot index");

        match self.frame_values[slot] {
            Some(value) => self.device.frame_fence().is_value_reached(value),
            None => true,
        }
    }

    /// Check if all frame slots are ready (non-blocking).
    pub fn is_idle(&self) -> bool {
        (0..self.frame_values.len()).all(|slot| self.is_slot_ready(slot))
    }
}
