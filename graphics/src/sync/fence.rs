//! Timeline fence.
//!
//! A [`Fence`] wraps one monotonically increasing counter shared between the
//! CPU and the GPU. The CPU hands out values with [`Fence::signal`]; queues set
//! the fence to those values as their work completes.
//!
//! Two counters are tracked on the CPU side:
//!
//! - `next_value`: the value the next [`signal`](Fence::signal) will use;
//! - `wait_value`: the last value signaled, which [`wait_signal`](Fence::wait_signal)
//!   and [`check_signal`](Fence::check_signal) compare against.
//!
//! `wait_value < next_value` holds at all times.
//!
//! # Example
//!
//! ```ignore
//! let value = fence.signal(queue.as_ref());
//! // ... later, before reusing what the frame referenced:
//! fence.wait_for_value(value);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::backend::{CommandQueue, GpuBackend, RawFence};
use crate::error::GraphicsError;
use crate::resources::{DeferredReclaimer, Reclaimable};

/// Status of a fence relative to its last signaled value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The GPU has not reached the last signaled value yet.
    Pending,
    /// All signaled work has completed.
    Signaled,
}

/// CPU/GPU timeline synchronization primitive.
pub struct Fence {
    backend: Arc<dyn GpuBackend>,
    raw: RawFence,
    next_value: AtomicU64,
    wait_value: AtomicU64,
    retired: bool,
}

impl Fence {
    /// Create a fence at value 0.
    ///
    /// # Errors
    ///
    /// Fails if the backend cannot create the fence or its wait primitive.
    /// The fence must not be used in that case.
    pub fn new(backend: Arc<dyn GpuBackend>) -> Result<Self, GraphicsError> {
        let raw = backend.create_fence(0)?;
        log::trace!("Created fence {}", raw.raw());
        Ok(Self {
            backend,
            raw,
            next_value: AtomicU64::new(1),
            wait_value: AtomicU64::new(0),
            retired: false,
        })
    }

    /// The backend fence object.
    pub fn raw(&self) -> RawFence {
        self.raw
    }

    /// The value the next [`signal`](Self::signal) will use.
    pub fn next_value(&self) -> u64 {
        self.next_value.load(Ordering::Acquire)
    }

    /// The last value handed out by [`signal`](Self::signal).
    pub fn wait_value(&self) -> u64 {
        self.wait_value.load(Ordering::Acquire)
    }

    /// The last value the GPU reported as completed.
    pub fn completed_value(&self) -> u64 {
        self.backend.fence_completed_value(self.raw)
    }

    /// Whether the GPU has reached `value`.
    pub fn is_value_reached(&self, value: u64) -> bool {
        self.completed_value() >= value
    }

    /// Ask `queue` to set the fence once its previously enqueued work is done.
    ///
    /// Returns the signaled value, which becomes the new wait value. Calls
    /// must be serialized by the caller (one coordinating thread per queue).
    pub fn signal(&self, queue: &dyn CommandQueue) -> u64 {
        let value = self.next_value.fetch_add(1, Ordering::AcqRel);
        self.wait_value.store(value, Ordering::Release);
        log::trace!("Fence {}: signal {} on {:?}", self.raw.raw(), value, queue.queue_type());
        queue.signal(self.raw, value);
        value
    }

    /// Signal an explicit value, leaving the internal counters untouched.
    pub fn signal_value(&self, queue: &dyn CommandQueue, value: u64) {
        log::trace!("Fence {}: signal explicit {}", self.raw.raw(), value);
        queue.signal(self.raw, value);
    }

    /// Block until the last signaled value is reached.
    pub fn wait_signal(&self) {
        self.wait_for_value(self.wait_value());
    }

    /// Block until the GPU reaches `value`.
    ///
    /// Returns immediately, without touching the wait primitive, when the
    /// value has already been reached.
    pub fn wait_for_value(&self, value: u64) {
        if self.is_value_reached(value) {
            return;
        }
        log::trace!("Fence {}: blocking for {}", self.raw.raw(), value);
        self.backend.wait_fence(self.raw, value, None);
    }

    /// Block until the GPU reaches `value` or `timeout` elapses.
    ///
    /// Returns `true` if the value was reached.
    pub fn wait_for_value_timeout(&self, value: u64, timeout: Duration) -> bool {
        if self.is_value_reached(value) {
            return true;
        }
        self.backend.wait_fence(self.raw, value, Some(timeout))
    }

    /// Make `queue` hold its subsequent work until the last signaled value is
    /// reached. Never blocks the CPU.
    pub fn wait_on_queue(&self, queue: &dyn CommandQueue) {
        queue.wait(self.raw, self.wait_value());
    }

    /// Non-blocking poll: has all signaled work completed?
    pub fn check_signal(&self) -> bool {
        self.is_value_reached(self.wait_value())
    }

    /// [`check_signal`](Self::check_signal) as a [`FenceStatus`].
    pub fn status(&self) -> FenceStatus {
        if self.check_signal() {
            FenceStatus::Signaled
        } else {
            FenceStatus::Pending
        }
    }

    /// Hand the backend fence object to `reclaimer` instead of destroying it
    /// now, for fences that queued work may still signal.
    pub fn retire(mut self, reclaimer: &DeferredReclaimer) {
        self.retired = true;
        reclaimer.enqueue(Reclaimable::Fence(self.raw));
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        if !self.retired {
            self.backend.destroy_fence(self.raw);
        }
    }
}

impl std::fmt::Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fence")
            .field("raw", &self.raw)
            .field("next_value", &self.next_value())
            .field("wait_value", &self.wait_value())
            .finish()
    }
}

static_assertions::assert_impl_all!(Fence: Send, Sync);
