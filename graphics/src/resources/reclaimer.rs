//! Deferred destruction of GPU objects.
//!
//! GPU commands execute asynchronously: the CPU records and submits frames
//! while the GPU is still one or more frames behind. An object dropped on the
//! CPU may therefore still be referenced by submitted work, so it can't be
//! destroyed immediately.
//!
//! The [`DeferredReclaimer`] holds such objects until the frame fence proves
//! that everything submitted before their release has completed.
//!
//! ```text
//! enqueue(object)                 collect_on_frame_boundary()
//!   record fence.next_value()       completed = fence.completed_value()
//!   push (object, value)            destroy every entry with value <= completed
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::backend::{GpuBackend, RawBuffer, RawFence, RawRootSignature};
use crate::sync::Fence;

/// A GPU object pending destruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reclaimable {
    Buffer(RawBuffer),
    RootSignature(RawRootSignature),
    Fence(RawFence),
}

impl Reclaimable {
    /// Destroy the object now. The GPU must no longer reference it.
    pub fn destroy(self, backend: &dyn GpuBackend) {
        match self {
            Reclaimable::Buffer(buffer) => backend.destroy_buffer(buffer),
            Reclaimable::RootSignature(root_signature) => {
                backend.destroy_root_signature(root_signature)
            }
            Reclaimable::Fence(fence) => backend.destroy_fence(fence),
        }
    }
}

#[derive(Debug)]
struct PendingDestroy {
    object: Reclaimable,
    value: u64,
}

/// Queue of GPU objects waiting for the frame fence before destruction.
pub struct DeferredReclaimer {
    backend: Arc<dyn GpuBackend>,
    fence: Arc<Fence>,
    pending: Mutex<Vec<PendingDestroy>>,
    destroyed: AtomicUsize,
}

impl DeferredReclaimer {
    /// Create a reclaimer gated on `fence`.
    pub fn new(backend: Arc<dyn GpuBackend>, fence: Arc<Fence>) -> Self {
        Self {
            backend,
            fence,
            pending: Mutex::new(Vec::new()),
            destroyed: AtomicUsize::new(0),
        }
    }

    /// The backend objects are destroyed through.
    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// The fence gating destruction.
    pub fn fence(&self) -> &Arc<Fence> {
        &self.fence
    }

    /// Queue `object` for destruction once all work submitted so far has
    /// completed, i.e. once the fence reaches its next signal value.
    pub fn enqueue(&self, object: Reclaimable) {
        let value = self.fence.next_value();
        log::trace!("Deferred destruction of {:?} until fence value {}", object, value);
        self.pending.lock().push(PendingDestroy { object, value });
    }

    /// Destroy every pending object whose fence value has been reached.
    ///
    /// Called once per frame by the owner. Returns the number destroyed.
    pub fn collect_on_frame_boundary(&self) -> usize {
        let completed = self.fence.completed_value();
        let ready: Vec<PendingDestroy> = {
            let mut pending = self.pending.lock();
            let (ready, still_pending) = std::mem::take(&mut *pending)
                .into_iter()
                .partition(|entry| entry.value <= completed);
            *pending = still_pending;
            ready
        };

        let count = ready.len();
        for entry in ready {
            entry.object.destroy(self.backend.as_ref());
        }
        if count > 0 {
            self.destroyed.fetch_add(count, Ordering::Relaxed);
            log::debug!(
                "Reclaimed {} objects (fence completed {}, {} still pending)",
                count,
                completed,
                self.pending_count()
            );
        }
        count
    }

    /// Destroy everything regardless of fence state.
    ///
    /// Only valid once the GPU is idle.
    pub fn flush_all(&self) -> usize {
        let all = std::mem::take(&mut *self.pending.lock());
        let count = all.len();
        for entry in all {
            entry.object.destroy(self.backend.as_ref());
        }
        if count > 0 {
            self.destroyed.fetch_add(count, Ordering::Relaxed);
            log::debug!("Flushed {} deferred objects", count);
        }
        count
    }

    /// Number of objects waiting for destruction.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Total number of objects destroyed so far.
    pub fn destroyed_count(&self) -> usize {
        self.destroyed.load(Ordering::Relaxed)
    }
}

impl Drop for DeferredReclaimer {
    fn drop(&mut self) {
        let pending = self.pending_count();
        if pending > 0 {
            log::warn!("DeferredReclaimer dropped with {} pending objects", pending);
            self.flush_all();
        }
    }
}

impl std::fmt::Debug for DeferredReclaimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredReclaimer")
            .field("pending", &self.pending_count())
            .field("destroyed", &self.destroyed_count())
            .finish()
    }
}

static_assertions::assert_impl_all!(DeferredReclaimer: Send, Sync);
