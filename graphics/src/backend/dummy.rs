//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't talk to a GPU but simulates the parts of one the
//! synchronization core depends on:
//!
//! - buffers are plain byte vectors, so uploads and copies can be verified;
//! - fences hold a completed value guarded by a condvar, so CPU waits block
//!   for real;
//! - queues execute their operations in order, either immediately
//!   ([`DummyBackend::new`]) or only when flushed ([`DummyBackend::manual`]),
//!   which lets tests model a GPU that lags frames behind the CPU.
//!
//! Live-object counters allow tests to assert that nothing leaks and that
//! nothing is destroyed early.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::command::{CommandList, GpuCommand};
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, HeapType, RootSignatureDescriptor};

use super::{CommandQueue, GpuBackend, QueueType, RawBuffer, RawFence, RawRootSignature};

struct DummyFence {
    value: Mutex<u64>,
    signaled: Condvar,
}

impl DummyFence {
    fn new(initial_value: u64) -> Self {
        Self {
            value: Mutex::new(initial_value),
            signaled: Condvar::new(),
        }
    }

    fn completed(&self) -> u64 {
        *self.value.lock()
    }

    fn set(&self, value: u64) {
        let mut guard = self.value.lock();
        *guard = value;
        self.signaled.notify_all();
    }

    fn wait(&self, value: u64, timeout: Option<Duration>) -> bool {
        let mut guard = self.value.lock();
        let deadline = timeout.map(|t| Instant::now() + t);
        while *guard < value {
            match deadline {
                Some(deadline) => {
                    if self.signaled.wait_until(&mut guard, deadline).timed_out() {
                        return *guard >= value;
                    }
                }
                None => self.signaled.wait(&mut guard),
            }
        }
        true
    }
}

struct DummyBuffer {
    data: Vec<u8>,
    heap: HeapType,
}

struct DummyState {
    next_id: AtomicU64,
    buffers: Mutex<HashMap<u64, DummyBuffer>>,
    fences: Mutex<HashMap<u64, Arc<DummyFence>>>,
    root_signatures: Mutex<HashMap<u64, usize>>,
    allocated_bytes: AtomicU64,
    memory_budget: AtomicU64,
    root_signatures_built: AtomicUsize,
    fail_fence_creation: AtomicBool,
    queues: Mutex<Vec<Weak<DummyQueue>>>,
}

impl DummyState {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            buffers: Mutex::new(HashMap::new()),
            fences: Mutex::new(HashMap::new()),
            root_signatures: Mutex::new(HashMap::new()),
            allocated_bytes: AtomicU64::new(0),
            memory_budget: AtomicU64::new(u64::MAX),
            root_signatures_built: AtomicUsize::new(0),
            fail_fence_creation: AtomicBool::new(false),
            queues: Mutex::new(Vec::new()),
        }
    }

    fn live_queues(&self) -> Vec<Arc<DummyQueue>> {
        let mut queues = self.queues.lock();
        queues.retain(|q| q.strong_count() > 0);
        queues.iter().filter_map(Weak::upgrade).collect()
    }

    /// Flush every queue until none makes progress.
    fn flush_queues(&self) -> usize {
        let queues = self.live_queues();
        let mut total = 0;
        loop {
            let executed: usize = queues.iter().map(|q| q.flush()).sum();
            if executed == 0 {
                return total;
            }
            total += executed;
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn fence(&self, fence: RawFence) -> Option<Arc<DummyFence>> {
        self.fences.lock().get(&fence.raw()).cloned()
    }

    fn can_run(&self, op: &QueueOp) -> bool {
        match op {
            QueueOp::Wait { fence, value } => self
                .fence(*fence)
                .is_some_and(|f| f.completed() >= *value),
            QueueOp::Signal { .. } | QueueOp::Execute(_) => true,
        }
    }

    fn run(&self, op: QueueOp) {
        match op {
            QueueOp::Signal { fence, value } => match self.fence(fence) {
                Some(f) => {
                    log::trace!("DummyBackend: fence {} -> {}", fence.raw(), value);
                    f.set(value);
                }
                None => log::warn!("DummyBackend: signal on destroyed fence {}", fence.raw()),
            },
            QueueOp::Wait { .. } => {}
            QueueOp::Execute(list) => {
                for command in list.commands() {
                    self.run_command(command);
                }
            }
        }
    }

    fn run_command(&self, command: &GpuCommand) {
        match command {
            GpuCommand::CopyBufferRegion { src, dst, region } => {
                let mut buffers = self.buffers.lock();
                let Some(bytes) = byte_range(region.src_offset, region.size)
                    .and_then(|range| buffers.get(&src.raw())?.data.get(range))
                    .map(<[u8]>::to_vec)
                else {
                    log::error!(
                        "DummyBackend: copy source {} out of range (offset {}, size {})",
                        src.raw(),
                        region.src_offset,
                        region.size
                    );
                    return;
                };
                let target = match byte_range(region.dst_offset, region.size) {
                    Some(range) => buffers
                        .get_mut(&dst.raw())
                        .and_then(|b| b.data.get_mut(range)),
                    None => None,
                };
                match target {
                    Some(target) => target.copy_from_slice(&bytes),
                    None => log::error!(
                        "DummyBackend: copy destination {} out of range (offset {}, size {})",
                        dst.raw(),
                        region.dst_offset,
                        region.size
                    ),
                }
            }
        }
    }
}

/// `offset..offset + len` as indices, if it does not overflow.
fn byte_range(offset: u64, len: u64) -> Option<std::ops::Range<usize>> {
    let start = usize::try_from(offset).ok()?;
    let end = start.checked_add(usize::try_from(len).ok()?)?;
    Some(start..end)
}

#[derive(Debug)]
enum QueueOp {
    Signal { fence: RawFence, value: u64 },
    Wait { fence: RawFence, value: u64 },
    Execute(CommandList),
}

/// Command queue of the dummy backend.
pub struct DummyQueue {
    state: Arc<DummyState>,
    queue_type: QueueType,
    auto_complete: bool,
    pending: Mutex<VecDeque<QueueOp>>,
}

impl DummyQueue {
    fn enqueue(&self, op: QueueOp) {
        self.pending.lock().push_back(op);
        // Progress here may satisfy waits queued on other queues
        if self.auto_complete && self.flush() > 0 {
            self.state.flush_queues();
        }
    }

    /// Execute queued operations in order until the queue is empty or blocked
    /// on an unsatisfied GPU-side wait. Returns the number executed.
    pub fn flush(&self) -> usize {
        let mut pending = self.pending.lock();
        let mut executed = 0;
        while let Some(op) = pending.front() {
            if !self.state.can_run(op) {
                break;
            }
            if let Some(op) = pending.pop_front() {
                self.state.run(op);
                executed += 1;
            }
        }
        executed
    }

    /// Execute the next queued operation if it is not blocked.
    pub fn complete_next(&self) -> bool {
        let mut pending = self.pending.lock();
        match pending.front() {
            Some(op) if self.state.can_run(op) => {
                if let Some(op) = pending.pop_front() {
                    self.state.run(op);
                }
                true
            }
            _ => false,
        }
    }

    /// Number of operations not yet executed.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

impl std::fmt::Debug for DummyQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyQueue")
            .field("queue_type", &self.queue_type)
            .field("auto_complete", &self.auto_complete)
            .field("pending", &self.pending_len())
            .finish()
    }
}

impl CommandQueue for DummyQueue {
    fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    fn signal(&self, fence: RawFence, value: u64) {
        self.enqueue(QueueOp::Signal { fence, value });
    }

    fn wait(&self, fence: RawFence, value: u64) {
        self.enqueue(QueueOp::Wait { fence, value });
    }

    fn execute(&self, list: CommandList) -> Result<(), GraphicsError> {
        if !list.is_closed() {
            return Err(GraphicsError::InvalidParameter(
                "command list must be closed before execution".to_string(),
            ));
        }
        log::trace!(
            "DummyBackend: executing {:?} ({} commands)",
            list.label(),
            list.commands().len()
        );
        self.enqueue(QueueOp::Execute(list));
        Ok(())
    }
}

/// Dummy GPU backend.
pub struct DummyBackend {
    state: Arc<DummyState>,
    auto_complete: bool,
}

impl DummyBackend {
    /// Create a backend whose queues complete work as soon as it is submitted.
    pub fn new() -> Self {
        Self {
            state: Arc::new(DummyState::new()),
            auto_complete: true,
        }
    }

    /// Create a backend whose queues hold work until flushed.
    pub fn manual() -> Self {
        Self {
            auto_complete: false,
            ..Self::new()
        }
    }

    /// Flush every queue until none makes progress. Returns the number of
    /// operations executed.
    pub fn flush_queues(&self) -> usize {
        self.state.flush_queues()
    }

    /// Number of operations still queued across all queues.
    pub fn pending_queue_ops(&self) -> usize {
        self.state
            .live_queues()
            .iter()
            .map(|q| q.pending_len())
            .sum()
    }

    /// Move a fence as if the GPU had signaled it.
    pub fn set_fence_value(&self, fence: RawFence, value: u64) {
        if let Some(f) = self.state.fence(fence) {
            f.set(value);
        }
        if self.auto_complete {
            self.state.flush_queues();
        }
    }

    /// Limit total buffer memory. `None` removes the limit.
    pub fn set_memory_budget(&self, budget: Option<u64>) {
        self.state
            .memory_budget
            .store(budget.unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    /// Make subsequent fence creation fail.
    pub fn set_fail_fence_creation(&self, fail: bool) {
        self.state.fail_fence_creation.store(fail, Ordering::Relaxed);
    }

    /// Bytes of buffer memory currently allocated.
    pub fn allocated_bytes(&self) -> u64 {
        self.state.allocated_bytes.load(Ordering::Relaxed)
    }

    /// Number of live buffers.
    pub fn live_buffer_count(&self) -> usize {
        self.state.buffers.lock().len()
    }

    /// Number of live fences.
    pub fn live_fence_count(&self) -> usize {
        self.state.fences.lock().len()
    }

    /// Number of live root signatures.
    pub fn live_root_signature_count(&self) -> usize {
        self.state.root_signatures.lock().len()
    }

    /// Total number of root signatures ever built.
    pub fn root_signatures_built(&self) -> usize {
        self.state.root_signatures_built.load(Ordering::Relaxed)
    }

    /// Whether `buffer` is still alive.
    pub fn buffer_exists(&self, buffer: RawBuffer) -> bool {
        self.state.buffers.lock().contains_key(&buffer.raw())
    }

    /// Whether `root_signature` is still alive.
    pub fn root_signature_exists(&self, root_signature: RawRootSignature) -> bool {
        self.state
            .root_signatures
            .lock()
            .contains_key(&root_signature.raw())
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DummyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyBackend")
            .field("auto_complete", &self.auto_complete)
            .field("buffers", &self.live_buffer_count())
            .field("fences", &self.live_fence_count())
            .field("root_signatures", &self.live_root_signature_count())
            .finish()
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn create_command_queue(
        &self,
        queue_type: QueueType,
    ) -> Result<Arc<dyn CommandQueue>, GraphicsError> {
        let queue = Arc::new(DummyQueue {
            state: Arc::clone(&self.state),
            queue_type,
            auto_complete: self.auto_complete,
            pending: Mutex::new(VecDeque::new()),
        });
        self.state.queues.lock().push(Arc::downgrade(&queue));
        log::trace!("DummyBackend: created {:?} queue", queue_type);
        Ok(queue)
    }

    fn create_fence(&self, initial_value: u64) -> Result<RawFence, GraphicsError> {
        if self.state.fail_fence_creation.load(Ordering::Relaxed) {
            return Err(GraphicsError::InitializationFailed(
                "fence wait event could not be created".to_string(),
            ));
        }
        let id = self.state.next_id();
        self.state
            .fences
            .lock()
            .insert(id, Arc::new(DummyFence::new(initial_value)));
        Ok(RawFence::from_raw(id))
    }

    fn fence_completed_value(&self, fence: RawFence) -> u64 {
        match self.state.fence(fence) {
            Some(f) => f.completed(),
            None => {
                debug_assert!(false, "query on destroyed fence {}", fence.raw());
                0
            }
        }
    }

    fn wait_fence(&self, fence: RawFence, value: u64, timeout: Option<Duration>) -> bool {
        match self.state.fence(fence) {
            Some(f) => f.wait(value, timeout),
            None => false,
        }
    }

    fn destroy_fence(&self, fence: RawFence) {
        self.state.fences.lock().remove(&fence.raw());
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<RawBuffer, GraphicsError> {
        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }
        let mut buffers = self.state.buffers.lock();
        let allocated = self.state.allocated_bytes.load(Ordering::Relaxed);
        let budget = self.state.memory_budget.load(Ordering::Relaxed);
        if allocated.saturating_add(descriptor.size) > budget {
            log::trace!(
                "DummyBackend: {:?} ({} bytes) exceeds budget {}",
                descriptor.label,
                descriptor.size,
                budget
            );
            return Err(GraphicsError::OutOfMemory);
        }
        let id = self.state.next_id();
        buffers.insert(
            id,
            DummyBuffer {
                data: vec![0u8; descriptor.size as usize],
                heap: descriptor.heap,
            },
        );
        self.state
            .allocated_bytes
            .fetch_add(descriptor.size, Ordering::Relaxed);
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        Ok(RawBuffer::from_raw(id))
    }

    fn write_buffer(
        &self,
        buffer: RawBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let mut buffers = self.state.buffers.lock();
        let target = buffers.get_mut(&buffer.raw()).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("buffer {} does not exist", buffer.raw()))
        })?;
        if !target.heap.is_cpu_writable() {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer {} is not CPU writable",
                buffer.raw()
            )));
        }
        let slice = match byte_range(offset, data.len() as u64) {
            Some(range) => target.data.get_mut(range),
            None => None,
        };
        let slice = slice.ok_or_else(|| {
            GraphicsError::InvalidParameter(format!(
                "write of {} bytes at {offset} out of range for buffer {}",
                data.len(),
                buffer.raw()
            ))
        })?;
        slice.copy_from_slice(data);
        log::trace!(
            "DummyBackend: write_buffer offset={} len={}",
            offset,
            data.len()
        );
        Ok(())
    }

    fn read_buffer(
        &self,
        buffer: RawBuffer,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, GraphicsError> {
        let buffers = self.state.buffers.lock();
        let source = buffers.get(&buffer.raw()).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("buffer {} does not exist", buffer.raw()))
        })?;
        byte_range(offset, size)
            .and_then(|range| source.data.get(range))
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                GraphicsError::InvalidParameter(format!(
                    "read of {size} bytes at {offset} out of range for buffer {}",
                    buffer.raw()
                ))
            })
    }

    fn destroy_buffer(&self, buffer: RawBuffer) {
        let removed = self.state.buffers.lock().remove(&buffer.raw());
        match removed {
            Some(b) => {
                self.state
                    .allocated_bytes
                    .fetch_sub(b.data.len() as u64, Ordering::Relaxed);
            }
            None => debug_assert!(false, "buffer {} destroyed twice", buffer.raw()),
        }
    }

    fn create_root_signature(
        &self,
        descriptor: &RootSignatureDescriptor,
    ) -> Result<RawRootSignature, GraphicsError> {
        descriptor.validate()?;
        let id = self.state.next_id();
        self.state
            .root_signatures
            .lock()
            .insert(id, descriptor.parameters.len());
        self.state
            .root_signatures_built
            .fetch_add(1, Ordering::Relaxed);
        log::trace!(
            "DummyBackend: creating root signature {:?} ({} parameters)",
            descriptor.label,
            descriptor.parameters.len()
        );
        Ok(RawRootSignature::from_raw(id))
    }

    fn destroy_root_signature(&self, root_signature: RawRootSignature) {
        let removed = self
            .state
            .root_signatures
            .lock()
            .remove(&root_signature.raw());
        debug_assert!(
            removed.is_some(),
            "root signature {} destroyed twice",
            root_signature.raw()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BufferUsage;

    #[test]
    fn test_fence_wait_timeout() {
        let backend = DummyBackend::new();
        let fence = backend.create_fence(0).unwrap();
        assert!(!backend.wait_fence(fence, 1, Some(Duration::from_millis(10))));
        backend.set_fence_value(fence, 1);
        assert!(backend.wait_fence(fence, 1, Some(Duration::from_millis(10))));
    }

    #[test]
    fn test_fence_wait_wakes_on_signal() {
        let backend = Arc::new(DummyBackend::new());
        let fence = backend.create_fence(0).unwrap();

        let signaler = Arc::clone(&backend);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            signaler.set_fence_value(fence, 3);
        });

        assert!(backend.wait_fence(fence, 3, None));
        handle.join().unwrap();
    }

    #[test]
    fn test_manual_queue_holds_signal() {
        let backend = DummyBackend::manual();
        let queue = backend.create_command_queue(QueueType::Direct).unwrap();
        let fence = backend.create_fence(0).unwrap();

        queue.signal(fence, 1);
        assert_eq!(backend.fence_completed_value(fence), 0);
        assert_eq!(backend.pending_queue_ops(), 1);

        assert_eq!(backend.flush_queues(), 1);
        assert_eq!(backend.fence_completed_value(fence), 1);
    }

    #[test]
    fn test_queue_wait_blocks_later_work() {
        let backend = DummyBackend::manual();
        let gfx = backend.create_command_queue(QueueType::Direct).unwrap();
        let copy = backend.create_command_queue(QueueType::Copy).unwrap();
        let upload = backend.create_fence(0).unwrap();
        let frame = backend.create_fence(0).unwrap();

        gfx.wait(upload, 1);
        gfx.signal(frame, 1);
        copy.signal(upload, 1);

        // flush_queues iterates until the copy queue unblocks the graphics queue
        assert_eq!(backend.flush_queues(), 3);
        assert_eq!(backend.fence_completed_value(frame), 1);
    }

    #[test]
    fn test_auto_queue_resumes_after_cross_queue_signal() {
        let backend = DummyBackend::new();
        let gfx = backend.create_command_queue(QueueType::Direct).unwrap();
        let copy = backend.create_command_queue(QueueType::Copy).unwrap();
        let upload = backend.create_fence(0).unwrap();
        let frame = backend.create_fence(0).unwrap();

        // The wait is queued before the copy queue signals
        gfx.wait(upload, 1);
        gfx.signal(frame, 1);
        assert_eq!(backend.fence_completed_value(frame), 0);
        assert_eq!(backend.pending_queue_ops(), 2);

        copy.signal(upload, 1);
        assert_eq!(backend.fence_completed_value(upload), 1);
        assert!(backend.wait_fence(frame, 1, Some(Duration::from_millis(200))));
        assert_eq!(backend.pending_queue_ops(), 0);
    }

    #[test]
    fn test_auto_queue_resumes_after_fence_set() {
        let backend = DummyBackend::new();
        let gfx = backend.create_command_queue(QueueType::Direct).unwrap();
        let external = backend.create_fence(0).unwrap();
        let frame = backend.create_fence(0).unwrap();

        gfx.wait(external, 2);
        gfx.signal(frame, 1);
        backend.set_fence_value(external, 2);
        assert_eq!(backend.fence_completed_value(frame), 1);
    }

    #[test]
    fn test_copy_between_buffers() {
        let backend = DummyBackend::new();
        let queue = backend.create_command_queue(QueueType::Copy).unwrap();
        let src = backend.create_buffer(&BufferDescriptor::upload(16)).unwrap();
        let dst = backend
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::COPY_DST))
            .unwrap();

        backend.write_buffer(src, 4, &[1, 2, 3, 4]).unwrap();
        let mut list = CommandList::new();
        list.copy_buffer_region(dst, 8, src, 4, 4);
        list.close();
        queue.execute(list).unwrap();

        assert_eq!(backend.read_buffer(dst, 8, 4).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_out_of_range_offsets() {
        let backend = DummyBackend::new();
        let queue = backend.create_command_queue(QueueType::Copy).unwrap();
        let src = backend.create_buffer(&BufferDescriptor::upload(16)).unwrap();
        let dst = backend
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::COPY_DST))
            .unwrap();

        assert!(backend.read_buffer(src, u64::MAX, 4).is_err());
        assert!(backend.write_buffer(src, u64::MAX, &[1, 2]).is_err());

        // Logged and skipped, the destination is untouched
        let mut list = CommandList::new();
        list.copy_buffer_region(dst, u64::MAX, src, 0, 4);
        list.copy_buffer_region(dst, 0, src, u64::MAX, 4);
        list.close();
        queue.execute(list).unwrap();
        assert_eq!(backend.read_buffer(dst, 0, 16).unwrap(), vec![0; 16]);
    }

    #[test]
    fn test_execute_open_list_rejected() {
        let backend = DummyBackend::new();
        let queue = backend.create_command_queue(QueueType::Direct).unwrap();
        assert!(queue.execute(CommandList::new()).is_err());
    }

    #[test]
    fn test_write_default_heap_rejected() {
        let backend = DummyBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::VERTEX))
            .unwrap();
        assert!(backend.write_buffer(buffer, 0, &[0; 4]).is_err());
    }

    #[test]
    fn test_memory_budget() {
        let backend = DummyBackend::new();
        backend.set_memory_budget(Some(100));
        let a = backend.create_buffer(&BufferDescriptor::upload(64)).unwrap();
        assert_eq!(
            backend.create_buffer(&BufferDescriptor::upload(64)),
            Err(GraphicsError::OutOfMemory)
        );
        backend.destroy_buffer(a);
        assert_eq!(backend.allocated_bytes(), 0);
        assert!(backend.create_buffer(&BufferDescriptor::upload(64)).is_ok());
    }

    #[test]
    fn test_fence_creation_failure() {
        let backend = DummyBackend::new();
        backend.set_fail_fence_creation(true);
        assert!(matches!(
            backend.create_fence(0),
            Err(GraphicsError::InitializationFailed(_))
        ));
    }
}
