//! Graphics device.
//!
//! The [`GraphicsDevice`] owns the backend, the direct command queue, the frame
//! fence and everything whose lifetime is tied to that fence: the deferred
//! reclaimer and the root signature cache. Resources created through it route
//! their destruction through the reclaimer.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::{self, CommandQueue, GpuBackend, QueueType};
use crate::cache::{RootSignatureCache, RootSignatureHandle};
use crate::command::CommandList;
use crate::error::GraphicsError;
use crate::parameters::DeviceParameters;
use crate::resources::{Buffer, DeferredReclaimer, UploadRingBuffer};
use crate::sync::Fence;
use crate::types::{BufferDescriptor, RootSignatureDescriptor};

/// How long dropping a device waits for outstanding GPU work.
const DROP_WAIT_TIMEOUT: Duration = Duration::from_millis(100);

/// A graphics device for creating GPU resources and submitting work.
///
/// # Thread Safety
///
/// `GraphicsDevice` is `Send + Sync` and can be safely shared across threads.
/// Frame signaling is serialized internally.
///
/// # Example
///
/// ```ignore
/// let device = GraphicsDevice::new(backend, DeviceParameters::default())?;
///
/// let buffer = device.create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX))?;
/// let signature = device.create_root_signature(&descriptor)?;
/// ```
pub struct GraphicsDevice {
    backend: Arc<dyn GpuBackend>,
    parameters: DeviceParameters,
    direct_queue: Arc<dyn CommandQueue>,
    frame_fence: Arc<Fence>,
    reclaimer: Arc<DeferredReclaimer>,
    root_signatures: RootSignatureCache,
    signal_lock: Mutex<()>,
}

impl GraphicsDevice {
    /// Create a device on `backend`.
    ///
    /// # Errors
    ///
    /// Fails if the parameters are invalid or the queue or frame fence cannot
    /// be created.
    pub fn new(
        backend: Arc<dyn GpuBackend>,
        parameters: DeviceParameters,
    ) -> Result<Arc<Self>, GraphicsError> {
        parameters.validate()?;

        let direct_queue = backend.create_command_queue(QueueType::Direct)?;
        let frame_fence = Arc::new(Fence::new(Arc::clone(&backend))?);
        let reclaimer = Arc::new(DeferredReclaimer::new(
            Arc::clone(&backend),
            Arc::clone(&frame_fence),
        ));
        let root_signatures = RootSignatureCache::new(Arc::clone(&reclaimer));

        log::info!(
            "Created graphics device {:?} on {} backend ({} frames in flight)",
            parameters.label,
            backend.name(),
            parameters.frames_in_flight
        );

        Ok(Arc::new(Self {
            backend,
            parameters,
            direct_queue,
            frame_fence,
            reclaimer,
            root_signatures,
            signal_lock: Mutex::new(()),
        }))
    }

    /// Create a device on the default backend.
    pub fn with_default_backend(parameters: DeviceParameters) -> Result<Arc<Self>, GraphicsError> {
        Self::new(backend::create_backend()?, parameters)
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    pub fn parameters(&self) -> &DeviceParameters {
        &self.parameters
    }

    pub fn direct_queue(&self) -> &Arc<dyn CommandQueue> {
        &self.direct_queue
    }

    /// The fence signaled at the end of every frame.
    pub fn frame_fence(&self) -> &Arc<Fence> {
        &self.frame_fence
    }

    pub fn reclaimer(&self) -> &Arc<DeferredReclaimer> {
        &self.reclaimer
    }

    pub fn root_signatures(&self) -> &RootSignatureCache {
        &self.root_signatures
    }

    /// Create a GPU buffer. Dropping the last reference defers its
    /// destruction until the GPU is done with it.
    pub fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<Arc<Buffer>, GraphicsError> {
        let buffer = Buffer::new(Arc::clone(&self.reclaimer), descriptor.clone())?;
        log::trace!(
            "Created buffer {:?} ({} bytes, {:?})",
            descriptor.label,
            descriptor.size,
            descriptor.heap
        );
        Ok(Arc::new(buffer))
    }

    /// Create an upload ring configured from the device parameters.
    pub fn create_upload_ring(&self) -> Result<UploadRingBuffer, GraphicsError> {
        UploadRingBuffer::new(self, self.parameters.ring_config())
    }

    /// Get or build the root signature for `descriptor`.
    pub fn create_root_signature(
        &self,
        descriptor: &RootSignatureDescriptor,
    ) -> Result<RootSignatureHandle, GraphicsError> {
        self.root_signatures.create(descriptor)
    }

    /// Create an empty command list.
    pub fn create_command_list(&self) -> CommandList {
        self.backend.create_command_list()
    }

    /// Submit `list` on the direct queue, closing it first if needed.
    pub fn execute(&self, mut list: CommandList) -> Result<(), GraphicsError> {
        if !list.is_closed() {
            list.close();
        }
        self.direct_queue.execute(list)
    }

    /// Signal the frame fence after all work submitted so far.
    pub fn signal_frame(&self) -> u64 {
        let _guard = self.signal_lock.lock();
        self.frame_fence.signal(self.direct_queue.as_ref())
    }

    /// Destroy released objects the GPU has finished with.
    pub fn collect_garbage(&self) -> usize {
        self.reclaimer.collect_on_frame_boundary()
    }

    /// Block until all submitted work completes, then destroy everything
    /// released so far.
    pub fn wait_idle(&self) {
        let value = self.signal_frame();
        self.frame_fence.wait_for_value(value);
        let destroyed = self.collect_garbage();
        self.root_signatures.sweep();
        log::debug!("Device idle at fence value {} ({} objects reclaimed)", value, destroyed);
    }
}

impl Drop for GraphicsDevice {
    fn drop(&mut self) {
        let value = self.frame_fence.wait_value();
        if !self.frame_fence.wait_for_value_timeout(value, DROP_WAIT_TIMEOUT) {
            log::warn!("Dropping graphics device with GPU work still pending at fence value {}", value);
        }
        self.collect_garbage();
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("backend", &self.backend.name())
            .field("parameters", &self.parameters)
            .field("frame_fence", &self.frame_fence)
            .field("reclaimer", &self.reclaimer)
            .finish()
    }
}

static_assertions::assert_impl_all!(GraphicsDevice: Send, Sync);
