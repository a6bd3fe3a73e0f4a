//! Root signature cache.

use std::collections::HashMap;
use std::sync::Arc;

use super::{SharedHandle, SharedHandleCache};
use crate::backend::RawRootSignature;
use crate::error::GraphicsError;
use crate::resources::{DeferredReclaimer, Reclaimable};
use crate::types::RootSignatureDescriptor;

/// A built root signature.
#[derive(Debug)]
pub struct RootSignature {
    raw: RawRootSignature,
    slot_indices: HashMap<String, u32>,
    label: Option<String>,
}

impl RootSignature {
    fn new(raw: RawRootSignature, descriptor: &RootSignatureDescriptor) -> Self {
        let slot_indices = descriptor
            .parameters
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), i as u32))
            .collect();
        Self {
            raw,
            slot_indices,
            label: descriptor.label.clone(),
        }
    }

    /// The backend root signature object.
    pub fn raw(&self) -> RawRootSignature {
        self.raw
    }

    /// Parameter index of the binding slot called `name`.
    pub fn slot_index(&self, name: &str) -> Option<u32> {
        self.slot_indices.get(name).copied()
    }

    /// Number of root parameters.
    pub fn parameter_count(&self) -> usize {
        self.slot_indices.len()
    }

    /// Label of the descriptor that first built this signature.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

/// Shared handle to a cached root signature.
pub type RootSignatureHandle = SharedHandle<RootSignature>;

/// Deduplicates root signatures by descriptor content.
///
/// Pipelines sharing a binding layout share one root signature. When the last
/// handle is released the backend object goes to the deferred reclaimer, since
/// submitted command lists may still reference it.
pub struct RootSignatureCache {
    reclaimer: Arc<DeferredReclaimer>,
    cache: SharedHandleCache<RootSignatureDescriptor, RootSignature>,
}

impl RootSignatureCache {
    pub fn new(reclaimer: Arc<DeferredReclaimer>) -> Self {
        let sink = Arc::clone(&reclaimer);
        let cache = SharedHandleCache::new("root_signature", move |sig: &RootSignature| {
            sink.enqueue(Reclaimable::RootSignature(sig.raw));
        });
        Self { reclaimer, cache }
    }

    /// Return the root signature for `descriptor`, building it on first use.
    ///
    /// # Errors
    ///
    /// Fails if the descriptor is invalid or the backend cannot build it.
    pub fn create(
        &self,
        descriptor: &RootSignatureDescriptor,
    ) -> Result<RootSignatureHandle, GraphicsError> {
        self.cache.get_or_create(descriptor, |desc| {
            desc.validate()?;
            let raw = self.reclaimer.backend().create_root_signature(desc)?;
            log::debug!(
                "Built root signature {:?} ({} parameters)",
                desc.label,
                desc.parameters.len()
            );
            Ok(RootSignature::new(raw, desc))
        })
    }

    /// Whether a live signature exists for `descriptor`.
    pub fn contains(&self, descriptor: &RootSignatureDescriptor) -> bool {
        self.cache.contains(descriptor)
    }

    /// Number of cached slots, dead ones not yet swept included.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Drop dead slots.
    pub fn sweep(&self) -> usize {
        self.cache.sweep()
    }
}

impl std::fmt::Debug for RootSignatureCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootSignatureCache")
            .field("cache", &self.cache)
            .finish()
    }
}

static_assertions::assert_impl_all!(RootSignatureCache: Send, Sync);
static_assertions::assert_impl_all!(RootSignatureHandle: Send, Sync, Clone);
