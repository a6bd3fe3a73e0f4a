//! Deduplicating caches for expensive GPU objects.
//!
//! - [`SharedHandleCache`] - generic content-hashed cache of reference-counted
//!   objects, destroyed when the last [`SharedHandle`] is released
//! - [`RootSignatureCache`] - the cache specialised for root signatures, with
//!   destruction routed through the deferred reclaimer
//! - [`ContentHash`] - CRC-64 of a descriptor's hashed fields

mod content_hash;
mod root_signature;
mod shared;

pub use content_hash::ContentHash;
pub use root_signature::{RootSignature, RootSignatureCache, RootSignatureHandle};
pub use shared::{SharedHandle, SharedHandleCache};
