//! Graphics error types.

use thiserror::Error;

/// Errors that can occur in the graphics system.
///
/// Every fallible call in this crate returns one of these as a local value.
/// Capacity exhaustion in the upload ring and cache misses are handled
/// internally and never surface here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphicsError {
    /// Failed to initialize a device, queue or synchronization object.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    /// Failed to create a resource.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// Out of GPU memory.
    #[error("out of GPU memory")]
    OutOfMemory,
    /// The GPU device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GraphicsError {
    /// Whether the error leaves the device unusable until full reinitialization.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::OutOfMemory | Self::DeviceLost)
    }
}
