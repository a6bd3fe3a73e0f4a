//! GPU resources and their lifetime management.
//!
//! - [`Buffer`] - owned GPU buffer, destroyed through the reclaimer on drop
//! - [`DeferredReclaimer`] - holds released GPU objects until the frame fence
//!   proves the GPU is done with them
//! - [`UploadRingBuffer`] - growable circular staging allocator for per-frame
//!   uploads
//!
//! Buffers are created by [`GraphicsDevice`] and can be shared across threads.
//!
//! [`GraphicsDevice`]: crate::GraphicsDevice

mod buffer;
mod reclaimer;
mod ring_buffer;

pub use buffer::Buffer;
pub use reclaimer::{DeferredReclaimer, Reclaimable};
pub use ring_buffer::{RingBufferConfig, RingBufferRegion, UploadRingBuffer};
