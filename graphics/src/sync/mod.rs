//! CPU/GPU synchronization primitives.
//!
//! - [`Fence`] - timeline fence shared between the CPU and one or more queues
//! - [`FenceStatus`] - result of a non-blocking poll

mod fence;

pub use fence::{Fence, FenceStatus};
