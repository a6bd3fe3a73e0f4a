//! Common types and descriptors for graphics resources.
//!
//! This module contains usage flags and descriptor structs used throughout
//! the graphics system.

mod buffer;
mod root_signature;

pub use buffer::{BufferDescriptor, BufferUsage, HeapType};
pub use root_signature::{
    AddressMode, DescriptorRange, DescriptorRangeKind, RootParameter, RootParameterKind,
    RootSignatureDescriptor, RootSignatureFlags, SamplerFilter, ShaderStages, StaticSampler,
};
