//! Root signature (pipeline binding layout) descriptors.
//!
//! A root signature describes which resources a pipeline binds and in which
//! slots. Building one is expensive and many pipelines share the same layout,
//! so they are deduplicated through [`RootSignatureCache`].
//!
//! Every field except the debug label takes part in equality and hashing:
//! two descriptors that differ in any binding produce different signatures.
//!
//! [`RootSignatureCache`]: crate::cache::RootSignatureCache

use std::hash::{Hash, Hasher};

use bitflags::bitflags;

use crate::error::GraphicsError;

bitflags! {
    /// Shader stages a binding is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const HULL = 1 << 1;
        const DOMAIN = 1 << 2;
        const GEOMETRY = 1 << 3;
        const PIXEL = 1 << 4;
        const COMPUTE = 1 << 5;
        const RAY_TRACING = 1 << 6;
        const ALL_GRAPHICS = Self::VERTEX.bits()
            | Self::HULL.bits()
            | Self::DOMAIN.bits()
            | Self::GEOMETRY.bits()
            | Self::PIXEL.bits();
    }
}

bitflags! {
    /// Global root signature flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RootSignatureFlags: u32 {
        const ALLOW_INPUT_ASSEMBLER_LAYOUT = 1 << 0;
        const DENY_HULL_ACCESS = 1 << 1;
        const DENY_DOMAIN_ACCESS = 1 << 2;
        const DENY_GEOMETRY_ACCESS = 1 << 3;
        const CBV_SRV_UAV_HEAP_DIRECTLY_INDEXED = 1 << 4;
        const SAMPLER_HEAP_DIRECTLY_INDEXED = 1 << 5;
        const LOCAL = 1 << 6;
    }
}

/// Kind of descriptor range inside a descriptor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorRangeKind {
    ShaderResource,
    UnorderedAccess,
    ConstantBuffer,
    Sampler,
}

/// A contiguous range of registers bound through a descriptor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorRange {
    pub kind: DescriptorRangeKind,
    /// Number of descriptors, `u32::MAX` for unbounded.
    pub count: u32,
    pub base_register: u32,
    pub space: u32,
}

impl DescriptorRange {
    pub fn new(kind: DescriptorRangeKind, count: u32, base_register: u32) -> Self {
        Self {
            kind,
            count,
            base_register,
            space: 0,
        }
    }

    pub fn with_space(mut self, space: u32) -> Self {
        self.space = space;
        self
    }
}

/// What a root parameter binds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RootParameterKind {
    /// Inline 32-bit constants.
    Constants { num_values: u32 },
    /// Root constant buffer view.
    ConstantBuffer,
    /// Root shader resource view.
    ShaderResource,
    /// Root unordered access view.
    UnorderedAccess,
    /// Descriptor table made of one or more ranges.
    DescriptorTable { ranges: Vec<DescriptorRange> },
}

/// A named binding slot of a root signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RootParameter {
    /// Slot name used for reverse lookups (`RootSignature::slot_index`).
    pub name: String,
    pub kind: RootParameterKind,
    pub register: u32,
    pub space: u32,
    pub visibility: ShaderStages,
}

impl RootParameter {
    pub fn new(name: impl Into<String>, kind: RootParameterKind, register: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            register,
            space: 0,
            visibility: ShaderStages::all(),
        }
    }

    pub fn constants(name: impl Into<String>, num_values: u32, register: u32) -> Self {
        Self::new(name, RootParameterKind::Constants { num_values }, register)
    }

    pub fn constant_buffer(name: impl Into<String>, register: u32) -> Self {
        Self::new(name, RootParameterKind::ConstantBuffer, register)
    }

    pub fn shader_resource(name: impl Into<String>, register: u32) -> Self {
        Self::new(name, RootParameterKind::ShaderResource, register)
    }

    pub fn unordered_access(name: impl Into<String>, register: u32) -> Self {
        Self::new(name, RootParameterKind::UnorderedAccess, register)
    }

    pub fn table(name: impl Into<String>, ranges: Vec<DescriptorRange>) -> Self {
        Self::new(name, RootParameterKind::DescriptorTable { ranges }, 0)
    }

    pub fn with_space(mut self, space: u32) -> Self {
        self.space = space;
        self
    }

    pub fn with_visibility(mut self, visibility: ShaderStages) -> Self {
        self.visibility = visibility;
        self
    }
}

/// Texture filtering of a static sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SamplerFilter {
    Point,
    #[default]
    Linear,
    Anisotropic,
}

/// Texture addressing of a static sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    Wrap,
    Mirror,
    Clamp,
    Border,
}

/// A sampler baked into the root signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StaticSampler {
    pub register: u32,
    pub space: u32,
    pub filter: SamplerFilter,
    pub address_mode: AddressMode,
    pub visibility: ShaderStages,
}

impl StaticSampler {
    pub fn new(register: u32, filter: SamplerFilter, address_mode: AddressMode) -> Self {
        Self {
            register,
            space: 0,
            filter,
            address_mode,
            visibility: ShaderStages::all(),
        }
    }
}

/// Descriptor for creating a root signature.
#[derive(Debug, Clone, Default)]
pub struct RootSignatureDescriptor {
    /// Debug label. Not part of equality or the content hash.
    pub label: Option<String>,
    pub parameters: Vec<RootParameter>,
    pub static_samplers: Vec<StaticSampler>,
    pub flags: RootSignatureFlags,
}

impl RootSignatureDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_parameter(mut self, parameter: RootParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_static_sampler(mut self, sampler: StaticSampler) -> Self {
        self.static_samplers.push(sampler);
        self
    }

    pub fn with_flags(mut self, flags: RootSignatureFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Union of the stages any parameter or sampler is visible to.
    pub fn shader_stages(&self) -> ShaderStages {
        self.parameters
            .iter()
            .map(|p| p.visibility)
            .chain(self.static_samplers.iter().map(|s| s.visibility))
            .fold(ShaderStages::empty(), |acc, v| acc | v)
    }

    /// Check the descriptor for errors the backend would reject.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::InvalidParameter`] for duplicate or empty slot
    /// names and for empty descriptor tables.
    pub fn validate(&self) -> Result<(), GraphicsError> {
        for (i, param) in self.parameters.iter().enumerate() {
            if param.name.is_empty() {
                return Err(GraphicsError::InvalidParameter(format!(
                    "root parameter {i} has an empty name"
                )));
            }
            if self.parameters[..i].iter().any(|p| p.name == param.name) {
                return Err(GraphicsError::InvalidParameter(format!(
                    "duplicate root parameter name '{}'",
                    param.name
                )));
            }
            if let RootParameterKind::DescriptorTable { ranges } = &param.kind
                && ranges.is_empty()
            {
                return Err(GraphicsError::InvalidParameter(format!(
                    "descriptor table '{}' has no ranges",
                    param.name
                )));
            }
        }
        Ok(())
    }
}

impl PartialEq for RootSignatureDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.parameters == other.parameters
            && self.static_samplers == other.static_samplers
            && self.flags == other.flags
    }
}

impl Eq for RootSignatureDescriptor {}

impl Hash for RootSignatureDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.parameters.hash(state);
        self.static_samplers.hash(state);
        self.flags.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RootSignatureDescriptor {
        RootSignatureDescriptor::new()
            .with_parameter(RootParameter::constant_buffer("camera", 0))
            .with_parameter(
                RootParameter::table(
                    "textures",
                    vec![DescriptorRange::new(DescriptorRangeKind::ShaderResource, 4, 0)],
                )
                .with_visibility(ShaderStages::PIXEL),
            )
            .with_static_sampler(StaticSampler::new(0, SamplerFilter::Linear, AddressMode::Clamp))
    }

    #[test]
    fn test_label_ignored_by_equality() {
        let a = sample().with_label("a");
        let b = sample().with_label("b");
        assert_eq!(a, b);
    }

    #[test]
    fn test_validate_duplicate_names() {
        let desc = sample().with_parameter(RootParameter::constant_buffer("camera", 1));
        assert!(matches!(
            desc.validate(),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_validate_empty_table() {
        let desc = RootSignatureDescriptor::new().with_parameter(RootParameter::table("t", vec![]));
        assert!(desc.validate().is_err());
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_shader_stages_union() {
        let desc = RootSignatureDescriptor::new()
            .with_parameter(RootParameter::constants("a", 4, 0).with_visibility(ShaderStages::VERTEX))
            .with_parameter(
                RootParameter::shader_resource("b", 0).with_visibility(ShaderStages::PIXEL),
            );
        assert_eq!(
            desc.shader_stages(),
            ShaderStages::VERTEX | ShaderStages::PIXEL
        );
    }
}
