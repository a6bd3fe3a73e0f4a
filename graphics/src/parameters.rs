//! Device configuration.

use crate::error::GraphicsError;
use crate::resources::RingBufferConfig;

/// Environment variable overriding [`DeviceParameters::frames_in_flight`].
pub const ENV_FRAMES_IN_FLIGHT: &str = "HEARTH_FRAMES_IN_FLIGHT";
/// Environment variable overriding [`DeviceParameters::upload_ring_capacity`].
pub const ENV_UPLOAD_RING_CAPACITY: &str = "HEARTH_UPLOAD_RING_CAPACITY";

/// Parameters for creating a [`GraphicsDevice`](crate::GraphicsDevice).
///
/// # Example
///
/// ```ignore
/// let params = DeviceParameters::default()
///     .with_frames_in_flight(3)
///     .with_upload_ring_capacity(16 * 1024 * 1024)
///     .with_label("main");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceParameters {
    /// Frames the CPU may record ahead of the GPU. Also the number of frame
    /// generations the upload ring protects.
    pub frames_in_flight: usize,
    /// Initial capacity of the frame upload ring in bytes.
    pub upload_ring_capacity: u64,
    /// Default alignment of upload ring allocations.
    pub upload_ring_alignment: u64,
    /// Bytes kept clear between wrapped ring writes and in-flight data.
    pub upload_ring_watermark: u64,
    /// Debug label.
    pub label: Option<String>,
}

impl Default for DeviceParameters {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            upload_ring_capacity: 4 * 1024 * 1024,
            upload_ring_alignment: RingBufferConfig::DEFAULT_ALIGNMENT,
            upload_ring_watermark: RingBufferConfig::DEFAULT_WATERMARK,
            label: None,
        }
    }
}

impl DeviceParameters {
    pub fn with_frames_in_flight(mut self, frames_in_flight: usize) -> Self {
        self.frames_in_flight = frames_in_flight;
        self
    }

    pub fn with_upload_ring_capacity(mut self, capacity: u64) -> Self {
        self.upload_ring_capacity = capacity;
        self
    }

    pub fn with_upload_ring_alignment(mut self, alignment: u64) -> Self {
        self.upload_ring_alignment = alignment;
        self
    }

    pub fn with_upload_ring_watermark(mut self, watermark: u64) -> Self {
        self.upload_ring_watermark = watermark;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Defaults overridden by `HEARTH_FRAMES_IN_FLIGHT` and
    /// `HEARTH_UPLOAD_RING_CAPACITY`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::InvalidParameter`] if a variable is set but
    /// does not parse.
    pub fn from_env() -> Result<Self, GraphicsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the environment
    /// variable names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GraphicsError> {
        let mut params = Self::default();
        if let Some(value) = lookup(ENV_FRAMES_IN_FLIGHT) {
            params.frames_in_flight = parse_var(ENV_FRAMES_IN_FLIGHT, &value)?;
        }
        if let Some(value) = lookup(ENV_UPLOAD_RING_CAPACITY) {
            params.upload_ring_capacity = parse_var(ENV_UPLOAD_RING_CAPACITY, &value)?;
        }
        Ok(params)
    }

    /// Check the parameters for values the device cannot work with.
    pub fn validate(&self) -> Result<(), GraphicsError> {
        if self.frames_in_flight == 0 {
            return Err(GraphicsError::InvalidParameter(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        if self.upload_ring_capacity == 0 {
            return Err(GraphicsError::InvalidParameter(
                "upload ring capacity cannot be zero".to_string(),
            ));
        }
        if !self.upload_ring_alignment.is_power_of_two() {
            return Err(GraphicsError::InvalidParameter(format!(
                "upload ring alignment must be a power of 2, got {}",
                self.upload_ring_alignment
            )));
        }
        Ok(())
    }

    /// Configuration of the frame upload ring.
    pub fn ring_config(&self) -> RingBufferConfig {
        let config = RingBufferConfig::new(self.upload_ring_capacity)
            .with_alignment(self.upload_ring_alignment)
            .with_watermark(self.upload_ring_watermark)
            .with_frame_latency(self.frames_in_flight);
        match &self.label {
            Some(label) => config.with_label(format!("{label}_upload")),
            None => config.with_label("upload"),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, GraphicsError> {
    value.trim().parse().map_err(|_| {
        GraphicsError::InvalidParameter(format!("{name}: cannot parse '{value}'"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let params = DeviceParameters::default();
        assert_eq!(params.frames_in_flight, 2);
        assert_eq!(params.upload_ring_capacity, 4 * 1024 * 1024);
        assert_eq!(params.upload_ring_alignment, 256);
        assert_eq!(params.upload_ring_watermark, 256);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_lookup_overrides() {
        let vars = HashMap::from([
            (ENV_FRAMES_IN_FLIGHT, "3"),
            (ENV_UPLOAD_RING_CAPACITY, " 65536 "),
        ]);
        let params =
            DeviceParameters::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(params.frames_in_flight, 3);
        assert_eq!(params.upload_ring_capacity, 65536);
    }

    #[test]
    fn test_lookup_rejects_garbage() {
        let result = DeviceParameters::from_lookup(|name| {
            (name == ENV_FRAMES_IN_FLIGHT).then(|| "two".to_string())
        });
        assert!(matches!(result, Err(GraphicsError::InvalidParameter(_))));
    }

    #[test]
    fn test_validate() {
        assert!(DeviceParameters::default().with_frames_in_flight(0).validate().is_err());
        assert!(
            DeviceParameters::default()
                .with_upload_ring_alignment(100)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_ring_config_follows_frames_in_flight() {
        let config = DeviceParameters::default()
            .with_frames_in_flight(3)
            .with_label("main")
            .ring_config();
        assert_eq!(config.frame_latency, 3);
        assert_eq!(config.label.as_deref(), Some("main_upload"));
    }
}
