//! Particle engine configuration
//!
//! Loaded from TOML; every field has a default so partial files work.

use crate::constants::{emitter, textures};
use crate::error::{ParticleError, ParticleResult};
use crate::gpu::KernelSource;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleEngineConfig {
    /// Capacity used when a caller does not pick one
    pub default_capacity: u32,
    /// Emission controllers clamp requested capacities up to this
    pub min_capacity: u32,
    pub max_capacity: u32,
    /// WGSL kernel body to load instead of the embedded one
    pub kernel_path: Option<PathBuf>,
    pub default_texture: String,
    /// Seed for deterministic spawning
    pub seed: Option<u64>,
}

impl Default for ParticleEngineConfig {
    fn default() -> Self {
        Self {
            default_capacity: emitter::DEFAULT_CAPACITY,
            min_capacity: emitter::MIN_CAPACITY,
            max_capacity: emitter::MAX_CAPACITY,
            kernel_path: None,
            default_texture: textures::FALLBACK_TEXTURE.to_string(),
            seed: None,
        }
    }
}

impl ParticleEngineConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> ParticleResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ParticleError::IoError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        let config = Self::from_toml_str(&text)?;
        log::info!("[ParticleEngineConfig] Loaded {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> ParticleResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ParticleResult<String> {
        toml::to_string_pretty(self).map_err(|e| ParticleError::Internal {
            message: format!("failed to serialize config: {}", e),
        })
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> ParticleResult<()> {
        if self.min_capacity == 0 {
            return Err(invalid("min_capacity", self.min_capacity, "cannot be 0"));
        }

        if self.max_capacity > emitter::MAX_CAPACITY {
            return Err(invalid(
                "max_capacity",
                self.max_capacity,
                &format!(
                    "exceeds the per-dispatch limit of {}",
                    emitter::MAX_CAPACITY
                ),
            ));
        }

        if self.min_capacity > self.max_capacity {
            return Err(invalid(
                "min_capacity",
                self.min_capacity,
                &format!("is above max_capacity {}", self.max_capacity),
            ));
        }

        if !(self.min_capacity..=self.max_capacity).contains(&self.default_capacity) {
            return Err(invalid(
                "default_capacity",
                self.default_capacity,
                &format!(
                    "must be within {}..={}",
                    self.min_capacity, self.max_capacity
                ),
            ));
        }

        if self.default_texture.trim().is_empty() {
            return Err(invalid("default_texture", "\"\"", "cannot be empty"));
        }

        log::debug!("[ParticleEngineConfig] Configuration validated successfully");
        Ok(())
    }

    pub fn kernel_source(&self) -> KernelSource {
        match &self.kernel_path {
            Some(path) => KernelSource::File(path.clone()),
            None => KernelSource::default_simulation(),
        }
    }

    /// Apply the configured minimum and maximum to a requested capacity
    pub fn clamp_capacity(&self, requested: u32) -> u32 {
        requested.clamp(self.min_capacity, self.max_capacity)
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ParticleError {
    ParticleError::InvalidConfig {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ParticleEngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_capacity, 300);
        assert_eq!(config.kernel_source(), KernelSource::default_simulation());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_capacity = 64\nseed = 9").unwrap();

        let config = ParticleEngineConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.default_capacity, 64);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.max_capacity, emitter::MAX_CAPACITY);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = ParticleEngineConfig::from_toml_str("max_capacity = 70000").unwrap_err();
        assert!(matches!(err, ParticleError::InvalidConfig { ref field, .. } if field == "max_capacity"));

        assert!(ParticleEngineConfig::from_toml_str("min_capacity = 0").is_err());
        assert!(ParticleEngineConfig::from_toml_str("default_capacity = 1").is_err());
        assert!(ParticleEngineConfig::from_toml_str("default_texture = \" \"").is_err());
    }

    #[test]
    fn test_malformed_toml_is_deserialization_error() {
        let err = ParticleEngineConfig::from_toml_str("default_capacity = \"lots\"").unwrap_err();
        assert!(matches!(err, ParticleError::DeserializationError { .. }));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ParticleEngineConfig::load_from_file("/nonexistent/particles.toml").unwrap_err();
        assert!(matches!(err, ParticleError::IoError { .. }));
    }

    #[test]
    fn test_kernel_path_selects_file_source() {
        let config =
            ParticleEngineConfig::from_toml_str("kernel_path = \"shaders/custom.wgsl\"").unwrap();
        assert_eq!(
            config.kernel_source(),
            KernelSource::File(PathBuf::from("shaders/custom.wgsl"))
        );
        assert_eq!(config.clamp_capacity(1), 2);
        assert_eq!(config.clamp_capacity(100_000), emitter::MAX_CAPACITY);
    }
}
