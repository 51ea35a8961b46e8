//! Error handling for the particle engine
//!
//! Construction-time failures (staging buffers, configuration, capacity) are
//! surfaced through `ParticleError`. Per-frame device failures travel as
//! `GpuError` and are absorbed by the scheduler one emitter at a time.

use crate::gpu::GpuError;
use std::error::Error as StdError;
use std::fmt;

/// Main error type for the particle engine
#[derive(Debug)]
pub enum ParticleError {
    // Emitter Errors
    InvalidCapacity {
        requested: u32,
        min: u32,
        max: u32,
    },

    // GPU Errors
    GpuOperationFailed {
        operation: String,
        error: GpuError,
    },

    // Configuration Errors
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },

    // System Errors
    IoError {
        path: String,
        error: String,
    },
    DeserializationError {
        context: String,
        error: String,
    },

    // Generic fallback for unexpected errors
    Internal {
        message: String,
    },
}

impl fmt::Display for ParticleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParticleError::InvalidCapacity {
                requested,
                min,
                max,
            } => write!(
                f,
                "Invalid emitter capacity {} (allowed range {}..={})",
                requested, min, max
            ),

            ParticleError::GpuOperationFailed { operation, error } => {
                write!(f, "GPU operation '{}' failed: {}", operation, error)
            }

            ParticleError::InvalidConfig {
                field,
                value,
                reason,
            } => write!(f, "Invalid config: {} = {} ({})", field, value, reason),

            ParticleError::IoError { path, error } => write!(f, "IO error for {}: {}", path, error),
            ParticleError::DeserializationError { context, error } => {
                write!(f, "Deserialization error in {}: {}", context, error)
            }

            ParticleError::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl StdError for ParticleError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ParticleError::GpuOperationFailed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Type alias for Results in the particle engine
pub type ParticleResult<T> = Result<T, ParticleError>;

impl From<std::io::Error> for ParticleError {
    fn from(error: std::io::Error) -> Self {
        ParticleError::IoError {
            path: String::new(),
            error: error.to_string(),
        }
    }
}

impl From<GpuError> for ParticleError {
    fn from(error: GpuError) -> Self {
        ParticleError::GpuOperationFailed {
            operation: "device".to_string(),
            error,
        }
    }
}

impl From<toml::de::Error> for ParticleError {
    fn from(error: toml::de::Error) -> Self {
        ParticleError::DeserializationError {
            context: "toml".to_string(),
            error: error.to_string(),
        }
    }
}

/// Extension trait for attaching the failed operation to device errors
pub trait GpuErrorContext<T> {
    fn gpu_context(self, operation: &str) -> ParticleResult<T>;
}

impl<T> GpuErrorContext<T> for Result<T, GpuError> {
    fn gpu_context(self, operation: &str) -> ParticleResult<T> {
        self.map_err(|error| ParticleError::GpuOperationFailed {
            operation: operation.to_string(),
            error,
        })
    }
}
