//! Error types for mesh generation and the mosaic pipeline

use std::fmt;

/// Errors that can occur while generating meshes or running the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum MosaicError {
    /// A mesh parameter or configuration value is out of range
    InvalidArgument(String),
    /// Generation failed due to degenerate input
    GenerationFailed(String),
    /// An input image could not be decoded
    ImageDecode {
        /// Path of the offending file
        path: String,
        /// Decoder message
        reason: String,
    },
    /// A rendering or remap task panicked or timed out
    TaskFailed(String),
    /// A pipeline channel was disconnected before all results arrived
    ChannelClosed(&'static str),
    /// A display sink could not write its output
    Output {
        path: String,
        reason: String,
    },
}

impl fmt::Display for MosaicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MosaicError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            MosaicError::GenerationFailed(msg) => write!(f, "generation failed: {}", msg),
            MosaicError::ImageDecode { path, reason } => {
                write!(f, "failed to decode {}: {}", path, reason)
            }
            MosaicError::TaskFailed(msg) => write!(f, "task failed: {}", msg),
            MosaicError::ChannelClosed(name) => write!(f, "{} channel closed", name),
            MosaicError::Output { path, reason } => {
                write!(f, "failed to write {}: {}", path, reason)
            }
        }
    }
}

impl std::error::Error for MosaicError {}

/// Result type alias for mosaic operations
pub type Result<T> = std::result::Result<T, MosaicError>;
