//! Error types for element codecs.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while converting elements to or from their
/// cache-safe representation.
#[derive(Debug, Error)]
pub enum CodecError {
    /// An element could not be disassembled.
    #[error("disassembly failed: {message}")]
    Disassembly {
        /// Description of the failure.
        message: String,
    },

    /// A disassembled state could not be assembled back into an element.
    #[error("assembly failed: {message}")]
    Assembly {
        /// Description of the failure.
        message: String,
    },

    /// Stored state has an invalid or unexpected format.
    #[error("invalid state format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },
}

impl CodecError {
    /// Creates a disassembly error.
    pub fn disassembly(message: impl Into<String>) -> Self {
        Self::Disassembly {
            message: message.into(),
        }
    }

    /// Creates an assembly error.
    pub fn assembly(message: impl Into<String>) -> Self {
        Self::Assembly {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }
}
