//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while decoding or encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Indefinite-length items are forbidden in this profile.
    #[error("indefinite-length items are forbidden")]
    IndefiniteLengthForbidden,

    /// Invalid CBOR structure.
    #[error("invalid CBOR structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// A claimed length exceeds the decoder's safety limit.
    #[error("claimed size {claimed} exceeds limit {max_allowed}")]
    SizeLimitExceeded {
        /// The length claimed by the input.
        claimed: u64,
        /// The maximum the decoder allows.
        max_allowed: u64,
    },

    /// Nesting depth exceeds the decoder's safety limit.
    #[error("nesting depth exceeds limit {max}")]
    DepthLimitExceeded {
        /// The maximum nesting depth allowed.
        max: usize,
    },

    /// Unsupported CBOR type.
    #[error("unsupported CBOR type: {type_name}")]
    UnsupportedType {
        /// Name of the unsupported type.
        type_name: String,
    },

    /// Malformed content identifier.
    #[error("invalid content identifier: {message}")]
    InvalidCid {
        /// Description of what was wrong with the CID bytes.
        message: String,
    },

    /// Malformed content archive.
    #[error("invalid content archive: {message}")]
    InvalidArchive {
        /// Description of what was wrong with the archive.
        message: String,
    },
}

impl CodecError {
    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Create an unsupported type error.
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }

    /// Create an invalid CID error.
    pub fn invalid_cid(message: impl Into<String>) -> Self {
        Self::InvalidCid {
            message: message.into(),
        }
    }

    /// Create an invalid archive error.
    pub fn invalid_archive(message: impl Into<String>) -> Self {
        Self::InvalidArchive {
            message: message.into(),
        }
    }
}
