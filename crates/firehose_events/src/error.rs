//! Error types for frame and event decoding.

use thiserror::Error;

/// Result type for event decoding.
pub type EventResult<T> = Result<T, EventError>;

/// Errors that can occur while decoding frames into events.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventError {
    /// The frame's leading envelope could not be decoded.
    ///
    /// The codec has lost synchronization with the stream: there is no
    /// safe point to resume mid-frame, so this error is stream-fatal
    /// and must force a reconnect.
    #[error("malformed envelope: {message}")]
    MalformedEnvelope {
        /// Description of what was wrong with the header.
        message: String,
    },

    /// A payload of a known kind failed to decode.
    ///
    /// Event-local: the frame boundary is intact, so the consumer skips
    /// this one event and continues.
    #[error("payload decode failed for {kind}: {message}")]
    PayloadDecode {
        /// Label of the frame kind whose payload failed.
        kind: String,
        /// Description of the decode failure.
        message: String,
    },
}

impl EventError {
    /// Create a malformed envelope error.
    pub fn malformed_envelope(message: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            message: message.into(),
        }
    }

    /// Create a payload decode error.
    pub fn payload_decode(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PayloadDecode {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Returns true if the stream cannot safely continue past this error.
    pub fn is_stream_fatal(&self) -> bool {
        matches!(self, EventError::MalformedEnvelope { .. })
    }
}
