//! Error taxonomy for the consumer engine.
//!
//! Only failures that steer the session loop live here: transport and
//! envelope errors force a reconnect, payload errors skip one event,
//! and a configuration error at startup is terminal. Finer-grained
//! failures are contained where they occur instead — unresolved
//! references and undecodable records surface per-operation through
//! [`crate::OpContent::Unresolved`] and the dispatch report, projection
//! failures as [`crate::ProjectionError`] inside handlers, and handler
//! errors are logged at the dispatch boundary and dropped.

use firehose_events::EventError;
use thiserror::Error;

/// Result type for engine operations.
pub type SubscribeResult<T> = Result<T, SubscribeError>;

/// Errors that can occur while consuming the stream.
#[derive(Error, Debug)]
pub enum SubscribeError {
    /// Dial or read failure, including EOF and idle timeout.
    ///
    /// Recoverable: the session re-enters backoff and reconnects.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    /// Frame decode failure.
    ///
    /// A malformed envelope is stream-fatal (forces reconnect); a
    /// payload failure skips that one event.
    #[error(transparent)]
    Decode(#[from] EventError),

    /// Invalid configuration detected at startup.
    ///
    /// The only error that terminates [`crate::Session::run`] besides
    /// explicit shutdown.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration problem.
        message: String,
    },
}

impl SubscribeError {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// True when the session must drop the connection and reconnect:
    /// the frame boundary is lost or the transport failed.
    pub fn forces_reconnect(&self) -> bool {
        match self {
            SubscribeError::Transport { .. } => true,
            SubscribeError::Decode(e) => e.is_stream_fatal(),
            SubscribeError::Config { .. } => false,
        }
    }

    /// True when the error ends the process-level loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscribeError::Config { .. })
    }
}
