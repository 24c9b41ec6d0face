//! Error types for motion-capture stream processing.
//!
//! All errors implement [`std::error::Error`] and carry structured context.
//! Nothing in this crate is fatal to the host process: every failure path
//! degrades to "retain the last known good pose" or "report and skip", so
//! a glitching capture stream never tears down a running presentation.
//!
//! ## Error Categories
//!
//! - **Connection Errors**: socket open/listen failures
//! - **Codec Errors**: malformed headers or truncated frame payloads
//! - **Routing Errors**: frames delivered for sockets no longer registered
//! - **Sample Errors**: non-finite values in decoded bone data
//!
//! ## Helper Constructors
//!
//! ```rust
//! use mocaplink::MocapError;
//!
//! let conn = MocapError::connection_failed("connection refused");
//! assert!(conn.is_retryable());
//!
//! let codec = MocapError::malformed_header("bad start token");
//! assert!(!codec.is_retryable());
//! ```

use thiserror::Error;

use crate::bones::Bone;

/// Result type alias for motion-capture operations.
pub type Result<T, E = MocapError> = std::result::Result<T, E>;

/// Main error type for motion-capture stream operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MocapError {
    #[error("Failed to open capture connection: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Malformed frame header: {details}")]
    MalformedHeader { details: String },

    #[error("Truncated frame payload: need {expected} bytes, have {available}")]
    TruncatedPayload { expected: usize, available: usize },

    #[error("Frame delivered for unregistered socket handle {handle}")]
    UnknownSocket { handle: u64 },

    #[error("Non-finite sample decoded for bone {bone:?}")]
    NonFiniteSample { bone: Bone },

    #[error("Invalid rig definition: {details}")]
    InvalidRig { details: String },

    #[error("Frame delivery queue is closed")]
    QueueClosed,
}

impl MocapError {
    /// Returns whether this error is potentially recoverable through retry.
    ///
    /// Connection failures are transient (the capture server may not be up
    /// yet); codec and rig errors are deterministic and will recur until the
    /// input changes.
    pub fn is_retryable(&self) -> bool {
        match self {
            MocapError::Connection { .. } => true,
            MocapError::QueueClosed => false,
            MocapError::MalformedHeader { .. } => false,
            MocapError::TruncatedPayload { .. } => false,
            MocapError::UnknownSocket { .. } => false,
            MocapError::NonFiniteSample { .. } => false,
            MocapError::InvalidRig { .. } => false,
        }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        MocapError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with an underlying cause.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        MocapError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for header parse failures.
    pub fn malformed_header(details: impl Into<String>) -> Self {
        MocapError::MalformedHeader { details: details.into() }
    }

    /// Helper constructor for short payloads.
    pub fn truncated_payload(expected: usize, available: usize) -> Self {
        MocapError::TruncatedPayload { expected, available }
    }

    /// Helper constructor for rig validation failures.
    pub fn invalid_rig(details: impl Into<String>) -> Self {
        MocapError::InvalidRig { details: details.into() }
    }
}

impl From<std::io::Error> for MocapError {
    fn from(err: std::io::Error) -> Self {
        MocapError::Connection { reason: err.to_string(), source: Some(Box::new(err)) }
    }
}
