//! Call-level error types.
//!
//! [`CallError`] is what a caller's future resolves to when a call fails and
//! what a handler returns to signal an application error. It is serializable
//! because some variants travel back over the wire in the reserved error slot
//! (see [`crate::schema::ERROR_SLOT`]). [`StubError`] covers caller-local
//! misuse detected before anything is sent.

use serde::{Deserialize, Serialize};

/// Errors resolving a call.
///
/// Serializable so a node can send them to the remote caller (e.g. an
/// `UnknownMethod` response); purely local conditions like [`CallError::Timeout`]
/// never cross the wire but share the type so callers match on one enum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallError {
    /// The remote node has no handler registered for the method.
    UnknownMethod {
        /// The method name that was called.
        method: String,
    },

    /// The call timed out waiting for a reply.
    ///
    /// The remote handler may still be processing the request.
    Timeout,

    /// The connection was closed before the call could be sent.
    ConnectionClosed,

    /// Serialization or deserialization failed while servicing the call.
    Serialization {
        /// Human-readable error message.
        message: String,
    },

    /// The remote handler failed.
    Handler {
        /// Human-readable error message.
        message: String,
    },

    /// The message carried a payload type other than the one the service
    /// declares for this method and direction.
    UnexpectedPayload {
        /// The declared payload type.
        expected: String,
        /// The payload type actually received.
        actual: String,
    },
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallError::UnknownMethod { method } => {
                write!(f, "no handler registered for method '{}'", method)
            }
            CallError::Timeout => write!(f, "call timed out"),
            CallError::ConnectionClosed => write!(f, "connection closed"),
            CallError::Serialization { message } => write!(f, "serialization error: {}", message),
            CallError::Handler { message } => write!(f, "handler error: {}", message),
            CallError::UnexpectedPayload { expected, actual } => {
                write!(f, "expected payload '{}', got '{}'", expected, actual)
            }
        }
    }
}

impl std::error::Error for CallError {}

/// Errors detected by the stub before a request leaves the process.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StubError {
    /// The method is not present in the service descriptor.
    #[error("method '{method}' is not in the service descriptor")]
    MethodNotFound {
        /// The method name that was called.
        method: String,
    },

    /// The request payload's type does not match the descriptor's declared
    /// request type for the method.
    #[error("method '{method}' takes '{expected}', got '{actual}'")]
    PayloadMismatch {
        /// The method name that was called.
        method: String,
        /// The declared request type.
        expected: String,
        /// The payload type actually supplied.
        actual: String,
    },

    /// The request envelope could not be encoded.
    #[error("failed to encode request: {0}")]
    Encode(String),

    /// The connection is already closed.
    #[error("connection closed")]
    ConnectionClosed,
}
