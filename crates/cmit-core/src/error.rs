//! Shared error type across CMIT crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Malformed frame: missing delimiters, invalid JSON, missing topic.
    BadRequest,
    /// No handler registered for the verb.
    NotImplemented,
    /// Unsupported protocol version.
    UnsupportedVersion,
    /// Frame exceeds the configured size limit.
    PayloadTooLarge,
    /// Referenced queue entry does not exist.
    NotFound,
    /// Socket level failure.
    Transport,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in error bodies.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::NotImplemented => "NOT_IMPLEMENTED",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ClientCode::NotFound => "NOT_FOUND",
            ClientCode::Transport => "TRANSPORT",
            ClientCode::Internal => "INTERNAL",
        }
    }

    /// Short phrase used as the reason of an error response line.
    pub fn phrase(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "Bad Request",
            ClientCode::NotImplemented => "Not Implemented",
            ClientCode::UnsupportedVersion => "Unsupported Version",
            ClientCode::PayloadTooLarge => "Payload Too Large",
            ClientCode::NotFound => "Not Found",
            ClientCode::Transport => "Transport Failure",
            ClientCode::Internal => "Internal Server Error",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, CmitError>;

/// Unified error type used by core and server.
#[derive(Debug, Error)]
pub enum CmitError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unknown verb: {0}")]
    UnknownVerb(String),
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),
    #[error("frame exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("transport: {0}")]
    Transport(#[from] std::io::Error),
    #[error("internal: {0}")]
    Internal(String),
}

impl CmitError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            CmitError::BadRequest(_) => ClientCode::BadRequest,
            CmitError::UnknownVerb(_) => ClientCode::NotImplemented,
            CmitError::UnsupportedVersion(_) => ClientCode::UnsupportedVersion,
            CmitError::PayloadTooLarge { .. } => ClientCode::PayloadTooLarge,
            CmitError::NotFound(_) => ClientCode::NotFound,
            CmitError::Transport(_) => ClientCode::Transport,
            CmitError::Internal(_) => ClientCode::Internal,
        }
    }
}
