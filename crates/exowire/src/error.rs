//! # Error Definitions
//!
//! Failures of the session protocol itself, as opposed to failures raised by
//! the remote runtime while executing a request.

/// Operational failures within the wire layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The frame could not be serialized or parsed.
    Json(String),
    /// The frame body exceeds the protocol limit.
    FrameTooLarge { len: usize, max: usize },
    /// The frame parsed but breaks the protocol (e.g., a missing sequence number).
    ProtocolViolation(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(msg) => write!(f, "malformed frame: {}", msg),
            Self::FrameTooLarge { len, max } => {
                write!(f, "frame of {} bytes exceeds the {} byte limit", len, max)
            }
            Self::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

/// A specialized Result type for wire operations.
pub type Result<T> = std::result::Result<T, Error>;
