//! # Protocol Frames
//!
//! Defines the envelopes exchanged over a session link: the handshake
//! (ping, connect), the call/reply/fault exchange, and the lifecycle
//! directives (reset, terminate).
//!
//! ## Invariants
//! - **Panic Safety**: All decoding paths return `Result`, never panicking on unknown data.
//! - **Correlation**: Every `Call` and `Reset` carries a sequence number that the
//!   answering `Reply` or `Fault` echoes back.

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;
use crate::request::Request;
use crate::request::TypeShape;
use crate::value::WireValue;

/// Largest frame body accepted on a session link (16 MiB).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Ping {
        nonce: u64,
    },
    Pong {
        nonce: u64,
    },
    Connect {
        node: u64,
        session: String,
    },
    Connected {
        peer: String,
        os_pid: u32,
    },
    AlreadyConnected {
        session: String,
    },
    Call {
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thread: Option<u64>,
        request: Request,
    },
    Reply {
        seq: u64,
        body: ReplyBody,
    },
    Fault {
        seq: u64,
        fault: FaultBody,
    },
    Reset {
        seq: u64,
    },
    Terminate,
}

/// The success side of a reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyBody {
    Value(WireValue),
    Shape(TypeShape),
}

/// An exception raised by the remote runtime while serving a request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaultBody {
    /// Runtime type name of the exception.
    pub class: String,
    pub message: String,
    /// Object handle of the exception, when the runtime kept it alive.
    #[serde(default)]
    pub exception: Option<u64>,
}

impl Frame {
    /// Serialize this frame into a body suitable for a length-prefixed link.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let bytes = serde_json::to_vec(self)?;
        check_frame_len(bytes.len())?;
        Ok(bytes)
    }

    /// Parse a frame body.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        check_frame_len(bytes.len())?;
        Ok(serde_json::from_slice(bytes)?)
    }

    /// The frame type as written on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::Connect { .. } => "connect",
            Self::Connected { .. } => "connected",
            Self::AlreadyConnected { .. } => "already_connected",
            Self::Call { .. } => "call",
            Self::Reply { .. } => "reply",
            Self::Fault { .. } => "fault",
            Self::Reset { .. } => "reset",
            Self::Terminate => "terminate",
        }
    }

    /// Sequence number carried by the frame, if the frame type has one.
    pub fn seq(&self) -> Option<u64> {
        match self {
            Self::Call { seq, .. }
            | Self::Reply { seq, .. }
            | Self::Fault { seq, .. }
            | Self::Reset { seq } => Some(*seq),
            _ => None,
        }
    }
}

/// Ensures a body length fits the protocol limit and the `u32` length prefix.
pub fn check_frame_len(len: usize) -> Result<u32> {
    if len > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge { len, max: MAX_FRAME_LEN });
    }
    Ok(len as u32)
}

/// Decodes just the sequence number from a raw frame.
/// This is useful for routing replies when the full decoding fails.
pub fn decode_seq(bytes: &[u8]) -> Result<u64> {
    let doc: serde_json::Value = serde_json::from_slice(bytes)?;
    doc.get("seq")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| Error::ProtocolViolation("Missing seq".into()))
}
