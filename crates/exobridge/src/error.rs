//! # Error Definitions
//!
//! Crate-level failures. Module errors (link, peer, transport, handshake,
//! config) convert into [`Error`] so callers deal with a single type.

use std::time::Duration;

use crate::config::ConfigError;
use crate::handshake;
use crate::link;
use crate::node::NodeId;
use crate::peer;
use crate::reference::Reference;
use crate::transport;
use crate::value::RemoteFault;

/// Mistakes on the caller's side. Detected locally, before anything is sent.
#[derive(Debug, Clone, PartialEq)]
pub enum UsageError {
    /// An instance operation was given `null` as its receiver.
    NullReceiver,
    /// The receiver is a local value, not a remote object.
    NotAnObject(&'static str),
    /// The reference outlived its node or epoch.
    InvalidReference(Reference),
    /// The reference belongs to a different node than the call targets.
    ForeignReference { reference: Reference, node: NodeId },
    /// No member matches the name and arguments.
    NoSuchMember { type_name: String, member: String },
    /// More than one member matches and no hint tells them apart.
    Ambiguous { type_name: String, member: String, candidates: usize },
    /// The value cannot be sent to the remote side.
    Unsendable(String),
}

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NullReceiver => write!(f, "receiver is null"),
            Self::NotAnObject(desc) => write!(f, "expected a remote object, got a local {}", desc),
            Self::InvalidReference(r) => write!(f, "reference {} is no longer valid", r),
            Self::ForeignReference { reference, node } => {
                write!(f, "reference {} cannot be used on {}", reference, node)
            }
            Self::NoSuchMember { type_name, member } => {
                write!(f, "no member of {} matches {}", type_name, member)
            }
            Self::Ambiguous { type_name, member, candidates } => write!(
                f,
                "{} members of {} match {}; add type hints",
                candidates, type_name, member
            ),
            Self::Unsendable(msg) => write!(f, "cannot send value: {}", msg),
        }
    }
}

impl std::error::Error for UsageError {}

#[derive(Debug, Clone)]
pub enum Error {
    /// Bad or unknown configuration. Never retried.
    Config(ConfigError),
    /// The remote runtime process could not be launched.
    Launch(transport::Error),
    /// A handshake attempt failed.
    Handshake(handshake::Error),
    /// Every start attempt failed the handshake.
    StartExhausted { attempts: u32 },
    /// The remote process is already bound to another session.
    AlreadyBound(String),
    NodeNotFound(NodeId),
    /// The node's session link is gone.
    NotConnected(NodeId),
    /// No reply arrived within the effective call timeout.
    Timeout(Duration),
    ConnectionLost(String),
    Link(link::Error),
    Wire(exowire::Error),
    /// The remote runtime raised an exception while serving the call.
    RemoteFault(RemoteFault),
    /// The remote answered with something the request does not allow.
    Protocol(String),
    Usage(UsageError),
    /// The host cannot perform the operation.
    Unsupported(&'static str),
    /// Forced termination of the remote process failed.
    Kill { pid: u32, reason: String },
}

impl Error {
    /// Handshake failures that a fresh start attempt may fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Handshake(e) if e.is_retryable())
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn remote_fault(&self) -> Option<&RemoteFault> {
        match self {
            Self::RemoteFault(fault) => Some(fault),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "Configuration error: {}", e),
            Self::Launch(e) => write!(f, "Launch error: {}", e),
            Self::Handshake(e) => write!(f, "Handshake error: {}", e),
            Self::StartExhausted { attempts } => {
                write!(f, "too_many_tries: gave up after {} start attempts", attempts)
            }
            Self::AlreadyBound(session) => {
                write!(f, "remote runtime is already bound to session {}", session)
            }
            Self::NodeNotFound(id) => write!(f, "Node not found: {}", id),
            Self::NotConnected(id) => write!(f, "Node not connected: {}", id),
            Self::Timeout(limit) => write!(f, "Call timed out after {:?}", limit),
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Link(e) => write!(f, "Link error: {}", e),
            Self::Wire(e) => write!(f, "Wire error: {}", e),
            Self::RemoteFault(fault) => write!(f, "Remote fault: {}", fault),
            Self::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            Self::Usage(e) => write!(f, "Usage error: {}", e),
            Self::Unsupported(what) => write!(f, "Unsupported: {}", what),
            Self::Kill { pid, reason } => write!(f, "Failed to kill process {}: {}", pid, reason),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Launch(e) => Some(e),
            Self::Handshake(e) => Some(e),
            Self::Link(e) => Some(e),
            Self::Wire(e) => Some(e),
            Self::Usage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Launch(e)
    }
}

impl From<handshake::Error> for Error {
    fn from(e: handshake::Error) -> Self {
        match e {
            handshake::Error::AlreadyBound(session) => Self::AlreadyBound(session),
            other => Self::Handshake(other),
        }
    }
}

impl From<peer::Error> for Error {
    fn from(e: peer::Error) -> Self {
        match e {
            peer::Error::Link(e) => Self::Link(e),
            peer::Error::Wire(e) => Self::Wire(e),
            peer::Error::Timeout(limit) => Self::Timeout(limit),
            peer::Error::ConnectionLost(msg) => Self::ConnectionLost(msg),
        }
    }
}

impl From<link::Error> for Error {
    fn from(e: link::Error) -> Self {
        Self::Link(e)
    }
}

impl From<UsageError> for Error {
    fn from(e: UsageError) -> Self {
        Self::Usage(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
