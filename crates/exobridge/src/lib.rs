//! # ExoBridge
//!
//! Drives a managed object runtime living in another process as if its
//! constructors, methods, fields and exceptions were local.
//!
//! ## Architecture
//!
//! A [`Bridge`] launches each remote runtime as a subprocess, binds a session
//! listener the runtime dials back to, and runs a ping/connect handshake over
//! it. Calls from any number of [`CallContext`]s are multiplexed over that
//! session and correlated by sequence number. Thread-affine calls run on a
//! worker thread bound to the calling context; type metadata is resolved once
//! per node and shared.

pub mod affinity;
pub mod bridge;
pub mod builder;
pub mod config;
pub mod context;
mod dispatch;
pub mod error;
pub mod handshake;
pub mod launcher;
mod lifecycle;
pub mod link;
pub mod logging;
pub mod metadata;
pub mod node;
pub mod peer;
pub mod reference;
pub mod select;
mod surface;
pub mod transport;
pub mod value;


pub use bridge::Bridge;
pub use builder::BridgeBuilder;
pub use config::CallTimeout;
pub use config::FaultMode;
pub use config::NodeConfig;
pub use context::CallContext;
pub use error::Error;
pub use error::Result;
pub use error::UsageError;
pub use node::NodeId;
pub use node::NodeInfo;
pub use node::NodeState;
pub use reference::Reference;
pub use value::Arg;
pub use value::RemoteFault;
pub use value::Value;
