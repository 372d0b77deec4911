//! # Nodes
//!
//! A node is one connected remote runtime: its identity, configuration,
//! session peer and owning transport. Identities are never reused; a
//! recreated runtime gets a fresh one.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::config::NodeConfig;
use crate::peer::Peer;
use crate::transport::Transport;

/// Strong type for node identifiers.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeState {
    Starting,
    Connected,
    /// The session dropped or the start gave up.
    Failed,
    Terminated,
    /// Torn down, about to start again under a fresh identity.
    Recreating,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Terminated => "terminated",
            Self::Recreating => "recreating",
        };
        f.write_str(name)
    }
}

/// A snapshot of one node for callers.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeInfo {
    pub id: NodeId,
    pub name: Option<String>,
    pub state: NodeState,
    pub session: String,
    /// Handle the remote identified itself with.
    pub remote: String,
    pub os_pid: u32,
    /// Start attempts it took to connect.
    pub attempts: u32,
    pub epoch: u64,
}

/// A connected remote runtime.
pub struct Node {
    id: NodeId,
    config: Arc<NodeConfig>,
    session: String,
    remote: String,
    os_pid: u32,
    attempts: u32,
    pub(crate) peer: Peer,
    pub(crate) transport: Option<Transport>,
    epoch: AtomicU64,
}

impl Node {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: NodeId,
        config: Arc<NodeConfig>,
        session: String,
        remote: String,
        os_pid: u32,
        attempts: u32,
        peer: Peer,
        transport: Option<Transport>,
    ) -> Self {
        Self {
            id,
            config,
            session,
            remote,
            os_pid,
            attempts,
            peer,
            transport,
            epoch: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.config.name.as_deref()
    }

    pub fn config(&self) -> &Arc<NodeConfig> {
        &self.config
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn os_pid(&self) -> u32 {
        self.os_pid
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Current reference epoch. Objects and threads from older epochs are dead.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Starts a new epoch and returns it.
    pub(crate) fn advance_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_connected(&self) -> bool {
        self.peer.is_alive()
    }

    pub(crate) fn info(&self, state: NodeState) -> NodeInfo {
        NodeInfo {
            id: self.id,
            name: self.config.name.clone(),
            state,
            session: self.session.clone(),
            remote: self.remote.clone(),
            os_pid: self.os_pid,
            attempts: self.attempts,
            epoch: self.epoch(),
        }
    }
}
