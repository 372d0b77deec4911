//! # Node Lifecycle
//!
//! Start, reset, terminate and recreate remote runtimes.
//!
//! Starting runs launch plus handshake up to `max_attempts` times. Every
//! attempt gets a fresh identity and its own session listener; a failed
//! attempt's process is killed before the next one launches.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::bridge::Bridge;
use crate::config::NodeConfig;
use crate::error::Error;
use crate::error::Result;
use crate::handshake;
use crate::launcher::LaunchPlan;
use crate::link;
use crate::node::Node;
use crate::node::NodeId;
use crate::node::NodeState;
use crate::peer::Completion;
use crate::value::RemoteFault;

impl Bridge {
    /// Launches a remote runtime and connects to it.
    ///
    /// The configuration is validated before anything is launched.
    pub async fn start(&self, config: NodeConfig) -> Result<NodeId> {
        config.validate()?;
        self.start_with(Arc::new(config)).await
    }

    async fn start_with(&self, config: Arc<NodeConfig>) -> Result<NodeId> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let id = self.next_node_id();
            self.states.insert(id, NodeState::Starting);

            match self.attempt(id, &config, attempts).await {
                Ok(node) => {
                    info!(
                        node = %id,
                        name = ?node.name(),
                        pid = node.os_pid(),
                        attempts,
                        "Node connected"
                    );
                    self.nodes.insert(id, Arc::new(node));
                    self.states.insert(id, NodeState::Connected);
                    return Ok(id);
                }
                Err(e) => {
                    self.states.insert(id, NodeState::Failed);
                    if !e.is_retryable() {
                        error!(node = %id, error = %e, "Node failed to start");
                        return Err(e);
                    }
                    if attempts >= config.max_attempts {
                        error!(node = %id, attempts, error = %e, "Giving up on node start");
                        return Err(Error::StartExhausted { attempts });
                    }
                    warn!(node = %id, attempt = attempts, error = %e, "Start attempt failed, retrying");
                }
            }
        }
    }

    /// One launch plus handshake under identity `id`.
    async fn attempt(&self, id: NodeId, config: &Arc<NodeConfig>, attempts: u32) -> Result<Node> {
        let listener = TcpListener::bind((config.host.as_str(), 0))
            .await
            .map_err(link::Error::from)?;
        let address = listener.local_addr().map_err(link::Error::from)?;
        let session = format!("exobridge{}_{}@{}", id.0, std::process::id(), address);

        let plan = LaunchPlan::new(id, session.clone(), address, config)?;
        debug!(node = %id, session = %session, "Launching remote runtime");
        let transport = self.launcher.launch(&plan, self.sink.clone()).await?;

        match handshake::establish(listener, id, &session, config).await {
            Ok(established) => Ok(Node::new(
                id,
                config.clone(),
                session,
                established.remote,
                established.os_pid,
                attempts,
                established.peer,
                transport,
            )),
            Err(e) => {
                if let Some(transport) = &transport {
                    transport.kill();
                }
                Err(e.into())
            }
        }
    }

    /// Starts a new epoch on the node: worker threads and object references
    /// die, type metadata stays.
    pub async fn reset(&self, id: NodeId) -> Result<()> {
        let node = self.connected(id)?;
        let epoch = self.retire_epoch(&node);
        debug!(node = %id, epoch, "Resetting node");

        let timeout = node.config().call_timeout.duration();
        let outcome = node.peer.reset(timeout).await;
        // Threads bound while the directive was in flight may already be gone
        // on the remote side.
        let epoch = self.retire_epoch(&node);
        match outcome? {
            Completion::Reply(_) => Ok(()),
            Completion::Fault(body) => Err(Error::RemoteFault(RemoteFault::lift(body, id, epoch))),
        }
    }

    fn retire_epoch(&self, node: &Node) -> u64 {
        let epoch = node.advance_epoch();
        self.workers.evict_node(node.id());
        self.metadata.evict_objects(node.id());
        self.freed.retain(|reference| reference.node() != node.id());
        epoch
    }

    /// Asks the remote runtime to exit and forgets the node.
    pub async fn terminate(&self, id: NodeId) -> Result<()> {
        let (_, node) = self.nodes.remove(&id).ok_or(Error::NodeNotFound(id))?;
        if let Err(e) = node.peer.terminate().await {
            debug!(node = %id, error = %e, "Terminate directive not delivered");
        }
        self.teardown(&node, NodeState::Terminated).await;
        info!(node = %id, "Node terminated");
        Ok(())
    }

    /// Kills the node's process by native pid, without asking, and forgets
    /// the node.
    ///
    /// Only supported on POSIX hosts. If the signal cannot be delivered the
    /// node stays registered.
    pub async fn brute_terminate(&self, id: NodeId) -> Result<()> {
        if !cfg!(unix) {
            return Err(Error::Unsupported("brute_terminate requires a POSIX host"));
        }
        let pid = self.node(id)?.os_pid();
        kill_pid(pid)?;
        if let Some((_, node)) = self.nodes.remove(&id) {
            self.teardown(&node, NodeState::Terminated).await;
        }
        info!(node = %id, pid, "Node killed");
        Ok(())
    }

    /// Terminates the node and starts a new one with the same configuration.
    ///
    /// Returns the new identity.
    pub async fn recreate(&self, id: NodeId) -> Result<NodeId> {
        let (_, node) = self.nodes.remove(&id).ok_or(Error::NodeNotFound(id))?;
        self.states.insert(id, NodeState::Recreating);
        if let Err(e) = node.peer.terminate().await {
            debug!(node = %id, error = %e, "Terminate directive not delivered");
        }
        self.teardown(&node, NodeState::Recreating).await;
        let config = node.config().clone();
        drop(node);

        let started = self.start_with(config).await;
        self.states.insert(id, NodeState::Terminated);
        if let Ok(fresh) = &started {
            info!(old = %id, node = %fresh, "Node recreated");
        }
        started
    }

    /// Terminates every node and clears every store.
    pub async fn shutdown(&self) {
        let ids: Vec<NodeId> = self.nodes.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Err(e) = self.terminate(id).await {
                warn!(node = %id, error = %e, "Failed to terminate node during shutdown");
            }
        }
        self.metadata.clear();
        self.workers.clear();
        self.freed.clear();
        self.states.clear();
    }

    async fn teardown(&self, node: &Node, state: NodeState) {
        let id = node.id();
        self.workers.evict_node(id);
        self.metadata.evict_node(id);
        self.freed.retain(|reference| reference.node() != id);
        node.peer.close().await;
        if let Some(transport) = &node.transport {
            transport.stop();
        }
        self.states.insert(id, state);
    }
}

#[cfg(unix)]
fn kill_pid(pid: u32) -> Result<()> {
    use nix::sys::signal::Signal;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // Zero and negative pids address process groups.
    let raw = i32::try_from(pid)
        .ok()
        .filter(|raw| *raw > 0)
        .ok_or_else(|| Error::Kill {
            pid,
            reason: "not a process id".into(),
        })?;
    kill(Pid::from_raw(raw), Signal::SIGKILL).map_err(|errno| Error::Kill {
        pid,
        reason: errno.to_string(),
    })
}

#[cfg(not(unix))]
fn kill_pid(_pid: u32) -> Result<()> {
    Err(Error::Unsupported("brute_terminate requires a POSIX host"))
}
