//! # Bridge Registry
//!
//! The store every operation goes through. Owns the connected nodes, their
//! lifecycle states, the metadata cache and the worker-thread bindings, plus
//! the pluggable launcher, resolver, selector and diagnostic sink.
//!
//! Uses DashMap for concurrent access without global locking, so any number
//! of tasks can start nodes, make calls and resolve types at once.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use dashmap::DashSet;

use crate::affinity::AffinityMap;
use crate::builder::BridgeBuilder;
use crate::context::CallContext;
use crate::context::ContextId;
use crate::error::Error;
use crate::error::Result;
use crate::error::UsageError;
use crate::launcher::Launcher;
use crate::metadata::MetadataCache;
use crate::metadata::TypeResolver;
use crate::node::Node;
use crate::node::NodeId;
use crate::node::NodeInfo;
use crate::node::NodeState;
use crate::reference::Reference;
use crate::select::MemberSelector;
use crate::transport::DiagnosticSink;

/// Drives remote runtimes.
///
/// Create one with [`Bridge::new`] or [`Bridge::builder`], share it as
/// `Arc<Bridge>`, and tear it down with [`Bridge::shutdown`].
pub struct Bridge {
    pub(crate) nodes: DashMap<NodeId, Arc<Node>>,
    pub(crate) states: DashMap<NodeId, NodeState>,
    pub(crate) metadata: MetadataCache,
    pub(crate) workers: AffinityMap,
    /// Objects released through [`Bridge::free`] in their current epoch.
    pub(crate) freed: DashSet<Reference>,
    pub(crate) launcher: Arc<dyn Launcher>,
    pub(crate) resolver: Arc<dyn TypeResolver>,
    pub(crate) selector: Arc<dyn MemberSelector>,
    pub(crate) sink: Arc<dyn DiagnosticSink>,
    next_node_id: AtomicU64,
    next_context_id: AtomicU64,
}

impl Bridge {
    /// A bridge that launches real subprocesses.
    pub fn new() -> Arc<Self> {
        BridgeBuilder::new().build()
    }

    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    pub(crate) fn from_parts(
        launcher: Arc<dyn Launcher>,
        resolver: Arc<dyn TypeResolver>,
        selector: Arc<dyn MemberSelector>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            nodes: DashMap::new(),
            states: DashMap::new(),
            metadata: MetadataCache::new(),
            workers: AffinityMap::new(),
            freed: DashSet::new(),
            launcher,
            resolver,
            selector,
            sink,
            next_node_id: AtomicU64::new(1),
            next_context_id: AtomicU64::new(1),
        }
    }

    /// A fresh calling context with no worker bindings yet.
    pub fn context(&self) -> CallContext {
        CallContext::new(ContextId(self.next_context_id.fetch_add(1, Ordering::Relaxed)))
    }

    pub(crate) fn next_node_id(&self) -> NodeId {
        NodeId(self.next_node_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Retrieves a registered node by ID.
    pub fn node(&self, id: NodeId) -> Result<Arc<Node>> {
        self.nodes
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(Error::NodeNotFound(id))
    }

    /// A registered node whose session is still up.
    pub(crate) fn connected(&self, id: NodeId) -> Result<Arc<Node>> {
        let node = self.node(id)?;
        if !node.is_connected() {
            self.states.insert(id, NodeState::Failed);
            return Err(Error::NotConnected(id));
        }
        Ok(node)
    }

    /// The node that issued `reference`, if the reference is still valid there.
    pub(crate) fn live_node(&self, reference: Reference) -> Result<Arc<Node>> {
        let node = self
            .node(reference.node())
            .map_err(|_| UsageError::InvalidReference(reference))?;
        if !reference.is_live_in(node.epoch()) || self.freed.contains(&reference) {
            return Err(UsageError::InvalidReference(reference).into());
        }
        if !node.is_connected() {
            self.states.insert(node.id(), NodeState::Failed);
            return Err(Error::NotConnected(node.id()));
        }
        Ok(node)
    }

    /// Lifecycle state of any identity this bridge has assigned.
    pub fn state(&self, id: NodeId) -> Option<NodeState> {
        let state = *self.states.get(&id)?;
        if state == NodeState::Connected && self.nodes.get(&id).is_some_and(|node| !node.is_connected()) {
            return Some(NodeState::Failed);
        }
        Some(state)
    }

    /// Snapshots of every registered node, ordered by identity.
    pub fn nodes(&self) -> Vec<NodeInfo> {
        let nodes: Vec<Arc<Node>> = self.nodes.iter().map(|entry| entry.value().clone()).collect();
        let mut infos: Vec<NodeInfo> = nodes
            .iter()
            .map(|node| node.info(self.state(node.id()).unwrap_or(NodeState::Connected)))
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    pub fn node_info(&self, id: NodeId) -> Result<NodeInfo> {
        let node = self.node(id)?;
        Ok(node.info(self.state(id).unwrap_or(NodeState::Connected)))
    }

    /// The registered node carrying `name`.
    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|entry| entry.value().name() == Some(name))
            .map(|entry| *entry.key())
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    pub fn workers(&self) -> &AffinityMap {
        &self.workers
    }
}
