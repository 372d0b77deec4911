//! # Worker-Thread Affinity
//!
//! Maps `(node, calling context)` to the remote worker thread that serves the
//! context's thread-affine calls. Bindings are created lazily and dropped
//! wholesale when the node resets or goes away.

use dashmap::DashMap;

use crate::context::ContextId;
use crate::node::NodeId;
use crate::reference::Reference;

#[derive(Default)]
pub struct AffinityMap {
    bindings: DashMap<(NodeId, ContextId), Reference>,
}

impl AffinityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node: NodeId, ctx: ContextId) -> Option<Reference> {
        self.bindings.get(&(node, ctx)).map(|entry| *entry.value())
    }

    /// Binds `thread` unless the pair is already bound, and returns the binding
    /// that holds afterwards.
    pub fn bind(&self, node: NodeId, ctx: ContextId, thread: Reference) -> Reference {
        *self.bindings.entry((node, ctx)).or_insert(thread).value()
    }

    /// Drops the pair's binding if it still points at `thread`.
    pub fn unbind(&self, node: NodeId, ctx: ContextId, thread: Reference) {
        self.bindings.remove_if(&(node, ctx), |_, bound| *bound == thread);
    }

    /// Drops every binding on `node`. Returns how many were dropped.
    pub fn evict_node(&self, node: NodeId) -> usize {
        let before = self.bindings.len();
        self.bindings.retain(|(bound, _), _| *bound != node);
        before.saturating_sub(self.bindings.len())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn clear(&self) {
        self.bindings.clear();
    }
}
