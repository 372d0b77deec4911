//! Calling contexts.

use crate::config::CallTimeout;
use crate::config::NodeConfig;

/// Strong type for calling-context identifiers.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct ContextId(pub u64);

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// State scoped to one logical caller.
///
/// Every call takes the context by `&mut`, so a context has at most one call
/// outstanding. Each context is bound to its own remote worker thread per
/// node, created on its first thread-affine call.
///
/// Contexts are created by [`Bridge::context`](crate::bridge::Bridge::context)
/// and are deliberately not `Clone`: a copy would share the worker binding.
#[derive(Debug)]
pub struct CallContext {
    id: ContextId,
    timeout: Option<CallTimeout>,
}

impl CallContext {
    pub(crate) fn new(id: ContextId) -> Self {
        Self { id, timeout: None }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Overrides the node's call timeout for calls made through this context.
    pub fn with_timeout(mut self, timeout: CallTimeout) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets or clears the timeout override.
    pub fn set_timeout(&mut self, timeout: Option<CallTimeout>) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Option<CallTimeout> {
        self.timeout
    }

    /// The override if set, else the node's default.
    pub(crate) fn effective_timeout(&self, config: &NodeConfig) -> CallTimeout {
        self.timeout.unwrap_or(config.call_timeout)
    }
}
