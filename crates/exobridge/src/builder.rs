//! # Bridge Builder
//!
//! Provides a fluent API for assembling a [`Bridge`] with its collaborators.

use std::sync::Arc;

use crate::bridge::Bridge;
use crate::launcher::Launcher;
use crate::launcher::ProcessLauncher;
use crate::metadata::RemoteResolver;
use crate::metadata::TypeResolver;
use crate::select::ArityMatcher;
use crate::select::MemberSelector;
use crate::transport::DiagnosticSink;
use crate::transport::TracingSink;

/// Fluent builder for a bridge. Every collaborator has a default.
pub struct BridgeBuilder {
    launcher: Arc<dyn Launcher>,
    resolver: Arc<dyn TypeResolver>,
    selector: Arc<dyn MemberSelector>,
    sink: Arc<dyn DiagnosticSink>,
}

impl BridgeBuilder {
    pub fn new() -> Self {
        Self {
            launcher: Arc::new(ProcessLauncher),
            resolver: Arc::new(RemoteResolver),
            selector: Arc::new(ArityMatcher),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn launcher(mut self, launcher: impl Launcher) -> Self {
        self.launcher = Arc::new(launcher);
        self
    }

    pub fn resolver(mut self, resolver: impl TypeResolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn selector(mut self, selector: impl MemberSelector) -> Self {
        self.selector = Arc::new(selector);
        self
    }

    pub fn diagnostics(mut self, sink: impl DiagnosticSink) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn build(self) -> Arc<Bridge> {
        Arc::new(Bridge::from_parts(self.launcher, self.resolver, self.selector, self.sink))
    }
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
