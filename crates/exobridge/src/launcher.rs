//! # Launcher
//!
//! Turns a node's configuration into a running remote runtime. The default
//! [`ProcessLauncher`] spawns the configured executable; tests substitute
//! their own launcher to stand up an in-process remote instead.

use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::process::Command;

use crate::config::ConfigError;
use crate::config::NodeConfig;
use crate::node::NodeId;
use crate::transport;
use crate::transport::DiagnosticSink;
use crate::transport::Transport;

/// Everything needed to launch one start attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct LaunchPlan {
    pub node: NodeId,
    /// Session name the remote must present back.
    pub session: String,
    /// Address the remote dials back to.
    pub address: SocketAddr,
    pub executable: PathBuf,
    pub args: Vec<OsString>,
}

impl LaunchPlan {
    /// Builds the command line: classpath, verbosity, entry point, session
    /// name and session address, in that order.
    pub fn new(
        node: NodeId,
        session: impl Into<String>,
        address: SocketAddr,
        config: &NodeConfig,
    ) -> Result<Self, ConfigError> {
        let session = session.into();
        let mut args = Vec::new();

        let entries: Vec<_> = config.classpath_entries().collect();
        if !entries.is_empty() {
            let joined = std::env::join_paths(entries)
                .map_err(|e| ConfigError::Invalid(format!("classpath: {}", e)))?;
            args.push(OsString::from("-cp"));
            args.push(joined);
        }
        if let Some(verbosity) = &config.verbosity {
            args.push(OsString::from(format!("-Dexobridge.verbosity={}", verbosity)));
        }
        args.push(OsString::from(&config.entry_point));
        args.push(OsString::from(&session));
        args.push(OsString::from(address.to_string()));

        Ok(Self {
            node,
            session,
            address,
            executable: config.executable.clone(),
            args,
        })
    }

    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.executable);
        command.args(&self.args);
        command
    }
}

/// Starts remote runtimes.
#[async_trait::async_trait]
pub trait Launcher: Send + Sync + 'static {
    /// Launches the runtime described by `plan`.
    ///
    /// Returns the owning transport, or `None` when the runtime does not run
    /// as a local subprocess.
    async fn launch(
        &self,
        plan: &LaunchPlan,
        sink: Arc<dyn DiagnosticSink>,
    ) -> transport::Result<Option<Transport>>;
}

/// Spawns the configured executable as a subprocess.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

#[async_trait::async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(
        &self,
        plan: &LaunchPlan,
        sink: Arc<dyn DiagnosticSink>,
    ) -> transport::Result<Option<Transport>> {
        Transport::spawn(plan.node, plan.command(), sink).map(Some)
    }
}
