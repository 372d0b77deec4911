//! # Process Transport
//!
//! Owns the remote runtime's subprocess. Outbound bytes are queued to the
//! process input; everything the process prints is drained line by line into
//! a [`DiagnosticSink`]. Protocol frames never travel here: they use the
//! session link.
//!
//! Stopping a transport stops the drain and releases the process handle
//! without killing the process. Forced termination is a separate step owned
//! by the lifecycle manager.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex;

use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::ChildStdin;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;

use crate::node::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The executable could not be found.
    NotFound(String),
    Spawn { program: String, reason: String },
    /// A standard stream was not captured.
    MissingPipe(&'static str),
    /// The transport has already been stopped.
    Stopped,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(program) => write!(f, "Executable not found: {}", program),
            Self::Spawn { program, reason } => write!(f, "Failed to spawn {}: {}", program, reason),
            Self::MissingPipe(name) => write!(f, "Failed to capture subprocess {}", name),
            Self::Stopped => write!(f, "Transport stopped"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Receives the text a remote runtime prints outside the protocol.
pub trait DiagnosticSink: Send + Sync + 'static {
    fn line(&self, node: NodeId, line: &str);
}

/// Logs every diagnostic line under the `exobridge::remote` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn line(&self, node: NodeId, line: &str) {
        tracing::info!(target: "exobridge::remote", node = %node, "{}", line);
    }
}

/// One running remote runtime process.
pub struct Transport {
    node: NodeId,
    os_pid: Option<u32>,
    input: mpsc::UnboundedSender<Vec<u8>>,
    stop: watch::Sender<bool>,
    child: Mutex<Option<Child>>,
}

impl Transport {
    /// Spawns `command` with all three standard streams piped and starts
    /// draining its output.
    pub fn spawn(node: NodeId, mut command: Command, sink: Arc<dyn DiagnosticSink>) -> Result<Self> {
        let program = command.as_std().get_program().to_string_lossy().into_owned();
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(program.clone()),
            _ => Error::Spawn {
                program: program.clone(),
                reason: e.to_string(),
            },
        })?;

        let stdin = child.stdin.take().ok_or(Error::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(Error::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(Error::MissingPipe("stderr"))?;
        let os_pid = child.id();

        let (stop, _) = watch::channel(false);
        let (input, queue) = mpsc::unbounded_channel();

        tokio::spawn(drain(node, stdout, sink.clone(), stop.subscribe()));
        tokio::spawn(drain(node, stderr, sink, stop.subscribe()));
        tokio::spawn(feed(node, stdin, queue, stop.subscribe()));

        debug!(node = %node, program = %program, pid = ?os_pid, "Spawned remote runtime");

        Ok(Self {
            node,
            os_pid,
            input,
            stop,
            child: Mutex::new(Some(child)),
        })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Native process id, if the OS reported one.
    pub fn os_pid(&self) -> Option<u32> {
        self.os_pid
    }

    /// Queues `bytes` for the process input. Does not wait for the write.
    pub fn send(&self, bytes: &[u8]) -> Result<()> {
        if self.is_stopped() {
            return Err(Error::Stopped);
        }
        self.input.send(bytes.to_vec()).map_err(|_| Error::Stopped)
    }

    /// Stops draining and releases the process handle. The process keeps running.
    pub fn stop(&self) {
        if self.stop.send_replace(true) {
            return;
        }
        drop(self.take_child());
        debug!(node = %self.node, "Transport stopped");
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Asks the OS to kill the process, if the handle is still held.
    pub(crate) fn kill(&self) {
        if let Some(mut child) = self.take_child() {
            let _ = child.start_kill();
        }
        self.stop.send_replace(true);
    }

    fn take_child(&self) -> Option<Child> {
        match self.child.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.stop.send_replace(true);
    }
}

async fn drain<R>(node: NodeId, reader: R, sink: Arc<dyn DiagnosticSink>, mut stop: watch::Receiver<bool>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        if *stop.borrow() {
            break;
        }
        tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => sink.line(node, &line),
                Ok(None) => break,
                Err(e) => {
                    debug!(node = %node, error = %e, "Diagnostic stream failed");
                    break;
                }
            },
        }
    }
}

async fn feed(
    node: NodeId,
    mut stdin: ChildStdin,
    mut queue: mpsc::UnboundedReceiver<Vec<u8>>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            bytes = queue.recv() => {
                let Some(bytes) = bytes else { break };
                let written = async {
                    stdin.write_all(&bytes).await?;
                    stdin.flush().await
                };
                if let Err(e) = written.await {
                    debug!(node = %node, error = %e, "Process input closed");
                    break;
                }
            }
        }
    }
}
