//! # Session Peer with Async Pump
//!
//! This module provides the `Peer` abstraction for exchanging frames with a
//! remote runtime over a [`Link`]. A background pump task demultiplexes
//! incoming frames: replies and faults are correlated with pending calls by
//! sequence number, handshake frames are handed to a control channel.
//!
//! Calls wait on their own `oneshot` only, so replies may arrive in any order.
//! A call that times out forgets its sequence number; a reply arriving later
//! is logged and dropped.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use exowire::FaultBody;
use exowire::Frame;
use exowire::ReplyBody;
use exowire::Request;
use exowire::decode_seq;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::link;
use crate::link::Link;
use crate::node::NodeId;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Link(link::Error),
    Wire(exowire::Error),
    /// No reply within the given limit.
    Timeout(Duration),
    /// The pump stopped before the reply arrived.
    ConnectionLost(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Link(e) => write!(f, "Link error: {}", e),
            Self::Wire(e) => write!(f, "Wire error: {}", e),
            Self::Timeout(limit) => write!(f, "Request timed out after {:?}", limit),
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<link::Error> for Error {
    fn from(e: link::Error) -> Self {
        Self::Link(e)
    }
}

impl From<exowire::Error> for Error {
    fn from(e: exowire::Error) -> Self {
        Self::Wire(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// How the remote answered a call.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Reply(ReplyBody),
    Fault(FaultBody),
}

type Waiter = oneshot::Sender<Result<Completion>>;

/// Frame peer with an async pump for concurrent calls.
///
/// Each peer owns its link exclusively, so sequence numbers are scoped to one
/// session.
pub struct Peer {
    node: NodeId,
    link: Arc<dyn Link>,
    pending: Arc<DashMap<u64, Waiter>>,
    seq_gen: AtomicU64,
    alive: Arc<AtomicBool>,
    pump: JoinHandle<()>,
}

impl Peer {
    /// Creates a peer and spawns its pump.
    ///
    /// The returned receiver yields handshake frames (`pong`, `connected`,
    /// `already_connected`). It closes when the pump stops.
    pub fn new(node: NodeId, link: Arc<dyn Link>) -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let pending: Arc<DashMap<u64, Waiter>> = Arc::new(DashMap::new());
        let alive = Arc::new(AtomicBool::new(true));
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let pump_link = link.clone();
        let pump_pending = pending.clone();
        let pump_alive = alive.clone();

        let pump = tokio::spawn(async move {
            let reason = loop {
                match pump_link.recv().await {
                    Ok(Some(msg)) => {
                        if let Err(e) = Self::handle_message(node, &msg, &pump_pending, &control_tx) {
                            error!(node = %node, error = %e, "Session pump stopped");
                            break e.to_string();
                        }
                    }
                    Ok(None) => {
                        debug!(node = %node, "Session link closed");
                        break "Stream closed".to_string();
                    }
                    Err(e) => {
                        error!(node = %node, error = %e, "Session link failed");
                        break e.to_string();
                    }
                }
            };

            pump_alive.store(false, Ordering::SeqCst);
            Self::notify_all_pending(&pump_pending, Error::ConnectionLost(reason));
        });

        let peer = Self {
            node,
            link,
            pending,
            seq_gen: AtomicU64::new(1),
            alive,
            pump,
        };
        (peer, control_rx)
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Whether the pump is still reading the session link.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Number of calls awaiting a reply.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Fails every pending call with `error`.
    fn notify_all_pending(pending: &DashMap<u64, Waiter>, error: Error) {
        let keys: Vec<u64> = pending.iter().map(|e| *e.key()).collect();
        for key in keys {
            if let Some((_, tx)) = pending.remove(&key) {
                let _ = tx.send(Err(error.clone()));
            }
        }
    }

    /// Routes one incoming body. An error stops the pump.
    fn handle_message(
        node: NodeId,
        msg: &[u8],
        pending: &DashMap<u64, Waiter>,
        control: &mpsc::UnboundedSender<Frame>,
    ) -> Result<()> {
        let frame = match Frame::decode(msg) {
            Ok(frame) => frame,
            Err(e) => {
                // A garbled answer only fails the call it belongs to.
                let seq = decode_seq(msg).map_err(|_| e.clone())?;
                let Some((_, tx)) = pending.remove(&seq) else {
                    return Err(e.into());
                };
                warn!(node = %node, seq, error = %e, "Undecodable reply");
                let _ = tx.send(Err(e.into()));
                return Ok(());
            }
        };

        let (seq, completion) = match frame {
            Frame::Reply { seq, body } => (seq, Completion::Reply(body)),
            Frame::Fault { seq, fault } => (seq, Completion::Fault(fault)),
            Frame::Pong { .. } | Frame::Connected { .. } | Frame::AlreadyConnected { .. } => {
                let _ = control.send(frame);
                return Ok(());
            }
            other => {
                return Err(Error::Wire(exowire::Error::ProtocolViolation(format!(
                    "Remote sent a {} frame",
                    other.name()
                ))));
            }
        };

        match pending.remove(&seq) {
            Some((_, tx)) => {
                // The receiver may have given up already.
                let _ = tx.send(Ok(completion));
            }
            None => warn!(node = %node, seq, "Discarding late reply"),
        }
        Ok(())
    }

    /// Sends a frame without expecting an answer.
    pub async fn send_frame(&self, frame: &Frame) -> Result<()> {
        let body = frame.encode()?;
        self.link.send(&body).await?;
        Ok(())
    }

    /// Sends `request`, optionally on a worker `thread`, and awaits its completion.
    ///
    /// `timeout` of `None` waits until the reply arrives or the session drops.
    pub async fn request(
        &self,
        thread: Option<u64>,
        request: Request,
        timeout: Option<Duration>,
    ) -> Result<Completion> {
        let (seq, rx) = self.prepare()?;
        debug!(node = %self.node, seq, op = request.op(), "Sending call");
        let frame = Frame::Call { seq, thread, request };
        self.send_and_await(seq, &frame, rx, timeout).await
    }

    /// Sends the reset directive and awaits its acknowledgement.
    pub async fn reset(&self, timeout: Option<Duration>) -> Result<Completion> {
        let (seq, rx) = self.prepare()?;
        self.send_and_await(seq, &Frame::Reset { seq }, rx, timeout).await
    }

    /// Sends the terminate directive. The remote does not answer it.
    pub async fn terminate(&self) -> Result<()> {
        self.send_frame(&Frame::Terminate).await
    }

    /// Registers a pending call and returns its sequence number.
    fn prepare(&self) -> Result<(u64, oneshot::Receiver<Result<Completion>>)> {
        let seq = self.seq_gen.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq, tx);

        // The pump clears `alive` before draining `pending`, so either it
        // sees this entry or we see the flag.
        if !self.is_alive() {
            self.pending.remove(&seq);
            return Err(Error::ConnectionLost("Session closed".into()));
        }
        Ok((seq, rx))
    }

    async fn send_and_await(
        &self,
        seq: u64,
        frame: &Frame,
        rx: oneshot::Receiver<Result<Completion>>,
        timeout: Option<Duration>,
    ) -> Result<Completion> {
        if let Err(e) = self.send_frame(frame).await {
            self.pending.remove(&seq);
            return Err(e);
        }

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.pending.remove(&seq);
                    debug!(node = %self.node, seq, ?limit, "Call timed out");
                    return Err(Error::Timeout(limit));
                }
            },
            None => rx.await,
        };

        match received {
            Ok(result) => result,
            Err(_) => {
                self.pending.remove(&seq);
                Err(Error::ConnectionLost("Response channel closed".into()))
            }
        }
    }

    /// Closes the link and stops the pump. Pending calls fail.
    pub async fn close(&self) {
        self.link.close().await;
        self.pump.abort();
        self.alive.store(false, Ordering::SeqCst);
        Self::notify_all_pending(&self.pending, Error::ConnectionLost("Session closed".into()));
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
