//! # Session Handshake
//!
//! Brings a freshly launched remote runtime onto a session. The remote dials
//! back to a listener the bridge bound before launching it; the bridge then
//! pings until the remote answers and finally claims it with `connect`.
//!
//! A remote that answers `already_connected` belongs to another session and
//! is never retried. Everything else that goes wrong here is worth a fresh
//! start attempt.

use std::sync::Arc;
use std::time::Duration;

use exowire::Frame;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use crate::config::NodeConfig;
use crate::link::TcpLink;
use crate::node::NodeId;
use crate::peer;
use crate::peer::Peer;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The remote never became reachable within the ping deadline.
    PingTimeout(Duration),
    /// The remote was reachable but did not answer `connect`.
    ConnectTimeout(Duration),
    /// The remote is bound to the named session.
    AlreadyBound(String),
    /// The remote hung up mid-handshake.
    Closed,
    Accept(String),
    Peer(peer::Error),
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PingTimeout(_) | Self::ConnectTimeout(_) | Self::Closed | Self::Accept(_) => true,
            Self::Peer(e) => matches!(e, peer::Error::Link(_) | peer::Error::ConnectionLost(_)),
            Self::AlreadyBound(_) => false,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PingTimeout(limit) => write!(f, "Remote unreachable after {:?}", limit),
            Self::ConnectTimeout(limit) => write!(f, "No answer to connect within {:?}", limit),
            Self::AlreadyBound(session) => write!(f, "Remote already bound to {}", session),
            Self::Closed => write!(f, "Remote closed the session during the handshake"),
            Self::Accept(msg) => write!(f, "Failed to accept session link: {}", msg),
            Self::Peer(e) => write!(f, "Peer error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<peer::Error> for Error {
    fn from(e: peer::Error) -> Self {
        Self::Peer(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A connected session.
pub struct Established {
    pub peer: Peer,
    /// Handle the remote identifies itself with.
    pub remote: String,
    pub os_pid: u32,
}

/// Runs the handshake for `node` on `listener`.
pub async fn establish(
    listener: TcpListener,
    node: NodeId,
    session: &str,
    config: &NodeConfig,
) -> Result<Established> {
    let deadline = Instant::now() + config.ping_retry;

    let (stream, from) = match tokio::time::timeout_at(deadline, listener.accept()).await {
        Ok(Ok(accepted)) => accepted,
        Ok(Err(e)) => return Err(Error::Accept(e.to_string())),
        Err(_) => return Err(Error::PingTimeout(config.ping_retry)),
    };
    debug!(node = %node, %from, "Remote dialed back");
    drop(listener);

    let (peer, mut control) = Peer::new(node, Arc::new(TcpLink::new(stream)));

    ping(&peer, &mut control, deadline, config).await?;
    debug!(node = %node, "Remote reachable");

    peer.send_frame(&Frame::Connect {
        node: node.0,
        session: session.to_string(),
    })
    .await?;

    let connect_deadline = Instant::now() + config.connect_timeout;
    loop {
        let frame = match tokio::time::timeout_at(connect_deadline, control.recv()).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Err(Error::Closed),
            Err(_) => return Err(Error::ConnectTimeout(config.connect_timeout)),
        };
        match frame {
            Frame::Connected { peer: remote, os_pid } => {
                return Ok(Established { peer, remote, os_pid });
            }
            Frame::AlreadyConnected { session } => return Err(Error::AlreadyBound(session)),
            // Answers to pings still in flight.
            _ => continue,
        }
    }
}

/// Pings every `ping_interval` until a pong arrives or `deadline` passes.
async fn ping(
    peer: &Peer,
    control: &mut mpsc::UnboundedReceiver<Frame>,
    deadline: Instant,
    config: &NodeConfig,
) -> Result<()> {
    let mut nonce = 0u64;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::PingTimeout(config.ping_retry));
        }

        nonce += 1;
        peer.send_frame(&Frame::Ping { nonce }).await?;

        let wait = config.ping_interval.min(deadline - now);
        match tokio::time::timeout(wait, control.recv()).await {
            Ok(Some(Frame::Pong { .. })) => return Ok(()),
            Ok(Some(_)) => {}
            Ok(None) => return Err(Error::Closed),
            Err(_) => {}
        }
    }
}
