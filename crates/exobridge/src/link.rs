//! # Session Links
//!
//! A minimal, async interface for moving frame bodies between the bridge and
//! a remote runtime.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: A link knows nothing about frames or requests. It
//!   moves opaque, already encoded bodies.
//! - **Duplex**: Sends and receives are independent; a single pump task
//!   receives while any number of callers send.

use std::sync::Mutex;

use exowire::MAX_FRAME_LEN;
use exowire::check_frame_len;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;

/// Errors that occur at the link layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// A body exceeds the protocol limit in either direction.
    FrameTooLarge(usize),
    /// Generic I/O failure.
    Io(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::FrameTooLarge(len) => {
                write!(f, "Frame of {} bytes exceeds the {} byte limit", len, MAX_FRAME_LEN)
            }
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => Self::ConnectionLost(e.to_string()),
            _ => Self::Io(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A bidirectional channel for frame bodies.
///
/// This trait is designed to be object-safe (`Arc<dyn Link>`).
#[async_trait::async_trait]
pub trait Link: Send + Sync + 'static {
    /// Sends one body. Safe to call from many tasks at once; bodies are
    /// never interleaved.
    async fn send(&self, body: &[u8]) -> Result<()>;

    /// Receives the next body, or `None` once the peer closed the link.
    ///
    /// Only one task receives at a time.
    async fn recv(&self) -> Result<Option<Vec<u8>>>;

    /// Closes the sending side. Later sends fail.
    async fn close(&self) {}
}

/// A session link over TCP, each body prefixed with its `u32` big-endian length.
pub struct TcpLink {
    reader: tokio::sync::Mutex<BufReader<OwnedReadHalf>>,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
}

impl TcpLink {
    pub fn new(stream: TcpStream) -> Self {
        let _ = stream.set_nodelay(true);
        let (read, write) = stream.into_split();
        Self {
            reader: tokio::sync::Mutex::new(BufReader::new(read)),
            writer: tokio::sync::Mutex::new(write),
        }
    }
}

#[async_trait::async_trait]
impl Link for TcpLink {
    async fn send(&self, body: &[u8]) -> Result<()> {
        let len = check_frame_len(body.len()).map_err(|_| Error::FrameTooLarge(body.len()))?;
        let mut writer = self.writer.lock().await;
        writer.write_u32(len).await?;
        writer.write_all(body).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>> {
        let mut reader = self.reader.lock().await;
        let len = match reader.read_u32().await {
            Ok(len) => len as usize,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if len > MAX_FRAME_LEN {
            return Err(Error::FrameTooLarge(len));
        }
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body).await?;
        Ok(Some(body))
    }

    async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// An in-memory link pair using tokio mpsc channels.
///
/// Bodies sent on one end are received by the other. Closing an end makes
/// the other end's `recv` return `None`.
pub struct DuplexLink {
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl DuplexLink {
    /// Creates a pair of links connected to each other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Self {
            tx: Mutex::new(Some(tx_a)),
            rx: tokio::sync::Mutex::new(rx_b),
        };

        let b = Self {
            tx: Mutex::new(Some(tx_b)),
            rx: tokio::sync::Mutex::new(rx_a),
        };

        (a, b)
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<Vec<u8>>> {
        match self.tx.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait::async_trait]
impl Link for DuplexLink {
    async fn send(&self, body: &[u8]) -> Result<()> {
        check_frame_len(body.len()).map_err(|_| Error::FrameTooLarge(body.len()))?;
        self.sender()
            .ok_or_else(|| Error::ConnectionLost("Link closed".into()))?
            .send(body.to_vec())
            .map_err(|_| Error::ConnectionLost("Channel closed".into()))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await)
    }

    async fn close(&self) {
        let taken = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(taken);
    }
}
