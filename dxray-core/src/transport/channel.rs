//! Single persistent outbound connection.
//!
//! ```text
//!  Disconnected ──► Connecting ──► Connected
//!       ▲                │              │
//!       └────────────────┴──────────────┘   (connect failure / send failure / disconnect)
//! ```
//!
//! Operations never return errors across this boundary: `connect` and
//! `send` report a success flag, and the reason for the last failure is
//! kept in [`TransportChannel::last_status`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::SinkExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::FramedWrite;
use tracing::{debug, error, info, warn};

use crate::error::{DxrayError, Result};
use crate::transport::codec::{FrameCodec, WireFrame};

/// Default time allowed for a TCP connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ── TransportPhase ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransportPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected {
        since: Instant,
    },
}

impl std::fmt::Display for TransportPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected { .. } => write!(f, "Connected"),
        }
    }
}

impl TransportPhase {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// How long the link has been up; `None` unless connected.
    pub fn connected_duration(&self) -> Option<Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<()> {
        match self {
            Self::Disconnected => {
                *self = Self::Connecting;
                Ok(())
            }
            other => Err(DxrayError::InvalidState(format!(
                "cannot connect while {other}"
            ))),
        }
    }

    /// Valid from: `Connecting`.
    pub fn complete_connect(&mut self) -> Result<()> {
        match self {
            Self::Connecting => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            other => Err(DxrayError::InvalidState(format!(
                "cannot complete connect while {other}"
            ))),
        }
    }

    /// Reset to `Disconnected` from any phase.
    pub fn force_disconnect(&mut self) {
        *self = Self::Disconnected;
    }
}

// ── Endpoint ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

// ── FrameSink ────────────────────────────────────────────────────

/// The seam the pipeline controller sends through.
#[async_trait]
pub trait FrameSink: Send {
    fn is_connected(&self) -> bool;

    /// Endpoint of the last connect attempt.
    fn endpoint(&self) -> Option<&Endpoint>;

    fn last_status(&self) -> &str;

    async fn connect(&mut self, address: &str, port: u16) -> bool;

    async fn send(&mut self, frame: &WireFrame) -> bool;

    async fn disconnect(&mut self);
}

// ── TransportChannel ─────────────────────────────────────────────

#[derive(Debug)]
pub struct TransportChannel {
    phase: TransportPhase,
    endpoint: Option<Endpoint>,
    writer: Option<FramedWrite<TcpStream, FrameCodec>>,
    last_status: String,
    connect_timeout: Duration,
    frames_sent: u64,
    bytes_sent: u64,
}

impl Default for TransportChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportChannel {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn with_timeout(connect_timeout: Duration) -> Self {
        Self {
            phase: TransportPhase::Disconnected,
            endpoint: None,
            writer: None,
            last_status: String::new(),
            connect_timeout,
            frames_sent: 0,
            bytes_sent: 0,
        }
    }

    pub fn phase(&self) -> &TransportPhase {
        &self.phase
    }

    pub fn is_connected(&self) -> bool {
        self.phase.is_connected()
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn last_status(&self) -> &str {
        &self.last_status
    }

    /// Frames and bytes written on the current connection.
    pub fn counters(&self) -> (u64, u64) {
        (self.frames_sent, self.bytes_sent)
    }

    /// Open the connection. An existing connection is closed first.
    ///
    /// On failure the channel stays `Disconnected` and the reason is
    /// recorded as the last status.
    pub async fn connect(&mut self, address: &str, port: u16) -> bool {
        if self.phase.is_connected() {
            self.disconnect().await;
        } else {
            self.phase.force_disconnect();
        }

        let endpoint = Endpoint::new(address, port);
        self.endpoint = Some(endpoint.clone());
        if let Err(e) = self.phase.begin_connect() {
            self.last_status = e.to_string();
            return false;
        }

        match self.open(&endpoint).await {
            Ok(stream) => {
                self.writer = Some(FramedWrite::new(stream, FrameCodec::new()));
                self.frames_sent = 0;
                self.bytes_sent = 0;
                if let Err(e) = self.phase.complete_connect() {
                    self.phase.force_disconnect();
                    self.writer = None;
                    self.last_status = e.to_string();
                    return false;
                }
                self.last_status = format!("Connected to {endpoint}");
                info!(%endpoint, "transport connected");
                true
            }
            Err(e) => {
                self.phase.force_disconnect();
                self.last_status = e.to_string();
                warn!(%endpoint, "connect failed: {e}");
                false
            }
        }
    }

    async fn open(&self, endpoint: &Endpoint) -> Result<TcpStream> {
        let rejected = |reason: String| DxrayError::ConnectionRejected {
            endpoint: endpoint.to_string(),
            reason,
        };
        let attempt = TcpStream::connect((endpoint.address.as_str(), endpoint.port));
        let stream = tokio::time::timeout(self.connect_timeout, attempt)
            .await
            .map_err(|_| rejected(format!("timed out after {:?}", self.connect_timeout)))?
            .map_err(|e| rejected(e.to_string()))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Write one frame and flush it.
    ///
    /// Any failure drops the connection; the caller must reconnect
    /// before sending again.
    pub async fn send(&mut self, frame: &WireFrame) -> bool {
        let Some(writer) = self.writer.as_mut().filter(|_| self.phase.is_connected()) else {
            self.last_status = DxrayError::NotConnected.to_string();
            return false;
        };

        let result = writer.send(frame.clone()).await;
        match result {
            Ok(()) => {
                self.frames_sent += 1;
                self.bytes_sent += frame.wire_len() as u64;
                self.last_status = format!("Sent {}", frame.name);
                debug!(name = %frame.name, bytes = frame.data.len(), "frame sent");
                true
            }
            Err(e) => {
                error!(name = %frame.name, "send failed: {e}");
                self.writer = None;
                self.phase.force_disconnect();
                self.last_status = format!("Send of {} failed: {e}", frame.name);
                false
            }
        }
    }

    /// Close the connection. Safe to call in any phase.
    pub async fn disconnect(&mut self) {
        if let Some(writer) = self.writer.take() {
            let mut stream = writer.into_inner();
            if let Err(e) = stream.shutdown().await {
                debug!("shutdown: {e}");
            }
            self.last_status = "Disconnected".to_string();
            info!(frames = self.frames_sent, bytes = self.bytes_sent, "transport disconnected");
        }
        self.phase.force_disconnect();
    }
}

#[async_trait]
impl FrameSink for TransportChannel {
    fn is_connected(&self) -> bool {
        TransportChannel::is_connected(self)
    }

    fn endpoint(&self) -> Option<&Endpoint> {
        TransportChannel::endpoint(self)
    }

    fn last_status(&self) -> &str {
        TransportChannel::last_status(self)
    }

    async fn connect(&mut self, address: &str, port: u16) -> bool {
        TransportChannel::connect(self, address, port).await
    }

    async fn send(&mut self, frame: &WireFrame) -> bool {
        TransportChannel::send(self, frame).await
    }

    async fn disconnect(&mut self) {
        TransportChannel::disconnect(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::net::TcpListener;
    use tokio_util::codec::FramedRead;

    #[test]
    fn phase_lifecycle() {
        let mut phase = TransportPhase::default();
        phase.begin_connect().unwrap();
        assert_eq!(phase, TransportPhase::Connecting);
        phase.complete_connect().unwrap();
        assert!(phase.is_connected());
        assert!(phase.connected_duration().is_some());
        phase.force_disconnect();
        assert_eq!(phase, TransportPhase::Disconnected);
    }

    #[test]
    fn invalid_phase_transitions() {
        let mut phase = TransportPhase::Disconnected;
        assert!(phase.complete_connect().is_err());

        let mut phase = TransportPhase::Connected {
            since: Instant::now(),
        };
        assert!(phase.begin_connect().is_err());
    }

    #[tokio::test]
    async fn send_without_connect_fails() {
        let mut channel = TransportChannel::new();
        let frame = WireFrame::new("a.tiff", 1, 1, vec![0u8]).unwrap();
        assert!(!channel.send(&frame).await);
        assert!(!channel.is_connected());
        assert_eq!(channel.last_status(), "not connected");
    }

    #[tokio::test]
    async fn refused_connect_stays_disconnected() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut channel = TransportChannel::with_timeout(Duration::from_secs(2));
        assert!(!channel.connect("127.0.0.1", port).await);
        assert_eq!(*channel.phase(), TransportPhase::Disconnected);
        assert!(channel.last_status().contains("rejected"));
        assert_eq!(channel.endpoint(), Some(&Endpoint::new("127.0.0.1", port)));
    }

    #[tokio::test]
    async fn connect_send_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = FramedRead::new(stream, FrameCodec::new());
            reader.next().await.unwrap().unwrap()
        });

        let mut channel = TransportChannel::new();
        assert!(channel.connect("127.0.0.1", port).await);
        assert!(channel.is_connected());

        let frame = WireFrame::new("1.tiff", 2, 3, vec![9u8; 10]).unwrap();
        assert!(channel.send(&frame).await);
        assert_eq!(channel.counters(), (1, frame.wire_len() as u64));

        channel.disconnect().await;
        channel.disconnect().await;
        assert!(!channel.is_connected());

        assert_eq!(server.await.unwrap(), frame);
    }
}
