//! UDP receive loop around the reassembly engine.
//!
//! [`ImageReceiver`] binds the engine to a datagram socket: every
//! received datagram goes through the [`Reassembler`] synchronously,
//! and each completed image is handed to an [`ImageHandler`] under
//! the configured [`HandoffPolicy`].

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::assembly::{AssembledImage, Reassembler, ReassemblyStats};
use crate::error::PixError;
use crate::wire::MAX_DATAGRAM_LEN;

// ── HandoffPolicy ────────────────────────────────────────────────

/// How the receive loop relates to the decode/display stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandoffPolicy {
    /// Hand the image to a spawned task and keep receiving
    /// immediately. Decode work for consecutive images may overlap.
    #[default]
    Overlapping,
    /// Await the handler before processing further datagrams. Bounds
    /// decode work to one image at a time; datagrams for a subsequent
    /// image queue in the socket buffer or are lost meanwhile.
    Gated,
}

impl HandoffPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            HandoffPolicy::Overlapping => "overlapping",
            HandoffPolicy::Gated => "gated",
        }
    }
}

impl FromStr for HandoffPolicy {
    type Err = PixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overlapping" => Ok(HandoffPolicy::Overlapping),
            "gated" => Ok(HandoffPolicy::Gated),
            other => Err(PixError::UnknownPolicy(other.to_string())),
        }
    }
}

// ── ImageHandler ─────────────────────────────────────────────────

/// Downstream consumer of completed images (decode + display).
///
/// Invoked at most once per completed image. A returned error is a
/// decode/display failure: it is logged at the handoff point and
/// never affects the engine, which has already returned to idle.
#[async_trait]
pub trait ImageHandler: Send + Sync {
    async fn handle(&self, image: AssembledImage) -> Result<(), PixError>;
}

// ── ReceiverConfig ───────────────────────────────────────────────

/// Configuration for [`ImageReceiver`].
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Decode handoff policy.
    pub policy: HandoffPolicy,
    /// Discard an in-flight session that has seen no datagram for this
    /// long. `None` keeps a stalled session open indefinitely; the
    /// protocol itself never times out.
    pub session_idle_timeout: Option<Duration>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            policy: HandoffPolicy::Overlapping,
            session_idle_timeout: None,
        }
    }
}

// ── ReceiverStats ────────────────────────────────────────────────

/// Receive-loop statistics published on a watch channel.
#[derive(Debug, Clone, Default)]
pub struct ReceiverStats {
    /// Datagrams pulled off the socket since the loop started.
    pub datagrams: u64,
    /// Raw bytes pulled off the socket.
    pub bytes: u64,
    /// Engine counters.
    pub reassembly: ReassemblyStats,
}

// ── ImageReceiver ────────────────────────────────────────────────

/// Owns the bound socket and the reassembly engine.
///
/// # Lifetime
///
/// Call [`run`](Self::run) to start the receive loop; it runs until
/// [`stop`](Self::stop) is observed or the socket fails. Stopping
/// releases any in-flight buffer without emitting it.
pub struct ImageReceiver {
    socket: UdpSocket,
    reassembler: Reassembler,
    handler: Arc<dyn ImageHandler>,
    config: ReceiverConfig,
    running: Arc<AtomicBool>,
    stats_tx: watch::Sender<ReceiverStats>,
    stats_rx: watch::Receiver<ReceiverStats>,
}

impl ImageReceiver {
    /// Wrap an already-bound socket with the default configuration.
    pub fn new(socket: UdpSocket, handler: Arc<dyn ImageHandler>) -> Self {
        Self::with_config(socket, handler, ReceiverConfig::default())
    }

    /// Wrap an already-bound socket with explicit configuration.
    pub fn with_config(
        socket: UdpSocket,
        handler: Arc<dyn ImageHandler>,
        config: ReceiverConfig,
    ) -> Self {
        let (stats_tx, stats_rx) = watch::channel(ReceiverStats::default());
        Self {
            socket,
            reassembler: Reassembler::new(),
            handler,
            config,
            running: Arc::new(AtomicBool::new(false)),
            stats_tx,
            stats_rx,
        }
    }

    /// The local address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, PixError> {
        Ok(self.socket.local_addr()?)
    }

    /// Obtain a `watch::Receiver` for receive-loop statistics.
    pub fn stats_receiver(&self) -> watch::Receiver<ReceiverStats> {
        self.stats_rx.clone()
    }

    /// A cloneable handle that can stop the loop from another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Signal the receive loop to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the receive loop is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the receive loop.
    ///
    /// Intended to be spawned on the Tokio runtime. Per-frame
    /// anomalies never end the loop; only socket failures do.
    pub async fn run(&mut self) -> Result<(), PixError> {
        self.running.store(true, Ordering::SeqCst);

        // One spare byte past the largest legal datagram: an oversized
        // datagram then classifies as too large instead of being
        // truncated by the kernel into a valid-looking frame.
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN + 1];

        while self.running.load(Ordering::SeqCst) {
            let len = match self.recv_next(&mut buf).await? {
                Some(len) => len,
                None => {
                    // Idle-timeout tick: the stalled session was evicted.
                    self.publish_stats();
                    continue;
                }
            };

            let completed = self.reassembler.handle_datagram(&buf[..len]);
            self.publish_datagram(len);

            if let Some(image) = completed {
                self.dispatch(image).await;
            }
        }

        if self.reassembler.reset() {
            debug!("receiver stopped mid-session; in-flight buffer released");
        }
        Ok(())
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Wait for the next datagram, applying the session idle timeout
    /// while a transfer is in flight. `None` means a session was
    /// evicted and no datagram was consumed.
    async fn recv_next(&mut self, buf: &mut [u8]) -> Result<Option<usize>, PixError> {
        match (self.config.session_idle_timeout, self.reassembler.is_receiving()) {
            (Some(limit), true) => {
                match tokio::time::timeout(limit, self.socket.recv_from(buf)).await {
                    Ok(received) => {
                        let (len, _) = received?;
                        Ok(Some(len))
                    }
                    Err(_) => {
                        self.reassembler.evict_stalled();
                        Ok(None)
                    }
                }
            }
            _ => {
                let (len, _) = self.socket.recv_from(buf).await?;
                Ok(Some(len))
            }
        }
    }

    async fn dispatch(&self, image: AssembledImage) {
        match self.config.policy {
            HandoffPolicy::Gated => {
                if let Err(e) = self.handler.handle(image).await {
                    warn!("image handler failed: {e}");
                }
            }
            HandoffPolicy::Overlapping => {
                let handler = Arc::clone(&self.handler);
                tokio::spawn(async move {
                    if let Err(e) = handler.handle(image).await {
                        warn!("image handler failed: {e}");
                    }
                });
            }
        }
    }

    fn publish_datagram(&mut self, len: usize) {
        self.stats_tx.send_modify(|stats| {
            stats.datagrams += 1;
            stats.bytes += len as u64;
            stats.reassembly = self.reassembler.stats().clone();
        });
    }

    fn publish_stats(&mut self) {
        let reassembly = self.reassembler.stats().clone();
        self.stats_tx.send_modify(|stats| stats.reassembly = reassembly);
    }
}

// ── Tests ────────────────────────────────────────────────────────
