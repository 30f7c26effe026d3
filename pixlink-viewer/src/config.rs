//! Viewer configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use pixlink_core::{PixError, ReceiverConfig};

/// Top-level configuration for the viewer.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ViewerConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Receive-loop tuning.
    pub receiver: ReceiverTuning,
    /// Frame output settings.
    pub output: OutputConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// UDP address to listen on for image datagrams.
    pub listen_addr: String,
}

/// Receive-loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverTuning {
    /// Decode handoff policy: "overlapping" or "gated".
    pub handoff_policy: String,
    /// Evict an in-flight transfer after this many milliseconds
    /// without a datagram. 0 disables eviction.
    pub session_idle_timeout_ms: u64,
}

/// Frame output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory completed frames are written to.
    pub frame_dir: String,
    /// Persist frames to disk (otherwise they are only logged).
    pub save_frames: bool,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            // Port the original camera link transmits to.
            listen_addr: "0.0.0.0:5000".into(),
        }
    }
}

impl Default for ReceiverTuning {
    fn default() -> Self {
        Self {
            handoff_policy: "overlapping".into(),
            session_idle_timeout_ms: 0,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            frame_dir: "frames".into(),
            save_frames: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ViewerConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }
}

impl ReceiverTuning {
    /// Translate the TOML-friendly fields into an engine config.
    pub fn to_receiver_config(&self) -> Result<ReceiverConfig, PixError> {
        let policy = self.handoff_policy.parse()?;
        let session_idle_timeout = match self.session_idle_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        Ok(ReceiverConfig {
            policy,
            session_idle_timeout,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────
