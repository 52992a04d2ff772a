//! Configuration for the sender.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use dxray_core::{CalibrationParams, OutputChannel, PayloadMode, PipelineConfig, TiffCompression};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    pub network: NetworkConfig,
    pub dataset: DatasetConfig,
    pub pipeline: PipelineSection,
    pub calibration: CalibrationSection,
    pub logging: LoggingConfig,
}

/// Receiver endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub address: String,
    pub port: u16,
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

/// Where the frames come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub path: PathBuf,
    /// File extension to pick up, without the dot.
    pub extension: String,
}

/// Drive loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Delay between sends in milliseconds.
    pub send_interval_ms: u64,
    /// Sleep step while paused, in milliseconds.
    pub pause_poll_ms: u64,
    /// Reconnect-and-resend attempts after a failed send.
    pub send_retries: u32,
    /// "passthrough", or a channel to process and send: "high", "low",
    /// "color", "zeff".
    pub payload: String,
    /// "lzw", "deflate" or "none".
    pub compression: String,
    /// Directory for the assembled frame of a processed run. Empty
    /// disables frame output.
    pub frame_output: String,
}

/// Calibration source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSection {
    /// Load the stored profile of this user. Empty uses `params` with
    /// no references (neutral correction).
    pub user_id: String,
    /// Root of the per-user calibration store.
    pub store_dir: PathBuf,
    pub params: CalibrationParams,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".into(),
            port: 5000,
            connect_timeout_ms: 5000,
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("dataset"),
            extension: "png".into(),
        }
    }
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            send_interval_ms: 10,
            pause_poll_ms: 50,
            send_retries: 0,
            payload: "passthrough".into(),
            compression: "lzw".into(),
            frame_output: String::new(),
        }
    }
}

impl Default for CalibrationSection {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            store_dir: PathBuf::from("calibration"),
            params: CalibrationParams::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl SenderConfig {
    /// Load configuration from a TOML file, falling back to defaults.
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

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.network.connect_timeout_ms.max(1))
    }

    /// Convert into a `PipelineConfig`, clamping out-of-range values.
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        let p = &self.pipeline;
        let payload = match p.payload.to_ascii_lowercase().as_str() {
            "" | "passthrough" => PayloadMode::Passthrough,
            other => match other.parse::<OutputChannel>() {
                Ok(channel) => PayloadMode::Processed(channel),
                Err(e) => {
                    tracing::warn!("{e}; sending files unprocessed");
                    PayloadMode::Passthrough
                }
            },
        };
        let compression = match p.compression.to_ascii_lowercase().as_str() {
            "none" => TiffCompression::None,
            "deflate" => TiffCompression::Deflate,
            "lzw" => TiffCompression::Lzw,
            other => {
                tracing::warn!("unknown compression {other:?}; using lzw");
                TiffCompression::Lzw
            }
        };

        PipelineConfig {
            send_interval: Duration::from_millis(p.send_interval_ms.max(1)),
            pause_poll: Duration::from_millis(p.pause_poll_ms.clamp(1, 1000)),
            send_retries: p.send_retries.min(10),
            payload,
            compression,
            extension: self.dataset.extension.clone(),
            frame_output: (!p.frame_output.is_empty()).then(|| PathBuf::from(&p.frame_output)),
            ..Default::default()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
