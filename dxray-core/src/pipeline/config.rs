use std::path::PathBuf;
use std::time::Duration;

use crate::frame::AssemblerConfig;
use crate::imaging::TiffCompression;
use crate::line::OutputChannel;

/// What the drive loop sends for each catalog record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadMode {
    /// Re-encode the decoded file losslessly and send it as is.
    #[default]
    Passthrough,
    /// Treat each file as a raw dual-band capture, process it and send
    /// one channel of the result.
    Processed(OutputChannel),
}

/// Configuration for [`PipelineController`](super::PipelineController).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Delay between consecutive sends.
    pub send_interval: Duration,
    /// Sleep step while paused.
    pub pause_poll: Duration,
    /// Reconnect-and-resend attempts after a failed send. 0 halts on the
    /// first failure.
    pub send_retries: u32,
    pub payload: PayloadMode,
    pub compression: TiffCompression,
    /// Catalog file extension filter.
    pub extension: String,
    pub assembler: AssemblerConfig,
    /// Write the assembled frame here when a processed run drains.
    pub frame_output: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            send_interval: Duration::from_millis(10),
            pause_poll: Duration::from_millis(50),
            send_retries: 0,
            payload: PayloadMode::Passthrough,
            compression: TiffCompression::default(),
            extension: "png".to_string(),
            assembler: AssemblerConfig::default(),
            frame_output: None,
        }
    }
}
