//! Line-scan frame assembly.
//!
//! Processed lines are appended row by row to one growing buffer per
//! channel. The assembler is single-writer: only the drive loop that owns
//! it appends. Readers either borrow a [`FrameView`] on the same thread or
//! take an owned [`Frame`] snapshot to hand across a task boundary.

use std::path::{Path, PathBuf};

use tiff::encoder::colortype;
use tracing::{debug, info};

use crate::error::{DxrayError, Result};
use crate::imaging::{DecodedImage, PixelData, TiffCompression, encode_tiff};
use crate::line::{OutputChannel, ProcessedLine};

/// Assembler settings.
#[derive(Debug, Clone, Default)]
pub struct AssemblerConfig {
    /// Keep at most this many rows; older rows scroll out. `None` grows
    /// without bound.
    pub max_rows: Option<usize>,
}

// ── Frame ────────────────────────────────────────────────────────

/// An owned, finished (or snapshotted) frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub width: usize,
    pub rows: usize,
    pub high: Vec<u16>,
    pub low: Vec<u16>,
    /// RGBA, 4 bytes per pixel.
    pub color: Vec<u8>,
    pub z_effective: Vec<u8>,
}

impl Frame {
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Copy one channel out as a [`DecodedImage`].
    pub fn channel_image(&self, channel: OutputChannel) -> DecodedImage {
        let data = match channel {
            OutputChannel::High => PixelData::U16(self.high.clone()),
            OutputChannel::Low => PixelData::U16(self.low.clone()),
            OutputChannel::Color => PixelData::U8(self.color.clone()),
            OutputChannel::ZEffective => PixelData::U8(self.z_effective.clone()),
        };
        DecodedImage {
            width: self.width as u32,
            height: self.rows as u32,
            format: channel.format(),
            data,
        }
    }

    /// Losslessly encode one channel as TIFF.
    pub fn encode_channel(
        &self,
        channel: OutputChannel,
        compression: TiffCompression,
    ) -> Result<Vec<u8>> {
        if self.is_empty() {
            return Err(DxrayError::InvalidInput("frame has no rows".into()));
        }
        let (w, h) = (self.width as u32, self.rows as u32);
        match channel {
            OutputChannel::High => encode_tiff::<colortype::Gray16>(w, h, &self.high, compression),
            OutputChannel::Low => encode_tiff::<colortype::Gray16>(w, h, &self.low, compression),
            OutputChannel::Color => encode_tiff::<colortype::RGBA8>(w, h, &self.color, compression),
            OutputChannel::ZEffective => {
                encode_tiff::<colortype::Gray8>(w, h, &self.z_effective, compression)
            }
        }
    }

    /// Write every channel to `dir` as `<channel>.tiff`.
    pub fn write_to_dir(&self, dir: &Path, compression: TiffCompression) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir).map_err(|e| DxrayError::file(dir, e))?;
        let mut written = Vec::with_capacity(OutputChannel::ALL.len());
        for channel in OutputChannel::ALL {
            let path = dir.join(format!("{}.tiff", channel.name()));
            let bytes = self.encode_channel(channel, compression)?;
            std::fs::write(&path, bytes).map_err(|e| DxrayError::file(&path, e))?;
            written.push(path);
        }
        info!(dir = %dir.display(), rows = self.rows, "frame written");
        Ok(written)
    }
}

// ── FrameView ────────────────────────────────────────────────────

/// Borrowed view of the frame in progress.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub width: usize,
    pub rows: usize,
    pub high: &'a [u16],
    pub low: &'a [u16],
    pub color: &'a [u8],
    pub z_effective: &'a [u8],
}

impl FrameView<'_> {
    /// Independent owned copy.
    pub fn to_frame(&self) -> Frame {
        Frame {
            width: self.width,
            rows: self.rows,
            high: self.high.to_vec(),
            low: self.low.to_vec(),
            color: self.color.to_vec(),
            z_effective: self.z_effective.to_vec(),
        }
    }
}

// ── FrameAssembler ───────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FrameAssembler {
    config: AssemblerConfig,
    frame: Frame,
    lines_appended: u64,
}

impl FrameAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self {
            config,
            frame: Frame::default(),
            lines_appended: 0,
        }
    }

    /// Append every row of `line`. The first line fixes the frame width.
    pub fn append(&mut self, line: &ProcessedLine) -> Result<()> {
        let width = line.width() as usize;
        if self.frame.rows > 0 && width != self.frame.width {
            return Err(DxrayError::WidthMismatch {
                expected: self.frame.width,
                actual: width,
            });
        }
        if self.frame.rows == 0 {
            self.frame.width = width;
        }

        self.frame.high.extend_from_slice(line.high.as_raw());
        self.frame.low.extend_from_slice(line.low.as_raw());
        self.frame.color.extend_from_slice(line.color.as_raw());
        self.frame.z_effective.extend_from_slice(line.z_effective.as_raw());
        self.frame.rows += line.rows() as usize;
        self.lines_appended += 1;

        if let Some(max) = self.config.max_rows {
            self.scroll_to(max);
        }
        Ok(())
    }

    /// Borrow the frame in progress without copying.
    pub fn current_frame(&self) -> FrameView<'_> {
        FrameView {
            width: self.frame.width,
            rows: self.frame.rows,
            high: &self.frame.high,
            low: &self.frame.low,
            color: &self.frame.color,
            z_effective: &self.frame.z_effective,
        }
    }

    /// Independent copy, safe to send to another task.
    pub fn snapshot(&self) -> Frame {
        self.frame.clone()
    }

    /// Finalise: hand over the accumulated frame and start empty.
    pub fn take(&mut self) -> Frame {
        let frame = std::mem::take(&mut self.frame);
        debug!(rows = frame.rows, "frame taken");
        self.lines_appended = 0;
        frame
    }

    /// Clear all channel buffers.
    pub fn reset(&mut self) {
        self.frame = Frame::default();
        self.lines_appended = 0;
    }

    pub fn rows(&self) -> usize {
        self.frame.rows
    }

    pub fn width(&self) -> usize {
        self.frame.width
    }

    /// Lines appended since the last reset/take.
    pub fn lines_appended(&self) -> u64 {
        self.lines_appended
    }

    fn scroll_to(&mut self, max_rows: usize) {
        if self.frame.rows <= max_rows {
            return;
        }
        let drop_rows = self.frame.rows - max_rows;
        let w = self.frame.width;
        self.frame.high.drain(..drop_rows * w);
        self.frame.low.drain(..drop_rows * w);
        self.frame.color.drain(..drop_rows * w * 4);
        self.frame.z_effective.drain(..drop_rows * w);
        self.frame.rows = max_rows;
    }
}
