//! Raw detector lines.
//!
//! A raw capture carries both energy bands row-interleaved: raw row `2k`
//! is the high-energy sub-sample and raw row `2k + 1` the low-energy
//! sub-sample of logical row `k`. A single physical scan line is
//! therefore two raw rows.

use crate::error::{DxrayError, Result};
use crate::imaging::DecodedImage;

/// One raw capture: `rows` rows of `width` 16-bit counts, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    width: usize,
    rows: usize,
    samples: Vec<u16>,
}

impl RawLine {
    pub fn new(width: usize, rows: usize, samples: Vec<u16>) -> Result<Self> {
        if width == 0 {
            return Err(DxrayError::InvalidInput("raw line has zero width".into()));
        }
        if samples.len() != width * rows {
            return Err(DxrayError::BufferSize {
                width,
                height: rows,
                actual: samples.len(),
            });
        }
        Ok(Self {
            width,
            rows,
            samples,
        })
    }

    /// Interleave one high row and one low row into a single scan line.
    pub fn from_bands(high: &[u16], low: &[u16]) -> Result<Self> {
        if high.len() != low.len() {
            return Err(DxrayError::WidthMismatch {
                expected: high.len(),
                actual: low.len(),
            });
        }
        let mut samples = Vec::with_capacity(high.len() * 2);
        samples.extend_from_slice(high);
        samples.extend_from_slice(low);
        Self::new(high.len(), 2, samples)
    }

    /// Interpret a decoded single-channel capture as a raw line.
    pub fn from_decoded(image: &DecodedImage) -> Result<Self> {
        Self::new(
            image.width as usize,
            image.height as usize,
            image.to_gray16()?,
        )
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    /// Logical row count after splitting bands.
    pub fn band_rows(&self) -> Result<usize> {
        if self.rows == 0 || self.rows % 2 != 0 {
            return Err(DxrayError::OddRowCount { rows: self.rows });
        }
        Ok(self.rows / 2)
    }

    /// High-energy samples of logical row `k`.
    pub fn high_row(&self, k: usize) -> &[u16] {
        self.row(2 * k)
    }

    /// Low-energy samples of logical row `k`.
    pub fn low_row(&self, k: usize) -> &[u16] {
        self.row(2 * k + 1)
    }

    fn row(&self, r: usize) -> &[u16] {
        let start = r * self.width;
        &self.samples[start..start + self.width]
    }
}
