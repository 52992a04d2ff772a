//! Line calculator: raw dual-band capture to calibrated channels.
//!
//! Per logical row and column:
//!
//! 1. Split the high and low bands (see [`RawLine`]).
//! 2. Normalise each band against the column's `(offset, gain)` pair:
//!    `t = clamp((s - offset) / (gain - offset), 0, 1)`, stored as
//!    `round(t * 65535)`.
//! 3. Dead columns (`gain - offset < epsilon`) and inter-module gap
//!    columns are masked to the offset baseline: 0 in every channel.
//!    A gap column is one whose gain reference column mean lies in
//!    `[offset_region, offset_region + boundary_artifact]`; the live raw
//!    signal is not consulted, so dense objects are never blanked. No
//!    gap masking happens until both references are set.
//! 4. A column is active when its low-band transmission falls below
//!    `activation_threshold_ratio`; inactive columns get the background
//!    colour and Z-effective 0.
//! 5. Active columns are coloured and assigned a Z-effective from the
//!    high/low attenuation ratio (see [`MaterialPalette`]).
//!
//! The calculation is pure: identical inputs give bit-identical outputs.

use image::{GrayImage, RgbaImage};
use tracing::trace;

use crate::calibration::CalibrationStore;
use crate::error::{DxrayError, Result};
use crate::line::palette::{BACKGROUND, MASKED, MaterialPalette};
use crate::line::processed::{Gray16Image, ProcessedLine};
use crate::line::raw::RawLine;

/// Per-column treatment decided once per line.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Column {
    Masked,
    Live { offset: f64, range: f64 },
}

/// Stateless converter from [`RawLine`] to [`ProcessedLine`].
#[derive(Debug, Clone, Default)]
pub struct LineCalculator {
    palette: MaterialPalette,
}

impl LineCalculator {
    pub fn new(palette: MaterialPalette) -> Self {
        Self { palette }
    }

    pub fn palette(&self) -> &MaterialPalette {
        &self.palette
    }

    /// Process one raw line.
    ///
    /// Fails with an `InvalidInput`-kind error on an odd row count or when
    /// the width disagrees with a complete calibration; the caller skips
    /// the line and carries on.
    pub fn process(&self, raw: &RawLine, store: &CalibrationStore) -> Result<ProcessedLine> {
        let rows = raw.band_rows()?;
        let width = raw.width();
        if store.is_calibrated() {
            if let Some(columns) = store.columns().filter(|&c| c != width) {
                return Err(DxrayError::WidthMismatch {
                    expected: columns,
                    actual: width,
                });
            }
        }

        let columns = self.plan_columns(width, store);
        let threshold = store.params().activation_threshold_ratio;

        let (w, h) = (width as u32, rows as u32);
        let mut high = Gray16Image::new(w, h);
        let mut low = Gray16Image::new(w, h);
        let mut color = RgbaImage::new(w, h);
        let mut z_effective = GrayImage::new(w, h);

        for k in 0..rows {
            let y = k as u32;
            let high_row = raw.high_row(k);
            let low_row = raw.low_row(k);

            for (c, column) in columns.iter().enumerate() {
                let x = c as u32;
                let Column::Live { offset, range } = *column else {
                    color.put_pixel(x, y, MASKED.into());
                    continue;
                };

                let t_high = normalise(high_row[c], offset, range);
                let t_low = normalise(low_row[c], offset, range);
                high.put_pixel(x, y, [to_counts(t_high)].into());
                low.put_pixel(x, y, [to_counts(t_low)].into());

                if t_low < threshold {
                    let index = self.palette.material_index(t_high, t_low);
                    color.put_pixel(x, y, self.palette.color(index, t_high).into());
                    z_effective.put_pixel(x, y, [self.palette.z_effective(index)].into());
                } else {
                    color.put_pixel(x, y, BACKGROUND.into());
                }
            }
        }

        trace!(width, rows, "line processed");
        Ok(ProcessedLine {
            high,
            low,
            color,
            z_effective,
        })
    }

    fn plan_columns(&self, width: usize, store: &CalibrationStore) -> Vec<Column> {
        let eps = store.params().dead_column_epsilon;
        (0..width)
            .map(|c| {
                let pair = store.correction_factor(c);
                let range = pair.range();
                if range < eps || store.is_boundary(c) {
                    Column::Masked
                } else {
                    Column::Live {
                        offset: pair.offset,
                        range,
                    }
                }
            })
            .collect()
    }
}

fn normalise(sample: u16, offset: f64, range: f64) -> f64 {
    ((f64::from(sample) - offset) / range).clamp(0.0, 1.0)
}

fn to_counts(t: f64) -> u16 {
    (t * f64::from(u16::MAX)).round() as u16
}
