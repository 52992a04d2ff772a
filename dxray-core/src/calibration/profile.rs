//! Calibration parameters and reference images.

use serde::{Deserialize, Serialize};

use crate::error::{DxrayError, Result};
use crate::imaging::DecodedImage;

// ── CalibrationParams ────────────────────────────────────────────

/// Scalar calibration settings. Persisted as JSON next to the reference
/// images; missing fields pick up the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    /// Scale factor between sensor width and maximum image width.
    pub relative_width_ratio: f64,
    /// Expected signal level with radiation off.
    pub offset_region: u16,
    /// Expected signal level with radiation on and nothing in the beam.
    pub gain_region: u16,
    /// Width of the low-signal band above `offset_region` that marks a
    /// gap between adjacent detector modules.
    pub boundary_artifact: u16,
    /// Transmitted fraction of the gain range below which a column counts
    /// as "object present". Compared as `t_low < ratio`: a column is active
    /// when its low-band transmission falls under this value.
    pub activation_threshold_ratio: f64,
    /// Maximum displayed image width.
    pub max_image_width: u32,
    /// Number of detector elements (authoritative column count).
    pub sensor_image_width: u32,
    /// Minimum `gain - offset` span, in counts, for a usable column.
    pub dead_column_epsilon: f64,
    /// Allowed relative deviation of a reference mean from its expected
    /// region before validation flags it.
    pub validation_tolerance: f64,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            relative_width_ratio: 1.25,
            offset_region: 2600,
            gain_region: 15000,
            boundary_artifact: 5000,
            activation_threshold_ratio: 0.9,
            max_image_width: 1600,
            sensor_image_width: 1280, // 1600 / 1.25
            dead_column_epsilon: 1.0,
            validation_tolerance: 0.5,
        }
    }
}

impl CalibrationParams {
    /// Inclusive raw-count band treated as an inter-module gap.
    pub fn boundary_band(&self) -> (f64, f64) {
        let lo = f64::from(self.offset_region);
        (lo, lo + f64::from(self.boundary_artifact))
    }
}

// ── ReferenceImage ───────────────────────────────────────────────

/// A 2-D Offset or Gain reference capture, 16-bit, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    width: usize,
    height: usize,
    samples: Vec<u16>,
}

impl ReferenceImage {
    pub fn new(width: usize, height: usize, samples: Vec<u16>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(DxrayError::InvalidInput(format!(
                "empty reference image {width}x{height}"
            )));
        }
        if samples.len() != width * height {
            return Err(DxrayError::BufferSize {
                width,
                height,
                actual: samples.len(),
            });
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    /// A reference whose every sample is `level`.
    pub fn uniform(width: usize, height: usize, level: u16) -> Result<Self> {
        Self::new(width, height, vec![level; width * height])
    }

    /// Build from a decoded single-channel capture.
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

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    /// Reduce to one value per column (mean over rows).
    pub fn column_means(&self) -> Vec<f64> {
        let mut sums = vec![0u64; self.width];
        for row in self.samples.chunks_exact(self.width) {
            for (sum, &s) in sums.iter_mut().zip(row) {
                *sum += u64::from(s);
            }
        }
        let rows = self.height as f64;
        sums.into_iter().map(|s| s as f64 / rows).collect()
    }

    /// Mean over the whole image.
    pub fn mean(&self) -> f64 {
        let total: u64 = self.samples.iter().map(|&s| u64::from(s)).sum();
        total as f64 / self.samples.len() as f64
    }
}

// ── CalibrationProfile ───────────────────────────────────────────

/// Everything that defines one user's calibration: scalar parameters plus
/// the optional Offset and Gain references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationProfile {
    pub params: CalibrationParams,
    pub offset: Option<ReferenceImage>,
    pub gain: Option<ReferenceImage>,
}
