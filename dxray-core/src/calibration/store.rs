//! Calibration store: reference images plus derived per-column lines.
//!
//! The store keeps the raw Offset/Gain captures untouched and reduces
//! each one to a per-column correction line when it is set. Processing
//! only ever reads those lines through [`CalibrationStore::correction_factor`].

use tracing::{debug, warn};

use crate::calibration::profile::{CalibrationParams, CalibrationProfile, ReferenceImage};
use crate::error::{DxrayError, Result};

// ── CorrectionPair ───────────────────────────────────────────────

/// Per-column `(offset, gain)` levels in raw counts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionPair {
    pub offset: f64,
    pub gain: f64,
}

impl CorrectionPair {
    /// Usable signal span of the column.
    pub fn range(&self) -> f64 {
        self.gain - self.offset
    }
}

// ── Validation report ────────────────────────────────────────────

/// Result of comparing a reference's mean level with its expected region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceCheck {
    pub mean: f64,
    pub expected: f64,
    pub within_tolerance: bool,
}

/// Informational summary of the loaded calibration. Never fatal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationReport {
    pub offset: Option<ReferenceCheck>,
    pub gain: Option<ReferenceCheck>,
    /// Columns whose gain does not clear offset by at least epsilon.
    pub degenerate_columns: Vec<usize>,
}

impl CalibrationReport {
    pub fn is_clean(&self) -> bool {
        self.degenerate_columns.is_empty()
            && self.offset.is_none_or(|c| c.within_tolerance)
            && self.gain.is_none_or(|c| c.within_tolerance)
    }
}

// ── CalibrationStore ─────────────────────────────────────────────

/// Holds the active [`CalibrationProfile`] for a session.
///
/// Read-only while a drive loop is running; the pipeline controller
/// rejects writes in that state.
#[derive(Debug, Clone, Default)]
pub struct CalibrationStore {
    profile: CalibrationProfile,
    offset_line: Vec<f64>,
    gain_line: Vec<f64>,
}

impl CalibrationStore {
    /// An uncalibrated store using `params`.
    pub fn new(params: CalibrationParams) -> Self {
        Self {
            profile: CalibrationProfile {
                params,
                offset: None,
                gain: None,
            },
            offset_line: Vec::new(),
            gain_line: Vec::new(),
        }
    }

    /// Adopt a loaded profile, deriving correction lines for any
    /// references it carries.
    pub fn from_profile(profile: CalibrationProfile) -> Result<Self> {
        let mut store = Self::new(profile.params);
        if let Some(offset) = profile.offset {
            store.set_offset(offset)?;
        }
        if let Some(gain) = profile.gain {
            store.set_gain(gain)?;
        }
        Ok(store)
    }

    pub fn params(&self) -> &CalibrationParams {
        &self.profile.params
    }

    pub fn set_params(&mut self, params: CalibrationParams) {
        self.profile.params = params;
    }

    pub fn profile(&self) -> &CalibrationProfile {
        &self.profile
    }

    pub fn into_profile(self) -> CalibrationProfile {
        self.profile
    }

    /// Store the radiation-off reference.
    pub fn set_offset(&mut self, image: ReferenceImage) -> Result<()> {
        if let Some(gain) = &self.profile.gain {
            check_columns(gain.width(), image.width())?;
        }
        self.warn_sensor_width("offset", image.width());
        self.offset_line = image.column_means();
        self.profile.offset = Some(image);
        debug!(columns = self.offset_line.len(), "offset reference set");
        Ok(())
    }

    /// Store the radiation-on, empty-beam reference.
    pub fn set_gain(&mut self, image: ReferenceImage) -> Result<()> {
        if let Some(offset) = &self.profile.offset {
            check_columns(offset.width(), image.width())?;
        }
        self.warn_sensor_width("gain", image.width());
        self.gain_line = image.column_means();
        self.profile.gain = Some(image);
        debug!(columns = self.gain_line.len(), "gain reference set");
        Ok(())
    }

    /// Drop both references.
    pub fn clear(&mut self) {
        self.profile.offset = None;
        self.profile.gain = None;
        self.offset_line.clear();
        self.gain_line.clear();
    }

    /// Whether both references are present.
    pub fn is_calibrated(&self) -> bool {
        self.profile.offset.is_some() && self.profile.gain.is_some()
    }

    /// Column count of the references, if any is set.
    pub fn columns(&self) -> Option<usize> {
        self.profile
            .offset
            .as_ref()
            .or(self.profile.gain.as_ref())
            .map(ReferenceImage::width)
    }

    /// Calibration pair for `column`.
    ///
    /// Falls back to the neutral pair `(0, gain_region)` when either
    /// reference is missing so processing degrades instead of failing.
    pub fn correction_factor(&self, column: usize) -> CorrectionPair {
        match (self.offset_line.get(column), self.gain_line.get(column)) {
            (Some(&offset), Some(&gain)) if self.is_calibrated() => CorrectionPair { offset, gain },
            _ => self.neutral(),
        }
    }

    /// The pair used when calibration is missing.
    pub fn neutral(&self) -> CorrectionPair {
        CorrectionPair {
            offset: 0.0,
            gain: f64::from(self.profile.params.gain_region),
        }
    }

    /// Whether `column` has too little span to normalise safely.
    pub fn is_dead(&self, column: usize) -> bool {
        self.correction_factor(column).range() < self.profile.params.dead_column_epsilon
    }

    /// Whether `column` sits on an inter-module gap: its gain reference
    /// only reaches the low-signal boundary band.
    pub fn is_boundary(&self, column: usize) -> bool {
        if !self.is_calibrated() {
            return false;
        }
        let (lo, hi) = self.profile.params.boundary_band();
        self.gain_line
            .get(column)
            .is_some_and(|&g| (lo..=hi).contains(&g))
    }

    /// Compare the offset reference against `offset_region`.
    pub fn validate_offset(&self) -> Result<ReferenceCheck> {
        let offset = self
            .profile
            .offset
            .as_ref()
            .ok_or(DxrayError::CalibrationMissing("offset"))?;
        Ok(self.check(offset, self.profile.params.offset_region))
    }

    /// Compare the gain reference against `gain_region`.
    pub fn validate_gain(&self) -> Result<ReferenceCheck> {
        let gain = self
            .profile
            .gain
            .as_ref()
            .ok_or(DxrayError::CalibrationMissing("gain"))?;
        Ok(self.check(gain, self.profile.params.gain_region))
    }

    /// Columns where gain fails to exceed offset by epsilon.
    pub fn degenerate_columns(&self) -> Vec<usize> {
        if !self.is_calibrated() {
            return Vec::new();
        }
        let eps = self.profile.params.dead_column_epsilon;
        self.offset_line
            .iter()
            .zip(&self.gain_line)
            .enumerate()
            .filter(|(_, (o, g))| *g - *o < eps)
            .map(|(c, _)| c)
            .collect()
    }

    /// Full validation summary, logging anything suspicious.
    pub fn report(&self) -> CalibrationReport {
        let report = CalibrationReport {
            offset: self.validate_offset().ok(),
            gain: self.validate_gain().ok(),
            degenerate_columns: self.degenerate_columns(),
        };
        if !report.degenerate_columns.is_empty() {
            warn!(
                count = report.degenerate_columns.len(),
                first = report.degenerate_columns[0],
                "degenerate calibration columns"
            );
        }
        if let Some(check) = report.offset.filter(|c| !c.within_tolerance) {
            warn!(mean = check.mean, expected = check.expected, "offset reference out of region");
        }
        if let Some(check) = report.gain.filter(|c| !c.within_tolerance) {
            warn!(mean = check.mean, expected = check.expected, "gain reference out of region");
        }
        report
    }

    fn check(&self, image: &ReferenceImage, region: u16) -> ReferenceCheck {
        let mean = image.mean();
        let expected = f64::from(region);
        let tolerance = expected * self.profile.params.validation_tolerance;
        ReferenceCheck {
            mean,
            expected,
            within_tolerance: (mean - expected).abs() <= tolerance,
        }
    }

    fn warn_sensor_width(&self, which: &str, width: usize) {
        let sensor = self.profile.params.sensor_image_width as usize;
        if width != sensor {
            debug!(which, width, sensor, "reference width differs from sensor width");
        }
    }
}

fn check_columns(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(DxrayError::WidthMismatch { expected, actual });
    }
    Ok(())
}
