//! Calibration persistence.
//!
//! The pipeline only depends on [`CalibrationRepository`]. The file-backed
//! implementation keeps one directory per user:
//!
//! ```text
//! <root>/<user_id>/profile.json   CalibrationParams (serde_json)
//! <root>/<user_id>/offset.tiff    16-bit Offset reference (optional)
//! <root>/<user_id>/gain.tiff      16-bit Gain reference (optional)
//! ```

use std::path::{Path, PathBuf};

use tiff::encoder::colortype;
use tracing::{debug, info};

use crate::calibration::profile::{CalibrationParams, CalibrationProfile, ReferenceImage};
use crate::error::{DxrayError, Result};
use crate::imaging::{DecodedImage, TiffCompression, encode_tiff};

const PROFILE_FILE: &str = "profile.json";
const OFFSET_FILE: &str = "offset.tiff";
const GAIN_FILE: &str = "gain.tiff";

/// Load/save seam for per-user calibration.
pub trait CalibrationRepository: Send + Sync {
    /// Load the profile for `user_id`. A user with nothing saved gets
    /// the default profile.
    fn load(&self, user_id: &str) -> Result<CalibrationProfile>;

    /// Persist `profile` for `user_id`.
    fn save(&self, user_id: &str, profile: &CalibrationProfile) -> Result<()>;
}

/// Stores calibration profiles under a root directory.
#[derive(Debug, Clone)]
pub struct FileCalibrationRepository {
    root: PathBuf,
}

impl FileCalibrationRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_dir(&self, user_id: &str) -> Result<PathBuf> {
        let valid = !user_id.is_empty()
            && user_id != "."
            && user_id != ".."
            && !user_id.contains(['/', '\\']);
        if !valid {
            return Err(DxrayError::InvalidInput(format!(
                "invalid user id {user_id:?}"
            )));
        }
        Ok(self.root.join(user_id))
    }
}

impl CalibrationRepository for FileCalibrationRepository {
    fn load(&self, user_id: &str) -> Result<CalibrationProfile> {
        let dir = self.user_dir(user_id)?;
        if !dir.is_dir() {
            info!(user_id, "no stored calibration; using defaults");
            return Ok(CalibrationProfile::default());
        }

        let profile_path = dir.join(PROFILE_FILE);
        let params = match std::fs::read_to_string(&profile_path) {
            Ok(text) => serde_json::from_str::<CalibrationParams>(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CalibrationParams::default(),
            Err(e) => return Err(DxrayError::file(profile_path, e)),
        };

        let profile = CalibrationProfile {
            params,
            offset: read_reference(&dir.join(OFFSET_FILE))?,
            gain: read_reference(&dir.join(GAIN_FILE))?,
        };
        debug!(
            user_id,
            offset = profile.offset.is_some(),
            gain = profile.gain.is_some(),
            "calibration loaded"
        );
        Ok(profile)
    }

    fn save(&self, user_id: &str, profile: &CalibrationProfile) -> Result<()> {
        let dir = self.user_dir(user_id)?;
        std::fs::create_dir_all(&dir).map_err(|e| DxrayError::file(&dir, e))?;

        let profile_path = dir.join(PROFILE_FILE);
        let text = serde_json::to_string_pretty(&profile.params)?;
        std::fs::write(&profile_path, text).map_err(|e| DxrayError::file(&profile_path, e))?;

        write_reference(&dir.join(OFFSET_FILE), profile.offset.as_ref())?;
        write_reference(&dir.join(GAIN_FILE), profile.gain.as_ref())?;
        info!(user_id, dir = %dir.display(), "calibration saved");
        Ok(())
    }
}

fn read_reference(path: &Path) -> Result<Option<ReferenceImage>> {
    if !path.is_file() {
        return Ok(None);
    }
    let img = image::open(path).map_err(|e| DxrayError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let decoded = DecodedImage::from_dynamic(img);
    ReferenceImage::from_decoded(&decoded).map(Some)
}

fn write_reference(path: &Path, image: Option<&ReferenceImage>) -> Result<()> {
    match image {
        Some(image) => {
            let bytes = encode_tiff::<colortype::Gray16>(
                image.width() as u32,
                image.height() as u32,
                image.samples(),
                TiffCompression::Lzw,
            )?;
            std::fs::write(path, bytes).map_err(|e| DxrayError::file(path, e))
        }
        None => match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DxrayError::file(path, e)),
        },
    }
}
