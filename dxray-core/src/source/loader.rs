//! On-demand decoding of catalog records.

use std::path::Path;

use tracing::debug;

use crate::error::{DxrayError, Result};
use crate::imaging::DecodedImage;
use crate::source::catalog::FileRecord;

/// Decode the image behind `record`.
///
/// Missing or corrupt files fail with an `IoFailure`-kind error naming
/// the path; the caller decides whether to skip the record.
pub fn load_decoded(record: &FileRecord) -> Result<DecodedImage> {
    load_path(&record.path)
}

/// Decode an image file, keeping 16-bit samples where present.
pub fn load_path(path: &Path) -> Result<DecodedImage> {
    let img = image::open(path).map_err(|e| match e {
        image::ImageError::IoError(io) => DxrayError::file(path, io),
        other => DxrayError::Decode {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    })?;
    let decoded = DecodedImage::from_dynamic(img);
    debug!(
        path = %path.display(),
        width = decoded.width,
        height = decoded.height,
        format = %decoded.format,
        "decoded"
    );
    Ok(decoded)
}
