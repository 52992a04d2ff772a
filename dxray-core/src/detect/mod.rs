//! Object detection seam.
//!
//! Inference lives outside this crate; the pipeline only needs bounding
//! boxes to attach to progress snapshots. Detection is best-effort: a
//! failing detector never stops the pipeline.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// Axis-aligned box in pixel coordinates of the analysed image.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    /// 0.0..=1.0
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// An external detector.
///
/// `image` holds the encoded bytes that are about to be sent and `size`
/// is `(width, height)` in pixels.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, image: &[u8], size: (u32, u32)) -> Result<Vec<Detection>>;
}

/// Run `detector`, logging and discarding any failure.
pub fn detect_best_effort(
    detector: &dyn ObjectDetector,
    name: &str,
    image: &[u8],
    size: (u32, u32),
) -> Vec<Detection> {
    match detector.detect(image, size) {
        Ok(found) => found,
        Err(e) => {
            warn!(name, "detector failed: {e}");
            Vec::new()
        }
    }
}
