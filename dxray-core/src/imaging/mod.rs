//! Pixel buffers shared across the pipeline, plus lossless TIFF encoding.
//!
//! | Module  | Purpose                                              |
//! |---------|------------------------------------------------------|
//! | `types` | `PixelFormat`, `PixelData`, `DecodedImage`           |
//! | `encode`| Lossless TIFF encoding for 8/16-bit gray and colour  |

pub mod encode;
pub mod types;

pub use encode::{TiffCompression, encode_image, encode_tiff};
pub use types::{DecodedImage, PixelData, PixelFormat};
