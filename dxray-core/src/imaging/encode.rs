//! Lossless TIFF encoding.
//!
//! Every image that leaves the process (wire payloads, calibration
//! references, finished frames) is written through here so 16-bit
//! detector counts survive unchanged.

use std::io::Cursor;

use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::compression::DeflateLevel;
use tiff::encoder::{Compression, TiffEncoder, TiffValue};
use tracing::debug;

use crate::error::{DxrayError, Result};
use crate::imaging::types::{DecodedImage, PixelData, PixelFormat};

/// TIFF compression methods. All of them are lossless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TiffCompression {
    /// No compression (fastest, largest).
    None,
    /// LZW compression.
    #[default]
    Lzw,
    /// Deflate at the balanced level.
    Deflate,
}

impl TiffCompression {
    fn to_tiff(self) -> Compression {
        match self {
            TiffCompression::None => Compression::Uncompressed,
            TiffCompression::Lzw => Compression::Lzw,
            TiffCompression::Deflate => Compression::Deflate(DeflateLevel::Balanced),
        }
    }
}

/// Encode raw samples of colour type `C` into an in-memory TIFF.
pub fn encode_tiff<C>(
    width: u32,
    height: u32,
    data: &[C::Inner],
    compression: TiffCompression,
) -> Result<Vec<u8>>
where
    C: ColorType,
    [C::Inner]: TiffValue,
{
    let expected = width as usize * height as usize * C::BITS_PER_SAMPLE.len();
    if data.len() != expected {
        return Err(DxrayError::BufferSize {
            width: width as usize,
            height: height as usize,
            actual: data.len(),
        });
    }

    let mut buffer = Vec::new();
    let mut encoder = TiffEncoder::new(Cursor::new(&mut buffer))
        .map_err(|e| DxrayError::Encoding(e.to_string()))?
        .with_compression(compression.to_tiff());
    encoder
        .write_image::<C>(width, height, data)
        .map_err(|e| DxrayError::Encoding(e.to_string()))?;

    debug!(width, height, bytes = buffer.len(), "encoded TIFF");
    Ok(buffer)
}

/// Encode a [`DecodedImage`] in its native pixel format.
pub fn encode_image(image: &DecodedImage, compression: TiffCompression) -> Result<Vec<u8>> {
    let (w, h) = (image.width, image.height);
    match (image.format, &image.data) {
        (PixelFormat::Gray8, PixelData::U8(d)) => encode_tiff::<colortype::Gray8>(w, h, d, compression),
        (PixelFormat::Gray16, PixelData::U16(d)) => {
            encode_tiff::<colortype::Gray16>(w, h, d, compression)
        }
        (PixelFormat::Rgb8, PixelData::U8(d)) => encode_tiff::<colortype::RGB8>(w, h, d, compression),
        (PixelFormat::Rgba8, PixelData::U8(d)) => {
            encode_tiff::<colortype::RGBA8>(w, h, d, compression)
        }
        (PixelFormat::Rgb16, PixelData::U16(d)) => {
            encode_tiff::<colortype::RGB16>(w, h, d, compression)
        }
        (PixelFormat::Rgba16, PixelData::U16(d)) => {
            encode_tiff::<colortype::RGBA16>(w, h, d, compression)
        }
        (format, _) => Err(DxrayError::UnsupportedFormat(format!(
            "{format} does not match sample storage"
        ))),
    }
}
