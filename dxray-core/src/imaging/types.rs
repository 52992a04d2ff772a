//! Shared pixel types used between the source, calculator and transport.
//!
//! These are internal representations. What goes on the wire is always a
//! losslessly encoded container (see [`super::encode`]).

use image::DynamicImage;

use crate::error::{DxrayError, Result};

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 1 sample per pixel, 8 bits.
    Gray8,
    /// 1 sample per pixel, 16 bits (raw detector counts).
    Gray16,
    /// Red, Green, Blue, 8 bits each.
    Rgb8,
    /// Red, Green, Blue, Alpha, 8 bits each.
    Rgba8,
    /// Red, Green, Blue, 16 bits each.
    Rgb16,
    /// Red, Green, Blue, Alpha, 16 bits each.
    Rgba16,
}

impl PixelFormat {
    /// Samples (channels) per pixel.
    pub const fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 | PixelFormat::Gray16 => 1,
            PixelFormat::Rgb8 | PixelFormat::Rgb16 => 3,
            PixelFormat::Rgba8 | PixelFormat::Rgba16 => 4,
        }
    }

    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Gray8 | PixelFormat::Rgb8 | PixelFormat::Rgba8 => self.channels(),
            PixelFormat::Gray16 | PixelFormat::Rgb16 | PixelFormat::Rgba16 => self.channels() * 2,
        }
    }

    /// Whether samples are stored as `u16`.
    pub const fn is_16bit(self) -> bool {
        matches!(
            self,
            PixelFormat::Gray16 | PixelFormat::Rgb16 | PixelFormat::Rgba16
        )
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PixelFormat::Gray8 => "Gray8",
            PixelFormat::Gray16 => "Gray16",
            PixelFormat::Rgb8 => "Rgb8",
            PixelFormat::Rgba8 => "Rgba8",
            PixelFormat::Rgb16 => "Rgb16",
            PixelFormat::Rgba16 => "Rgba16",
        };
        f.write_str(name)
    }
}

// ── PixelData ────────────────────────────────────────────────────

/// Interleaved sample storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelData {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl PixelData {
    /// Number of samples (not bytes).
    pub fn len(&self) -> usize {
        match self {
            PixelData::U8(v) => v.len(),
            PixelData::U16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── DecodedImage ─────────────────────────────────────────────────

/// A fully decoded image: `height` rows of `width * channels` samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: PixelData,
}

impl DecodedImage {
    /// Build an image, checking that the sample buffer matches the
    /// declared dimensions and sample width.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: PixelData) -> Result<Self> {
        let expected = width as usize * height as usize * format.channels();
        let width_ok = matches!(
            (&data, format.is_16bit()),
            (PixelData::U16(_), true) | (PixelData::U8(_), false)
        );
        if !width_ok {
            return Err(DxrayError::UnsupportedFormat(format!(
                "{format} does not match sample storage"
            )));
        }
        if data.len() != expected {
            return Err(DxrayError::BufferSize {
                width: width as usize,
                height: height as usize,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Single-channel 16-bit image.
    pub fn gray16(width: u32, height: u32, samples: Vec<u16>) -> Result<Self> {
        Self::new(width, height, PixelFormat::Gray16, PixelData::U16(samples))
    }

    /// Convert from the `image` crate, keeping 16-bit fidelity where the
    /// source has it.
    pub fn from_dynamic(img: DynamicImage) -> Self {
        let (width, height) = (img.width(), img.height());
        let (format, data) = match img {
            DynamicImage::ImageLuma8(b) => (PixelFormat::Gray8, PixelData::U8(b.into_raw())),
            DynamicImage::ImageLuma16(b) => (PixelFormat::Gray16, PixelData::U16(b.into_raw())),
            DynamicImage::ImageRgb8(b) => (PixelFormat::Rgb8, PixelData::U8(b.into_raw())),
            DynamicImage::ImageRgba8(b) => (PixelFormat::Rgba8, PixelData::U8(b.into_raw())),
            DynamicImage::ImageRgb16(b) => (PixelFormat::Rgb16, PixelData::U16(b.into_raw())),
            DynamicImage::ImageRgba16(b) => (PixelFormat::Rgba16, PixelData::U16(b.into_raw())),
            wide @ (DynamicImage::ImageLumaA16(_)
            | DynamicImage::ImageRgb32F(_)
            | DynamicImage::ImageRgba32F(_)) => (
                PixelFormat::Rgba16,
                PixelData::U16(wide.to_rgba16().into_raw()),
            ),
            other => (PixelFormat::Rgba8, PixelData::U8(other.to_rgba8().into_raw())),
        };
        Self {
            width,
            height,
            format,
            data,
        }
    }

    /// Sample count per row.
    pub fn row_len(&self) -> usize {
        self.width as usize * self.format.channels()
    }

    /// Encoded size of the raw pixel buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Return the pixels as 16-bit gray samples.
    ///
    /// 8-bit gray is widened by `* 257` so full scale maps to full scale.
    /// Colour images are rejected: a detector capture is always single channel.
    pub fn to_gray16(&self) -> Result<Vec<u16>> {
        match (&self.format, &self.data) {
            (PixelFormat::Gray16, PixelData::U16(v)) => Ok(v.clone()),
            (PixelFormat::Gray8, PixelData::U8(v)) => {
                Ok(v.iter().map(|&s| u16::from(s) * 257).collect())
            }
            (format, _) => Err(DxrayError::UnsupportedFormat(format!(
                "expected single-channel capture, got {format}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgb};

    #[test]
    fn bytes_per_pixel() {
        assert_eq!(PixelFormat::Gray16.bytes_per_pixel(), 2);
        assert_eq!(PixelFormat::Rgba8.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::Rgb16.bytes_per_pixel(), 6);
    }

    #[test]
    fn new_rejects_wrong_length() {
        let err = DecodedImage::gray16(4, 2, vec![0; 7]).unwrap_err();
        assert!(matches!(err, DxrayError::BufferSize { actual: 7, .. }));
    }

    #[test]
    fn new_rejects_mismatched_storage() {
        let err =
            DecodedImage::new(1, 1, PixelFormat::Gray16, PixelData::U8(vec![0])).unwrap_err();
        assert!(matches!(err, DxrayError::UnsupportedFormat(_)));
    }

    #[test]
    fn from_dynamic_keeps_16_bit() {
        let buf: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_raw(2, 1, vec![1000, 60000]).unwrap();
        let img = DecodedImage::from_dynamic(DynamicImage::ImageLuma16(buf));
        assert_eq!(img.format, PixelFormat::Gray16);
        assert_eq!(img.data, PixelData::U16(vec![1000, 60000]));
        assert_eq!(img.byte_len(), 4);
    }

    #[test]
    fn gray8_widens_to_full_scale() {
        let img = DecodedImage::new(2, 1, PixelFormat::Gray8, PixelData::U8(vec![0, 255])).unwrap();
        assert_eq!(img.to_gray16().unwrap(), vec![0, 65535]);
    }

    #[test]
    fn colour_is_not_a_capture() {
        let buf: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_raw(1, 1, vec![1, 2, 3]).unwrap();
        let img = DecodedImage::from_dynamic(DynamicImage::ImageRgb8(buf));
        assert!(img.to_gray16().is_err());
    }
}
