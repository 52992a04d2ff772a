//! Output of the line calculator.

use image::{GrayImage, ImageBuffer, Luma, RgbaImage};

use crate::imaging::{DecodedImage, PixelData, PixelFormat};

/// Single-channel 16-bit image.
pub type Gray16Image = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Selects one channel of a processed line or frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputChannel {
    High,
    Low,
    #[default]
    Color,
    ZEffective,
}

impl OutputChannel {
    pub const ALL: [OutputChannel; 4] = [
        OutputChannel::High,
        OutputChannel::Low,
        OutputChannel::Color,
        OutputChannel::ZEffective,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OutputChannel::High => "high",
            OutputChannel::Low => "low",
            OutputChannel::Color => "color",
            OutputChannel::ZEffective => "zeff",
        }
    }

    pub fn format(self) -> PixelFormat {
        match self {
            OutputChannel::High | OutputChannel::Low => PixelFormat::Gray16,
            OutputChannel::Color => PixelFormat::Rgba8,
            OutputChannel::ZEffective => PixelFormat::Gray8,
        }
    }
}

impl std::str::FromStr for OutputChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutputChannel::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown channel {s:?}"))
    }
}

/// One processed scan line, one image per channel.
///
/// All four channels share the raw line's column count; `high` and `low`
/// have half its row count.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedLine {
    /// Corrected high-energy intensity, full 16-bit range.
    pub high: Gray16Image,
    /// Corrected low-energy intensity, full 16-bit range.
    pub low: Gray16Image,
    /// Pseudo-colour composite; alpha 0 marks inactive/dead columns.
    pub color: RgbaImage,
    /// Material index in `[0, 255]`; 0 for inactive/dead columns.
    pub z_effective: GrayImage,
}

impl ProcessedLine {
    pub fn width(&self) -> u32 {
        self.high.width()
    }

    pub fn rows(&self) -> u32 {
        self.high.height()
    }

    /// Copy one channel out as a [`DecodedImage`].
    pub fn channel_image(&self, channel: OutputChannel) -> DecodedImage {
        let data = match channel {
            OutputChannel::High => PixelData::U16(self.high.as_raw().clone()),
            OutputChannel::Low => PixelData::U16(self.low.as_raw().clone()),
            OutputChannel::Color => PixelData::U8(self.color.as_raw().clone()),
            OutputChannel::ZEffective => PixelData::U8(self.z_effective.as_raw().clone()),
        };
        DecodedImage {
            width: self.width(),
            height: self.rows(),
            format: channel.format(),
            data,
        }
    }

    /// Number of columns that carry an object in any row.
    pub fn active_columns(&self) -> usize {
        (0..self.color.width())
            .filter(|&x| (0..self.color.height()).any(|y| self.color.get_pixel(x, y)[3] != 0))
            .count()
    }
}
