//! Material palette: high/low attenuation ratio to colour and Z-effective.
//!
//! The ratio `ln(t_low) / ln(t_high)` (attenuation at low energy over
//! attenuation at high energy) grows with atomic number. It is mapped
//! linearly onto a material index in `[0, 1]`, which then drives both the
//! hue (orange for organics, green for light inorganics, blue for metals)
//! and the Z-effective byte.

/// Colour written for columns without an object.
pub const BACKGROUND: [u8; 4] = [255, 255, 255, 0];

/// Colour written for dead and masked columns.
pub const MASKED: [u8; 4] = [0, 0, 0, 0];

/// Smallest transmission used in the logarithm.
const MIN_TRANSMISSION: f64 = 1.0 / 65535.0;

/// Largest transmission used in the logarithm; keeps `ln` away from 0.
const MAX_TRANSMISSION: f64 = 1.0 - 1.0 / 65535.0;

/// Hue for material index 0 (organic), degrees.
const HUE_ORGANIC: f64 = 30.0;

/// Hue for material index 1 (metal), degrees.
const HUE_METAL: f64 = 220.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialPalette {
    /// Ratio mapped to material index 0.
    pub ratio_min: f64,
    /// Ratio mapped to material index 1.
    pub ratio_max: f64,
    /// Colour saturation for active columns.
    pub saturation: f64,
}

impl Default for MaterialPalette {
    fn default() -> Self {
        Self {
            ratio_min: 1.0,
            ratio_max: 2.5,
            saturation: 0.85,
        }
    }
}

impl MaterialPalette {
    /// Low/high attenuation ratio from normalised transmissions.
    pub fn attenuation_ratio(&self, t_high: f64, t_low: f64) -> f64 {
        let h = t_high.clamp(MIN_TRANSMISSION, MAX_TRANSMISSION).ln();
        let l = t_low.clamp(MIN_TRANSMISSION, MAX_TRANSMISSION).ln();
        l / h
    }

    /// Material index in `[0, 1]`, monotonic in the attenuation ratio.
    pub fn material_index(&self, t_high: f64, t_low: f64) -> f64 {
        let ratio = self.attenuation_ratio(t_high, t_low);
        ((ratio - self.ratio_min) / (self.ratio_max - self.ratio_min)).clamp(0.0, 1.0)
    }

    /// Z-effective byte for an active column. Never 0, which is reserved
    /// for inactive columns.
    pub fn z_effective(&self, index: f64) -> u8 {
        1 + (index.clamp(0.0, 1.0) * 254.0).round() as u8
    }

    /// RGBA for an active column. Hue follows the material index;
    /// brightness follows high-energy transmission (denser is darker).
    pub fn color(&self, index: f64, t_high: f64) -> [u8; 4] {
        let hue = HUE_ORGANIC + index.clamp(0.0, 1.0) * (HUE_METAL - HUE_ORGANIC);
        let value = 0.3 + 0.7 * t_high.clamp(0.0, 1.0);
        let [r, g, b] = hsv_to_rgb(hue, self.saturation, value);
        [r, g, b, 255]
    }
}

fn hsv_to_rgb(hue: f64, s: f64, v: f64) -> [u8; 3] {
    let c = v * s;
    let h = (hue % 360.0) / 60.0;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    let to_u8 = |f: f64| ((f + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    [to_u8(r), to_u8(g), to_u8(b)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_is_monotonic_in_ratio() {
        let p = MaterialPalette::default();
        let t_high = 0.6;
        let mut last = -1.0;
        // Lower low-energy transmission at fixed high means a higher ratio.
        for t_low in [0.59, 0.5, 0.4, 0.3, 0.2, 0.1, 0.05] {
            let idx = p.material_index(t_high, t_low);
            assert!(idx >= last, "index fell at t_low={t_low}");
            last = idx;
        }
        assert_eq!(p.material_index(0.5, 0.5), 0.0);
    }

    #[test]
    fn z_effective_reserves_zero() {
        let p = MaterialPalette::default();
        assert_eq!(p.z_effective(0.0), 1);
        assert_eq!(p.z_effective(1.0), 255);
        assert_eq!(p.z_effective(7.0), 255);
    }

    #[test]
    fn active_colour_is_opaque() {
        let p = MaterialPalette::default();
        assert_eq!(p.color(0.5, 0.5)[3], 255);
    }

    #[test]
    fn hue_endpoints() {
        // Pure red at hue 0, pure blue at 240.
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), [255, 0, 0]);
        assert_eq!(hsv_to_rgb(240.0, 1.0, 1.0), [0, 0, 255]);
    }

    #[test]
    fn organics_warm_metals_cool() {
        let p = MaterialPalette::default();
        let [r, _, b, _] = p.color(0.0, 0.8);
        assert!(r > b);
        let [r, _, b, _] = p.color(1.0, 0.8);
        assert!(b > r);
    }
}
