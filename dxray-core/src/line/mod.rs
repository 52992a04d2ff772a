//! Line processing: raw dual-band captures to calibrated channels.
//!
//! ```text
//! RawLine ──► LineCalculator ──► ProcessedLine { high, low, color, z_effective }
//!                  ▲
//!           CalibrationStore
//! ```
//!
//! | Module       | Purpose                                          |
//! |--------------|--------------------------------------------------|
//! | `raw`        | `RawLine` and the row-interleaved band layout    |
//! | `calculator` | Radiometric correction, gating, material mapping |
//! | `palette`    | Attenuation ratio to colour / Z-effective        |
//! | `processed`  | `ProcessedLine` output type                      |

pub mod calculator;
pub mod palette;
pub mod processed;
pub mod raw;

pub use calculator::LineCalculator;
pub use palette::MaterialPalette;
pub use processed::{Gray16Image, OutputChannel, ProcessedLine};
pub use raw::RawLine;
