//! Calibration: per-sensor Offset/Gain references and their persistence.
//!
//! | Module       | Purpose                                              |
//! |--------------|------------------------------------------------------|
//! | `profile`    | `CalibrationParams`, `ReferenceImage`, `CalibrationProfile` |
//! | `store`      | `CalibrationStore` with derived per-column lines     |
//! | `repository` | `CalibrationRepository` seam + file-backed store     |

pub mod profile;
pub mod repository;
pub mod store;

pub use profile::{CalibrationParams, CalibrationProfile, ReferenceImage};
pub use repository::{CalibrationRepository, FileCalibrationRepository};
pub use store::{CalibrationReport, CalibrationStore, CorrectionPair, ReferenceCheck};
