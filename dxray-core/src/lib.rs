//! # dxray-core
//!
//! Calibration, line processing and frame streaming for a dual-energy
//! X-ray line-scan detector.
//!
//! This crate contains:
//! - **Calibration**: `CalibrationStore` with Offset/Gain references, validation and a
//!   file-backed `CalibrationRepository`
//! - **Line**: `LineCalculator` turning a `RawLine` into high/low/colour/Z-effective rows
//! - **Frame**: `FrameAssembler` stacking processed lines into line-scan frames
//! - **Source**: numeric-ordered directory catalog, lazy decode, and a live line feed
//! - **Imaging**: pixel buffers and lossless TIFF encoding
//! - **Transport**: `FrameCodec` wire format, `TransportChannel`, `FrameReceiver`
//! - **Detect**: the `ObjectDetector` seam
//! - **Pipeline**: `PipelineController` drive loop with pause/stop and progress
//! - **Error**: `DxrayError`, a `thiserror`-based error hierarchy

pub mod calibration;
pub mod detect;
pub mod error;
pub mod frame;
pub mod imaging;
pub mod line;
pub mod pipeline;
pub mod source;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use calibration::{
    CalibrationParams, CalibrationProfile, CalibrationReport, CalibrationRepository,
    CalibrationStore, CorrectionPair, FileCalibrationRepository, ReferenceImage,
};
pub use detect::{BoundingBox, Detection, ObjectDetector};
pub use error::{DxrayError, ErrorKind, Result};
pub use frame::{AssemblerConfig, Frame, FrameAssembler, FrameView};
pub use imaging::{DecodedImage, PixelData, PixelFormat, TiffCompression};
pub use line::{LineCalculator, MaterialPalette, OutputChannel, ProcessedLine, RawLine};
pub use pipeline::{
    LineProcessor, PayloadMode, PipelineConfig, PipelineController, PipelineState, Progress,
    RunOutcome, SharedCalibration, shared_calibration,
};
pub use source::{DirectorySource, FileRecord, LiveFeed, TransmitStatus, load_decoded, scan_directory};
pub use transport::{Endpoint, FrameCodec, FrameReceiver, FrameSink, TransportChannel, WireFrame};
