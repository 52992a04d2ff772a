//! Frame assembly: processed lines stacked into 2-D channel images.

pub mod assembler;

pub use assembler::{AssemblerConfig, Frame, FrameAssembler, FrameView};
