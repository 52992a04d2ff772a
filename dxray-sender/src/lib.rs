//! # dxray-sender
//!
//! Producer side of the line-scan stream. Loads a directory of frames,
//! applies the configured calibration and streams each file (or one
//! processed channel of it) to a receiver, in catalog order, over a
//! single TCP connection.

pub mod config;
pub mod service;
