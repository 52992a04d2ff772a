//! # dxray-receiver
//!
//! Consumer side of the line-scan stream. Accepts one sender connection
//! at a time, decodes the length-prefixed frame format and writes each
//! received image to an output directory under its wire name.

pub mod config;
pub mod server;
