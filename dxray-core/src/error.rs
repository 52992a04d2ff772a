//! Domain-specific error types for the dxray pipeline.
//!
//! All fallible operations return `Result<T, DxrayError>`.
//! Algorithmic errors are recovered close to where they occur; I/O and
//! connection errors are surfaced to the pipeline controller.

use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of a [`DxrayError`], used for recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed raw line or image (odd row count, wrong width, bad format).
    InvalidInput,
    /// Offset or gain reference missing.
    CalibrationMissing,
    /// File or network read/write failure.
    IoFailure,
    /// A connect attempt was refused or timed out.
    ConnectionRejected,
    /// An operation was not allowed in the current state.
    InvalidState,
    /// Wire data violated the framing rules.
    Protocol,
}

/// The canonical error type for the dxray pipeline.
#[derive(Debug, Error)]
pub enum DxrayError {
    // ── Input Errors ─────────────────────────────────────────────
    /// A raw line had an odd number of rows and cannot be split into bands.
    #[error("raw line has odd row count: {rows}")]
    OddRowCount { rows: usize },

    /// Column count does not match the calibration or the frame in progress.
    #[error("width mismatch: expected {expected} columns, got {actual}")]
    WidthMismatch { expected: usize, actual: usize },

    /// The sample buffer length does not match the declared dimensions.
    #[error("buffer length {actual} does not match {width}x{height}")]
    BufferSize {
        width: usize,
        height: usize,
        actual: usize,
    },

    /// Pixel layout the operation cannot handle.
    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    /// Generic malformed input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // ── Calibration Errors ───────────────────────────────────────
    /// Offset or gain reference has not been set.
    #[error("calibration missing: {0}")]
    CalibrationMissing(&'static str),

    // ── I/O Errors ───────────────────────────────────────────────
    /// A file could not be read, decoded or written.
    #[error("I/O failure on {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An image could not be decoded.
    #[error("failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    /// Lossless encoding of an image failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    // ── Connection Errors ────────────────────────────────────────
    /// Connect attempt failed.
    #[error("connection to {endpoint} rejected: {reason}")]
    ConnectionRejected { endpoint: String, reason: String },

    /// Send was attempted without an established connection.
    #[error("not connected")]
    NotConnected,

    // ── Protocol Errors ──────────────────────────────────────────
    /// A frame violated the wire format.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Frame size exceeded the codec limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// UTF-8 conversion failed.
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    // ── Pipeline Errors ──────────────────────────────────────────
    /// A state transition was rejected.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, DxrayError>;

impl DxrayError {
    /// Wrap an I/O error together with the file it concerns.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DxrayError::File {
            path: path.into(),
            source,
        }
    }

    /// Map onto the recovery classes the pipeline cares about.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OddRowCount { .. }
            | Self::WidthMismatch { .. }
            | Self::BufferSize { .. }
            | Self::UnsupportedFormat(_)
            | Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::CalibrationMissing(_) => ErrorKind::CalibrationMissing,
            Self::File { .. }
            | Self::Decode { .. }
            | Self::Encoding(_)
            | Self::Connection(_)
            | Self::NotConnected => ErrorKind::IoFailure,
            Self::ConnectionRejected { .. } => ErrorKind::ConnectionRejected,
            Self::ProtocolViolation(_) | Self::FrameTooLarge { .. } | Self::InvalidUtf8(_) => {
                ErrorKind::Protocol
            }
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Other(_) => ErrorKind::IoFailure,
        }
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for DxrayError {
    fn from(s: String) -> Self {
        DxrayError::Other(s)
    }
}

impl From<&str> for DxrayError {
    fn from(s: &str) -> Self {
        DxrayError::Other(s.to_string())
    }
}

impl From<tiff::TiffError> for DxrayError {
    fn from(e: tiff::TiffError) -> Self {
        DxrayError::Encoding(e.to_string())
    }
}

impl From<image::ImageError> for DxrayError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::IoError(io) => DxrayError::Connection(io),
            other => DxrayError::Encoding(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DxrayError {
    fn from(e: serde_json::Error) -> Self {
        DxrayError::Encoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = DxrayError::OddRowCount { rows: 3 };
        assert!(e.to_string().contains("odd"));

        let e = DxrayError::FrameTooLarge {
            size: 1000,
            max: 500,
        };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));
    }

    #[test]
    fn file_error_names_path() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e = DxrayError::file("/data/7.png", io);
        assert!(e.to_string().contains("/data/7.png"));
        assert_eq!(e.kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn kinds_follow_recovery_classes() {
        assert_eq!(
            DxrayError::WidthMismatch {
                expected: 4,
                actual: 3
            }
            .kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            DxrayError::CalibrationMissing("offset").kind(),
            ErrorKind::CalibrationMissing
        );
        assert_eq!(
            DxrayError::ConnectionRejected {
                endpoint: "127.0.0.1:1".into(),
                reason: "refused".into()
            }
            .kind(),
            ErrorKind::ConnectionRejected
        );
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: DxrayError = io_err.into();
        assert!(matches!(e, DxrayError::Connection(_)));
    }
}
