//! Directory catalog of single-frame image files.
//!
//! Files are ordered by their numeric file stem (`3.png` before `10.png`);
//! names that do not parse as an integer sort after every numeric one,
//! lexically among themselves. Each [`DirectorySource::scan`] re-reads the
//! directory; image payloads are only decoded on demand.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use image::{ImageDecoder, ImageReader};
use tracing::{debug, warn};

use crate::error::{DxrayError, Result};
use crate::imaging::{DecodedImage, PixelFormat};

// ── TransmitStatus ───────────────────────────────────────────────

/// Outcome of the last send attempt for a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TransmitStatus {
    #[default]
    Pending,
    Success,
    Fail,
}

impl std::fmt::Display for TransmitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => Ok(()),
            Self::Success => write!(f, "Success"),
            Self::Fail => write!(f, "Fail"),
        }
    }
}

// ── FileRecord ───────────────────────────────────────────────────

/// One catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    /// Numeric file stem, if it parses.
    pub index: Option<u64>,
    pub path: PathBuf,
    pub file_name: String,
    /// Header dimensions; 0 when the header could not be read.
    pub width: u32,
    pub height: u32,
    pub format: Option<PixelFormat>,
    /// Decoded payload; loaded just before sending and released after.
    pub image: Option<DecodedImage>,
    pub status: TransmitStatus,
}

impl FileRecord {
    /// Build a record without touching the file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let index = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok());
        Self {
            index,
            path,
            file_name,
            width: 0,
            height: 0,
            format: None,
            image: None,
            status: TransmitStatus::Pending,
        }
    }

    /// File stem, used to derive wire names.
    pub fn stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.file_name)
    }

    /// Read dimensions and pixel layout from the image header.
    fn probe(&mut self) -> Result<()> {
        let decoder = ImageReader::open(&self.path)
            .map_err(|e| DxrayError::file(&self.path, e))?
            .with_guessed_format()
            .map_err(|e| DxrayError::file(&self.path, e))?
            .into_decoder()
            .map_err(|e| DxrayError::Decode {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        let (width, height) = decoder.dimensions();
        self.width = width;
        self.height = height;
        self.format = match decoder.color_type() {
            image::ColorType::L8 => Some(PixelFormat::Gray8),
            image::ColorType::L16 => Some(PixelFormat::Gray16),
            image::ColorType::Rgb8 => Some(PixelFormat::Rgb8),
            image::ColorType::Rgba8 => Some(PixelFormat::Rgba8),
            image::ColorType::Rgb16 => Some(PixelFormat::Rgb16),
            image::ColorType::Rgba16 => Some(PixelFormat::Rgba16),
            _ => None,
        };
        Ok(())
    }
}

/// Catalog order: numeric stems ascending, then everything else by name.
pub fn catalog_order(a: &FileRecord, b: &FileRecord) -> Ordering {
    match (a.index, b.index) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.file_name.cmp(&b.file_name)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.file_name.cmp(&b.file_name),
    }
}

// ── DirectorySource ──────────────────────────────────────────────

/// A directory of image files filtered by extension.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
    extension: String,
}

impl DirectorySource {
    /// `extension` is matched case-insensitively, with or without the
    /// leading dot. An empty extension accepts every file.
    pub fn new(dir: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List, probe and order the directory. Unreadable headers are
    /// logged and kept with zero dimensions.
    pub fn scan(&self) -> Result<Vec<FileRecord>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| DxrayError::file(&self.dir, e))?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DxrayError::file(&self.dir, e))?;
            let path = entry.path();
            if !path.is_file() || !self.matches(&path) {
                continue;
            }
            let mut record = FileRecord::new(path);
            if let Err(e) = record.probe() {
                warn!(path = %record.path.display(), "unreadable image header: {e}");
            }
            records.push(record);
        }

        records.sort_by(catalog_order);
        debug!(dir = %self.dir.display(), count = records.len(), "directory scanned");
        Ok(records)
    }

    fn matches(&self, path: &Path) -> bool {
        if self.extension.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
    }
}

/// Scan `dir` for files ending in `extension`.
pub fn scan_directory(dir: impl Into<PathBuf>, extension: &str) -> Result<Vec<FileRecord>> {
    DirectorySource::new(dir, extension).scan()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    fn touch_png(dir: &Path, name: &str, w: u32, h: u32) {
        let img: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_pixel(w, h, Luma([1000]));
        img.save(dir.join(name)).unwrap();
    }

    fn names(records: &[FileRecord]) -> Vec<&str> {
        records.iter().map(|r| r.file_name.as_str()).collect()
    }

    #[test]
    fn numeric_names_sort_numerically_then_others() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["3.png", "1.png", "10.png", "x.png"] {
            touch_png(dir.path(), name, 2, 2);
        }
        let records = scan_directory(dir.path(), "png").unwrap();
        assert_eq!(names(&records), vec!["1.png", "3.png", "10.png", "x.png"]);
        assert_eq!(records[2].index, Some(10));
        assert_eq!(records[3].index, None);
    }

    #[test]
    fn non_numeric_keep_lexical_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "2.png", "a.png", "c.png"] {
            touch_png(dir.path(), name, 1, 1);
        }
        let records = scan_directory(dir.path(), ".PNG").unwrap();
        assert_eq!(names(&records), vec!["2.png", "a.png", "b.png", "c.png"]);
    }

    #[test]
    fn extension_filter_and_probe() {
        let dir = tempfile::tempdir().unwrap();
        touch_png(dir.path(), "1.png", 5, 4);
        std::fs::write(dir.path().join("notes.txt"), "hi").unwrap();

        let records = scan_directory(dir.path(), "png").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!((records[0].width, records[0].height), (5, 4));
        assert_eq!(records[0].format, Some(PixelFormat::Gray16));
        assert!(records[0].image.is_none());
        assert_eq!(records[0].status, TransmitStatus::Pending);
    }

    #[test]
    fn corrupt_file_is_kept_unprobed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("4.png"), b"not a png").unwrap();
        touch_png(dir.path(), "5.png", 1, 1);

        let records = scan_directory(dir.path(), "png").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].width, 0);
        assert_eq!(records[0].format, None);
        assert_eq!(records[1].width, 1);
    }

    #[test]
    fn rescan_sees_new_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectorySource::new(dir.path(), "png");
        touch_png(dir.path(), "1.png", 1, 1);
        assert_eq!(source.scan().unwrap().len(), 1);
        touch_png(dir.path(), "2.png", 1, 1);
        assert_eq!(source.scan().unwrap().len(), 2);
    }

    #[test]
    fn missing_directory_is_io_failure() {
        let err = scan_directory("/definitely/not/here", "png").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::IoFailure);
    }

    #[test]
    fn status_strings() {
        assert_eq!(TransmitStatus::Pending.to_string(), "");
        assert_eq!(TransmitStatus::Success.to_string(), "Success");
        assert_eq!(TransmitStatus::Fail.to_string(), "Fail");
    }
}
