//! Length-prefixed frame codec.
//!
//! ## Wire format
//!
//! ```text
//! metadata_len:  i32 LE   (4)
//! metadata:      UTF-8    (metadata_len)  "<name>|<width>|<height>|<image_len>"
//! image:         bytes    (image_len)     lossless container (TIFF)
//! ```
//!
//! The decoder accumulates partial reads: it yields nothing until the
//! metadata, and then the whole image, are buffered.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{DxrayError, Result};

/// Size of the metadata length prefix.
pub const PREFIX_SIZE: usize = 4;

/// Upper bound on the metadata string.
pub const MAX_METADATA_SIZE: usize = 4 * 1024;

/// Upper bound on a single image payload (256 MiB).
pub const MAX_IMAGE_SIZE: usize = 256 * 1024 * 1024;

const FIELD_SEPARATOR: char = '|';

/// Upper bound on a single buffer reservation while awaiting image bytes.
const RESERVE_CHUNK: usize = 64 * 1024;

// ── WireFrame ────────────────────────────────────────────────────

/// One item on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Encoded image bytes.
    pub data: Bytes,
}

impl WireFrame {
    /// Build a frame, rejecting names the metadata cannot carry.
    pub fn new(name: impl Into<String>, width: u32, height: u32, data: impl Into<Bytes>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            width,
            height,
            data: data.into(),
        })
    }

    /// The pipe-delimited metadata string.
    pub fn metadata(&self) -> String {
        format!(
            "{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}",
            self.name,
            self.width,
            self.height,
            self.data.len()
        )
    }

    /// Total bytes this frame occupies on the wire.
    pub fn wire_len(&self) -> usize {
        PREFIX_SIZE + self.metadata().len() + self.data.len()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DxrayError::InvalidInput("frame name is empty".into()));
    }
    if name.contains(FIELD_SEPARATOR) {
        return Err(DxrayError::InvalidInput(format!(
            "frame name {name:?} contains '{FIELD_SEPARATOR}'"
        )));
    }
    Ok(())
}

/// Parsed metadata awaiting its image bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingImage {
    name: String,
    width: u32,
    height: u32,
    len: usize,
}

fn parse_metadata(raw: &[u8]) -> Result<PendingImage> {
    let text = String::from_utf8(raw.to_vec())?;
    let fields: Vec<&str> = text.split(FIELD_SEPARATOR).collect();
    let [name, width, height, len] = fields.as_slice() else {
        return Err(DxrayError::ProtocolViolation(format!(
            "expected 4 metadata fields, got {}",
            fields.len()
        )));
    };
    if name.is_empty() {
        return Err(DxrayError::ProtocolViolation("empty frame name".into()));
    }
    let number = |field: &str, what: &str| {
        field
            .parse::<u64>()
            .map_err(|_| DxrayError::ProtocolViolation(format!("bad {what}: {field:?}")))
    };
    let width = u32::try_from(number(width, "width")?)
        .map_err(|_| DxrayError::ProtocolViolation("width out of range".into()))?;
    let height = u32::try_from(number(height, "height")?)
        .map_err(|_| DxrayError::ProtocolViolation("height out of range".into()))?;
    let len = number(len, "image length")? as usize;
    if len > MAX_IMAGE_SIZE {
        return Err(DxrayError::FrameTooLarge {
            size: len,
            max: MAX_IMAGE_SIZE,
        });
    }
    Ok(PendingImage {
        name: name.to_string(),
        width,
        height,
        len,
    })
}

// ── FrameCodec ───────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FrameCodec {
    pending: Option<PendingImage>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for FrameCodec {
    type Item = WireFrame;
    type Error = DxrayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if self.pending.is_none() {
            if src.len() < PREFIX_SIZE {
                return Ok(None);
            }
            let mut prefix = [0u8; PREFIX_SIZE];
            prefix.copy_from_slice(&src[..PREFIX_SIZE]);
            let meta_len = i32::from_le_bytes(prefix);
            let meta_len = usize::try_from(meta_len).map_err(|_| {
                DxrayError::ProtocolViolation(format!("negative metadata length {meta_len}"))
            })?;
            if meta_len == 0 || meta_len > MAX_METADATA_SIZE {
                return Err(DxrayError::ProtocolViolation(format!(
                    "metadata length {meta_len} outside 1..={MAX_METADATA_SIZE}"
                )));
            }
            if src.len() < PREFIX_SIZE + meta_len {
                src.reserve(PREFIX_SIZE + meta_len - src.len());
                return Ok(None);
            }
            src.advance(PREFIX_SIZE);
            let meta = src.split_to(meta_len);
            self.pending = Some(parse_metadata(&meta)?);
        }

        let need = self.pending.as_ref().map_or(0, |p| p.len);
        if src.len() < need {
            src.reserve((need - src.len()).min(RESERVE_CHUNK));
            return Ok(None);
        }
        let Some(pending) = self.pending.take() else {
            return Ok(None);
        };
        let data = src.split_to(pending.len).freeze();
        Ok(Some(WireFrame {
            name: pending.name,
            width: pending.width,
            height: pending.height,
            data,
        }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if self.pending.is_some() || !src.is_empty() => {
                let missing = self
                    .pending
                    .take()
                    .map_or(0, |p| p.len.saturating_sub(src.len()));
                src.clear();
                Err(DxrayError::ProtocolViolation(format!(
                    "stream ended inside a frame ({missing} image bytes missing)"
                )))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<WireFrame> for FrameCodec {
    type Error = DxrayError;

    fn encode(&mut self, item: WireFrame, dst: &mut BytesMut) -> Result<()> {
        validate_name(&item.name)?;
        if item.data.len() > MAX_IMAGE_SIZE {
            return Err(DxrayError::FrameTooLarge {
                size: item.data.len(),
                max: MAX_IMAGE_SIZE,
            });
        }
        let metadata = item.metadata();
        let meta_len = i32::try_from(metadata.len())
            .ok()
            .filter(|&n| n as usize <= MAX_METADATA_SIZE)
            .ok_or(DxrayError::FrameTooLarge {
                size: metadata.len(),
                max: MAX_METADATA_SIZE,
            })?;

        dst.reserve(PREFIX_SIZE + metadata.len() + item.data.len());
        dst.put_i32_le(meta_len);
        dst.put_slice(metadata.as_bytes());
        dst.put_slice(&item.data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(frame: &WireFrame) -> BytesMut {
        let mut buf = BytesMut::new();
        FrameCodec::new().encode(frame.clone(), &mut buf).unwrap();
        buf
    }

    #[test]
    fn layout_matches_receiver_contract() {
        let frame = WireFrame::new("a.tiff", 100, 50, vec![7u8; 3]).unwrap();
        let buf = encoded(&frame);

        let meta = b"a.tiff|100|50|3";
        assert_eq!(&buf[..4], &(meta.len() as i32).to_le_bytes());
        assert_eq!(&buf[4..4 + meta.len()], meta);
        assert_eq!(&buf[4 + meta.len()..], &[7, 7, 7]);
        assert_eq!(buf.len(), frame.wire_len());
    }

    #[test]
    fn decode_reproduces_frame() {
        let data: Vec<u8> = (0..=255).cycle().take(5000).collect();
        let frame = WireFrame::new("a.tiff", 100, 50, data).unwrap();
        let mut buf = encoded(&frame);
        let decoded = FrameCodec::new().decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_input_accumulates() {
        let frame = WireFrame::new("7.tiff", 4, 2, vec![1u8; 64]).unwrap();
        let full = encoded(&frame);
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        // Feed one byte at a time; nothing until the last byte.
        for (i, b) in full.iter().enumerate() {
            buf.put_u8(*b);
            let out = codec.decode(&mut buf).unwrap();
            if i + 1 < full.len() {
                assert!(out.is_none(), "early frame at byte {i}");
            } else {
                assert_eq!(out.unwrap(), frame);
            }
        }
    }

    #[test]
    fn back_to_back_frames() {
        let a = WireFrame::new("1.tiff", 1, 1, vec![1u8]).unwrap();
        let b = WireFrame::new("2.tiff", 2, 2, Vec::<u8>::new()).unwrap();
        let mut buf = encoded(&a);
        buf.extend_from_slice(&encoded(&b));

        let mut codec = FrameCodec::new();
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), a);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), b);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn names_with_separator_rejected() {
        assert!(WireFrame::new("a|b", 1, 1, Vec::<u8>::new()).is_err());
        assert!(WireFrame::new("", 1, 1, Vec::<u8>::new()).is_err());
    }

    #[test]
    fn malformed_metadata_rejected() {
        let mut codec = FrameCodec::new();
        for meta in ["a.tiff|1|2", "a.tiff|x|2|0", "|1|1|0", "a|1|1|0|9"] {
            let mut buf = BytesMut::new();
            buf.put_i32_le(meta.len() as i32);
            buf.put_slice(meta.as_bytes());
            assert!(codec.decode(&mut buf).is_err(), "accepted {meta:?}");
            codec = FrameCodec::new();
        }
    }

    #[test]
    fn negative_and_oversized_lengths_rejected() {
        let mut buf = BytesMut::new();
        buf.put_i32_le(-1);
        assert!(FrameCodec::new().decode(&mut buf).is_err());

        let mut buf = BytesMut::new();
        buf.put_i32_le((MAX_METADATA_SIZE + 1) as i32);
        assert!(FrameCodec::new().decode(&mut buf).is_err());

        let meta = format!("big|1|1|{}", MAX_IMAGE_SIZE + 1);
        let mut buf = BytesMut::new();
        buf.put_i32_le(meta.len() as i32);
        buf.put_slice(meta.as_bytes());
        assert!(matches!(
            FrameCodec::new().decode(&mut buf),
            Err(DxrayError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn large_declared_image_reserves_in_chunks() {
        let meta = format!("big.tiff|1|1|{MAX_IMAGE_SIZE}");
        let mut buf = BytesMut::new();
        buf.put_i32_le(meta.len() as i32);
        buf.put_slice(meta.as_bytes());

        assert!(FrameCodec::new().decode(&mut buf).unwrap().is_none());
        assert!(buf.capacity() < 1024 * 1024, "reserved {}", buf.capacity());
    }

    #[test]
    fn eof_after_metadata_is_an_error() {
        let frame = WireFrame::new("a.tiff", 1, 1, vec![0u8; 32]).unwrap();
        let full = encoded(&frame);
        let mut buf = BytesMut::from(&full[..full.len() - 32]);

        let mut codec = FrameCodec::new();
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(DxrayError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn eof_between_frames_is_clean() {
        let frame = WireFrame::new("a.tiff", 1, 1, vec![5u8]).unwrap();
        let mut buf = encoded(&frame);
        let mut codec = FrameCodec::new();
        assert_eq!(codec.decode_eof(&mut buf).unwrap().unwrap(), frame);
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }
}
