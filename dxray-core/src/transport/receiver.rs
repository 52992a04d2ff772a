//! Consumer side of the wire format.

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use crate::error::Result;
use crate::transport::codec::{FrameCodec, WireFrame};

/// Decodes [`WireFrame`]s from any byte stream, accumulating partial reads.
#[derive(Debug)]
pub struct FrameReceiver<R> {
    inner: FramedRead<R, FrameCodec>,
    received: u64,
}

impl<R: AsyncRead + Unpin> FrameReceiver<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: FramedRead::new(reader, FrameCodec::new()),
            received: 0,
        }
    }

    /// Next frame; `None` on clean end of stream.
    ///
    /// A stream that ends inside a frame yields an error.
    pub async fn recv(&mut self) -> Option<Result<WireFrame>> {
        let item = self.inner.next().await;
        if matches!(item, Some(Ok(_))) {
            self.received += 1;
        }
        item
    }

    /// Frames decoded so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use tokio_util::codec::Encoder;

    fn wire(frame: &WireFrame) -> Vec<u8> {
        let mut buf = BytesMut::new();
        FrameCodec::new().encode(frame.clone(), &mut buf).unwrap();
        buf.to_vec()
    }

    #[tokio::test]
    async fn fragmented_reads_are_accumulated() {
        let frame = WireFrame::new("a.tiff", 100, 50, vec![3u8; 300]).unwrap();
        let bytes = wire(&frame);

        // Split across the prefix, inside the metadata and inside the image.
        let mock = tokio_test::io::Builder::new()
            .read(&bytes[..2])
            .read(&bytes[2..9])
            .read(&bytes[9..40])
            .read(&bytes[40..41])
            .read(&bytes[41..])
            .build();

        let mut receiver = FrameReceiver::new(mock);
        assert_eq!(receiver.recv().await.unwrap().unwrap(), frame);
        assert!(receiver.recv().await.is_none());
        assert_eq!(receiver.received(), 1);
    }

    #[tokio::test]
    async fn several_frames_in_one_read() {
        let a = WireFrame::new("1.tiff", 1, 1, vec![1u8]).unwrap();
        let b = WireFrame::new("2.tiff", 1, 1, vec![2u8]).unwrap();
        let mut bytes = wire(&a);
        bytes.extend(wire(&b));

        let mock = tokio_test::io::Builder::new().read(&bytes).build();
        let mut receiver = FrameReceiver::new(mock);
        assert_eq!(receiver.recv().await.unwrap().unwrap().name, "1.tiff");
        assert_eq!(receiver.recv().await.unwrap().unwrap().name, "2.tiff");
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn truncated_stream_is_an_error() {
        let frame = WireFrame::new("a.tiff", 1, 1, vec![0u8; 32]).unwrap();
        let bytes = wire(&frame);

        let mock = tokio_test::io::Builder::new()
            .read(&bytes[..bytes.len() - 5])
            .build();
        let mut receiver = FrameReceiver::new(mock);
        assert!(receiver.recv().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn stream_ending_after_metadata_is_an_error() {
        let frame = WireFrame::new("a.tiff", 1, 1, vec![0u8; 32]).unwrap();
        let bytes = wire(&frame);

        // Prefix and metadata arrive, the image never does.
        let mock = tokio_test::io::Builder::new()
            .read(&bytes[..bytes.len() - 32])
            .build();
        let mut receiver = FrameReceiver::new(mock);
        let err = receiver.recv().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Protocol);
        assert_eq!(receiver.received(), 0);
    }
}
