//! Live feed of raw lines from an acquisition task.
//!
//! The acquisition side holds a [`LiveFeedSender`]; the processing side
//! drains the matching [`LiveFeed`]. The channel is bounded so a slow
//! consumer applies backpressure to acquisition instead of growing memory.

use tokio::sync::mpsc;

use crate::line::RawLine;

/// Default number of lines buffered between acquisition and processing.
pub const DEFAULT_FEED_CAPACITY: usize = 256;

pub type LiveFeedSender = mpsc::Sender<RawLine>;

/// Receiving half of a live line feed.
#[derive(Debug)]
pub struct LiveFeed {
    rx: mpsc::Receiver<RawLine>,
}

impl LiveFeed {
    /// Create a bounded feed.
    pub fn channel(capacity: usize) -> (LiveFeedSender, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }

    /// Next line, or `None` once every sender is dropped.
    pub async fn next(&mut self) -> Option<RawLine> {
        self.rx.recv().await
    }
}
