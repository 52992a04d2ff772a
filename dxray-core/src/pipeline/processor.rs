//! Calculator + assembler driven one line at a time.

use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::calibration::CalibrationStore;
use crate::error::{DxrayError, Result};
use crate::frame::{AssemblerConfig, Frame, FrameAssembler};
use crate::line::{LineCalculator, ProcessedLine, RawLine};
use crate::source::LiveFeed;

/// Calibration shared between the controller (writes on Save) and the
/// processing loop (reads per line).
pub type SharedCalibration = Arc<RwLock<CalibrationStore>>;

pub fn shared_calibration(store: CalibrationStore) -> SharedCalibration {
    Arc::new(RwLock::new(store))
}

/// Counts from one [`LineProcessor::run_feed`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedSummary {
    pub processed: u64,
    pub skipped: u64,
    pub cancelled: bool,
}

#[derive(Debug)]
pub struct LineProcessor {
    calculator: LineCalculator,
    calibration: SharedCalibration,
    assembler: FrameAssembler,
}

impl LineProcessor {
    pub fn new(calibration: SharedCalibration, config: AssemblerConfig) -> Self {
        Self::with_calculator(LineCalculator::default(), calibration, config)
    }

    pub fn with_calculator(
        calculator: LineCalculator,
        calibration: SharedCalibration,
        config: AssemblerConfig,
    ) -> Self {
        Self {
            calculator,
            calibration,
            assembler: FrameAssembler::new(config),
        }
    }

    pub fn calibration(&self) -> &SharedCalibration {
        &self.calibration
    }

    pub fn assembler(&self) -> &FrameAssembler {
        &self.assembler
    }

    /// Process one raw line without touching the frame.
    pub fn compute(&self, raw: &RawLine) -> Result<ProcessedLine> {
        let store = self
            .calibration
            .read()
            .map_err(|_| DxrayError::InvalidState("calibration lock poisoned".into()))?;
        self.calculator.process(raw, &store)
    }

    pub fn append(&mut self, line: &ProcessedLine) -> Result<()> {
        self.assembler.append(line)
    }

    /// Process one raw line and append it to the frame.
    pub fn process_raw(&mut self, raw: &RawLine) -> Result<ProcessedLine> {
        let line = self.compute(raw)?;
        self.append(&line)?;
        Ok(line)
    }

    pub fn snapshot(&self) -> Frame {
        self.assembler.snapshot()
    }

    /// Hand off the assembled frame, leaving the assembler empty.
    pub fn take_frame(&mut self) -> Frame {
        self.assembler.take()
    }

    pub fn reset(&mut self) {
        self.assembler.reset();
    }

    /// Drain `feed` until it closes or `cancel` fires.
    ///
    /// Invalid lines are logged and skipped. Every `publish_every`
    /// processed lines, and once more at the end, a snapshot of the frame
    /// is published on `frames`.
    pub async fn run_feed(
        &mut self,
        feed: &mut LiveFeed,
        frames: &watch::Sender<Arc<Frame>>,
        publish_every: usize,
        cancel: CancellationToken,
    ) -> FeedSummary {
        let mut summary = FeedSummary::default();
        let mut index: u64 = 0;

        loop {
            let raw = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                next = feed.next() => match next {
                    Some(raw) => raw,
                    None => break,
                },
            };

            match self.process_raw(&raw) {
                Ok(_) => {
                    summary.processed += 1;
                    if publish_every > 0 && summary.processed % publish_every as u64 == 0 {
                        frames.send_replace(Arc::new(self.assembler.snapshot()));
                    }
                }
                Err(e) => {
                    summary.skipped += 1;
                    warn!(line = index, "skipping line: {e}");
                }
            }
            index += 1;
        }

        frames.send_replace(Arc::new(self.assembler.snapshot()));
        if summary.skipped > 0 {
            info!(
                processed = summary.processed,
                skipped = summary.skipped,
                "live feed finished"
            );
        } else {
            debug!(processed = summary.processed, "live feed finished");
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CalibrationParams, ReferenceImage};

    fn calibrated(width: usize) -> SharedCalibration {
        let mut store = CalibrationStore::new(CalibrationParams::default());
        store.set_offset(ReferenceImage::uniform(width, 2, 2600).unwrap()).unwrap();
        store.set_gain(ReferenceImage::uniform(width, 2, 15000).unwrap()).unwrap();
        shared_calibration(store)
    }

    fn raw(level: u16, width: usize) -> RawLine {
        RawLine::from_bands(&vec![level; width], &vec![level; width]).unwrap()
    }

    #[test]
    fn lines_accumulate() {
        let mut p = LineProcessor::new(calibrated(4), AssemblerConfig::default());
        p.process_raw(&raw(8000, 4)).unwrap();
        p.process_raw(&raw(9000, 4)).unwrap();
        assert_eq!(p.assembler().rows(), 2);

        let frame = p.take_frame();
        assert_eq!((frame.width, frame.rows), (4, 2));
        assert_eq!(p.assembler().rows(), 0);
    }

    #[test]
    fn invalid_line_leaves_frame_untouched() {
        let mut p = LineProcessor::new(calibrated(4), AssemblerConfig::default());
        p.process_raw(&raw(8000, 4)).unwrap();
        assert!(p.process_raw(&raw(8000, 5)).is_err());
        assert_eq!(p.assembler().rows(), 1);
    }

    #[test]
    fn compute_defers_append() {
        let mut p = LineProcessor::new(calibrated(4), AssemblerConfig::default());
        let line = p.compute(&raw(8000, 4)).unwrap();
        assert_eq!(p.assembler().rows(), 0);

        p.append(&line).unwrap();
        assert_eq!(p.assembler().rows(), 1);
    }

    #[tokio::test]
    async fn feed_runs_until_closed() {
        let mut p = LineProcessor::new(calibrated(3), AssemblerConfig::default());
        let (tx, mut feed) = LiveFeed::channel(8);
        let (frames_tx, frames_rx) = watch::channel(Arc::new(Frame::default()));

        for level in [5000u16, 6000, 7000] {
            tx.send(raw(level, 3)).await.unwrap();
        }
        tx.send(raw(5000, 7)).await.unwrap();
        drop(tx);

        let summary = p
            .run_feed(&mut feed, &frames_tx, 2, CancellationToken::new())
            .await;
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.skipped, 1);
        assert!(!summary.cancelled);
        assert_eq!(frames_rx.borrow().rows, 3);
    }

    #[tokio::test]
    async fn feed_stops_on_cancel() {
        let mut p = LineProcessor::new(calibrated(3), AssemblerConfig::default());
        let (_tx, mut feed) = LiveFeed::channel(8);
        let (frames_tx, _frames_rx) = watch::channel(Arc::new(Frame::default()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = p.run_feed(&mut feed, &frames_tx, 1, cancel).await;
        assert!(summary.cancelled);
        assert_eq!(summary.processed, 0);
    }
}
