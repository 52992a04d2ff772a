//! Pipeline controller: load → (process) → (detect) → transmit.
//!
//! The controller owns one [`FrameSink`] and runs at most one drive loop
//! as a background task. The loop sends catalog records strictly in
//! order with a fixed delay between sends, and observes pause and
//! cancellation between items. An in-flight send is never torn down.
//!
//! Observers subscribe to a `watch` channel of [`Progress`] snapshots.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::calibration::{CalibrationRepository, CalibrationStore};
use crate::detect::{Detection, ObjectDetector, detect_best_effort};
use crate::error::{DxrayError, Result};
use crate::frame::Frame;
use crate::imaging::{TiffCompression, encode_image};
use crate::line::{ProcessedLine, RawLine};
use crate::pipeline::config::{PayloadMode, PipelineConfig};
use crate::pipeline::processor::{LineProcessor, SharedCalibration};
use crate::pipeline::progress::{Progress, RunOutcome};
use crate::pipeline::state::PipelineState;
use crate::source::{DirectorySource, FileRecord, TransmitStatus, load_decoded};
use crate::transport::{FrameSink, WireFrame};

type SharedSink = Arc<AsyncMutex<Box<dyn FrameSink>>>;

// ── Shared state ─────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Inner {
    state: PipelineState,
    catalog: Vec<FileRecord>,
    cursor: usize,
    last_status: String,
    last_item: Option<String>,
    last_detections: Vec<Detection>,
    outcome: Option<RunOutcome>,
}

impl Inner {
    fn progress(&self) -> Progress {
        let count = |status| self.catalog.iter().filter(|r| r.status == status).count();
        Progress {
            state: self.state,
            cursor: self.cursor,
            total: self.catalog.len(),
            succeeded: count(TransmitStatus::Success),
            failed: count(TransmitStatus::Fail),
            last_status: self.last_status.clone(),
            last_item: self.last_item.clone(),
            last_detections: self.last_detections.clone(),
            outcome: self.outcome,
        }
    }

    fn mark(&mut self, index: usize, status: TransmitStatus) {
        if let Some(record) = self.catalog.get_mut(index) {
            record.status = status;
            self.last_item = Some(record.file_name.clone());
        }
    }
}

#[derive(Debug)]
struct Shared {
    inner: Mutex<Inner>,
    progress: watch::Sender<Progress>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate under the lock, then publish a snapshot.
    fn update<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.lock();
        let out = f(&mut inner);
        self.progress.send_replace(inner.progress());
        out
    }
}

// ── PipelineController ───────────────────────────────────────────

pub struct PipelineController {
    config: PipelineConfig,
    shared: Arc<Shared>,
    sink: SharedSink,
    calibration: SharedCalibration,
    processor: Arc<Mutex<LineProcessor>>,
    detector: Option<Arc<dyn ObjectDetector>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<RunOutcome>>,
}

impl PipelineController {
    pub fn new(
        config: PipelineConfig,
        sink: Box<dyn FrameSink>,
        calibration: SharedCalibration,
    ) -> Self {
        let processor = LineProcessor::new(Arc::clone(&calibration), config.assembler.clone());
        let (progress, _) = watch::channel(Progress::default());
        Self {
            config,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                progress,
            }),
            sink: Arc::new(AsyncMutex::new(sink)),
            calibration,
            processor: Arc::new(Mutex::new(processor)),
            detector: None,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Attach a detector run on every outgoing item.
    pub fn with_detector(mut self, detector: Arc<dyn ObjectDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.shared.progress.subscribe()
    }

    pub fn progress(&self) -> Progress {
        self.shared.lock().progress()
    }

    pub fn state(&self) -> PipelineState {
        self.shared.lock().state
    }

    pub fn cursor(&self) -> usize {
        self.shared.lock().cursor
    }

    /// Copy of the catalog with per-record statuses.
    pub fn catalog(&self) -> Vec<FileRecord> {
        self.shared.lock().catalog.clone()
    }

    pub fn calibration(&self) -> &SharedCalibration {
        &self.calibration
    }

    // ── Transport ────────────────────────────────────────────────

    /// Connect the sink. Rejected while a run is active.
    pub async fn connect(&self, address: &str, port: u16) -> bool {
        if self.state().is_active() {
            warn!("connect ignored while a run is active");
            self.shared.update(|inner| {
                inner.last_status = "cannot connect while running".to_string();
            });
            return false;
        }
        let (ok, status) = {
            let mut sink = self.sink.lock().await;
            let ok = sink.connect(address, port).await;
            (ok, sink.last_status().to_string())
        };
        self.shared.update(|inner| inner.last_status = status);
        ok
    }

    pub async fn disconnect(&self) {
        self.sink.lock().await.disconnect().await;
    }

    pub async fn is_connected(&self) -> bool {
        self.sink.lock().await.is_connected()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Scan `path` into the catalog. Returns the number of records.
    pub async fn load(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        self.state().load()?;

        let source = DirectorySource::new(path.as_ref(), &self.config.extension);
        let records = tokio::task::spawn_blocking(move || source.scan())
            .await
            .map_err(|e| DxrayError::Other(format!("scan task failed: {e}")))??;
        let total = records.len();

        self.shared.update(|inner| {
            inner.state.load()?;
            inner.catalog = records;
            inner.cursor = 0;
            inner.outcome = None;
            inner.last_detections.clear();
            inner.last_item = None;
            inner.last_status = format!("Loaded {total} files");
            Ok::<_, DxrayError>(())
        })?;
        info!(path = %path.as_ref().display(), total, "catalog loaded");
        Ok(total)
    }

    /// Begin sending from the cursor. Requires a connected sink.
    pub async fn start(&mut self) -> Result<()> {
        self.state().start()?;
        if !self.is_connected().await {
            let e = DxrayError::InvalidState("cannot start: transport not connected".into());
            self.shared.update(|inner| inner.last_status = e.to_string());
            return Err(e);
        }
        if let Some(previous) = self.task.take() {
            if let Err(e) = previous.await {
                debug!("previous run task: {e}");
            }
        }

        self.cancel = CancellationToken::new();
        let cursor = self.shared.update(|inner| {
            inner.state.start()?;
            if inner.cursor >= inner.catalog.len() {
                inner.cursor = 0;
            }
            inner.outcome = None;
            inner.last_status = "Running".to_string();
            Ok::<_, DxrayError>(inner.cursor)
        })?;
        // A resumed run keeps the rows already sent.
        if cursor == 0 {
            self.processor
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .reset();
        }

        let driver = Driver {
            shared: Arc::clone(&self.shared),
            sink: Arc::clone(&self.sink),
            processor: Arc::clone(&self.processor),
            detector: self.detector.clone(),
            config: self.config.clone(),
            cancel: self.cancel.clone(),
        };
        self.task = Some(tokio::spawn(driver.run()));
        info!(cursor, "pipeline started");
        Ok(())
    }

    /// Toggle `Running` ⇄ `Paused`.
    pub fn pause(&self) -> Result<()> {
        let state = self.shared.update(|inner| {
            inner.state.toggle_pause()?;
            Ok::<_, DxrayError>(inner.state)
        })?;
        debug!(%state, "pause toggled");
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        self.shared.update(|inner| inner.state.resume())?;
        debug!("resumed");
        Ok(())
    }

    /// Cancel the run, disconnect and rewind. Valid from any state.
    pub async fn stop(&mut self) -> Result<()> {
        let was_active = self.state().is_active();
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(outcome) => debug!(%outcome, "drive loop ended"),
                Err(e) => error!("drive loop task failed: {e}"),
            }
        }
        self.sink.lock().await.disconnect().await;

        self.shared.update(|inner| {
            inner.state.stop();
            inner.cursor = 0;
            if was_active {
                inner.outcome = Some(RunOutcome::Stopped);
            }
            inner.last_status = "Stopped".to_string();
        });
        info!("pipeline stopped");
        Ok(())
    }

    /// Wait for the current run to end on its own.
    ///
    /// Returns the last outcome immediately when no run is in progress.
    /// Cancel-safe: dropping the future leaves the run attached.
    pub async fn wait(&mut self) -> Option<RunOutcome> {
        if let Some(task) = self.task.as_mut() {
            let joined = task.await;
            self.task = None;
            return match joined {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    error!("drive loop task failed: {e}");
                    None
                }
            };
        }
        self.shared.lock().outcome
    }

    // ── Frames & calibration ─────────────────────────────────────

    /// Hand off the frame assembled by processed runs.
    pub fn take_frame(&self) -> Frame {
        self.processor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take_frame()
    }

    fn ensure_idle_loop(&self, action: &str) -> Result<()> {
        let state = self.state();
        if state.is_active() {
            return Err(DxrayError::InvalidState(format!(
                "cannot {action} while {state}"
            )));
        }
        Ok(())
    }

    fn write_calibration(&self) -> Result<std::sync::RwLockWriteGuard<'_, CalibrationStore>> {
        self.calibration
            .write()
            .map_err(|_| DxrayError::InvalidState("calibration lock poisoned".into()))
    }

    /// Replace the active calibration.
    pub fn set_calibration(&self, store: CalibrationStore) -> Result<()> {
        self.ensure_idle_loop("change calibration")?;
        *self.write_calibration()? = store;
        Ok(())
    }

    /// Persist the active calibration for `user_id`.
    pub fn save_calibration(&self, repo: &dyn CalibrationRepository, user_id: &str) -> Result<()> {
        self.ensure_idle_loop("save calibration")?;
        let profile = self
            .calibration
            .read()
            .map_err(|_| DxrayError::InvalidState("calibration lock poisoned".into()))?
            .profile()
            .clone();
        repo.save(user_id, &profile)?;
        info!(user_id, "calibration saved");
        Ok(())
    }

    /// Load and activate the calibration stored for `user_id`.
    pub fn load_calibration(&self, repo: &dyn CalibrationRepository, user_id: &str) -> Result<()> {
        self.ensure_idle_loop("load calibration")?;
        let store = CalibrationStore::from_profile(repo.load(user_id)?)?;
        let report = store.report();
        *self.write_calibration()? = store;
        info!(user_id, clean = report.is_clean(), "calibration loaded");
        Ok(())
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Drive loop ───────────────────────────────────────────────────

struct Driver {
    shared: Arc<Shared>,
    sink: SharedSink,
    processor: Arc<Mutex<LineProcessor>>,
    detector: Option<Arc<dyn ObjectDetector>>,
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(self) -> RunOutcome {
        let outcome = self.drive().await;
        if outcome == RunOutcome::Drained {
            self.finish_drained().await;
        }
        outcome
    }

    async fn drive(&self) -> RunOutcome {
        loop {
            if !self.wait_while_paused().await {
                return RunOutcome::Stopped;
            }
            let started = Instant::now();

            let next = {
                let inner = self.shared.lock();
                inner
                    .catalog
                    .get(inner.cursor)
                    .cloned()
                    .map(|record| (inner.cursor, record))
            };
            let Some((index, record)) = next else {
                return RunOutcome::Drained;
            };

            let (frame, line, detections) = match self.prepare(record.clone()).await {
                Ok(prepared) => prepared,
                Err(e) => {
                    warn!(index, path = %record.path.display(), "skipping record: {e}");
                    self.shared.update(|inner| {
                        inner.mark(index, TransmitStatus::Fail);
                        inner.cursor = index + 1;
                        inner.last_status = e.to_string();
                    });
                    if !self.pace(started).await {
                        return RunOutcome::Stopped;
                    }
                    continue;
                }
            };

            if self.transmit(&frame).await {
                debug!(index, name = %frame.name, "item sent");
                if let Some(line) = line {
                    let appended = self
                        .processor
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .append(&line);
                    if let Err(e) = appended {
                        warn!(index, name = %frame.name, "line not assembled: {e}");
                    }
                }
                self.shared.update(|inner| {
                    inner.mark(index, TransmitStatus::Success);
                    inner.cursor = index + 1;
                    inner.last_status = format!("Sent {}", frame.name);
                    inner.last_detections = detections;
                });
            } else {
                let status = self.sink.lock().await.last_status().to_string();
                error!(index, name = %frame.name, "send failed, halting: {status}");
                self.shared.update(|inner| {
                    inner.mark(index, TransmitStatus::Fail);
                    inner.last_status = status;
                    if let Err(e) = inner.state.finish() {
                        debug!("{e}");
                    }
                    inner.outcome = Some(RunOutcome::Failed);
                });
                return RunOutcome::Failed;
            }

            if !self.pace(started).await {
                return RunOutcome::Stopped;
            }
        }
    }

    /// Returns `false` once cancelled or no longer running.
    async fn wait_while_paused(&self) -> bool {
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let state = self.shared.lock().state;
            match state {
                PipelineState::Running => return true,
                PipelineState::Paused => {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return false,
                        _ = tokio::time::sleep(self.config.pause_poll) => {}
                    }
                }
                _ => return false,
            }
        }
    }

    /// Sleep out the rest of the send interval. `false` when cancelled.
    async fn pace(&self, started: Instant) -> bool {
        let remaining = self.config.send_interval.saturating_sub(started.elapsed());
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(remaining) => true,
        }
    }

    /// Decode, optionally process, encode and run detection off the
    /// async workers.
    async fn prepare(
        &self,
        record: FileRecord,
    ) -> Result<(WireFrame, Option<ProcessedLine>, Vec<Detection>)> {
        let payload = self.config.payload;
        let compression = self.config.compression;
        let processor = Arc::clone(&self.processor);
        let detector = self.detector.clone();
        tokio::task::spawn_blocking(move || {
            let (frame, line) = build_frame(&record, payload, compression, &processor)?;
            let detections = detector
                .map(|d| {
                    detect_best_effort(d.as_ref(), &frame.name, &frame.data, (frame.width, frame.height))
                })
                .unwrap_or_default();
            Ok::<_, DxrayError>((frame, line, detections))
        })
        .await
        .map_err(|e| DxrayError::Other(format!("encode task failed: {e}")))?
    }

    /// Send once, then reconnect and resend up to `send_retries` times.
    async fn transmit(&self, frame: &WireFrame) -> bool {
        let mut sink = self.sink.lock().await;
        if sink.send(frame).await {
            return true;
        }
        for attempt in 1..=self.config.send_retries {
            if self.cancel.is_cancelled() {
                break;
            }
            let Some(endpoint) = sink.endpoint().cloned() else {
                break;
            };
            warn!(attempt, %endpoint, name = %frame.name, "retrying send");
            if sink.connect(&endpoint.address, endpoint.port).await && sink.send(frame).await {
                return true;
            }
        }
        false
    }

    async fn finish_drained(&self) {
        if let (PayloadMode::Processed(_), Some(dir)) =
            (self.config.payload, self.config.frame_output.clone())
        {
            let processor = Arc::clone(&self.processor);
            let compression = self.config.compression;
            let written = tokio::task::spawn_blocking(move || {
                let frame = processor
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .snapshot();
                if frame.is_empty() {
                    return Ok(Vec::new());
                }
                frame.write_to_dir(&dir, compression)
            })
            .await;
            match written {
                Ok(Ok(paths)) => debug!(files = paths.len(), "frame output written"),
                Ok(Err(e)) => warn!("frame output failed: {e}"),
                Err(e) => warn!("frame output task failed: {e}"),
            }
        }

        let total = self.shared.update(|inner| {
            if let Err(e) = inner.state.finish() {
                debug!("{e}");
            }
            inner.outcome = Some(RunOutcome::Drained);
            inner.last_status = format!("Drained {} items", inner.catalog.len());
            inner.catalog.len()
        });
        info!(total, "catalog drained");
    }
}

/// Build the wire payload for one record. In processed mode the line is
/// returned unassembled; it joins the frame only once it has been sent.
fn build_frame(
    record: &FileRecord,
    payload: PayloadMode,
    compression: TiffCompression,
    processor: &Mutex<LineProcessor>,
) -> Result<(WireFrame, Option<ProcessedLine>)> {
    let decoded = load_decoded(record)?;
    let name = format!("{}.tiff", record.stem());
    match payload {
        PayloadMode::Passthrough => {
            let bytes = encode_image(&decoded, compression)?;
            let frame = WireFrame::new(name, decoded.width, decoded.height, bytes)?;
            Ok((frame, None))
        }
        PayloadMode::Processed(channel) => {
            let raw = RawLine::from_decoded(&decoded)?;
            drop(decoded);
            let line = processor
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .compute(&raw)?;
            let image = line.channel_image(channel);
            let bytes = encode_image(&image, compression)?;
            let frame = WireFrame::new(name, image.width, image.height, bytes)?;
            Ok((frame, Some(line)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CalibrationParams, FileCalibrationRepository, ReferenceImage};
    use crate::error::ErrorKind;
    use crate::line::OutputChannel;
    use crate::pipeline::processor::shared_calibration;
    use crate::transport::Endpoint;
    use async_trait::async_trait;
    use image::{ImageBuffer, Luma};
    use std::time::Duration;

    /// Records sent names; fails the listed (1-based) send calls.
    #[derive(Default)]
    struct MockSink {
        connected: bool,
        endpoint: Option<Endpoint>,
        status: String,
        sent: Arc<Mutex<Vec<String>>>,
        fail_calls: Vec<usize>,
        calls: usize,
    }

    #[async_trait]
    impl FrameSink for MockSink {
        fn is_connected(&self) -> bool {
            self.connected
        }

        fn endpoint(&self) -> Option<&Endpoint> {
            self.endpoint.as_ref()
        }

        fn last_status(&self) -> &str {
            &self.status
        }

        async fn connect(&mut self, address: &str, port: u16) -> bool {
            self.endpoint = Some(Endpoint::new(address, port));
            self.connected = true;
            self.status = "Connected".into();
            true
        }

        async fn send(&mut self, frame: &WireFrame) -> bool {
            self.calls += 1;
            if !self.connected {
                self.status = "not connected".into();
                return false;
            }
            if self.fail_calls.contains(&self.calls) {
                self.connected = false;
                self.status = "broken pipe".into();
                return false;
            }
            self.sent.lock().unwrap().push(frame.name.clone());
            true
        }

        async fn disconnect(&mut self) {
            self.connected = false;
        }
    }

    fn write_png(dir: &Path, name: &str, width: u32, height: u32, level: u16) {
        let img: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_pixel(width, height, Luma([level]));
        img.save(dir.join(name)).unwrap();
    }

    fn dataset() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in ["10.png", "1.png", "2.png"] {
            write_png(dir.path(), name, 4, 2, 8000);
        }
        dir
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            send_interval: Duration::from_millis(1),
            pause_poll: Duration::from_millis(5),
            ..Default::default()
        }
    }

    fn controller(
        config: PipelineConfig,
        fail_calls: Vec<usize>,
    ) -> (PipelineController, Arc<Mutex<Vec<String>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = MockSink {
            sent: Arc::clone(&sent),
            fail_calls,
            ..Default::default()
        };
        let calibration = shared_calibration(CalibrationStore::default());
        (
            PipelineController::new(config, Box::new(sink), calibration),
            sent,
        )
    }

    fn statuses(c: &PipelineController) -> Vec<TransmitStatus> {
        c.catalog().iter().map(|r| r.status).collect()
    }

    #[tokio::test]
    async fn start_requires_connection() {
        let dir = dataset();
        let (mut c, _) = controller(fast_config(), vec![]);
        assert_eq!(c.load(dir.path()).await.unwrap(), 3);

        let err = c.start().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(c.state(), PipelineState::Loaded);
    }

    #[tokio::test]
    async fn start_before_load_rejected() {
        let (mut c, _) = controller(fast_config(), vec![]);
        assert!(c.connect("127.0.0.1", 1).await);
        assert!(c.start().await.is_err());
        assert_eq!(c.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn run_drains_in_catalog_order() {
        let dir = dataset();
        let (mut c, sent) = controller(fast_config(), vec![]);
        let mut progress = c.subscribe();
        c.load(dir.path()).await.unwrap();
        assert!(c.connect("127.0.0.1", 9000).await);
        c.start().await.unwrap();

        assert_eq!(c.wait().await, Some(RunOutcome::Drained));
        assert_eq!(*sent.lock().unwrap(), vec!["1.tiff", "2.tiff", "10.tiff"]);
        assert_eq!(statuses(&c), vec![TransmitStatus::Success; 3]);
        assert_eq!(c.state(), PipelineState::Loaded);

        let last = progress.borrow_and_update().clone();
        assert_eq!(last.outcome, Some(RunOutcome::Drained));
        assert_eq!((last.cursor, last.total, last.succeeded), (3, 3, 3));
        assert!(last.is_done());
    }

    #[tokio::test]
    async fn send_failure_halts_run() {
        let dir = dataset();
        let (mut c, sent) = controller(fast_config(), vec![2]);
        c.load(dir.path()).await.unwrap();
        c.connect("127.0.0.1", 9000).await;
        c.start().await.unwrap();

        assert_eq!(c.wait().await, Some(RunOutcome::Failed));
        assert_eq!(*sent.lock().unwrap(), vec!["1.tiff"]);
        assert_eq!(
            statuses(&c),
            vec![TransmitStatus::Success, TransmitStatus::Fail, TransmitStatus::Pending]
        );
        assert!(!c.is_connected().await);
        assert_eq!(c.cursor(), 1);
        assert_eq!(c.progress().last_status, "broken pipe");
    }

    #[tokio::test]
    async fn bounded_retry_reconnects_and_resends() {
        let dir = dataset();
        let config = PipelineConfig {
            send_retries: 1,
            ..fast_config()
        };
        let (mut c, sent) = controller(config, vec![2]);
        c.load(dir.path()).await.unwrap();
        c.connect("127.0.0.1", 9000).await;
        c.start().await.unwrap();

        assert_eq!(c.wait().await, Some(RunOutcome::Drained));
        assert_eq!(*sent.lock().unwrap(), vec!["1.tiff", "2.tiff", "10.tiff"]);
        assert!(c.is_connected().await);
    }

    #[tokio::test]
    async fn corrupt_record_is_skipped() {
        let dir = dataset();
        std::fs::write(dir.path().join("3.png"), b"not a png").unwrap();
        let (mut c, sent) = controller(fast_config(), vec![]);
        c.load(dir.path()).await.unwrap();
        c.connect("127.0.0.1", 9000).await;
        c.start().await.unwrap();

        assert_eq!(c.wait().await, Some(RunOutcome::Drained));
        assert_eq!(*sent.lock().unwrap(), vec!["1.tiff", "2.tiff", "10.tiff"]);
        assert_eq!(
            statuses(&c),
            vec![
                TransmitStatus::Success,
                TransmitStatus::Success,
                TransmitStatus::Fail,
                TransmitStatus::Success
            ]
        );
    }

    #[tokio::test]
    async fn pause_toggles_and_stop_rewinds() {
        let dir = dataset();
        let config = PipelineConfig {
            send_interval: Duration::from_secs(5),
            ..fast_config()
        };
        let (mut c, _) = controller(config, vec![]);
        c.load(dir.path()).await.unwrap();
        c.connect("127.0.0.1", 9000).await;
        c.start().await.unwrap();

        c.pause().unwrap();
        assert_eq!(c.state(), PipelineState::Paused);
        c.pause().unwrap();
        assert_eq!(c.state(), PipelineState::Running);
        c.pause().unwrap();
        c.resume().unwrap();
        assert_eq!(c.state(), PipelineState::Running);

        c.stop().await.unwrap();
        assert_eq!(c.state(), PipelineState::Stopped);
        assert_eq!(c.cursor(), 0);
        assert!(!c.is_connected().await);
        assert_eq!(c.wait().await, Some(RunOutcome::Stopped));
    }

    #[tokio::test]
    async fn stop_from_idle() {
        let (mut c, _) = controller(fast_config(), vec![]);
        c.stop().await.unwrap();
        assert_eq!(c.state(), PipelineState::Stopped);
        assert_eq!(c.progress().outcome, None);
    }

    #[tokio::test]
    async fn calibration_save_rejected_while_running() {
        let dir = dataset();
        let store_dir = tempfile::tempdir().unwrap();
        let repo = FileCalibrationRepository::new(store_dir.path());
        let config = PipelineConfig {
            send_interval: Duration::from_secs(5),
            ..fast_config()
        };
        let (mut c, _) = controller(config, vec![]);
        c.load(dir.path()).await.unwrap();
        c.connect("127.0.0.1", 9000).await;
        c.start().await.unwrap();

        let err = c.save_calibration(&repo, "alice").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        c.stop().await.unwrap();
        c.save_calibration(&repo, "alice").unwrap();
        c.load_calibration(&repo, "alice").unwrap();
    }

    fn calibrated_store() -> CalibrationStore {
        let mut store = CalibrationStore::new(CalibrationParams::default());
        store.set_offset(ReferenceImage::uniform(4, 2, 2600).unwrap()).unwrap();
        store.set_gain(ReferenceImage::uniform(4, 2, 15000).unwrap()).unwrap();
        store
    }

    #[tokio::test]
    async fn resumed_processed_run_keeps_sent_rows() {
        let dir = dataset();
        let config = PipelineConfig {
            payload: PayloadMode::Processed(OutputChannel::High),
            ..fast_config()
        };
        let (mut c, sent) = controller(config, vec![2]);
        c.set_calibration(calibrated_store()).unwrap();
        c.load(dir.path()).await.unwrap();
        c.connect("127.0.0.1", 9000).await;

        c.start().await.unwrap();
        assert_eq!(c.wait().await, Some(RunOutcome::Failed));
        assert_eq!(c.cursor(), 1);

        assert!(c.connect("127.0.0.1", 9000).await);
        c.start().await.unwrap();
        assert_eq!(c.wait().await, Some(RunOutcome::Drained));
        assert_eq!(*sent.lock().unwrap(), vec!["1.tiff", "2.tiff", "10.tiff"]);

        let frame = c.take_frame();
        assert_eq!(frame.rows, c.catalog().len());
    }

    #[tokio::test]
    async fn retried_item_is_assembled_once() {
        let dir = dataset();
        let config = PipelineConfig {
            payload: PayloadMode::Processed(OutputChannel::High),
            send_retries: 1,
            ..fast_config()
        };
        let (mut c, _) = controller(config, vec![2]);
        c.set_calibration(calibrated_store()).unwrap();
        c.load(dir.path()).await.unwrap();
        c.connect("127.0.0.1", 9000).await;
        c.start().await.unwrap();

        assert_eq!(c.wait().await, Some(RunOutcome::Drained));
        assert_eq!(c.take_frame().rows, 3);
    }

    #[tokio::test]
    async fn processed_run_assembles_and_writes_frame() {
        let dir = dataset();
        let out = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            payload: PayloadMode::Processed(OutputChannel::ZEffective),
            frame_output: Some(out.path().join("frame")),
            ..fast_config()
        };
        let (mut c, sent) = controller(config, vec![]);
        let mut store = CalibrationStore::new(CalibrationParams::default());
        store.set_offset(ReferenceImage::uniform(4, 2, 2600).unwrap()).unwrap();
        store.set_gain(ReferenceImage::uniform(4, 2, 15000).unwrap()).unwrap();
        c.set_calibration(store).unwrap();

        c.load(dir.path()).await.unwrap();
        c.connect("127.0.0.1", 9000).await;
        c.start().await.unwrap();

        assert_eq!(c.wait().await, Some(RunOutcome::Drained));
        assert_eq!(sent.lock().unwrap().len(), 3);
        assert!(out.path().join("frame").join("zeff.tiff").is_file());

        let frame = c.take_frame();
        assert_eq!((frame.width, frame.rows), (4, 3));
    }
}
