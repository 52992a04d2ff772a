//! Sender run logic: calibration → load → connect → stream.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dxray_core::{
    CalibrationRepository, CalibrationStore, DxrayError, FileCalibrationRepository,
    PipelineController, Progress, RunOutcome, TransportChannel, shared_calibration,
};

use crate::config::SenderConfig;

/// Final counts of one sender run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub outcome: Option<RunOutcome>,
    pub progress: Progress,
}

pub struct SenderService {
    config: SenderConfig,
}

impl SenderService {
    pub fn new(config: SenderConfig) -> Self {
        Self { config }
    }

    /// Build the calibration store from the configured user profile, or
    /// from the bare parameters when no user is set.
    pub fn calibration(&self) -> dxray_core::Result<CalibrationStore> {
        let section = &self.config.calibration;
        if section.user_id.is_empty() {
            warn!("no calibration user configured; using neutral correction");
            return Ok(CalibrationStore::new(section.params.clone()));
        }
        let repo = FileCalibrationRepository::new(&section.store_dir);
        let store = CalibrationStore::from_profile(repo.load(&section.user_id)?)?;
        let report = store.report();
        info!(
            user_id = %section.user_id,
            calibrated = store.is_calibrated(),
            degenerate = report.degenerate_columns.len(),
            "calibration loaded"
        );
        Ok(store)
    }

    /// Stream the dataset until it drains, a send fails, or `shutdown`
    /// fires.
    pub async fn run(&self, shutdown: CancellationToken) -> dxray_core::Result<RunSummary> {
        let net = &self.config.network;
        let mut controller = PipelineController::new(
            self.config.to_pipeline_config(),
            Box::new(TransportChannel::with_timeout(self.config.connect_timeout())),
            shared_calibration(self.calibration()?),
        );

        let total = controller.load(&self.config.dataset.path).await?;
        if total == 0 {
            warn!(path = %self.config.dataset.path.display(), "dataset is empty");
            return Ok(RunSummary {
                outcome: None,
                progress: controller.progress(),
            });
        }

        if !controller.connect(&net.address, net.port).await {
            return Err(DxrayError::ConnectionRejected {
                endpoint: format!("{}:{}", net.address, net.port),
                reason: controller.progress().last_status,
            });
        }

        let mut updates = controller.subscribe();
        let reporter = tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let progress = updates.borrow_and_update().clone();
                debug!(%progress, "progress");
            }
        });

        controller.start().await?;
        let finished = tokio::select! {
            outcome = controller.wait() => Some(outcome),
            _ = shutdown.cancelled() => None,
        };
        let outcome = match finished {
            Some(outcome) => outcome,
            None => {
                info!("shutdown requested; stopping pipeline");
                controller.stop().await?;
                Some(RunOutcome::Stopped)
            }
        };
        controller.disconnect().await;
        reporter.abort();

        let progress = controller.progress();
        info!(
            outcome = ?outcome,
            sent = progress.succeeded,
            failed = progress.failed,
            total = progress.total,
            "run finished"
        );
        Ok(RunSummary { outcome, progress })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxray_core::FrameReceiver;
    use image::{ImageBuffer, Luma};
    use tokio::net::TcpListener;

    fn dataset(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            let img: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_pixel(3, 2, Luma([4000]));
            img.save(dir.path().join(name)).unwrap();
        }
        dir
    }

    fn config_for(dir: &std::path::Path, port: u16) -> SenderConfig {
        let mut cfg = SenderConfig::default();
        cfg.network.port = port;
        cfg.dataset.path = dir.to_path_buf();
        cfg.pipeline.send_interval_ms = 1;
        cfg
    }

    #[tokio::test]
    async fn streams_dataset_to_listener() {
        let dir = dataset(&["2.png", "1.png"]);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut receiver = FrameReceiver::new(stream);
            let mut names = Vec::new();
            while let Some(frame) = receiver.recv().await {
                names.push(frame.unwrap().name);
            }
            names
        });

        let service = SenderService::new(config_for(dir.path(), port));
        let summary = service.run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.outcome, Some(RunOutcome::Drained));
        assert_eq!(summary.progress.succeeded, 2);
        assert_eq!(server.await.unwrap(), vec!["1.tiff", "2.tiff"]);
    }

    #[tokio::test]
    async fn unreachable_receiver_is_reported() {
        let dir = dataset(&["1.png"]);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let service = SenderService::new(config_for(dir.path(), port));
        let err = service.run(CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), dxray_core::ErrorKind::ConnectionRejected);
    }

    #[tokio::test]
    async fn empty_dataset_sends_nothing() {
        let dir = dataset(&[]);
        let service = SenderService::new(config_for(dir.path(), 1));
        let summary = service.run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.outcome, None);
        assert_eq!(summary.progress.total, 0);
    }

    #[test]
    fn stored_calibration_is_used() {
        let store_dir = tempfile::tempdir().unwrap();
        let repo = FileCalibrationRepository::new(store_dir.path());
        let mut store = CalibrationStore::default();
        store
            .set_offset(dxray_core::ReferenceImage::uniform(3, 2, 2600).unwrap())
            .unwrap();
        store
            .set_gain(dxray_core::ReferenceImage::uniform(3, 2, 15000).unwrap())
            .unwrap();
        repo.save("op1", store.profile()).unwrap();

        let mut cfg = SenderConfig::default();
        cfg.calibration.user_id = "op1".into();
        cfg.calibration.store_dir = store_dir.path().to_path_buf();
        let loaded = SenderService::new(cfg).calibration().unwrap();
        assert!(loaded.is_calibrated());
        assert_eq!(loaded.columns(), Some(3));
    }
}
