//! Accept loop and per-connection frame writer.
//!
//! Connections are served one at a time, matching the sender's single
//! persistent connection. A connection that violates the wire format is
//! dropped; the server keeps accepting.

use std::path::{Path, PathBuf};

use tokio::io::AsyncRead;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dxray_core::{DxrayError, FrameReceiver, WireFrame};

use crate::config::ReceiverConfig;

/// Totals across every connection served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub connections: u64,
    pub frames: u64,
    pub bytes: u64,
}

pub struct FrameServer {
    config: ReceiverConfig,
}

impl FrameServer {
    pub fn new(config: ReceiverConfig) -> Self {
        Self { config }
    }

    /// Bind the configured address and serve until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) -> dxray_core::Result<ServerStats> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        info!("receiver listening on {}", listener.local_addr()?);
        self.serve(listener, shutdown).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> dxray_core::Result<ServerStats> {
        let mut stats = ServerStats::default();
        loop {
            let accept = tokio::select! {
                result = listener.accept() => result,
                _ = shutdown.cancelled() => break,
            };
            let (stream, peer) = match accept {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept error: {e}");
                    continue;
                }
            };

            info!("sender connected from {peer}");
            stats.connections += 1;
            let session = serve_connection(
                stream,
                &self.config.output.dir,
                self.config.output.overwrite,
                &shutdown,
            )
            .await;
            match session {
                Ok(session) => {
                    stats.frames += session.frames;
                    stats.bytes += session.bytes;
                    info!(frames = session.frames, "session with {peer} ended");
                }
                Err(e) => warn!("session with {peer} dropped: {e}"),
            }
        }
        info!(
            connections = stats.connections,
            frames = stats.frames,
            "receiver stopped"
        );
        Ok(stats)
    }
}

/// Write every frame from `reader` into `output` until the stream ends.
pub async fn serve_connection<R: AsyncRead + Unpin>(
    reader: R,
    output: &Path,
    overwrite: bool,
    shutdown: &CancellationToken,
) -> dxray_core::Result<ServerStats> {
    tokio::fs::create_dir_all(output)
        .await
        .map_err(|e| DxrayError::file(output, e))?;

    let mut receiver = FrameReceiver::new(reader);
    let mut stats = ServerStats {
        connections: 1,
        ..Default::default()
    };
    loop {
        let next = tokio::select! {
            next = receiver.recv() => next,
            _ = shutdown.cancelled() => break,
        };
        let Some(frame) = next else {
            break;
        };
        let frame = frame?;
        let path = output_path(output, &frame)?;
        if !overwrite && tokio::fs::try_exists(&path).await.unwrap_or(false) {
            warn!(path = %path.display(), "exists; skipping");
            continue;
        }
        tokio::fs::write(&path, &frame.data)
            .await
            .map_err(|e| DxrayError::file(&path, e))?;
        stats.frames += 1;
        stats.bytes += frame.data.len() as u64;
        debug!(
            name = %frame.name,
            width = frame.width,
            height = frame.height,
            bytes = frame.data.len(),
            "frame written"
        );
    }
    Ok(stats)
}

/// Resolve a wire name to a file directly inside `output`.
fn output_path(output: &Path, frame: &WireFrame) -> dxray_core::Result<PathBuf> {
    let name = Path::new(&frame.name);
    match name.file_name() {
        Some(file) if file == name.as_os_str() => Ok(output.join(file)),
        _ => Err(DxrayError::ProtocolViolation(format!(
            "frame name {:?} is not a plain file name",
            frame.name
        ))),
    }
}
