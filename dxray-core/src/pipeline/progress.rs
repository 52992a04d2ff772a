//! Observable pipeline progress.

use crate::detect::Detection;
use crate::pipeline::state::PipelineState;

/// How the last run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunOutcome {
    /// Cursor reached the end of the catalog.
    Drained,
    /// Cancelled by `stop()`.
    Stopped,
    /// A send failed and the loop halted.
    Failed,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Drained => write!(f, "drained"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Snapshot published on every state change and every item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    pub state: PipelineState,
    /// Index of the next item to send.
    pub cursor: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub last_status: String,
    /// File name of the last item attempted.
    pub last_item: Option<String>,
    pub last_detections: Vec<Detection>,
    pub outcome: Option<RunOutcome>,
}

impl Progress {
    pub fn is_done(&self) -> bool {
        self.total > 0 && self.cursor >= self.total
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.state, self.cursor, self.total)?;
        if self.failed > 0 {
            write!(f, " ({} failed)", self.failed)?;
        }
        if !self.last_status.is_empty() {
            write!(f, ": {}", self.last_status)?;
        }
        Ok(())
    }
}
