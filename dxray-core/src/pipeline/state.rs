//! Pipeline controller state machine.
//!
//! ```text
//!   Idle ──► Loaded ──► Running ◄──► Paused
//!              ▲           │           │
//!              │  drained/failed       │
//!              └───────────┴───────────┘
//!   any ──stop──► Stopped ──load──► Loaded
//! ```
//!
//! Transitions return `Result` so callers can surface a rejected request
//! without changing state.

use crate::error::{DxrayError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Loaded,
    Running,
    Paused,
    Stopped,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "Idle",
            Self::Loaded => "Loaded",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Stopped => "Stopped",
        };
        f.write_str(s)
    }
}

impl PipelineState {
    /// A drive loop exists in these states.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    fn reject(self, action: &str) -> DxrayError {
        DxrayError::InvalidState(format!("cannot {action} while {self}"))
    }

    /// Valid from: `Idle`, `Loaded`, `Stopped`.
    pub fn load(&mut self) -> Result<()> {
        match self {
            Self::Idle | Self::Loaded | Self::Stopped => {
                *self = Self::Loaded;
                Ok(())
            }
            other => Err(other.reject("load")),
        }
    }

    /// Valid from: `Loaded`.
    pub fn start(&mut self) -> Result<()> {
        match self {
            Self::Loaded => {
                *self = Self::Running;
                Ok(())
            }
            other => Err(other.reject("start")),
        }
    }

    /// `Running` ⇄ `Paused`.
    pub fn toggle_pause(&mut self) -> Result<()> {
        match self {
            Self::Running => {
                *self = Self::Paused;
                Ok(())
            }
            Self::Paused => {
                *self = Self::Running;
                Ok(())
            }
            other => Err(other.reject("pause")),
        }
    }

    /// Valid from: `Paused`.
    pub fn resume(&mut self) -> Result<()> {
        match self {
            Self::Paused => {
                *self = Self::Running;
                Ok(())
            }
            other => Err(other.reject("resume")),
        }
    }

    /// Run ended on its own (drained or failed). Valid from an active state.
    pub fn finish(&mut self) -> Result<()> {
        match self {
            Self::Running | Self::Paused => {
                *self = Self::Loaded;
                Ok(())
            }
            other => Err(other.reject("finish")),
        }
    }

    /// Valid from any state.
    pub fn stop(&mut self) {
        *self = Self::Stopped;
    }
}
