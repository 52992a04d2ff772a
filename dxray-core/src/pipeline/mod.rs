//! Pipeline orchestration.
//!
//! | Module       | Purpose                                                 |
//! |--------------|---------------------------------------------------------|
//! | `state`      | `PipelineState` transitions                             |
//! | `progress`   | `Progress` snapshots and `RunOutcome`                   |
//! | `config`     | `PipelineConfig`, `PayloadMode`                         |
//! | `processor`  | `LineProcessor`: calculator + assembler, live feed loop |
//! | `controller` | `PipelineController`: load/start/pause/stop drive loop  |

pub mod config;
pub mod controller;
pub mod processor;
pub mod progress;
pub mod state;

pub use config::{PayloadMode, PipelineConfig};
pub use controller::PipelineController;
pub use processor::{FeedSummary, LineProcessor, SharedCalibration, shared_calibration};
pub use progress::{Progress, RunOutcome};
pub use state::PipelineState;
