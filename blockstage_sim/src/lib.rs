//! BlockStage deterministic simulation harness.
//!
//! Runs block programs on tokio's paused clock: every sleep resolves
//! instantly in wall time, yet agents interleave exactly as they would on
//! a real stage. The same seed always yields the same frames.
//!
//! # Usage
//!
//! ```ignore
//! use blockstage_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::RobotManual)?;
//! assert!(result.passed);
//! ```

mod context;
mod exporter;
mod fuzz;
mod runner;
mod stage_file;
pub mod scenarios;

pub use context::SimContext;
pub use exporter::{BridgeMessage, FrameRecorder, SimExport, SimFrame, ACTIVITY_SCORE};
pub use fuzz::{random_forest, FuzzShape};
pub use runner::{AgentSummary, RunnerError, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use stage_file::{PreparedAgent, PreparedStage, StageAgent, StageFile, StageFileError};
