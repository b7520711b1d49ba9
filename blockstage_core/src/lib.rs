//! BlockStage Core - block programs to concurrent agent motion.
//!
//! The pipeline has three stages:
//! 1. **Compile**: a visual block tree becomes a flat, bounded [`Program`]
//!    ([`compiler`]). Malformed input is repaired, never rejected.
//! 2. **Interpret**: one [`Interpreter`] per agent steps its [`AgentState`]
//!    through time, emitting a [`Snapshot`] after every visible change.
//! 3. **Coordinate**: the [`ExecutionCoordinator`] runs every agent at
//!    once, joins them all and decides whether the session succeeded.
//!
//! Time is injected through [`blockstage_env::StageContext`], so the same
//! engine runs on a wall clock or on a paused deterministic one.

pub mod blocks;
pub mod compiler;
pub mod config;
pub mod coordinator;
pub mod effects;
pub mod error;
pub mod guard;
pub mod interpreter;
pub mod program;
pub mod stage;

// Re-export key types for convenience
pub use blocks::{BlockKind, BlockNode, FieldValue};
pub use compiler::{compile, Compilation, Compiler};
pub use config::EngineConfig;
pub use coordinator::{
    AgentOutcome, AgentStatus, ExecutionCoordinator, ExecutionSession, SessionReport, SessionResult,
};
pub use effects::{
    ChannelSink, CompletionEvent, CompletionSink, EffectSink, NullSink, RecordingCompletions,
    RecordingSink, Snapshot,
};
pub use error::{BlockPath, CompileWarning, ExecError, SessionError};
pub use guard::SafetyGuard;
pub use interpreter::{Interpreter, RunFlag, RunStats, RunStatus};
pub use program::{Instruction, Program};
pub use stage::{AgentState, Cardinal, Cell, GoalRegion, Playfield, Pose};
