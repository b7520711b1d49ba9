//! BlockStage Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction that lets the BlockStage
//! interpreter run in both **Production** (tokio wall clock) and
//! **Simulation** (paused virtual clock) environments.
//!
//! # Core Concept: Suspension Points
//!
//! Every instruction that "takes time" (a grid step, a turn, a wait, a
//! speech bubble) suspends through the context instead of calling tokio
//! directly:
//! - Time (`now()`, `sleep()`)
//! - Identity (`seed()` for reproducible runs)
//!
//! Because all agents share one cooperative scheduler, these suspension
//! points are where concurrent agents interleave.
//!
//! # Example
//!
//! ```ignore
//! use blockstage_env::StageContext;
//!
//! async fn step_loop<Ctx: StageContext>(ctx: &Ctx) {
//!     for _ in 0..3 {
//!         advance_one_cell();
//!         ctx.sleep(Duration::from_millis(280)).await;
//!     }
//! }
//! ```

mod context;
mod types;
mod tokio_impl;

pub use context::StageContext;
pub use types::AgentId;
pub use tokio_impl::TokioContext;
