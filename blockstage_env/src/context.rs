//! Core environment context trait for BlockStage interpreters.

use async_trait::async_trait;
use std::time::Duration;

/// The central interface for Environment Interaction.
///
/// This trait abstracts the clock so that the interpreter can animate
/// against real time in production and against a virtual clock in
/// simulation and tests.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` - paused tokio clock, seeded
///
/// # Determinism
///
/// Under a paused clock, `sleep()` returns as soon as every task is idle,
/// so a multi-second animation completes instantly and in a fixed order.
#[async_trait]
pub trait StageContext: Send + Sync + 'static {
    /// Returns the monotonic time since context creation.
    ///
    /// Used to stamp `elapsed_seconds` on completion events.
    fn now(&self) -> Duration;

    /// Suspends the calling agent for the given duration.
    ///
    /// Other agents keep running while this one is suspended.
    async fn sleep(&self, duration: Duration);

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    /// In simulation, returns the master seed.
    fn seed(&self) -> u64;
}
