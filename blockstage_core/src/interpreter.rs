//! Interpreter - runs one Program against one Agent State.
//!
//! # Suspension model
//!
//! Every instruction that takes time suspends through the
//! [`StageContext`], never by blocking:
//!
//! ```text
//! Move(3) on a grid     step ─ emit ─ sleep(step) ─ step ─ emit ─ sleep ─ ...
//! Move(d) on a canvas   sleep(frame) ─ ease ─ emit ─ sleep(frame) ─ ... (one glide)
//! Turn                  rotate ─ emit ─ sleep(turn)       (grid)
//! Wait(s)               sleep(s) ─ emit
//! Say(t)                show ─ emit ─ sleep(say) ─ hide ─ emit
//! ```
//!
//! Concurrent agents interleave at exactly these points.
//!
//! # Cancellation
//!
//! The [`RunFlag`] is read at step boundaries. Once it is cleared the
//! interpreter finishes the step in flight and returns the state as it
//! stands; nothing is rolled back.

use crate::config::EngineConfig;
use crate::effects::{EffectSink, Snapshot};
use crate::error::ExecError;
use crate::guard::SafetyGuard;
use crate::program::{Instruction, Program};
use crate::stage::{AgentState, Cell, Pose};
use blockstage_env::{AgentId, StageContext};
use nalgebra::Vector2;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Ease-out cubic: `1 - (1 - t)^3`, with `t` clamped to `[0, 1]`.
pub fn ease_out(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

/// Shared "keep running" flag, cleared to cancel cooperatively.
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    /// A flag in the running state.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Requests a stop; observed at the next step boundary.
    pub fn stop(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

/// Counters collected while interpreting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Instructions started
    pub instructions: u64,
    /// Snapshots emitted
    pub snapshots: u64,
    /// Loop body executions, all loops combined
    pub loop_iterations: u64,
    /// Loops cut short by the safety guard
    pub truncated_loops: u32,
}

/// Interpreter for a single agent.
pub struct Interpreter<Ctx: StageContext> {
    agent_id: AgentId,
    context: Arc<Ctx>,
    config: Arc<EngineConfig>,
    sink: Arc<dyn EffectSink>,
    flag: RunFlag,
    guard: SafetyGuard,
    stats: RunStats,
}

impl<Ctx: StageContext> Interpreter<Ctx> {
    /// Creates an interpreter that streams snapshots to `sink`.
    pub fn new(
        agent_id: AgentId,
        context: Arc<Ctx>,
        config: Arc<EngineConfig>,
        sink: Arc<dyn EffectSink>,
    ) -> Self {
        let guard = config.guard();
        Self {
            agent_id,
            context,
            config,
            sink,
            flag: RunFlag::new(),
            guard,
            stats: RunStats::default(),
        }
    }

    /// Uses an externally owned run flag (the session's).
    pub fn with_run_flag(mut self, flag: RunFlag) -> Self {
        self.flag = flag;
        self
    }

    pub fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Runs `program` to completion (or cancellation), mutating `state`.
    ///
    /// On error the state keeps whatever progress was made before the
    /// failing instruction.
    pub async fn run(
        &mut self,
        program: &Program,
        state: &mut AgentState,
    ) -> Result<RunStatus, ExecError> {
        if state.pose.mode() != self.config.playfield.mode() {
            return Err(ExecError::PlayfieldMismatch {
                pose: state.pose.mode(),
                playfield: self.config.playfield.mode(),
            });
        }

        state.observe_goal(&self.config.goal);
        let status = self.run_block(program, state).await?;

        debug!(
            "agent {} finished ({:?}): {} instructions, {} snapshots",
            self.agent_id, status, self.stats.instructions, self.stats.snapshots
        );
        Ok(status)
    }

    fn run_block<'a>(
        &'a mut self,
        program: &'a Program,
        state: &'a mut AgentState,
    ) -> BoxFuture<'a, Result<RunStatus, ExecError>> {
        Box::pin(async move {
            for instruction in program {
                if !self.flag.is_running() {
                    return Ok(RunStatus::Cancelled);
                }
                if self.execute(instruction, state).await? == RunStatus::Cancelled {
                    return Ok(RunStatus::Cancelled);
                }
            }
            Ok(RunStatus::Completed)
        })
    }

    async fn execute(
        &mut self,
        instruction: &Instruction,
        state: &mut AgentState,
    ) -> Result<RunStatus, ExecError> {
        self.stats.instructions += 1;
        debug!("agent {} -> {}", self.agent_id, instruction.name());

        match instruction {
            Instruction::Move { distance } => {
                let distance = operand("move", *distance)?;
                if matches!(state.pose, Pose::Grid { .. }) {
                    self.step_cells(distance, state).await
                } else {
                    self.glide(distance, state).await
                }
            }

            Instruction::TurnRight { degrees } => {
                let degrees = operand("turn_right", *degrees)?;
                self.turn(degrees, state).await
            }

            Instruction::TurnLeft { degrees } => {
                let degrees = operand("turn_left", *degrees)?;
                self.turn(-degrees, state).await
            }

            Instruction::Wait { seconds } => {
                let seconds = operand("wait", *seconds)?;
                let pause = Duration::try_from_secs_f64(seconds).map_err(|_| {
                    ExecError::InvalidOperand {
                        instruction: "wait",
                        value: seconds,
                    }
                })?;
                self.context.sleep(pause).await;
                self.emit(state);
                Ok(RunStatus::Completed)
            }

            Instruction::Say { text } => {
                state.message = Some(text.clone());
                self.emit(state);
                self.context.sleep(self.config.say_duration()).await;
                state.message = None;
                self.emit(state);
                Ok(RunStatus::Completed)
            }

            Instruction::Repeat { count, body } => {
                if self.guard.truncates(*count) {
                    warn!(
                        "agent {}: repeat {} exceeds ceiling, running {}",
                        self.agent_id,
                        count,
                        self.guard.ceiling()
                    );
                    self.stats.truncated_loops += 1;
                }
                self.repeat(self.guard.bound(*count), body, state).await
            }

            Instruction::RepeatBounded {
                body,
                max_iterations,
            } => {
                let iterations = self.guard.bound(*max_iterations);
                info!(
                    "agent {}: forever loop truncated to {} iterations",
                    self.agent_id, iterations
                );
                self.stats.truncated_loops += 1;
                self.repeat(iterations, body, state).await
            }

            Instruction::IfGoalReached { body } => {
                if state.goal_reached {
                    self.run_block(body, state).await
                } else {
                    Ok(RunStatus::Completed)
                }
            }
        }
    }

    async fn repeat(
        &mut self,
        iterations: u32,
        body: &Program,
        state: &mut AgentState,
    ) -> Result<RunStatus, ExecError> {
        for _ in 0..iterations {
            self.stats.loop_iterations += 1;
            if self.run_block(body, state).await? == RunStatus::Cancelled {
                return Ok(RunStatus::Cancelled);
            }
        }
        Ok(RunStatus::Completed)
    }

    /// Grid move: one cell per step, clamped, one snapshot per step.
    async fn step_cells(
        &mut self,
        distance: f64,
        state: &mut AgentState,
    ) -> Result<RunStatus, ExecError> {
        let steps = distance.round() as u64;

        for step in 0..steps {
            if step > 0 && !self.flag.is_running() {
                return Ok(RunStatus::Cancelled);
            }

            if let Pose::Grid { cell, heading } = &mut state.pose {
                let (d_col, d_row) = heading.unit();
                *cell = self
                    .config
                    .playfield
                    .clamp_cell(Cell::new(cell.col + d_col, cell.row + d_row));
            }
            state.observe_goal(&self.config.goal);
            self.emit(state);
            self.context.sleep(self.config.step_interval()).await;
        }
        Ok(RunStatus::Completed)
    }

    /// Canvas move: target clamped once, then eased over the glide duration.
    async fn glide(
        &mut self,
        distance: f64,
        state: &mut AgentState,
    ) -> Result<RunStatus, ExecError> {
        let Pose::Canvas { position, rotation } = state.pose.clone() else {
            return Ok(RunStatus::Completed);
        };

        let radians = (rotation - 90.0).to_radians();
        let heading = Vector2::new(radians.cos(), radians.sin());
        let raw_target = position + heading * distance * self.config.unit_step_pixels;
        let target = self.config.playfield.clamp_point(raw_target);

        let duration = self.config.glide_duration();
        self.animate(duration, state, move |eased, pose| {
            if let Pose::Canvas { position: p, .. } = pose {
                *p = position + (target - position) * eased;
            }
        })
        .await;
        Ok(RunStatus::Completed)
    }

    /// Grid: snap to cardinal, one snapshot, pause. Canvas: eased rotation.
    async fn turn(&mut self, degrees: f64, state: &mut AgentState) -> Result<RunStatus, ExecError> {
        match &mut state.pose {
            Pose::Grid { heading, .. } => {
                let quarter_turns = (degrees / 90.0).round() as i64;
                if degrees % 90.0 != 0.0 {
                    warn!(
                        "agent {}: grid turn of {} degrees snapped to {}",
                        self.agent_id,
                        degrees,
                        quarter_turns * 90
                    );
                }
                *heading = heading.rotate(quarter_turns);
                self.emit(state);
                self.context.sleep(self.config.turn_duration()).await;
            }
            Pose::Canvas { rotation, .. } => {
                let start = *rotation;
                let duration = self.config.turn_duration();
                self.animate(duration, state, move |eased, pose| {
                    if let Pose::Canvas { rotation: r, .. } = pose {
                        *r = start + degrees * eased;
                    }
                })
                .await;
            }
        }
        Ok(RunStatus::Completed)
    }

    /// Frame-by-frame interpolation. `apply` receives the eased progress.
    async fn animate<F>(&mut self, duration: Duration, state: &mut AgentState, apply: F)
    where
        F: Fn(f64, &mut Pose) + Send,
    {
        let frames = self.config.frames_for(duration);
        let frame = self.config.frame_interval();

        for i in 1..=frames {
            self.context.sleep(frame).await;
            apply(ease_out(i as f64 / frames as f64), &mut state.pose);
            state.observe_goal(&self.config.goal);
            self.emit(state);
        }
    }

    fn emit(&mut self, state: &AgentState) {
        self.stats.snapshots += 1;
        self.sink.emit(Snapshot::of(self.agent_id, state));
    }
}

/// Rejects NaN, infinite and negative operands.
fn operand(instruction: &'static str, value: f64) -> Result<f64, ExecError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ExecError::InvalidOperand { instruction, value })
    }
}
