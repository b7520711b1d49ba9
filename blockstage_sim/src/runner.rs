//! Scenario runner - compiles a stage and runs it on the virtual clock.

use crate::context::SimContext;
use crate::exporter::{BridgeMessage, FrameRecorder, SimExport, SimFrame};
use crate::scenarios::ScenarioId;
use crate::stage_file::{PreparedStage, StageFile, StageFileError};

use blockstage_core::{
    AgentStatus, EngineConfig, ExecutionCoordinator, Playfield, Pose, RecordingCompletions,
    SessionError, SessionReport, SessionResult, Snapshot,
};
use blockstage_env::AgentId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that stop a scenario before it produces a result.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Stage(#[from] StageFileError),

    #[error("failed to build simulation runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Final view of one agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub name: String,
    #[serde(flatten)]
    pub status: AgentStatus,
    pub final_pose: Pose,
    pub reached: bool,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Instructions started, all agents
    pub instructions: u64,

    /// Snapshots emitted, all agents
    pub snapshots: u64,

    /// Loop iterations run, all agents
    pub loop_iterations: u64,

    /// Loops cut short by the safety ceiling
    pub truncated_loops: u32,

    /// Compiler repairs across all programs
    pub compile_warnings: usize,

    /// Agents whose branch failed
    pub failed_agents: usize,
}

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario or stage that was run
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Virtual session time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    pub session: SessionResult,

    /// Bridge message, present only when every agent reached the goal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<BridgeMessage>,

    pub agents: Vec<AgentSummary>,

    pub metrics: ScenarioMetrics,

    /// Frame-by-frame recording
    #[serde(skip)]
    pub export: SimExport,
}

/// Runs scenarios and stage files.
pub struct ScenarioRunner {
    /// Master seed
    seed: u64,

    /// Number of agents for generated scenarios
    num_agents: usize,

    /// Replaces a stage file's own config
    config: Option<EngineConfig>,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            num_agents: 4,
            config: None,
        }
    }

    /// Sets the agent count for generated scenarios.
    pub fn with_agents(mut self, num_agents: usize) -> Self {
        self.num_agents = num_agents;
        self
    }

    /// Overrides the config of stage files run by [`Self::run_stage`].
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Runs a built-in scenario and checks its expectations.
    pub fn run(&self, scenario: ScenarioId) -> Result<ScenarioResult, RunnerError> {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let stage = scenario.stage(self.seed, self.num_agents)?;
        let initial: Vec<Pose> = stage.agents.iter().map(|a| a.state.pose.clone()).collect();
        let mut result = self.execute(scenario.name(), stage)?;

        let verdict = check(scenario, &result, &initial);
        result.passed = verdict.is_ok();
        result.failure_reason = verdict.err();
        result.export.passed = result.passed;

        log_result(&result);
        Ok(result)
    }

    /// Runs a stage file; it passes when every agent reaches the goal.
    pub fn run_stage(&self, name: &str, stage: &StageFile) -> Result<ScenarioResult, RunnerError> {
        info!("Starting stage: {} ({} agent(s))", name, stage.agents.len());

        let prepared = stage.prepare(self.config.as_ref())?;
        let mut result = self.execute(name, prepared)?;

        if !result.session.all_reached {
            result.passed = false;
            result.failure_reason = Some(format!(
                "{}/{} agents reached the goal",
                result.session.reached_count, result.session.total_agents
            ));
        }
        result.export.passed = result.passed;

        log_result(&result);
        Ok(result)
    }

    fn execute(&self, name: &str, stage: PreparedStage) -> Result<ScenarioResult, RunnerError> {
        let runtime = SimContext::runtime()?;
        let completions = Arc::new(RecordingCompletions::new());

        let (report, frames) = runtime.block_on(async {
            let context = SimContext::shared(self.seed);
            let recorder = Arc::new(FrameRecorder::new(context.clone()));
            let coordinator = ExecutionCoordinator::new(context, stage.config.clone())
                .with_effects(recorder.clone())
                .with_completion(completions.clone());

            let initial = stage
                .agents
                .iter()
                .map(|a| (a.id, a.state.clone()))
                .collect::<BTreeMap<_, _>>();
            let programs = stage
                .agents
                .iter()
                .map(|a| (a.id, a.program.clone()))
                .collect::<BTreeMap<_, _>>();

            let report = coordinator
                .run_session(programs, &initial, &stage.config.goal)
                .await?;
            Ok::<_, RunnerError>((report, recorder.take()))
        })?;

        let completion = completions.events().first().map(BridgeMessage::from);
        Ok(self.summarize(name, &stage, report, frames, completion))
    }

    fn summarize(
        &self,
        name: &str,
        stage: &PreparedStage,
        report: SessionReport,
        frames: Vec<(f64, Snapshot)>,
        completion: Option<BridgeMessage>,
    ) -> ScenarioResult {
        let names: BTreeMap<_, _> = stage.agents.iter().map(|a| (a.id, a.name.as_str())).collect();
        let display = |id: AgentId| names.get(&id).copied().unwrap_or("?").to_string();

        let mut metrics = ScenarioMetrics {
            compile_warnings: stage.warning_count(),
            ..Default::default()
        };
        // Stage order, not id order, so summaries line up with the file
        let mut agents = Vec::with_capacity(report.agents.len());
        for (id, outcome) in stage.agents.iter().filter_map(|a| report.outcome(a.id).map(|o| (a.id, o))) {
            metrics.instructions += outcome.stats.instructions;
            metrics.snapshots += outcome.stats.snapshots;
            metrics.loop_iterations += outcome.stats.loop_iterations;
            metrics.truncated_loops += outcome.stats.truncated_loops;
            if matches!(outcome.status, AgentStatus::Failed { .. }) {
                metrics.failed_agents += 1;
            }
            agents.push(AgentSummary {
                name: display(id),
                status: outcome.status.clone(),
                final_pose: outcome.final_state.pose.clone(),
                reached: outcome.reached,
            });
        }

        let mut export = SimExport::new(name, self.seed);
        for (time_sec, snapshot) in frames {
            export.add_frame(SimFrame {
                time_sec,
                agent: display(snapshot.agent_id),
                snapshot,
            });
        }
        export.finalize(report.result.all_reached, report.result, completion.clone());
        debug!("{}: {} frame(s) recorded", name, export.frames.len());

        ScenarioResult {
            scenario: name.to_string(),
            seed: self.seed,
            passed: true,
            final_time_secs: report.elapsed_seconds,
            failure_reason: None,
            session: report.result,
            completion,
            agents,
            metrics,
            export,
        }
    }
}

fn log_result(result: &ScenarioResult) {
    if result.passed {
        info!(
            "✓ {} passed ({}/{} reached, {:.2}s virtual)",
            result.scenario,
            result.session.reached_count,
            result.session.total_agents,
            result.final_time_secs
        );
    } else {
        warn!(
            "✗ {} failed: {}",
            result.scenario,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}

/// Scenario-specific expectations.
fn check(scenario: ScenarioId, result: &ScenarioResult, initial: &[Pose]) -> Result<(), String> {
    let session = &result.session;
    match scenario {
        ScenarioId::RobotManual | ScenarioId::CanvasGlide => {
            if !session.all_reached || result.completion.is_none() {
                return Err(format!(
                    "{}/{} agents reached the goal",
                    session.reached_count, session.total_agents
                ));
            }
        }

        ScenarioId::ClosedSquare => {
            let (Some(agent), Some(home)) = (result.agents.first(), initial.first()) else {
                return Err("no agent ran".to_string());
            };
            if agent.final_pose != *home {
                return Err(format!("ended at {:?}, started at {:?}", agent.final_pose, home));
            }
        }

        ScenarioId::ForeverLoop => {
            let metrics = &result.metrics;
            if metrics.loop_iterations != 100 || metrics.truncated_loops != 1 {
                return Err(format!(
                    "{} iterations, {} truncated loop(s)",
                    metrics.loop_iterations, metrics.truncated_loops
                ));
            }
        }

        ScenarioId::FaultIsolation => {
            let faulty = result.agents.first().map(|a| &a.status);
            let faulty_failed = matches!(faulty, Some(AgentStatus::Failed { .. }));
            if !faulty_failed || session.reached_count != 1 || session.all_reached {
                return Err(format!(
                    "faulty agent {:?}, {}/{} reached",
                    faulty, session.reached_count, session.total_agents
                ));
            }
        }

        ScenarioId::RandomWalk => {
            if session.reached_count > session.total_agents {
                return Err("reached count exceeds agent count".to_string());
            }
            if result.metrics.failed_agents > 0 {
                return Err(format!("{} agent(s) failed", result.metrics.failed_agents));
            }
            if let Some(frame) = result
                .export
                .frames
                .iter()
                .find(|f| !on_board(&f.snapshot.pose))
            {
                return Err(format!("{} left the board: {:?}", frame.agent, frame.snapshot.pose));
            }
        }
    }
    Ok(())
}

fn on_board(pose: &Pose) -> bool {
    let board = EngineConfig::grid().playfield;
    match (pose, board) {
        (Pose::Grid { cell, .. }, Playfield::Grid { columns, rows }) => {
            (0..columns as i32).contains(&cell.col) && (0..rows as i32).contains(&cell.row)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockstage_core::{BlockNode, Cardinal, Cell};

    #[test]
    fn test_builtin_scenarios_pass() {
        let runner = ScenarioRunner::new(42).with_agents(3);
        for scenario in ScenarioId::all() {
            let result = runner.run(scenario).unwrap();
            assert!(result.passed, "{}: {:?}", scenario, result.failure_reason);
        }
    }

    #[test]
    fn test_robot_manual_completion_payload() {
        let result = ScenarioRunner::new(1).run(ScenarioId::RobotManual).unwrap();

        assert_eq!(result.session.reached_count, 4);
        // Longest sprite: 12 steps and one turn
        assert!(result.final_time_secs >= 3.5 && result.final_time_secs < 4.0);
        assert_eq!(
            result.completion,
            Some(BridgeMessage::ActivityComplete {
                score: 50,
                time_spent: 4
            })
        );
        assert_eq!(result.export.frames.len() as u64, result.metrics.snapshots);
    }

    #[test]
    fn test_random_walk_many_seeds() {
        for seed in 0..20 {
            let result = ScenarioRunner::new(seed)
                .with_agents(5)
                .run(ScenarioId::RandomWalk)
                .unwrap();
            assert!(result.passed, "seed {}: {:?}", seed, result.failure_reason);
            assert_eq!(result.session.total_agents, 5);
        }
    }

    #[test]
    fn test_same_seed_same_run() {
        let runner = ScenarioRunner::new(7).with_agents(4);
        let a = runner.run(ScenarioId::RandomWalk).unwrap();
        let b = runner.run(ScenarioId::RandomWalk).unwrap();

        let poses = |r: &ScenarioResult| r.agents.iter().map(|a| a.final_pose.clone()).collect::<Vec<_>>();
        assert_eq!(poses(&a), poses(&b));
        assert_eq!(a.export.frames.len(), b.export.frames.len());
        assert_eq!(a.final_time_secs, b.final_time_secs);
    }

    #[test]
    fn test_stage_short_of_goal_fails() {
        let mut stage = StageFile::robot_manual();
        stage.agents[2].blocks = vec![BlockNode::new("robot_maju").with_field("N", 2.0)];

        let result = ScenarioRunner::new(0).run_stage("short", &stage).unwrap();

        assert!(!result.passed);
        assert_eq!(result.session.reached_count, 3);
        assert!(result.completion.is_none());
        let hijau = &result.agents[2];
        assert_eq!(hijau.name, "Si Hijau");
        assert_eq!(
            hijau.final_pose,
            Pose::Grid {
                cell: Cell::new(7, 2),
                heading: Cardinal::North
            }
        );
    }

    #[test]
    fn test_config_override_applies_to_stage() {
        let stage = StageFile::robot_manual();
        let slow = EngineConfig::grid();
        let slow = EngineConfig {
            animation_step_ms: 1000,
            ..slow
        };

        let result = ScenarioRunner::new(0)
            .with_config(slow)
            .run_stage("slow", &stage)
            .unwrap();

        assert!(result.passed);
        assert!(result.final_time_secs >= 12.0);
    }
}
