//! Execution Coordinator - runs every agent of a session concurrently.
//!
//! # Session lifecycle
//!
//! ```text
//!  run_session ──► reset all agents ──► spawn one task per agent ──┐
//!                                                                  │ (interleave at
//!                                                                  │  suspension points)
//!  report ◄── fire completion once ◄── evaluate goal ◄── join ALL ◄┘
//! ```
//!
//! Each task owns its agent's state outright; the only shared data is the
//! read-only program, the goal and the config. The join is a full barrier:
//! one slow agent holds back the session result, and completion order
//! across agents never changes the outcome.
//!
//! A failing agent (invalid operand, even a panic) only fails its own
//! branch and is reported as not reached.

use crate::config::EngineConfig;
use crate::effects::{CompletionEvent, CompletionSink, EffectSink, NullSink};
use crate::error::SessionError;
use crate::interpreter::{Interpreter, RunFlag, RunStats, RunStatus};
use crate::program::Program;
use crate::stage::{AgentState, GoalRegion};
use blockstage_env::{AgentId, StageContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Aggregate outcome of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResult {
    pub reached_count: usize,
    pub total_agents: usize,
    pub all_reached: bool,
}

/// How one agent's branch ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentStatus {
    Completed,
    Cancelled,
    Failed { reason: String },
}

/// Per-agent result after the join.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentOutcome {
    pub status: AgentStatus,

    /// State when the branch ended (the reset state if it panicked)
    pub final_state: AgentState,

    /// Final position is inside the goal and the branch did not fail
    pub reached: bool,

    pub stats: RunStats,
}

/// Transient aggregate for one run; discarded once reported.
#[derive(Debug)]
pub struct ExecutionSession {
    id: Uuid,
    flag: RunFlag,
    started: Duration,
    outcomes: BTreeMap<AgentId, AgentOutcome>,
    completion_fired: bool,
}

impl ExecutionSession {
    fn new(started: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            flag: RunFlag::new(),
            started,
            outcomes: BTreeMap::new(),
            completion_fired: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_running(&self) -> bool {
        self.flag.is_running()
    }

    /// Aggregate over the collected outcomes.
    pub fn result(&self) -> SessionResult {
        let total_agents = self.outcomes.len();
        let reached_count = self.outcomes.values().filter(|o| o.reached).count();
        SessionResult {
            reached_count,
            total_agents,
            all_reached: total_agents > 0 && reached_count == total_agents,
        }
    }

    /// Fires the completion event if every agent reached the goal.
    ///
    /// Idempotent: returns true only the first time it actually fires.
    pub fn signal_completion(&mut self, sink: &dyn CompletionSink, elapsed: Duration) -> bool {
        let result = self.result();
        if !result.all_reached || self.completion_fired {
            return false;
        }
        self.completion_fired = true;
        sink.on_complete(&CompletionEvent {
            reached_count: result.reached_count,
            total_agents: result.total_agents,
            elapsed_seconds: elapsed.as_secs_f64(),
        });
        true
    }

    fn into_report(self, elapsed: Duration) -> SessionReport {
        SessionReport {
            session_id: self.id,
            result: self.result(),
            elapsed_seconds: elapsed.as_secs_f64(),
            completion_fired: self.completion_fired,
            agents: self.outcomes,
        }
    }
}

/// What `run_session` hands back once every agent has settled.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub result: SessionResult,
    pub elapsed_seconds: f64,
    pub completion_fired: bool,
    pub agents: BTreeMap<AgentId, AgentOutcome>,
}

impl SessionReport {
    pub fn outcome(&self, agent_id: AgentId) -> Option<&AgentOutcome> {
        self.agents.get(&agent_id)
    }
}

/// Clears the in-flight marker however `run_session` exits.
///
/// If the session future is dropped before the join, every branch is
/// aborted first so no stale snapshot reaches the next session.
struct InFlight<'a> {
    busy: &'a AtomicBool,
    active: &'a Mutex<Option<RunFlag>>,
    branches: Vec<AbortHandle>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(flag) = active.take() {
            flag.stop();
        }
        for branch in self.branches.drain(..) {
            branch.abort();
        }
        self.busy.store(false, Ordering::Release);
    }
}

/// Runs sessions, one at a time.
pub struct ExecutionCoordinator<Ctx: StageContext> {
    context: Arc<Ctx>,
    config: Arc<EngineConfig>,
    effects: Arc<dyn EffectSink>,
    completion: Arc<dyn CompletionSink>,
    busy: AtomicBool,
    active: Mutex<Option<RunFlag>>,
}

impl<Ctx: StageContext> ExecutionCoordinator<Ctx> {
    /// Creates a coordinator with no-op sinks.
    pub fn new(context: Arc<Ctx>, config: EngineConfig) -> Self {
        Self {
            context,
            config: Arc::new(config),
            effects: Arc::new(NullSink),
            completion: Arc::new(NullSink),
            busy: AtomicBool::new(false),
            active: Mutex::new(None),
        }
    }

    /// Streams every agent's snapshots to `sink`.
    pub fn with_effects(mut self, sink: Arc<dyn EffectSink>) -> Self {
        self.effects = sink;
        self
    }

    /// Sends the completion event to `sink`.
    pub fn with_completion(mut self, sink: Arc<dyn CompletionSink>) -> Self {
        self.completion = sink;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// True while a session is in flight.
    pub fn is_running(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Asks the in-flight session to stop at the next step boundary.
    ///
    /// Returns false if nothing was running. The session still has to
    /// settle before a new one can start.
    pub fn cancel(&self) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match active.as_ref() {
            Some(flag) => {
                info!("cancelling running session");
                flag.stop();
                true
            }
            None => false,
        }
    }

    /// Runs one session to completion.
    ///
    /// Agents listed in `initial_states` without a program stand still
    /// and are still evaluated against `goal`.
    pub async fn run_session(
        &self,
        mut programs: BTreeMap<AgentId, Program>,
        initial_states: &BTreeMap<AgentId, AgentState>,
        goal: &GoalRegion,
    ) -> Result<SessionReport, SessionError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::AlreadyRunning);
        }
        let mut in_flight = InFlight {
            busy: &self.busy,
            active: &self.active,
            branches: Vec::with_capacity(initial_states.len()),
        };

        if let Some(orphan) = programs.keys().find(|id| !initial_states.contains_key(*id)) {
            return Err(SessionError::MissingInitialState(*orphan));
        }

        let mut session = ExecutionSession::new(self.context.now());
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.flag.clone());

        let config = Arc::new(EngineConfig {
            goal: goal.clone(),
            ..(*self.config).clone()
        });

        info!(
            "session {} starting: {} agent(s), seed {}",
            session.id,
            initial_states.len(),
            self.context.seed()
        );

        let mut branches = Vec::with_capacity(initial_states.len());
        for (agent_id, spawn) in initial_states {
            let mut state = spawn.reset();
            state.observe_goal(goal);
            let reset = state.clone();

            let program = programs.remove(agent_id).unwrap_or_default();
            let mut interpreter = Interpreter::new(
                *agent_id,
                self.context.clone(),
                config.clone(),
                self.effects.clone(),
            )
            .with_run_flag(session.flag.clone());

            let handle = tokio::spawn(async move {
                let status = interpreter.run(&program, &mut state).await;
                (state, status, interpreter.stats().clone())
            });
            in_flight.branches.push(handle.abort_handle());
            branches.push((*agent_id, reset, handle));
        }

        // Join barrier: every branch settles before anything is evaluated
        for (agent_id, reset, handle) in branches {
            let (final_state, status, stats) = match handle.await {
                Ok((state, Ok(RunStatus::Completed), stats)) => (state, AgentStatus::Completed, stats),
                Ok((state, Ok(RunStatus::Cancelled), stats)) => (state, AgentStatus::Cancelled, stats),
                Ok((state, Err(e), stats)) => {
                    warn!("agent {} failed: {}", agent_id, e);
                    let reason = e.to_string();
                    (state, AgentStatus::Failed { reason }, stats)
                }
                Err(e) => {
                    warn!("agent {} aborted: {}", agent_id, e);
                    let reason = format!("task aborted: {}", e);
                    (reset, AgentStatus::Failed { reason }, RunStats::default())
                }
            };

            let reached =
                !matches!(status, AgentStatus::Failed { .. }) && goal.contains(&final_state.pose);

            session.outcomes.insert(
                agent_id,
                AgentOutcome {
                    status,
                    final_state,
                    reached,
                    stats,
                },
            );
        }

        let elapsed = self.context.now().saturating_sub(session.started);
        let result = session.result();
        if session.signal_completion(self.completion.as_ref(), elapsed) {
            info!("session {}: all {} agent(s) reached the goal", session.id, result.total_agents);
        }

        info!(
            "session {} finished in {:.2}s: {}/{} reached",
            session.id,
            elapsed.as_secs_f64(),
            result.reached_count,
            result.total_agents
        );

        Ok(session.into_report(elapsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{RecordingCompletions, RecordingSink, Snapshot};
    use crate::program::Instruction;
    use crate::stage::{Cardinal, Cell, Pose};
    use blockstage_env::TokioContext;

    fn id(i: u64) -> AgentId {
        AgentId::from_index(i)
    }

    fn prog(instructions: Vec<Instruction>) -> Program {
        Program::from(instructions)
    }

    fn mv(distance: f64) -> Instruction {
        Instruction::Move { distance }
    }

    fn right() -> Instruction {
        Instruction::TurnRight { degrees: 90.0 }
    }

    fn goal() -> GoalRegion {
        GoalRegion::Cell { col: 7, row: 6 }
    }

    /// The four robot-manual sprites and a solution for each.
    fn robot_manual() -> (BTreeMap<AgentId, AgentState>, BTreeMap<AgentId, Program>) {
        let states = BTreeMap::from([
            (id(0), AgentState::grid(0, 8, Cardinal::East)),
            (id(1), AgentState::grid(1, 0, Cardinal::North)),
            (id(2), AgentState::grid(7, 0, Cardinal::North)),
            (id(3), AgentState::grid(9, 9, Cardinal::South)),
        ]);
        let programs = BTreeMap::from([
            (id(0), prog(vec![mv(7.0), right(), mv(2.0)])),
            (id(1), prog(vec![mv(6.0), right(), mv(6.0)])),
            (id(2), prog(vec![mv(6.0)])),
            (id(3), prog(vec![mv(3.0), right(), mv(2.0)])),
        ]);
        (states, programs)
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_agents_reach_goal_concurrently() {
        let completions = Arc::new(RecordingCompletions::new());
        let coordinator = ExecutionCoordinator::new(TokioContext::shared(), EngineConfig::grid())
            .with_completion(completions.clone());
        let (states, programs) = robot_manual();

        let report = coordinator.run_session(programs, &states, &goal()).await.unwrap();

        assert_eq!(
            report.result,
            SessionResult {
                reached_count: 4,
                total_agents: 4,
                all_reached: true
            }
        );
        assert!(report.completion_fired);
        assert_eq!(completions.count(), 1);
        assert_eq!(completions.events()[0].total_agents, 4);

        // Longest branch is 12 steps + 1 turn (3.528 s); sequential would be ~9.6 s
        assert!(report.elapsed_seconds >= 3.5);
        assert!(report.elapsed_seconds < 4.0);
        assert!(!coordinator.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_agent_is_isolated() {
        let completions = Arc::new(RecordingCompletions::new());
        let coordinator = ExecutionCoordinator::new(TokioContext::shared(), EngineConfig::grid())
            .with_completion(completions.clone());
        let states = BTreeMap::from([
            (id(0), AgentState::grid(0, 0, Cardinal::North)),
            (id(1), AgentState::grid(7, 0, Cardinal::North)),
        ]);
        let programs = BTreeMap::from([
            (id(0), prog(vec![mv(1.0), mv(f64::INFINITY), mv(1.0)])),
            (id(1), prog(vec![mv(6.0)])),
        ]);

        let report = coordinator.run_session(programs, &states, &goal()).await.unwrap();

        assert_eq!(
            report.result,
            SessionResult {
                reached_count: 1,
                total_agents: 2,
                all_reached: false
            }
        );
        let failed = report.outcome(id(0)).unwrap();
        assert!(matches!(failed.status, AgentStatus::Failed { .. }));
        assert_eq!(failed.final_state.cell(), Some(Cell::new(0, 1)));
        assert!(!failed.reached);
        assert!(report.outcome(id(1)).unwrap().reached);
        assert_eq!(completions.count(), 0);
    }

    /// Panics whenever it sees the given agent.
    struct ExplodingSink {
        victim: AgentId,
        inner: RecordingSink,
    }

    impl EffectSink for ExplodingSink {
        fn emit(&self, snapshot: Snapshot) {
            if snapshot.agent_id == self.victim {
                panic!("presentation blew up");
            }
            self.inner.emit(snapshot);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_branch_is_isolated() {
        let sink = Arc::new(ExplodingSink {
            victim: id(0),
            inner: RecordingSink::new(),
        });
        let coordinator = ExecutionCoordinator::new(TokioContext::shared(), EngineConfig::grid())
            .with_effects(sink.clone());
        let states = BTreeMap::from([
            (id(0), AgentState::grid(7, 5, Cardinal::North)),
            (id(1), AgentState::grid(7, 0, Cardinal::North)),
        ]);
        let programs = BTreeMap::from([(id(0), prog(vec![mv(1.0)])), (id(1), prog(vec![mv(6.0)]))]);

        let report = coordinator.run_session(programs, &states, &goal()).await.unwrap();

        let crashed = report.outcome(id(0)).unwrap();
        assert!(matches!(crashed.status, AgentStatus::Failed { .. }));
        assert_eq!(crashed.final_state.cell(), Some(Cell::new(7, 5)));
        assert_eq!(report.result.reached_count, 1);
        assert_eq!(sink.inner.for_agent(id(1)).len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_session_rejected_until_settled() {
        let context = TokioContext::shared();
        let coordinator = Arc::new(ExecutionCoordinator::new(context.clone(), EngineConfig::grid()));
        let states = BTreeMap::from([(id(0), AgentState::grid(0, 0, Cardinal::North))]);
        let forever = prog(vec![Instruction::RepeatBounded {
            body: prog(vec![right()]),
            max_iterations: 100,
        }]);

        let first = {
            let coordinator = coordinator.clone();
            let states = states.clone();
            let programs = BTreeMap::from([(id(0), forever)]);
            tokio::spawn(async move { coordinator.run_session(programs, &states, &goal()).await })
        };

        context.sleep(Duration::from_millis(500)).await;
        assert!(coordinator.is_running());
        let rejected = coordinator
            .run_session(BTreeMap::new(), &states, &goal())
            .await
            .unwrap_err();
        assert_eq!(rejected, SessionError::AlreadyRunning);

        assert!(coordinator.cancel());
        let report = first.await.unwrap().unwrap();
        let outcome = report.outcome(id(0)).unwrap();
        assert_eq!(outcome.status, AgentStatus::Cancelled);
        assert!(outcome.stats.loop_iterations < 100);

        assert!(!coordinator.is_running());
        assert!(!coordinator.cancel());
        let again = coordinator.run_session(BTreeMap::new(), &states, &goal()).await;
        assert!(again.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_session_leaves_no_stragglers() {
        let sink = Arc::new(RecordingSink::new());
        let coordinator = ExecutionCoordinator::new(TokioContext::shared(), EngineConfig::grid())
            .with_effects(sink.clone());
        let states = BTreeMap::from([(id(0), AgentState::grid(0, 0, Cardinal::North))]);

        // Abandon the first session mid-Say
        let speech = BTreeMap::from([(
            id(0),
            prog(vec![Instruction::Say {
                text: "old".into(),
            }]),
        )]);
        let abandoned = tokio::time::timeout(
            Duration::from_millis(100),
            coordinator.run_session(speech, &states, &goal()),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(!coordinator.is_running());
        assert_eq!(sink.take().len(), 1);

        let programs = BTreeMap::from([(id(0), prog(vec![mv(9.0)]))]);
        let report = coordinator.run_session(programs, &states, &goal()).await.unwrap();

        // Let any surviving timer fire before inspecting the stream
        tokio::time::sleep(Duration::from_secs(5)).await;

        let rows: Vec<i32> = sink
            .take()
            .iter()
            .filter_map(|s| match s.pose {
                Pose::Grid { cell, .. } => Some(cell.row),
                _ => None,
            })
            .collect();
        assert_eq!(rows, (1..=9).collect::<Vec<_>>());
        assert_eq!(report.outcome(id(0)).unwrap().stats.snapshots, 9);
    }

    /// Wall clock that remembers whether its seed was read.
    #[derive(Default)]
    struct SeedWatch {
        inner: TokioContext,
        seed_read: AtomicBool,
    }

    #[async_trait::async_trait]
    impl StageContext for SeedWatch {
        fn now(&self) -> Duration {
            self.inner.now()
        }

        async fn sleep(&self, duration: Duration) {
            self.inner.sleep(duration).await
        }

        fn seed(&self) -> u64 {
            self.seed_read.store(true, Ordering::Release);
            99
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_start_reads_seed() {
        let context = Arc::new(SeedWatch::default());
        let coordinator = ExecutionCoordinator::new(context.clone(), EngineConfig::grid());
        let states = BTreeMap::from([(id(0), AgentState::grid(7, 6, Cardinal::North))]);

        coordinator
            .run_session(BTreeMap::new(), &states, &goal())
            .await
            .unwrap();

        assert!(context.seed_read.load(Ordering::Acquire));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_initial_state_rejected() {
        let coordinator = ExecutionCoordinator::new(TokioContext::shared(), EngineConfig::grid());
        let programs = BTreeMap::from([(id(5), prog(vec![mv(1.0)]))]);

        let err = coordinator
            .run_session(programs, &BTreeMap::new(), &goal())
            .await
            .unwrap_err();

        assert_eq!(err, SessionError::MissingInitialState(id(5)));
        assert!(!coordinator.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_agent_without_program_is_still_judged() {
        let coordinator = ExecutionCoordinator::new(TokioContext::shared(), EngineConfig::grid());
        let states = BTreeMap::from([
            (id(0), AgentState::grid(7, 6, Cardinal::North)),
            (id(1), AgentState::grid(0, 0, Cardinal::North)),
        ]);

        let report = coordinator
            .run_session(BTreeMap::new(), &states, &goal())
            .await
            .unwrap();

        assert_eq!(report.result.reached_count, 1);
        assert_eq!(report.result.total_agents, 2);
        assert!(report.outcome(id(0)).unwrap().final_state.goal_reached);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reached_means_final_position() {
        let coordinator = ExecutionCoordinator::new(TokioContext::shared(), EngineConfig::grid());
        let states = BTreeMap::from([(id(0), AgentState::grid(7, 4, Cardinal::North))]);
        // Passes through the goal and keeps going
        let programs = BTreeMap::from([(id(0), prog(vec![mv(3.0)]))]);

        let report = coordinator.run_session(programs, &states, &goal()).await.unwrap();

        let outcome = report.outcome(id(0)).unwrap();
        assert!(outcome.final_state.goal_reached);
        assert!(!outcome.reached);
        assert_eq!(report.result.reached_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_is_reset_between_sessions() {
        let coordinator = ExecutionCoordinator::new(TokioContext::shared(), EngineConfig::grid());
        let mut spawn = AgentState::grid(7, 0, Cardinal::North);
        spawn.goal_reached = true;
        spawn.message = Some("stale".into());
        let states = BTreeMap::from([(id(0), spawn)]);

        for _ in 0..2 {
            let programs = BTreeMap::from([(id(0), prog(vec![mv(6.0)]))]);
            let report = coordinator.run_session(programs, &states, &goal()).await.unwrap();
            let outcome = report.outcome(id(0)).unwrap();
            assert_eq!(outcome.final_state.cell(), Some(Cell::new(7, 6)));
            assert_eq!(outcome.final_state.message, None);
            assert_eq!(outcome.stats.snapshots, 6);
        }
    }

    #[test]
    fn test_completion_event_fires_once() {
        let completions = RecordingCompletions::new();
        let mut session = ExecutionSession::new(Duration::ZERO);
        session.outcomes.insert(
            id(0),
            AgentOutcome {
                status: AgentStatus::Completed,
                final_state: AgentState::grid(7, 6, Cardinal::North),
                reached: true,
                stats: RunStats::default(),
            },
        );

        assert!(session.signal_completion(&completions, Duration::from_secs(3)));
        assert!(!session.signal_completion(&completions, Duration::from_secs(4)));
        assert_eq!(completions.count(), 1);
        assert_eq!(completions.events()[0].elapsed_seconds, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_session() {
        let coordinator = ExecutionCoordinator::new(TokioContext::shared(), EngineConfig::grid());
        let report = coordinator
            .run_session(BTreeMap::new(), &BTreeMap::new(), &goal())
            .await
            .unwrap();

        assert_eq!(report.result.total_agents, 0);
        assert!(!report.result.all_reached);
        assert!(!report.completion_fired);
    }
}
