//! Effect and completion sinks - the core's only outputs.
//!
//! Presentation consumes [`Snapshot`]s through an [`EffectSink`]; scoring
//! and logging consume one [`CompletionEvent`] per successful session
//! through a [`CompletionSink`]. Both directions are one-way: nothing a
//! sink does can feed back into execution.

use crate::stage::{AgentState, Pose};
use blockstage_env::AgentId;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// One observed agent state, tagged by agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub agent_id: AgentId,
    pub pose: Pose,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub goal_reached: bool,
}

impl Snapshot {
    pub fn of(agent_id: AgentId, state: &AgentState) -> Self {
        Self {
            agent_id,
            pose: state.pose.clone(),
            message: state.message.clone(),
            goal_reached: state.goal_reached,
        }
    }
}

/// Receives a snapshot after every state-changing step.
pub trait EffectSink: Send + Sync {
    fn emit(&self, snapshot: Snapshot);
}

/// Session-level completion payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub reached_count: usize,
    pub total_agents: usize,
    pub elapsed_seconds: f64,
}

/// Receives the completion event; fired at most once per session.
pub trait CompletionSink: Send + Sync {
    fn on_complete(&self, event: &CompletionEvent);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EffectSink for NullSink {
    fn emit(&self, _snapshot: Snapshot) {}
}

impl CompletionSink for NullSink {
    fn on_complete(&self, _event: &CompletionEvent) {}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps every snapshot in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    snapshots: Mutex<Vec<Snapshot>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn snapshots(&self) -> Vec<Snapshot> {
        lock(&self.snapshots).clone()
    }

    /// Snapshots of one agent, in order.
    pub fn for_agent(&self, agent_id: AgentId) -> Vec<Snapshot> {
        lock(&self.snapshots)
            .iter()
            .filter(|s| s.agent_id == agent_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.snapshots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains the recording.
    pub fn take(&self) -> Vec<Snapshot> {
        std::mem::take(&mut *lock(&self.snapshots))
    }
}

impl EffectSink for RecordingSink {
    fn emit(&self, snapshot: Snapshot) {
        lock(&self.snapshots).push(snapshot);
    }
}

/// Forwards snapshots over an unbounded tokio channel.
///
/// A dropped receiver is not an error: presentation may go away mid-run.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Snapshot>,
}

impl ChannelSink {
    /// Creates a sink and the receiving end for the presentation layer.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Snapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EffectSink for ChannelSink {
    fn emit(&self, snapshot: Snapshot) {
        let _ = self.tx.send(snapshot);
    }
}

/// Keeps every completion event.
#[derive(Debug, Default)]
pub struct RecordingCompletions {
    events: Mutex<Vec<CompletionEvent>>,
}

impl RecordingCompletions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CompletionEvent> {
        lock(&self.events).clone()
    }

    pub fn count(&self) -> usize {
        lock(&self.events).len()
    }
}

impl CompletionSink for RecordingCompletions {
    fn on_complete(&self, event: &CompletionEvent) {
        lock(&self.events).push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Cardinal;

    #[test]
    fn test_recording_sink_filters_by_agent() {
        let sink = RecordingSink::new();
        let a = AgentId::from_index(0);
        let b = AgentId::from_index(1);
        let state = AgentState::grid(0, 0, Cardinal::North);

        sink.emit(Snapshot::of(a, &state));
        sink.emit(Snapshot::of(b, &state));
        sink.emit(Snapshot::of(a, &state));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.for_agent(a).len(), 2);
        assert_eq!(sink.take().len(), 3);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_channel_sink_survives_dropped_receiver() {
        let (sink, mut rx) = ChannelSink::channel();
        let state = AgentState::grid(2, 3, Cardinal::East);
        sink.emit(Snapshot::of(AgentId::from_index(0), &state));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.pose, state.pose);

        drop(rx);
        sink.emit(Snapshot::of(AgentId::from_index(0), &state));
    }
}
