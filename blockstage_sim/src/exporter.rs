//! JSON frame exporter for offline replay.
//!
//! Every snapshot becomes one timestamped frame; the export also carries
//! the session summary and, when every agent reached the goal, the
//! completion message the host app expects.

use blockstage_core::{CompletionEvent, EffectSink, SessionResult, Snapshot};
use blockstage_env::StageContext;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Score awarded by the host app for a completed activity.
pub const ACTIVITY_SCORE: u32 = 50;

/// One snapshot with the virtual time it was emitted at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    /// Agent display name
    pub agent: String,

    #[serde(flatten)]
    pub snapshot: Snapshot,
}

/// Records timestamped snapshots as they are emitted.
pub struct FrameRecorder<Ctx: StageContext> {
    context: Arc<Ctx>,
    frames: Mutex<Vec<(f64, Snapshot)>>,
}

impl<Ctx: StageContext> FrameRecorder<Ctx> {
    pub fn new(context: Arc<Ctx>) -> Self {
        Self {
            context,
            frames: Mutex::new(Vec::new()),
        }
    }

    /// Drains the recorded (time, snapshot) pairs.
    pub fn take(&self) -> Vec<(f64, Snapshot)> {
        std::mem::take(&mut *self.frames.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl<Ctx: StageContext> EffectSink for FrameRecorder<Ctx> {
    fn emit(&self, snapshot: Snapshot) {
        let time_sec = self.context.now().as_secs_f64();
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((time_sec, snapshot));
    }
}

/// The host bridge's completion message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeMessage {
    #[serde(rename_all = "camelCase")]
    ActivityComplete {
        score: u32,
        /// Whole seconds
        time_spent: u64,
    },
}

impl From<&CompletionEvent> for BridgeMessage {
    fn from(event: &CompletionEvent) -> Self {
        BridgeMessage::ActivityComplete {
            score: ACTIVITY_SCORE,
            time_spent: event.elapsed_seconds.round() as u64,
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario or stage name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SessionResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<BridgeMessage>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            result: None,
            completion: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = self.duration_sec.max(frame.time_sec);
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, result: SessionResult, completion: Option<BridgeMessage>) {
        self.passed = passed;
        self.result = Some(result);
        self.completion = completion;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
