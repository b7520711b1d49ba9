//! Engine configuration.

use crate::guard::{SafetyGuard, DEFAULT_LOOP_CEILING};
use crate::stage::{Cell, GoalRegion, Playfield};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Finish cell of the robot-manual challenge (H7).
pub const ROBOT_MANUAL_FINISH: Cell = Cell::new(7, 6);

/// Timing, bounds and goal for one stage.
///
/// Fields missing from a JSON config fall back to the grid preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Canvas pixels per `Move` unit
    pub unit_step_pixels: f64,

    /// Pause after each grid cell step (ms)
    pub animation_step_ms: u64,

    /// Canvas glide duration for one `Move` (ms)
    pub glide_duration_ms: u64,

    /// Turn animation / pause (ms)
    pub turn_animation_ms: u64,

    /// Speech bubble display time (ms)
    pub say_display_ms: u64,

    /// Interpolation frame interval (ms), ~60 fps
    pub frame_interval_ms: u64,

    /// Safety ceiling for every loop
    pub loop_iteration_ceiling: u32,

    pub playfield: Playfield,

    pub goal: GoalRegion,
}

impl EngineConfig {
    /// 10x10 robot-manual grid with the finish at H7.
    pub fn grid() -> Self {
        Self {
            unit_step_pixels: 3.0,
            animation_step_ms: 280,
            glide_duration_ms: 300,
            turn_animation_ms: 168,
            say_display_ms: 1200,
            frame_interval_ms: 16,
            loop_iteration_ceiling: DEFAULT_LOOP_CEILING,
            playfield: Playfield::Grid {
                columns: 10,
                rows: 10,
            },
            goal: GoalRegion::cell(ROBOT_MANUAL_FINISH),
        }
    }

    /// Free-floating canvas stage of `width` x `height` pixels.
    ///
    /// The default goal is a 40 px square in the top-right corner.
    pub fn canvas(width: f64, height: f64) -> Self {
        Self {
            turn_animation_ms: 300,
            playfield: Playfield::Canvas {
                width,
                height,
                inset: 20.0,
            },
            goal: GoalRegion::Rect {
                x: width - 60.0,
                y: 20.0,
                width: 40.0,
                height: 40.0,
            },
            ..Self::grid()
        }
    }

    /// Loads a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(std::io::Error::from)
    }

    /// Sets the loop ceiling.
    pub fn with_loop_ceiling(mut self, ceiling: u32) -> Self {
        self.loop_iteration_ceiling = ceiling;
        self
    }

    /// Sets the goal region.
    pub fn with_goal(mut self, goal: GoalRegion) -> Self {
        self.goal = goal;
        self
    }

    /// Sets the playfield.
    pub fn with_playfield(mut self, playfield: Playfield) -> Self {
        self.playfield = playfield;
        self
    }

    pub fn guard(&self) -> SafetyGuard {
        SafetyGuard::new(self.loop_iteration_ceiling)
    }

    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.animation_step_ms)
    }

    pub fn glide_duration(&self) -> Duration {
        Duration::from_millis(self.glide_duration_ms)
    }

    pub fn turn_duration(&self) -> Duration {
        Duration::from_millis(self.turn_animation_ms)
    }

    pub fn say_duration(&self) -> Duration {
        Duration::from_millis(self.say_display_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    /// Number of interpolation frames for an animation of `duration`.
    pub fn frames_for(&self, duration: Duration) -> u32 {
        let frame = self.frame_interval().as_millis().max(1);
        (duration.as_millis().div_ceil(frame) as u32).max(1)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::grid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_preset() {
        let config = EngineConfig::default();
        assert_eq!(config.animation_step_ms, 280);
        assert_eq!(config.turn_animation_ms, 168);
        assert_eq!(config.say_display_ms, 1200);
        assert_eq!(config.guard().ceiling(), 100);
        assert_eq!(config.goal, GoalRegion::Cell { col: 7, row: 6 });
    }

    #[test]
    fn test_frames_for_rounds_up() {
        let config = EngineConfig::canvas(480.0, 400.0);
        assert_eq!(config.frames_for(Duration::from_millis(300)), 19);
        assert_eq!(config.frames_for(Duration::ZERO), 1);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "loop_iteration_ceiling": 7 }"#).unwrap();
        assert_eq!(config.loop_iteration_ceiling, 7);
        assert_eq!(config.animation_step_ms, 280);
    }

    #[test]
    fn test_canvas_json_round_trip() {
        let config = EngineConfig::canvas(480.0, 400.0);
        let text = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
