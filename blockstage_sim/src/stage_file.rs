//! Stage files - JSON bundles of spawn poses and block programs.
//!
//! ```json
//! {
//!   "config": { "loop_iteration_ceiling": 50 },
//!   "agents": [
//!     {
//!       "name": "Si Hijau",
//!       "spawn": { "mode": "grid", "cell": { "col": 7, "row": 0 }, "heading": 0 },
//!       "blocks": [
//!         { "kind": "robot_mulai" },
//!         { "kind": "robot_maju", "fields": { "N": 6 } }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! `config` is optional and falls back to the grid preset field by field.

use blockstage_core::{
    AgentState, BlockNode, Cardinal, Compiler, CompileWarning, EngineConfig, Pose, Program,
};
use blockstage_env::AgentId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors loading or preparing a stage file.
#[derive(Debug, Error)]
pub enum StageFileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid stage file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("stage file has no agents")]
    NoAgents,

    #[error("agent '{name}' spawns in {pose} mode on a {playfield} playfield")]
    ModeMismatch {
        name: String,
        pose: &'static str,
        playfield: &'static str,
    },
}

/// One agent entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageAgent {
    pub name: String,
    pub spawn: Pose,
    #[serde(default)]
    pub blocks: Vec<BlockNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<EngineConfig>,
    pub agents: Vec<StageAgent>,
}

/// An agent ready to run.
#[derive(Debug, Clone)]
pub struct PreparedAgent {
    pub id: AgentId,
    pub name: String,
    pub state: AgentState,
    pub program: Program,
    pub warnings: Vec<CompileWarning>,
}

/// A compiled stage: effective config plus one prepared agent per entry.
#[derive(Debug, Clone)]
pub struct PreparedStage {
    pub config: EngineConfig,
    pub agents: Vec<PreparedAgent>,
}

impl PreparedStage {
    pub fn warning_count(&self) -> usize {
        self.agents.iter().map(|a| a.warnings.len()).sum()
    }
}

impl StageFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StageFileError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| StageFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, StageFileError> {
        Ok(serde_json::from_str(text)?)
    }

    /// The four-sprite robot-manual challenge, each sprite with a
    /// program that drives it onto H7.
    pub fn robot_manual() -> Self {
        fn start() -> BlockNode {
            BlockNode::new("robot_mulai")
        }
        fn forward(n: f64) -> BlockNode {
            BlockNode::new("robot_maju").with_field("N", n)
        }
        fn turn(direction: &str) -> BlockNode {
            BlockNode::new("robot_putar")
                .with_field("direction", direction)
                .with_field("DEG", 90.0)
        }
        fn sprite(name: &str, col: i32, row: i32, heading: Cardinal, blocks: Vec<BlockNode>) -> StageAgent {
            StageAgent {
                name: name.to_string(),
                spawn: AgentState::grid(col, row, heading).pose,
                blocks,
            }
        }

        Self {
            config: Some(EngineConfig::grid()),
            agents: vec![
                sprite("Si Merah", 0, 8, Cardinal::East, vec![start(), forward(7.0), turn("right"), forward(2.0)]),
                sprite("Si Pink", 1, 0, Cardinal::North, vec![start(), forward(6.0), turn("right"), forward(6.0)]),
                sprite("Si Hijau", 7, 0, Cardinal::North, vec![start(), forward(6.0)]),
                sprite("Si Kuning", 9, 9, Cardinal::South, vec![start(), forward(3.0), turn("right"), forward(2.0)]),
            ],
        }
    }

    /// Compiles every agent against the effective config.
    ///
    /// `override_config` wins over the file's own config.
    pub fn prepare(&self, override_config: Option<&EngineConfig>) -> Result<PreparedStage, StageFileError> {
        if self.agents.is_empty() {
            return Err(StageFileError::NoAgents);
        }

        let config = override_config
            .or(self.config.as_ref())
            .cloned()
            .unwrap_or_default();
        let compiler = Compiler::new(config.guard());

        let mut agents = Vec::with_capacity(self.agents.len());
        for (index, entry) in self.agents.iter().enumerate() {
            if entry.spawn.mode() != config.playfield.mode() {
                return Err(StageFileError::ModeMismatch {
                    name: entry.name.clone(),
                    pose: entry.spawn.mode(),
                    playfield: config.playfield.mode(),
                });
            }

            let compilation = compiler.compile(&entry.blocks);
            for warning in &compilation.warnings {
                warn!("{}: {}", entry.name, warning);
            }
            debug!(
                "{}: {} instruction(s), depth {}",
                entry.name,
                compilation.program.instruction_count(),
                compilation.program.depth()
            );

            agents.push(PreparedAgent {
                id: AgentId::from_index(index as u64),
                name: entry.name.clone(),
                state: AgentState::from_pose(entry.spawn.clone()),
                program: compilation.program,
                warnings: compilation.warnings,
            });
        }

        Ok(PreparedStage { config, agents })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockstage_core::{Cell, Instruction};

    #[test]
    fn test_parse_documented_example() {
        let text = r#"{
            "config": { "loop_iteration_ceiling": 50 },
            "agents": [{
                "name": "Si Hijau",
                "spawn": { "mode": "grid", "cell": { "col": 7, "row": 0 }, "heading": 0 },
                "blocks": [
                    { "kind": "robot_mulai" },
                    { "kind": "robot_maju", "fields": { "N": 6 } }
                ]
            }]
        }"#;

        let stage = StageFile::from_json(text).unwrap();
        let prepared = stage.prepare(None).unwrap();

        assert_eq!(prepared.config.loop_iteration_ceiling, 50);
        assert_eq!(prepared.config.animation_step_ms, 280);
        let agent = &prepared.agents[0];
        assert_eq!(agent.state.cell(), Some(Cell::new(7, 0)));
        assert_eq!(
            agent.program,
            Program::from(vec![Instruction::Move { distance: 6.0 }])
        );
        assert!(agent.warnings.is_empty());
    }

    #[test]
    fn test_robot_manual_compiles_clean() {
        let prepared = StageFile::robot_manual().prepare(None).unwrap();

        assert_eq!(prepared.agents.len(), 4);
        assert_eq!(prepared.warning_count(), 0);
        assert_eq!(prepared.agents[0].name, "Si Merah");
        assert_eq!(prepared.agents[3].state.heading_degrees(), 180.0);
    }

    #[test]
    fn test_warnings_are_collected_not_fatal() {
        let text = r#"{ "agents": [{
            "name": "a",
            "spawn": { "mode": "grid", "cell": { "col": 0, "row": 0 }, "heading": 0 },
            "blocks": [ { "kind": "fly" }, { "kind": "move", "fields": { "steps": 500 } } ]
        }]}"#;

        let prepared = StageFile::from_json(text).unwrap().prepare(None).unwrap();

        assert_eq!(prepared.warning_count(), 2);
        assert_eq!(
            prepared.agents[0].program,
            Program::from(vec![Instruction::Move { distance: 100.0 }])
        );
    }

    #[test]
    fn test_empty_stage_rejected() {
        let stage = StageFile::from_json(r#"{ "agents": [] }"#).unwrap();
        assert!(matches!(stage.prepare(None), Err(StageFileError::NoAgents)));
    }

    #[test]
    fn test_mode_mismatch_rejected() {
        let stage = StageFile::robot_manual();
        let canvas = EngineConfig::canvas(480.0, 400.0);

        let err = stage.prepare(Some(&canvas)).unwrap_err();
        assert!(matches!(err, StageFileError::ModeMismatch { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = StageFile::load("/nonexistent/stage.json").unwrap_err();
        assert!(matches!(err, StageFileError::Io { .. }));
    }
}
