//! Built-in stage scenarios.

use crate::fuzz::{random_forest, FuzzShape};
use crate::stage_file::{PreparedStage, StageAgent, StageFile, StageFileError};
use blockstage_core::{AgentState, BlockNode, Cardinal, EngineConfig, Instruction, Program};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Four sprites drive onto H7 at once
    RobotManual,

    /// Repeat 4 x (move 3, turn right) returns home
    ClosedSquare,

    /// Unbounded loop is cut at the safety ceiling
    ForeverLoop,

    /// Eased canvas glide into the top-right goal
    CanvasGlide,

    /// One agent faults; its sibling still finishes
    FaultIsolation,

    /// Seeded random programs across N agents
    RandomWalk,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::RobotManual,
            ScenarioId::ClosedSquare,
            ScenarioId::ForeverLoop,
            ScenarioId::CanvasGlide,
            ScenarioId::FaultIsolation,
            ScenarioId::RandomWalk,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::RobotManual => "robot_manual",
            ScenarioId::ClosedSquare => "closed_square",
            ScenarioId::ForeverLoop => "forever_loop",
            ScenarioId::CanvasGlide => "canvas_glide",
            ScenarioId::FaultIsolation => "fault_isolation",
            ScenarioId::RandomWalk => "random_walk",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::RobotManual => "4 sprites on a 10x10 grid, all must finish on H7",
            ScenarioId::ClosedSquare => "repeat 4 [move 3, turn right 90] ends where it started",
            ScenarioId::ForeverLoop => "forever [turn right] stops after exactly 100 iterations",
            ScenarioId::CanvasGlide => "480x400 canvas, eased glides into the goal corner",
            ScenarioId::FaultIsolation => "invalid operand in one agent, the other still reaches the goal",
            ScenarioId::RandomWalk => "seeded random block forests, every session terminates",
        }
    }

    /// Builds the agents and config this scenario runs.
    pub fn stage(&self, seed: u64, num_agents: usize) -> Result<PreparedStage, StageFileError> {
        match self {
            ScenarioId::RobotManual => StageFile::robot_manual().prepare(None),

            ScenarioId::ClosedSquare => single(
                AgentState::grid(2, 2, Cardinal::North),
                vec![BlockNode::new("repeat-n").with_field("times", 4.0).with_body(vec![
                    BlockNode::new("move").with_field("steps", 3.0),
                    BlockNode::new("turn-right").with_field("degrees", 90.0),
                ])],
                EngineConfig::grid(),
            ),

            ScenarioId::ForeverLoop => single(
                AgentState::grid(0, 0, Cardinal::North),
                vec![BlockNode::new("kontrol_selamanya")
                    .with_body(vec![BlockNode::new("putar_kanan").with_field("degrees", 90.0)])],
                EngineConfig::grid(),
            ),

            ScenarioId::CanvasGlide => {
                let config = EngineConfig::canvas(480.0, 400.0);
                let center = config.playfield.center();
                single(
                    AgentState::canvas(center.x, center.y, 0.0),
                    vec![
                        BlockNode::new("kejadian_mulai"),
                        BlockNode::new("putar_kanan").with_field("degrees", 90.0),
                        BlockNode::new("gerak_maju").with_field("steps", 66.0),
                        BlockNode::new("putar_kiri").with_field("degrees", 90.0),
                        BlockNode::new("gerak_maju").with_field("steps", 50.0),
                    ],
                    config,
                )
            }

            ScenarioId::FaultIsolation => {
                let mut stage = StageFile {
                    config: None,
                    agents: vec![
                        agent("faulty", AgentState::grid(0, 0, Cardinal::North), Vec::new()),
                        agent(
                            "steady",
                            AgentState::grid(7, 0, Cardinal::North),
                            vec![BlockNode::new("move").with_field("steps", 6.0)],
                        ),
                    ],
                }
                .prepare(None)?;
                // Compiled programs never carry invalid operands; inject one directly
                if let Some(faulty) = stage.agents.first_mut() {
                    faulty.program = Program::from(vec![
                        Instruction::Move { distance: 2.0 },
                        Instruction::Move { distance: f64::NAN },
                        Instruction::Move { distance: 2.0 },
                    ]);
                }
                Ok(stage)
            }

            ScenarioId::RandomWalk => {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let config = EngineConfig::grid().with_loop_ceiling(10);
                let agents = (0..num_agents.max(1))
                    .map(|i| {
                        let state = AgentState::grid(
                            rng.gen_range(0..10),
                            rng.gen_range(0..10),
                            Cardinal::North.rotate(rng.gen_range(0..4)),
                        );
                        agent(&format!("walker-{}", i), state, random_forest(&mut rng, FuzzShape::default()))
                    })
                    .collect();
                StageFile {
                    config: Some(config),
                    agents,
                }
                .prepare(None)
            }
        }
    }
}

fn agent(name: &str, state: AgentState, blocks: Vec<BlockNode>) -> StageAgent {
    StageAgent {
        name: name.to_string(),
        spawn: state.pose,
        blocks,
    }
}

fn single(state: AgentState, blocks: Vec<BlockNode>, config: EngineConfig) -> Result<PreparedStage, StageFileError> {
    StageFile {
        config: Some(config),
        agents: vec![agent("solo", state, blocks)],
    }
    .prepare(None)
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "robot_manual" | "robotmanual" | "manual" => Ok(ScenarioId::RobotManual),
            "closed_square" | "closedsquare" | "square" => Ok(ScenarioId::ClosedSquare),
            "forever_loop" | "foreverloop" | "forever" => Ok(ScenarioId::ForeverLoop),
            "canvas_glide" | "canvasglide" | "canvas" => Ok(ScenarioId::CanvasGlide),
            "fault_isolation" | "faultisolation" | "fault" => Ok(ScenarioId::FaultIsolation),
            "random_walk" | "randomwalk" | "fuzz" => Ok(ScenarioId::RandomWalk),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_every_scenario_prepares() {
        for scenario in ScenarioId::all() {
            let stage = scenario.stage(42, 3).unwrap();
            assert!(!stage.agents.is_empty(), "{}", scenario);
        }
    }

    #[test]
    fn test_random_walk_is_seeded() {
        let a = ScenarioId::RandomWalk.stage(5, 4).unwrap();
        let b = ScenarioId::RandomWalk.stage(5, 4).unwrap();

        assert_eq!(a.agents.len(), 4);
        for (x, y) in a.agents.iter().zip(&b.agents) {
            assert_eq!(x.program, y.program);
            assert_eq!(x.state, y.state);
        }
    }
}
