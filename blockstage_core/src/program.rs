//! Program Representation - the compiled instruction tree.
//!
//! A [`Program`] is what the compiler hands to the interpreter. It is a
//! plain tagged tree: compound instructions own their body as a nested
//! `Program`. Programs are never mutated after compilation, so the same
//! tree can be replayed on every run of a session.

use serde::{Deserialize, Serialize};

/// One executable instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    /// Move forward along the current heading.
    ///
    /// Grid mode: number of cells. Canvas mode: scaled by `unit_step_pixels`.
    Move { distance: f64 },

    /// Rotate clockwise by `degrees`.
    TurnRight { degrees: f64 },

    /// Rotate counter-clockwise by `degrees`.
    TurnLeft { degrees: f64 },

    /// Suspend without changing state.
    Wait { seconds: f64 },

    /// Show a transient speech bubble.
    Say { text: String },

    /// Run `body` exactly `count` times (bounded by the safety guard).
    Repeat { count: u32, body: Program },

    /// A user-authored "forever" loop, truncated at `max_iterations`.
    RepeatBounded { body: Program, max_iterations: u32 },

    /// Run `body` once if the agent's goal latch is set.
    IfGoalReached { body: Program },
}

impl Instruction {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::Move { .. } => "move",
            Instruction::TurnRight { .. } => "turn_right",
            Instruction::TurnLeft { .. } => "turn_left",
            Instruction::Wait { .. } => "wait",
            Instruction::Say { .. } => "say",
            Instruction::Repeat { .. } => "repeat",
            Instruction::RepeatBounded { .. } => "repeat_bounded",
            Instruction::IfGoalReached { .. } => "if_goal_reached",
        }
    }

    /// Nested body, for compound instructions.
    pub fn body(&self) -> Option<&Program> {
        match self {
            Instruction::Repeat { body, .. }
            | Instruction::RepeatBounded { body, .. }
            | Instruction::IfGoalReached { body } => Some(body),
            _ => None,
        }
    }
}

/// An ordered instruction sequence. Execution order is sequence order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Program(pub Vec<Instruction>);

impl Program {
    /// Creates an empty program.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Top-level instructions.
    pub fn instructions(&self) -> &[Instruction] {
        &self.0
    }

    /// Number of top-level instructions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total instruction count including every nested body.
    pub fn instruction_count(&self) -> usize {
        self.0
            .iter()
            .map(|i| 1 + i.body().map_or(0, Program::instruction_count))
            .sum()
    }

    /// Maximum nesting depth. An empty program has depth 0.
    pub fn depth(&self) -> usize {
        self.0
            .iter()
            .map(|i| 1 + i.body().map_or(0, Program::depth))
            .max()
            .unwrap_or(0)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.0.iter()
    }
}

impl From<Vec<Instruction>> for Program {
    fn from(instructions: Vec<Instruction>) -> Self {
        Self(instructions)
    }
}

impl FromIterator<Instruction> for Program {
    fn from_iter<T: IntoIterator<Item = Instruction>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Program {
        Program::from(vec![Instruction::Repeat {
            count: 4,
            body: Program::from(vec![
                Instruction::Move { distance: 5.0 },
                Instruction::TurnRight { degrees: 90.0 },
            ]),
        }])
    }

    #[test]
    fn test_counts_and_depth() {
        let program = square();
        assert_eq!(program.len(), 1);
        assert_eq!(program.instruction_count(), 3);
        assert_eq!(program.depth(), 2);
        assert_eq!(Program::new().depth(), 0);
    }

    #[test]
    fn test_serialized_form_is_tagged() {
        let json = serde_json::to_value(square()).unwrap();
        assert_eq!(json[0]["op"], "repeat");
        assert_eq!(json[0]["body"][1]["op"], "turn_right");
        assert_eq!(json[0]["body"][1]["degrees"], 90.0);
    }
}
