//! Error types for compilation, interpretation and sessions.

use blockstage_env::AgentId;
use thiserror::Error;

/// Position of a block in the source forest, as an index chain.
///
/// `[2, 0]` is the first block in the body of the third top-level block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockPath(pub Vec<usize>);

impl BlockPath {
    /// Path of a child at `index` below this one.
    pub fn child(&self, index: usize) -> Self {
        let mut path = self.0.clone();
        path.push(index);
        Self(path)
    }
}

impl std::fmt::Display for BlockPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "[{}]", parts.join("."))
    }
}

/// Non-fatal compiler diagnostics. The block is still compiled (or
/// skipped) and compilation continues.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileWarning {
    /// Kind tag not in the instruction set; no instruction emitted
    #[error("{path}: unknown block kind '{kind}' skipped")]
    UnknownKind { path: BlockPath, kind: String },

    /// Field value outside its domain, clamped to the nearest bound
    #[error("{path}: field '{field}' value {given} clamped to {used}")]
    FieldClamped {
        path: BlockPath,
        field: &'static str,
        given: f64,
        used: f64,
    },

    /// Field absent or not readable as the expected type
    #[error("{path}: field '{field}' missing or invalid, using default {default}")]
    FieldDefaulted {
        path: BlockPath,
        field: &'static str,
        default: String,
    },

    /// A body was attached to a block that cannot hold one
    #[error("{path}: '{kind}' does not take a body, {dropped} nested block(s) ignored")]
    UnexpectedBody {
        path: BlockPath,
        kind: &'static str,
        dropped: usize,
    },

    /// Condition can never hold, so the body is never run
    #[error("{path}: condition '{condition}' is never true, body dropped")]
    ConditionNeverTrue { path: BlockPath, condition: String },
}

impl CompileWarning {
    /// Where the offending block sits in the forest.
    pub fn path(&self) -> &BlockPath {
        match self {
            CompileWarning::UnknownKind { path, .. }
            | CompileWarning::FieldClamped { path, .. }
            | CompileWarning::FieldDefaulted { path, .. }
            | CompileWarning::UnexpectedBody { path, .. }
            | CompileWarning::ConditionNeverTrue { path, .. } => path,
        }
    }
}

/// Runtime failure while interpreting one agent's program.
///
/// Isolated to that agent: sibling agents and the coordinator carry on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    /// Operand is NaN, infinite or negative
    #[error("invalid operand for {instruction}: {value}")]
    InvalidOperand {
        instruction: &'static str,
        value: f64,
    },

    /// Agent pose does not match the configured playfield mode
    #[error("agent pose is {pose} but playfield is {playfield}")]
    PlayfieldMismatch {
        pose: &'static str,
        playfield: &'static str,
    },
}

/// Errors that reject a whole session before it starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// A session is still in flight; cancel or await it first
    #[error("a session is already running")]
    AlreadyRunning,

    /// A program was supplied for an agent with no spawn state
    #[error("no initial state for agent {0}")]
    MissingInitialState(AgentId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_path_display() {
        let path = BlockPath::default().child(2).child(0);
        assert_eq!(path.to_string(), "[2.0]");
    }

    #[test]
    fn test_warning_messages() {
        let warning = CompileWarning::UnknownKind {
            path: BlockPath(vec![1]),
            kind: "teleport".into(),
        };
        assert_eq!(warning.to_string(), "[1]: unknown block kind 'teleport' skipped");
        assert_eq!(warning.path(), &BlockPath(vec![1]));
    }
}
