//! Compiler - block forest to Program.
//!
//! A pure structural translation: each recognised block maps to exactly one
//! instruction (start events map to none), bodies are compiled before the
//! compound instruction that owns them, and identical input always yields
//! an identical tree.
//!
//! The compiler never fails. Anything it cannot use is recovered locally
//! (skipped, clamped or defaulted) and reported in
//! [`Compilation::warnings`] so the editor can surface it.

use crate::blocks::{field_names, BlockKind, BlockNode, FieldValue};
use crate::error::{BlockPath, CompileWarning};
use crate::guard::SafetyGuard;
use crate::program::{Instruction, Program};
use tracing::debug;

/// Compiler output: the program plus every diagnostic raised on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Compilation {
    pub program: Program,
    pub warnings: Vec<CompileWarning>,
}

impl Compilation {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Declared domain of a numeric field.
#[derive(Debug, Clone, Copy)]
struct Domain {
    name: &'static str,
    min: f64,
    max: f64,
    default: f64,
    integer: bool,
}

const STEPS: Domain = Domain {
    name: "steps",
    min: 1.0,
    max: 100.0,
    default: 1.0,
    integer: true,
};

const DEGREES: Domain = Domain {
    name: "degrees",
    min: 1.0,
    max: 360.0,
    default: 90.0,
    integer: false,
};

const SECONDS: Domain = Domain {
    name: "seconds",
    min: 0.1,
    max: 10.0,
    default: 1.0,
    integer: false,
};

const DEFAULT_SAY_TEXT: &str = "Selesai";
const DEFAULT_REPEAT_TIMES: f64 = 2.0;

/// Block forest compiler.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    guard: SafetyGuard,
}

impl Compiler {
    /// Creates a compiler whose loops are bounded by `guard`.
    pub fn new(guard: SafetyGuard) -> Self {
        Self { guard }
    }

    /// Compiles an ordered block forest.
    pub fn compile(&self, root: &[BlockNode]) -> Compilation {
        let mut warnings = Vec::new();
        let program = self.compile_sequence(root, &BlockPath::default(), &mut warnings);

        debug!(
            "compiled {} block(s) into {} instruction(s), {} warning(s)",
            root.len(),
            program.instruction_count(),
            warnings.len()
        );

        Compilation { program, warnings }
    }

    fn compile_sequence(
        &self,
        nodes: &[BlockNode],
        parent: &BlockPath,
        warnings: &mut Vec<CompileWarning>,
    ) -> Program {
        let mut out = Vec::with_capacity(nodes.len());
        for (index, node) in nodes.iter().enumerate() {
            self.compile_node(node, parent.child(index), warnings, &mut out);
        }
        Program(out)
    }

    fn compile_node(
        &self,
        node: &BlockNode,
        path: BlockPath,
        warnings: &mut Vec<CompileWarning>,
        out: &mut Vec<Instruction>,
    ) {
        let Some(kind) = BlockKind::parse(&node.kind) else {
            warnings.push(CompileWarning::UnknownKind {
                path,
                kind: node.kind.clone(),
            });
            return;
        };

        if !kind.is_compound() {
            if let Some(body) = node.body.as_ref().filter(|b| !b.is_empty()) {
                warnings.push(CompileWarning::UnexpectedBody {
                    path: path.clone(),
                    kind: kind.name(),
                    dropped: body.len(),
                });
            }
        }

        match kind {
            // Hat block: structural entry marker only
            BlockKind::StartEvent => {}

            BlockKind::Move => {
                let distance = numeric(node, field_names::STEPS, STEPS, &path, warnings);
                out.push(Instruction::Move { distance });
            }

            BlockKind::TurnRight => {
                let degrees = numeric(node, field_names::DEGREES, DEGREES, &path, warnings);
                out.push(Instruction::TurnRight { degrees });
            }

            BlockKind::TurnLeft => {
                let degrees = numeric(node, field_names::DEGREES, DEGREES, &path, warnings);
                out.push(Instruction::TurnLeft { degrees });
            }

            BlockKind::Turn => {
                let degrees = numeric(node, field_names::DEGREES, DEGREES, &path, warnings);
                let direction = node
                    .field(field_names::DIRECTION)
                    .map(|v| v.as_text().to_lowercase());

                match direction.as_deref() {
                    Some("left") => out.push(Instruction::TurnLeft { degrees }),
                    None | Some("right") => out.push(Instruction::TurnRight { degrees }),
                    Some(_) => {
                        warnings.push(CompileWarning::FieldDefaulted {
                            path,
                            field: "direction",
                            default: "right".to_string(),
                        });
                        out.push(Instruction::TurnRight { degrees });
                    }
                }
            }

            BlockKind::Wait => {
                let seconds = numeric(node, field_names::SECONDS, SECONDS, &path, warnings);
                out.push(Instruction::Wait { seconds });
            }

            BlockKind::Say => {
                let text = match node.field(field_names::TEXT) {
                    Some(value) => value.as_text(),
                    None => {
                        warnings.push(CompileWarning::FieldDefaulted {
                            path,
                            field: "text",
                            default: DEFAULT_SAY_TEXT.to_string(),
                        });
                        DEFAULT_SAY_TEXT.to_string()
                    }
                };
                out.push(Instruction::Say { text });
            }

            BlockKind::RepeatN => {
                let domain = Domain {
                    name: "times",
                    min: 1.0,
                    max: self.guard.ceiling() as f64,
                    default: DEFAULT_REPEAT_TIMES.min(self.guard.ceiling() as f64),
                    integer: true,
                };
                let count = numeric(node, field_names::TIMES, domain, &path, warnings) as u32;
                let body = self.compile_body(node, &path, warnings);
                out.push(Instruction::Repeat { count, body });
            }

            BlockKind::RepeatForever => {
                let body = self.compile_body(node, &path, warnings);
                out.push(Instruction::RepeatBounded {
                    body,
                    max_iterations: self.guard.ceiling(),
                });
            }

            BlockKind::IfGoalReached => {
                let body = self.compile_body(node, &path, warnings);
                out.push(Instruction::IfGoalReached { body });
            }

            BlockKind::IfCondition => {
                let condition = node
                    .field(field_names::CONDITION)
                    .map(|v| v.as_text().to_lowercase())
                    .unwrap_or_else(|| "false".to_string());

                match condition.as_str() {
                    "goal-reached" | "goal_reached" | "finish" => {
                        let body = self.compile_body(node, &path, warnings);
                        out.push(Instruction::IfGoalReached { body });
                    }
                    "true" => {
                        let body = self.compile_body(node, &path, warnings);
                        out.extend(body.0);
                    }
                    _ => warnings.push(CompileWarning::ConditionNeverTrue { path, condition }),
                }
            }
        }
    }

    fn compile_body(
        &self,
        node: &BlockNode,
        path: &BlockPath,
        warnings: &mut Vec<CompileWarning>,
    ) -> Program {
        match &node.body {
            Some(body) => self.compile_sequence(body, path, warnings),
            None => Program::new(),
        }
    }
}

/// Compiles with the default safety guard.
pub fn compile(root: &[BlockNode]) -> Compilation {
    Compiler::default().compile(root)
}

/// Reads a numeric field, defaulting when absent and clamping into the
/// declared domain.
fn numeric(
    node: &BlockNode,
    names: &[&str],
    domain: Domain,
    path: &BlockPath,
    warnings: &mut Vec<CompileWarning>,
) -> f64 {
    let Some(given) = node
        .field(names)
        .and_then(FieldValue::as_number)
        .filter(|n| n.is_finite())
    else {
        warnings.push(CompileWarning::FieldDefaulted {
            path: path.clone(),
            field: domain.name,
            default: domain.default.to_string(),
        });
        return domain.default;
    };

    let rounded = if domain.integer { given.round() } else { given };
    let used = rounded.clamp(domain.min, domain.max);
    // Rounding inside the domain is silent; only out-of-domain input warns
    if !in_range(given, domain) {
        warnings.push(CompileWarning::FieldClamped {
            path: path.clone(),
            field: domain.name,
            given,
            used,
        });
    }
    used
}

fn in_range(value: f64, domain: Domain) -> bool {
    value >= domain.min && value <= domain.max
}
