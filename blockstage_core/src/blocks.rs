//! Block Node model - the editor's output, consumed read-only.
//!
//! The editor serializes its workspace as an ordered forest of nodes:
//!
//! ```json
//! [
//!   { "kind": "start-event" },
//!   { "kind": "repeat-n", "fields": { "times": 4 }, "body": [
//!       { "kind": "move", "fields": { "steps": 5 } },
//!       { "kind": "turn-right", "fields": { "degrees": 90 } }
//!   ] }
//! ]
//! ```
//!
//! `kind` stays a free-form string here so that a block from a newer editor
//! still deserializes; the compiler decides what it means.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scalar field value as the editor stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Numeric view. Text that parses as a number is accepted (editors
    /// often store field values as strings).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Text view. Numbers are rendered without a trailing `.0`.
    pub fn as_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            // Beyond 1e15 an i64 cast loses digits or saturates
            FieldValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            FieldValue::Number(n) => n.to_string(),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

/// One visual block instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockNode {
    /// Block type tag (`"move"`, `"robot_maju"`, ...)
    pub kind: String,

    /// Scalar fields keyed by field name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldValue>,

    /// Nested statement slot, only meaningful for compound kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<BlockNode>>,
}

impl BlockNode {
    /// Creates a block with no fields and no body.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: BTreeMap::new(),
            body: None,
        }
    }

    /// Adds a field (builder style).
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Sets the nested body (builder style).
    pub fn with_body(mut self, body: Vec<BlockNode>) -> Self {
        self.body = Some(body);
        self
    }

    /// Looks up the first present field among `names`.
    pub fn field(&self, names: &[&str]) -> Option<&FieldValue> {
        names.iter().find_map(|n| self.fields.get(*n))
    }
}

/// The closed set of block kinds the compiler understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    StartEvent,
    Move,
    /// Generic turn; direction comes from the `direction` field
    Turn,
    TurnRight,
    TurnLeft,
    Wait,
    Say,
    RepeatN,
    RepeatForever,
    IfCondition,
    IfGoalReached,
}

impl BlockKind {
    /// Resolves a kind tag, including the aliases used by both editor
    /// toolboxes (robot-manual and visual-stage).
    pub fn parse(tag: &str) -> Option<Self> {
        let kind = match tag {
            "start-event" | "robot_mulai" | "kejadian_mulai" => BlockKind::StartEvent,
            "move" | "robot_maju" | "gerak_maju" => BlockKind::Move,
            "turn" | "robot_putar" => BlockKind::Turn,
            "turn-right" | "putar_kanan" => BlockKind::TurnRight,
            "turn-left" | "putar_kiri" => BlockKind::TurnLeft,
            "wait" | "tunggu" => BlockKind::Wait,
            "say" | "robot_bilang" => BlockKind::Say,
            "repeat-n" | "robot_ulangi" | "kontrol_ulangi" => BlockKind::RepeatN,
            "repeat-forever" | "kontrol_selamanya" => BlockKind::RepeatForever,
            "if-condition" | "kontrol_jika" => BlockKind::IfCondition,
            "if-goal-reached" | "robot_jika_finish" => BlockKind::IfGoalReached,
            _ => return None,
        };
        Some(kind)
    }

    /// Canonical tag.
    pub fn name(&self) -> &'static str {
        match self {
            BlockKind::StartEvent => "start-event",
            BlockKind::Move => "move",
            BlockKind::Turn => "turn",
            BlockKind::TurnRight => "turn-right",
            BlockKind::TurnLeft => "turn-left",
            BlockKind::Wait => "wait",
            BlockKind::Say => "say",
            BlockKind::RepeatN => "repeat-n",
            BlockKind::RepeatForever => "repeat-forever",
            BlockKind::IfCondition => "if-condition",
            BlockKind::IfGoalReached => "if-goal-reached",
        }
    }

    /// Only compound kinds carry a statement body.
    pub fn is_compound(&self) -> bool {
        matches!(
            self,
            BlockKind::RepeatN
                | BlockKind::RepeatForever
                | BlockKind::IfCondition
                | BlockKind::IfGoalReached
        )
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Accepted field names per concern. The first entry is canonical.
pub mod field_names {
    pub const STEPS: &[&str] = &["steps", "N", "STEPS"];
    pub const DEGREES: &[&str] = &["degrees", "DEG", "DEGREES"];
    pub const DIRECTION: &[&str] = &["direction"];
    pub const SECONDS: &[&str] = &["seconds", "SECONDS"];
    pub const TEXT: &[&str] = &["text", "TEXT"];
    pub const TIMES: &[&str] = &["times", "N", "TIMES"];
    pub const CONDITION: &[&str] = &["condition", "CONDITION"];
}
