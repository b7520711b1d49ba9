//! Agent State and stage geometry.
//!
//! Two stage modes share one state record:
//!
//! ```text
//!   Grid (robot manual)              Canvas (visual stage)
//!   row 9 ┌──┬──┬──┐                (0,0) ┌──────────────┐
//!         │  │  │  │  North = +row        │   ↑ rot 0    │  screen y grows
//!   row 0 └──┴──┴──┘  East  = +col        │      → 90    │  downwards
//!         col 0 ... 9                     └──────────────┘ (w,h)
//! ```
//!
//! Positions are clamped to the playfield on every write; grid headings
//! are always one of the four cardinal directions.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// A grid cell. Row 0 is the bottom row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub col: i32,
    pub row: i32,
}

impl Cell {
    pub const fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }

    /// Spreadsheet-style label, `H7` for col 7 row 6.
    pub fn label(&self) -> String {
        let letter = (b'A' + (self.col.clamp(0, 25) as u8)) as char;
        format!("{}{}", letter, self.row + 1)
    }
}

/// Grid heading, clockwise from North.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum Cardinal {
    North,
    East,
    South,
    West,
}

impl Cardinal {
    /// Heading in degrees (0, 90, 180, 270).
    pub fn degrees(self) -> u16 {
        match self {
            Cardinal::North => 0,
            Cardinal::East => 90,
            Cardinal::South => 180,
            Cardinal::West => 270,
        }
    }

    /// Resolves any multiple of 90 (negative or > 360 included).
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Cardinal::North),
            90 => Some(Cardinal::East),
            180 => Some(Cardinal::South),
            270 => Some(Cardinal::West),
            _ => None,
        }
    }

    /// Rotates clockwise by `quarter_turns` (negative = counter-clockwise).
    pub fn rotate(self, quarter_turns: i64) -> Self {
        let degrees = self.degrees() as i64 + quarter_turns * 90;
        match degrees.rem_euclid(360) {
            0 => Cardinal::North,
            90 => Cardinal::East,
            180 => Cardinal::South,
            _ => Cardinal::West,
        }
    }

    /// One-cell displacement as `(d_col, d_row)`.
    pub fn unit(self) -> (i32, i32) {
        match self {
            Cardinal::North => (0, 1),
            Cardinal::East => (1, 0),
            Cardinal::South => (0, -1),
            Cardinal::West => (-1, 0),
        }
    }
}

impl From<Cardinal> for u16 {
    fn from(c: Cardinal) -> Self {
        c.degrees()
    }
}

impl TryFrom<u16> for Cardinal {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Cardinal::from_degrees(value as i64)
            .ok_or_else(|| format!("heading {} is not a multiple of 90", value))
    }
}

/// Position and orientation of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Pose {
    Grid { cell: Cell, heading: Cardinal },
    Canvas {
        /// Pixel coordinate, y grows downwards
        position: Vector2<f64>,
        /// Degrees clockwise from "up"; unbounded
        rotation: f64,
    },
}

impl Pose {
    pub fn mode(&self) -> &'static str {
        match self {
            Pose::Grid { .. } => "grid",
            Pose::Canvas { .. } => "canvas",
        }
    }
}

/// Bounds of the stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Playfield {
    Grid { columns: u32, rows: u32 },
    Canvas {
        width: f64,
        height: f64,
        /// Keeps the sprite body inside the visible area
        #[serde(default)]
        inset: f64,
    },
}

impl Playfield {
    pub fn mode(&self) -> &'static str {
        match self {
            Playfield::Grid { .. } => "grid",
            Playfield::Canvas { .. } => "canvas",
        }
    }

    /// Clamps a cell into `[0, columns) x [0, rows)`.
    ///
    /// On a canvas playfield the cell is returned unchanged.
    pub fn clamp_cell(&self, cell: Cell) -> Cell {
        match *self {
            Playfield::Grid { columns, rows } => Cell {
                col: cell.col.clamp(0, columns.max(1) as i32 - 1),
                row: cell.row.clamp(0, rows.max(1) as i32 - 1),
            },
            Playfield::Canvas { .. } => cell,
        }
    }

    /// Clamps a point into the inset canvas rectangle.
    pub fn clamp_point(&self, point: Vector2<f64>) -> Vector2<f64> {
        match *self {
            Playfield::Canvas { width, height, inset } => {
                let max_x = (width - inset).max(inset);
                let max_y = (height - inset).max(inset);
                Vector2::new(point.x.clamp(inset, max_x), point.y.clamp(inset, max_y))
            }
            Playfield::Grid { .. } => point,
        }
    }

    /// Centre of the stage, the default canvas spawn point.
    pub fn center(&self) -> Vector2<f64> {
        match *self {
            Playfield::Canvas { width, height, .. } => Vector2::new(width / 2.0, height / 2.0),
            Playfield::Grid { columns, rows } => Vector2::new(columns as f64 / 2.0, rows as f64 / 2.0),
        }
    }
}

/// The target an agent must reach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum GoalRegion {
    /// A single grid cell
    Cell { col: i32, row: i32 },
    /// An axis-aligned canvas rectangle (inclusive)
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
}

impl GoalRegion {
    pub fn cell(cell: Cell) -> Self {
        GoalRegion::Cell {
            col: cell.col,
            row: cell.row,
        }
    }

    /// Whether a pose lies inside the region. Mode mismatches never match.
    pub fn contains(&self, pose: &Pose) -> bool {
        match (self, pose) {
            (GoalRegion::Cell { col, row }, Pose::Grid { cell, .. }) => {
                cell.col == *col && cell.row == *row
            }
            (GoalRegion::Rect { x, y, width, height }, Pose::Canvas { position, .. }) => {
                position.x >= *x
                    && position.x <= x + width
                    && position.y >= *y
                    && position.y <= y + height
            }
            _ => false,
        }
    }
}

/// Mutable per-agent record, owned by exactly one interpreter at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub pose: Pose,

    /// Speech bubble text, cleared after the display duration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Latched once the agent stands on the goal
    #[serde(default)]
    pub goal_reached: bool,
}

impl AgentState {
    /// Grid agent at `(col, row)` facing `heading`.
    pub fn grid(col: i32, row: i32, heading: Cardinal) -> Self {
        Self::from_pose(Pose::Grid {
            cell: Cell::new(col, row),
            heading,
        })
    }

    /// Canvas agent at `(x, y)` with `rotation` degrees.
    pub fn canvas(x: f64, y: f64, rotation: f64) -> Self {
        Self::from_pose(Pose::Canvas {
            position: Vector2::new(x, y),
            rotation,
        })
    }

    pub fn from_pose(pose: Pose) -> Self {
        Self {
            pose,
            message: None,
            goal_reached: false,
        }
    }

    /// Fresh copy for a new run: same pose, no message, latch cleared.
    pub fn reset(&self) -> Self {
        Self::from_pose(self.pose.clone())
    }

    /// Latches `goal_reached` if the current pose is inside `goal`.
    /// Never clears the latch.
    pub fn observe_goal(&mut self, goal: &GoalRegion) -> bool {
        if goal.contains(&self.pose) {
            self.goal_reached = true;
        }
        self.goal_reached
    }

    /// Grid cell, if this is a grid agent.
    pub fn cell(&self) -> Option<Cell> {
        match &self.pose {
            Pose::Grid { cell, .. } => Some(*cell),
            Pose::Canvas { .. } => None,
        }
    }

    /// Heading in degrees, for either mode.
    pub fn heading_degrees(&self) -> f64 {
        match &self.pose {
            Pose::Grid { heading, .. } => heading.degrees() as f64,
            Pose::Canvas { rotation, .. } => *rotation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cardinal_rotation_wraps() {
        assert_eq!(Cardinal::North.rotate(1), Cardinal::East);
        assert_eq!(Cardinal::North.rotate(-1), Cardinal::West);
        assert_eq!(Cardinal::West.rotate(2), Cardinal::East);
        assert_eq!(Cardinal::South.rotate(4), Cardinal::South);
    }

    #[test]
    fn test_cardinal_from_degrees() {
        assert_eq!(Cardinal::from_degrees(450), Some(Cardinal::East));
        assert_eq!(Cardinal::from_degrees(-90), Some(Cardinal::West));
        assert_eq!(Cardinal::from_degrees(45), None);
    }

    #[test]
    fn test_cell_label() {
        assert_eq!(Cell::new(7, 6).label(), "H7");
        assert_eq!(Cell::new(0, 8).label(), "A9");
    }

    #[test]
    fn test_goal_latch_never_clears() {
        let goal = GoalRegion::Cell { col: 1, row: 1 };
        let mut state = AgentState::grid(1, 1, Cardinal::North);
        assert!(state.observe_goal(&goal));

        state.pose = Pose::Grid {
            cell: Cell::new(0, 0),
            heading: Cardinal::North,
        };
        assert!(state.observe_goal(&goal));
        assert!(!state.reset().goal_reached);
    }

    #[test]
    fn test_goal_mode_mismatch() {
        let goal = GoalRegion::Cell { col: 0, row: 0 };
        assert!(!goal.contains(&AgentState::canvas(0.0, 0.0, 0.0).pose));
    }

    #[test]
    fn test_canvas_clamp_inset() {
        let field = Playfield::Canvas {
            width: 480.0,
            height: 400.0,
            inset: 20.0,
        };
        let p = field.clamp_point(Vector2::new(-50.0, 1000.0));
        assert_eq!(p, Vector2::new(20.0, 380.0));
    }

    #[test]
    fn test_pose_serializes_heading_as_degrees() {
        let json = serde_json::to_value(AgentState::grid(0, 8, Cardinal::East)).unwrap();
        assert_eq!(json["pose"]["mode"], "grid");
        assert_eq!(json["pose"]["heading"], 90);
        assert_eq!(json["pose"]["cell"]["row"], 8);
    }

    proptest! {
        #[test]
        fn prop_clamped_cell_in_bounds(col in -1000i32..1000, row in -1000i32..1000,
                                       columns in 1u32..50, rows in 1u32..50) {
            let field = Playfield::Grid { columns, rows };
            let cell = field.clamp_cell(Cell::new(col, row));
            prop_assert!(cell.col >= 0 && cell.col < columns as i32);
            prop_assert!(cell.row >= 0 && cell.row < rows as i32);
        }
    }
}
