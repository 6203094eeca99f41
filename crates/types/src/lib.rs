//! Shared types and message definitions for the tank control core.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discrete motion command. No other motions exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl Command {
    /// Single-letter code used in wire messages and logs (`F`, `B`, `L`, `R`, `S`).
    pub fn code(&self) -> char {
        match self {
            Self::Forward => 'F',
            Self::Backward => 'B',
            Self::Left => 'L',
            Self::Right => 'R',
            Self::Stop => 'S',
        }
    }

    pub fn from_code(c: char) -> Option<Self> {
        match c {
            'F' => Some(Self::Forward),
            'B' => Some(Self::Backward),
            'L' => Some(Self::Left),
            'R' => Some(Self::Right),
            'S' => Some(Self::Stop),
            _ => None,
        }
    }
}

impl Default for Command {
    fn default() -> Self {
        Self::Stop
    }
}

/// Source of a dispatched command, in ascending priority order.
///
/// `emergency > joystick > manual_override > map_planner > auto_nav`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceTag {
    AutoNav,
    MapPlanner,
    ManualOverride,
    Joystick,
    Emergency,
}

impl SourceTag {
    /// `Ord` is derived in ascending priority so `a > b` directly answers
    /// "does `a` preempt `b`".
    pub fn preempts(&self, other: &SourceTag) -> bool {
        self > other
    }
}

/// Vehicle pose on the navigation grid.
///
/// Invariant: `0 <= x <= grid_size`, `0 <= y <= grid_size` (clamped),
/// `theta_deg` in `[0, 360)`. Convention: theta=0 points along +x,
/// theta=90 points along -y (screen-up).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta_deg: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, theta_deg: f64) -> Self {
        Self { x, y, theta_deg }
    }

    /// Row/col at the grid boundary: `row = floor(y)`, `col = floor(x)`.
    pub fn row(&self) -> i64 {
        self.y.floor() as i64
    }

    pub fn col(&self) -> i64 {
        self.x.floor() as i64
    }
}

/// Fixed square grid of obstacle cells plus its immutable dimensions.
#[derive(Debug, Clone)]
pub struct Grid {
    pub size: usize,
    obstacles: Vec<bool>,
}

impl Grid {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            obstacles: vec![false; size * size],
        }
    }

    fn index(&self, row: i64, col: i64) -> Option<usize> {
        if !self.in_bounds(row, col) {
            return None;
        }
        Some(row as usize * self.size + col as usize)
    }

    pub fn is_obstacle(&self, row: i64, col: i64) -> bool {
        self.index(row, col).map(|i| self.obstacles[i]).unwrap_or(false)
    }

    pub fn set_obstacle(&mut self, row: i64, col: i64, obstacle: bool) {
        if let Some(i) = self.index(row, col) {
            self.obstacles[i] = obstacle;
        }
    }

    /// Replace the whole obstacle set from a list of `(row, col)` cells.
    pub fn replace_obstacles(&mut self, cells: &[(i64, i64)]) {
        self.obstacles.iter_mut().for_each(|o| *o = false);
        for &(row, col) in cells {
            self.set_obstacle(row, col, true);
        }
    }

    pub fn in_bounds(&self, row: i64, col: i64) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.size && (col as usize) < self.size
    }
}

/// Calibration mapping from pulse to displacement (F/B) or rotation (L/R).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParams {
    /// Grid-cells covered per F/B pulse.
    pub move_distance: f64,
    /// Degrees rotated per L/R pulse.
    pub turn_angle: f64,
    pub forward_delay: f64,
    pub turn_delay_left: f64,
    pub turn_delay_right: f64,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            move_distance: 1.0,
            turn_angle: 90.0,
            forward_delay: 0.5,
            turn_delay_left: 0.5,
            turn_delay_right: 0.5,
        }
    }
}

/// Raw joystick input, pre-deadzone.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ControlInput {
    /// -100..=100
    pub forward: i32,
    /// -100..=100
    pub turn: i32,
}

/// Opaque image buffer with a latest-wins identity.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: std::sync::Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub sequence: u64,
    pub timestamp_ms: u64,
}

/// A detection produced by the (possibly absent) object detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub label: String,
    pub confidence: f64,
    pub class_id: i32,
}

impl DetectionBox {
    pub fn centroid_x(&self) -> f64 {
        (self.x1 + self.x2) as f64 / 2.0
    }
}

/// Telemetry snapshot broadcast to operator sessions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Telemetry {
    pub battery: u8,
    pub current_motion: Command,
    pub auto_navigation: bool,
    pub object_detection: bool,
}

/// One step of a navigation plan: a pulse and its calibrated duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub command: Command,
    pub duration_s: f64,
}

/// Ordered sequence of pulses produced by the navigation planner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavigationPlan {
    pub steps: Vec<PlanStep>,
}

impl NavigationPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

bitflags! {
    /// What an operator session is allowed to do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SessionCapabilities: u8 {
        const RECEIVE_POSE = 0b0000_0001;
        const RECEIVE_FRAMES = 0b0000_0010;
        const RECEIVE_LOGS = 0b0000_0100;
        const SEND_CONTROL = 0b0000_1000;
        const SEND_ESTOP = 0b0001_0000;
        const SEND_MAP_COMMANDS = 0b0010_0000;
    }
}

/// A connected operator: capability set plus a transient identity.
///
/// Sessions have no persistent identity — `id` is minted on attach and
/// discarded on detach.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub capabilities: SessionCapabilities,
}

impl Session {
    pub fn full_access() -> Self {
        Self {
            id: Uuid::new_v4(),
            capabilities: SessionCapabilities::all(),
        }
    }
}
