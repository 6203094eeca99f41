//! Shared open-loop kinematics (§4.2), reused by both the pose estimator
//! and the virtual robot so the two stay in lockstep absent real-world
//! error.

use types::{CalibrationParams, Command, Pose};

/// The dead-reckoning update rule applied on every dispatched command.
///
/// Bounded to `[0, grid_size - 1]` on x/y and wrapped to `[0, 360)` on
/// θ, per §4.2's invariant.
#[derive(Debug, Clone)]
pub struct PoseModel {
    pose: Pose,
    grid_size: usize,
    calibration: CalibrationParams,
}

impl PoseModel {
    pub fn new(start: Pose, grid_size: usize, calibration: CalibrationParams) -> Self {
        let mut model = Self {
            pose: start,
            grid_size,
            calibration,
        };
        model.clamp();
        model
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn calibration(&self) -> CalibrationParams {
        self.calibration
    }

    pub fn set_calibration(&mut self, calibration: CalibrationParams) {
        self.calibration = calibration;
    }

    pub fn reset(&mut self, pose0: Pose) {
        self.pose = pose0;
        self.clamp();
    }

    /// Apply one pulse. Returns the resulting pose.
    pub fn advance(&mut self, cmd: Command) -> Pose {
        let theta_rad = self.pose.theta_deg.to_radians();
        match cmd {
            Command::Forward => {
                self.pose.x += self.calibration.move_distance * theta_rad.cos();
                self.pose.y -= self.calibration.move_distance * theta_rad.sin();
            }
            Command::Backward => {
                self.pose.x -= self.calibration.move_distance * theta_rad.cos();
                self.pose.y += self.calibration.move_distance * theta_rad.sin();
            }
            Command::Left => {
                self.pose.theta_deg = wrap_degrees(self.pose.theta_deg + self.calibration.turn_angle);
            }
            Command::Right => {
                self.pose.theta_deg = wrap_degrees(self.pose.theta_deg - self.calibration.turn_angle);
            }
            Command::Stop => {}
        }
        self.clamp();
        self.pose
    }

    fn clamp(&mut self) {
        let max = (self.grid_size.max(1) - 1) as f64;
        self.pose.x = self.pose.x.clamp(0.0, max);
        self.pose.y = self.pose.y.clamp(0.0, max);
        self.pose.theta_deg = wrap_degrees(self.pose.theta_deg);
    }
}

/// Wrap an angle in degrees to `[0, 360)`.
pub fn wrap_degrees(deg: f64) -> f64 {
    let wrapped = deg % 360.0;
    if wrapped < 0.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}
