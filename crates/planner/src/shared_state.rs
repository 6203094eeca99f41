//! Process-wide grid + calibration store (§3/§9): the planner is the
//! primary reader/writer, so it owns the state rather than `types`.

use std::sync::{Arc, Mutex};

use localization::{PoseEstimator, VirtualRobot};
use types::{CalibrationParams, Command, Grid, Pose};

pub struct SharedState {
    grid: Mutex<Grid>,
    calibration: Mutex<CalibrationParams>,
    pose_estimator: Arc<Mutex<PoseEstimator>>,
    virtual_robot: Arc<Mutex<VirtualRobot>>,
}

impl SharedState {
    pub fn new(
        grid: Grid,
        calibration: CalibrationParams,
        pose_estimator: Arc<Mutex<PoseEstimator>>,
        virtual_robot: Arc<Mutex<VirtualRobot>>,
    ) -> Self {
        Self {
            grid: Mutex::new(grid),
            calibration: Mutex::new(calibration),
            pose_estimator,
            virtual_robot,
        }
    }

    pub fn grid_snapshot(&self) -> Grid {
        self.grid.lock().unwrap().clone()
    }

    pub fn calibration(&self) -> CalibrationParams {
        *self.calibration.lock().unwrap()
    }

    /// Current pose snapshot, read through the estimator (§3 "Pose is
    /// owned by the Pose Estimator; read by everyone through a snapshot
    /// interface").
    pub fn pose(&self) -> Pose {
        self.pose_estimator.lock().unwrap().pose()
    }

    /// `reset_start {}` inbound message: restore pose to grid center, θ=90°.
    pub fn reset_pose(&self) -> Pose {
        let size = self.grid.lock().unwrap().size;
        let center = (size / 2) as f64;
        let pose0 = Pose::new(center, center, 90.0);
        self.pose_estimator.lock().unwrap().reset(pose0);
        self.virtual_robot.lock().unwrap().reset(pose0);
        pose0
    }

    /// `update_obstacles` inbound message: replace the whole obstacle set.
    pub fn update_obstacles(&self, cells: &[(i64, i64)]) {
        self.grid.lock().unwrap().replace_obstacles(cells);
    }

    /// `update_timing` inbound message.
    pub fn update_timing(&self, forward_delay: f64, turn_left_delay: f64, turn_right_delay: f64) {
        let mut calib = self.calibration.lock().unwrap();
        calib.forward_delay = forward_delay;
        calib.turn_delay_left = turn_left_delay;
        calib.turn_delay_right = turn_right_delay;
    }

    /// `apply_calibration` inbound message. Writes the planner's and the
    /// pose estimator's (and virtual robot's) calibration atomically, as
    /// required by §3.
    pub fn apply_calibration(&self, distance: Option<f64>, angle: Option<f64>) {
        let updated = {
            let mut calib = self.calibration.lock().unwrap();
            if let Some(d) = distance {
                calib.move_distance = d;
            }
            if let Some(a) = angle {
                calib.turn_angle = a;
            }
            *calib
        };
        self.pose_estimator.lock().unwrap().set_calibration(updated);
        self.virtual_robot.lock().unwrap().set_calibration(updated);
    }

    /// Nominal pulse duration for a single `calibrate_command` pulse.
    pub fn nominal_duration(&self, cmd: Command) -> f64 {
        let calib = self.calibration();
        match cmd {
            Command::Forward | Command::Backward => calib.forward_delay,
            Command::Left => calib.turn_delay_left,
            Command::Right => calib.turn_delay_right,
            Command::Stop => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::Pose;

    fn shared() -> SharedState {
        let calib = CalibrationParams::default();
        let pose_estimator = Arc::new(Mutex::new(PoseEstimator::new(Pose::new(10.0, 10.0, 90.0), 20, calib)));
        let virtual_robot = Arc::new(Mutex::new(VirtualRobot::new(Pose::new(10.0, 10.0, 90.0), 20, calib)));
        SharedState::new(Grid::new(20), calib, pose_estimator, virtual_robot)
    }

    #[test]
    fn test_update_obstacles_replaces_set() {
        let state = shared();
        state.update_obstacles(&[(1, 1), (2, 2)]);
        let grid = state.grid_snapshot();
        assert!(grid.is_obstacle(1, 1));
        assert!(grid.is_obstacle(2, 2));
        assert!(!grid.is_obstacle(3, 3));
    }

    #[test]
    fn test_apply_calibration_propagates_to_estimator_and_virtual_robot() {
        let state = shared();
        state.apply_calibration(Some(2.0), Some(45.0));
        assert_eq!(state.calibration().move_distance, 2.0);
        assert_eq!(state.calibration().turn_angle, 45.0);
        assert_eq!(state.pose_estimator.lock().unwrap().calibration().move_distance, 2.0);
    }

    #[test]
    fn test_update_timing_only_touches_delays() {
        let state = shared();
        state.update_timing(1.0, 2.0, 3.0);
        let calib = state.calibration();
        assert_eq!(calib.forward_delay, 1.0);
        assert_eq!(calib.turn_delay_left, 2.0);
        assert_eq!(calib.turn_delay_right, 3.0);
        assert_eq!(calib.move_distance, CalibrationParams::default().move_distance);
    }
}
