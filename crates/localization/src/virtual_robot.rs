//! Virtual robot (§4.7): a second, independent consumer of the same
//! dispatched command stream, sharing kinematics with the pose
//! estimator but carrying no history — it only drives a display model.

use types::{CalibrationParams, Command, Pose};

use crate::pose_model::PoseModel;

pub struct VirtualRobot {
    model: PoseModel,
}

impl VirtualRobot {
    pub fn new(start: Pose, grid_size: usize, calibration: CalibrationParams) -> Self {
        Self {
            model: PoseModel::new(start, grid_size, calibration),
        }
    }

    pub fn pose(&self) -> Pose {
        self.model.pose()
    }

    pub fn set_calibration(&mut self, calibration: CalibrationParams) {
        self.model.set_calibration(calibration);
    }

    pub fn advance(&mut self, cmd: Command) -> Pose {
        self.model.advance(cmd)
    }

    pub fn reset(&mut self, pose0: Pose) {
        self.model.reset(pose0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_robot_mirrors_pose_estimator_kinematics() {
        use crate::estimator::PoseEstimator;

        let calib = CalibrationParams::default();
        let start = Pose::new(10.0, 10.0, 90.0);
        let mut estimator = PoseEstimator::new(start, 20, calib);
        let mut virtual_robot = VirtualRobot::new(start, 20, calib);

        for cmd in [Command::Forward, Command::Forward, Command::Right, Command::Forward] {
            let pose_a = estimator.advance(cmd);
            let pose_b = virtual_robot.advance(cmd);
            assert_eq!(pose_a, pose_b);
        }
    }
}
