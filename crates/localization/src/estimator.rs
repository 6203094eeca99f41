//! Pose estimator (§4.2): the vehicle's own dead-reckoning state, plus a
//! bounded history ring buffer for UI trails.

use std::collections::VecDeque;

use tracing::debug;
use types::{CalibrationParams, Command, Pose};

use crate::pose_model::PoseModel;

/// Recent-pose trail length. Not load-bearing — purely cosmetic, per
/// §4.2.
const HISTORY_CAPACITY: usize = 100;

pub struct PoseEstimator {
    model: PoseModel,
    history: VecDeque<Pose>,
}

impl PoseEstimator {
    pub fn new(start: Pose, grid_size: usize, calibration: CalibrationParams) -> Self {
        Self {
            model: PoseModel::new(start, grid_size, calibration),
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    pub fn pose(&self) -> Pose {
        self.model.pose()
    }

    pub fn calibration(&self) -> CalibrationParams {
        self.model.calibration()
    }

    pub fn set_calibration(&mut self, calibration: CalibrationParams) {
        self.model.set_calibration(calibration);
    }

    /// Recent poses, oldest first. Purely informational.
    pub fn history(&self) -> &[Pose] {
        self.history.as_slices().0
    }

    /// Apply a dispatched command and record the resulting pose.
    pub fn advance(&mut self, cmd: Command) -> Pose {
        let pose = self.model.advance(cmd);
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(pose);
        debug!(?cmd, ?pose, "pose estimator advanced");
        pose
    }

    /// Restore the configured start pose and discard all history.
    pub fn reset(&mut self, pose0: Pose) {
        self.model.reset(pose0);
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_bounded_at_capacity() {
        let mut estimator = PoseEstimator::new(Pose::new(10.0, 10.0, 90.0), 20, CalibrationParams::default());
        for _ in 0..(HISTORY_CAPACITY + 20) {
            estimator.advance(Command::Left);
        }
        assert_eq!(estimator.history().len(), HISTORY_CAPACITY);
    }

    #[test]
    fn test_reset_clears_history_and_restores_pose() {
        let mut estimator = PoseEstimator::new(Pose::new(10.0, 10.0, 90.0), 20, CalibrationParams::default());
        estimator.advance(Command::Forward);
        assert_eq!(estimator.history().len(), 1);

        estimator.reset(Pose::new(10.0, 10.0, 90.0));
        assert!(estimator.history().is_empty());
        assert_eq!(estimator.pose(), Pose::new(10.0, 10.0, 90.0));
    }
}
