//! Open-loop pose estimation (§4.2) and virtual robot mirror (§4.7).

mod estimator;
mod observer;
mod pose_model;
mod virtual_robot;

pub use estimator::PoseEstimator;
pub use observer::{PoseEstimatorObserver, VirtualRobotObserver};
pub use pose_model::{wrap_degrees, PoseModel};
pub use virtual_robot::VirtualRobot;
