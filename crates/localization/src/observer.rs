//! Adapters wiring the pose estimator and virtual robot into the
//! arbiter's observer fan-out (§3/§9 "mirror-write pattern").

use std::sync::{Arc, Mutex};

use arbiter::CommandObserver;
use types::{Command, SourceTag};

use crate::estimator::PoseEstimator;
use crate::virtual_robot::VirtualRobot;

/// Wraps the shared estimator `Arc` rather than owning it outright, so the
/// same instance can also be read directly by [`crate`] consumers (the
/// planner's shared state, telemetry) without a second mirror copy.
pub struct PoseEstimatorObserver(pub Arc<Mutex<PoseEstimator>>);

impl CommandObserver for PoseEstimatorObserver {
    fn on_command(&self, cmd: Command, _source: SourceTag) {
        self.0.lock().unwrap().advance(cmd);
    }
}

pub struct VirtualRobotObserver(pub Arc<Mutex<VirtualRobot>>);

impl CommandObserver for VirtualRobotObserver {
    fn on_command(&self, cmd: Command, _source: SourceTag) {
        self.0.lock().unwrap().advance(cmd);
    }
}
