//! Navigation state machine (§4.3): drives a [`NavigationPlan`] through the
//! arbiter one pulse at a time, suspending only on the inter-step delay
//! (§5's "only place the planner waits"), with cooperative cancellation and
//! a step-overrun watchdog.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arbiter::{Arbiter, Preemptable};
use thiserror::Error;
use tracing::{info, warn};
use types::{Command, SourceTag};

use crate::plan;
use crate::shared_state::SharedState;

/// `Idle -> Planning -> Executing(step_i) -> Idle`, per §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationState {
    Idle,
    Planning,
    Executing { step: usize, total: usize },
}

#[derive(Debug, Error)]
pub enum NavigatorError {
    #[error("plan cancelled")]
    Cancelled,
    #[error("step preempted by a higher-priority source: {0}")]
    Preempted(String),
    #[error("obstacle ahead of step {0}")]
    Obstacle(usize),
    #[error("step {0} overran its nominal duration")]
    StepOverrun(usize),
}

/// Drives plans for `navigate_to` and the `go_up`/`turn_90_*` convenience
/// operations (§6). Registered with the [`Arbiter`] as a [`Preemptable`] so
/// a higher-priority dispatch can cancel an in-progress plan (§4.1).
pub struct NavigatorHandle {
    arbiter: Arc<Arbiter>,
    shared: Arc<SharedState>,
    state: Mutex<NavigationState>,
    cancel_flag: AtomicBool,
}

impl NavigatorHandle {
    pub fn new(arbiter: Arc<Arbiter>, shared: Arc<SharedState>) -> Arc<Self> {
        Arc::new(Self {
            arbiter,
            shared,
            state: Mutex::new(NavigationState::Idle),
            cancel_flag: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> NavigationState {
        *self.state.lock().unwrap()
    }

    /// `navigate_to` inbound message (§6): plan to `(row, col)` and execute.
    pub async fn navigate(&self, target: (i64, i64)) -> Result<(), NavigatorError> {
        *self.state.lock().unwrap() = NavigationState::Planning;
        self.cancel_flag.store(false, Ordering::SeqCst);

        let pose = self.shared.pose();
        let calib = self.shared.calibration();
        let grid = self.shared.grid_snapshot();
        let navigation_plan = plan::plan(target, pose, calib, &grid);

        self.execute(navigation_plan.steps).await
    }

    /// `go_up {}` — plan one cell toward decreasing row ("up" on the map),
    /// reusing the main planner so the turn-then-forward sequencing is
    /// identical to `navigate_to`.
    pub async fn go_up_one_cell(&self) -> Result<(), NavigatorError> {
        let pose = self.shared.pose();
        self.navigate((pose.row() - 1, pose.col())).await
    }

    /// `turn_90_left {}` / `turn_90_right {}` — fixed short plans, executed
    /// through the same state machine so they inherit preemption for free.
    pub async fn turn_90_left(&self) -> Result<(), NavigatorError> {
        self.run_fixed_turn(Command::Left).await
    }

    pub async fn turn_90_right(&self) -> Result<(), NavigatorError> {
        self.run_fixed_turn(Command::Right).await
    }

    async fn run_fixed_turn(&self, turn_cmd: Command) -> Result<(), NavigatorError> {
        *self.state.lock().unwrap() = NavigationState::Planning;
        self.cancel_flag.store(false, Ordering::SeqCst);

        let calib = self.shared.calibration();
        let duration = match turn_cmd {
            Command::Left => calib.turn_delay_left,
            Command::Right => calib.turn_delay_right,
            _ => unreachable!("run_fixed_turn only called with Left/Right"),
        };
        let pulses = (90.0 / calib.turn_angle).round().max(1.0) as usize;
        let steps = vec![
            types::PlanStep {
                command: turn_cmd,
                duration_s: duration,
            };
            pulses
        ];

        self.execute(steps).await
    }

    /// `clear_target {}` (§6) / arbiter preemption: stop cooperatively. Does
    /// not itself issue `S` — the next step check, or the caller via
    /// `Preemptable::cancel`, handles that.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    async fn execute(&self, steps: Vec<types::PlanStep>) -> Result<(), NavigatorError> {
        if steps.is_empty() {
            *self.state.lock().unwrap() = NavigationState::Idle;
            return Ok(());
        }

        // Marks the plan active on the arbiter for the duration of this
        // loop — not inferred from `last_source`, since a plan that
        // finishes cleanly never dispatches a trailing `S` (§4.1).
        self.arbiter.set_plan_active(true);

        let total = steps.len();
        for (i, step) in steps.into_iter().enumerate() {
            if self.cancel_flag.load(Ordering::SeqCst) {
                self.stop_and_log("plan cancelled before step");
                return Err(NavigatorError::Cancelled);
            }

            *self.state.lock().unwrap() = NavigationState::Executing { step: i, total };

            let nominal = Duration::from_secs_f64(step.duration_s.max(0.0));
            let watchdog = nominal.saturating_mul(2).max(Duration::from_millis(1));

            let run_step = async {
                self.arbiter
                    .dispatch(step.command, SourceTag::MapPlanner)
                    .await
                    .map_err(|e| NavigatorError::Preempted(e.to_string()))?;
                tokio::time::sleep(nominal).await;
                Ok::<(), NavigatorError>(())
            };

            match tokio::time::timeout(watchdog, run_step).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    self.stop_and_log(&format!("step {i} failed: {err}"));
                    return Err(err);
                }
                Err(_) => {
                    self.stop_and_log(&format!("step {i} overran its nominal duration"));
                    return Err(NavigatorError::StepOverrun(i));
                }
            }
        }

        *self.state.lock().unwrap() = NavigationState::Idle;
        self.arbiter.set_plan_active(false);
        Ok(())
    }

    fn stop_and_log(&self, reason: &str) {
        warn!(reason, "navigator stopping");
        *self.state.lock().unwrap() = NavigationState::Idle;
        self.arbiter.set_plan_active(false);
        let arbiter = self.arbiter.clone();
        let reason = reason.to_string();
        tokio::spawn(async move {
            if let Err(err) = arbiter.dispatch(Command::Stop, SourceTag::MapPlanner).await {
                info!(?err, reason, "stop dispatch after planner abort was itself rejected");
            }
        });
    }
}

impl Preemptable for NavigatorHandle {
    fn cancel(&self) {
        NavigatorHandle::cancel(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter::LoggingActuator;
    use localization::{PoseEstimator, VirtualRobot};
    use types::{CalibrationParams, Grid, Pose};

    fn build() -> (Arc<NavigatorHandle>, Arc<SharedState>, Arc<Arbiter>) {
        let calib = CalibrationParams {
            move_distance: 1.0,
            turn_angle: 90.0,
            forward_delay: 0.001,
            turn_delay_left: 0.001,
            turn_delay_right: 0.001,
        };
        let start = Pose::new(10.0, 10.0, 90.0);
        let pose_estimator = Arc::new(Mutex::new(PoseEstimator::new(start, 20, calib)));
        let virtual_robot = Arc::new(Mutex::new(VirtualRobot::new(start, 20, calib)));
        let shared = Arc::new(SharedState::new(Grid::new(20), calib, pose_estimator, virtual_robot));
        let arbiter = Arc::new(Arbiter::new(Arc::new(LoggingActuator)));
        let navigator = NavigatorHandle::new(arbiter.clone(), shared.clone());
        (navigator, shared, arbiter)
    }

    #[tokio::test]
    async fn test_navigate_to_current_cell_is_idle_immediately() {
        let (navigator, _shared, _arbiter) = build();
        navigator.navigate((10, 10)).await.unwrap();
        assert_eq!(navigator.state(), NavigationState::Idle);
    }

    #[tokio::test]
    async fn test_navigate_runs_to_completion() {
        let (navigator, _shared, _arbiter) = build();
        navigator.navigate((5, 10)).await.unwrap();
        assert_eq!(navigator.state(), NavigationState::Idle);
    }

    #[tokio::test]
    async fn test_navigate_completion_clears_plan_active_on_arbiter() {
        // A plan that reaches `Idle` cleanly must not leave the arbiter's
        // `plan_active` flag set — otherwise every subsequent auto-nav
        // dispatch is rejected as "preempted" forever (§4.1/§4.6).
        let (navigator, _shared, arbiter) = build();
        navigator.navigate((5, 10)).await.unwrap();
        assert!(!arbiter.is_plan_active());

        let result = arbiter.dispatch(types::Command::Left, SourceTag::AutoNav).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_before_start_aborts_immediately() {
        let (navigator, _shared, arbiter) = build();
        navigator.cancel();
        let result = navigator.navigate((5, 10)).await;
        assert!(matches!(result, Err(NavigatorError::Cancelled)));
        assert_eq!(navigator.state(), NavigationState::Idle);
        assert!(!arbiter.is_plan_active());
    }

    #[tokio::test]
    async fn test_turn_90_left_runs_a_single_pulse_at_90_degree_calibration() {
        let (navigator, _shared, _arbiter) = build();
        navigator.turn_90_left().await.unwrap();
        assert_eq!(navigator.state(), NavigationState::Idle);
    }
}
