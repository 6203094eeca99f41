//! Pure planning function (§4.3 steps 1-6).

use localization::PoseModel;
use types::{CalibrationParams, Command, Grid, NavigationPlan, PlanStep, Pose};

/// Reduce an angle (degrees) to `(-180, 180]`.
fn normalize_signed(deg: f64) -> f64 {
    let mut d = deg % 360.0;
    if d <= -180.0 {
        d += 360.0;
    } else if d > 180.0 {
        d -= 360.0;
    }
    d
}

/// Build the bounded pulse sequence that approximately reaches
/// `target = (row, col)` from `pose`, truncating the forward run the
/// moment it would enter an obstacle cell (no pathfinding, §4.3
/// Non-goal).
pub fn plan(target: (i64, i64), pose: Pose, calib: CalibrationParams, grid: &Grid) -> NavigationPlan {
    let (target_row, target_col) = target;
    let drow = (target_row - pose.row()) as f64;
    let dcol = (target_col - pose.col()) as f64;

    if drow == 0.0 && dcol == 0.0 {
        return NavigationPlan::default();
    }

    // Forward motion maps to (Δcol, Δrow) = (cos θ, -sin θ) · distance,
    // so the heading that points straight at the target is:
    let desired_heading = (-drow).atan2(dcol).to_degrees();
    let delta = normalize_signed(desired_heading - pose.theta_deg);
    let turns = (delta.abs() / calib.turn_angle).round() as i64;
    let turn_cmd = if delta > 0.0 { Command::Left } else { Command::Right };
    let turn_duration = match turn_cmd {
        Command::Left => calib.turn_delay_left,
        Command::Right => calib.turn_delay_right,
        _ => unreachable!(),
    };

    let distance = (drow * drow + dcol * dcol).sqrt();
    let forward_pulses = (distance / calib.move_distance).round() as i64;

    let mut steps = Vec::new();
    let mut scratch = PoseModel::new(pose, grid.size, calib);
    for _ in 0..turns {
        scratch.advance(turn_cmd);
        steps.push(PlanStep {
            command: turn_cmd,
            duration_s: turn_duration,
        });
    }

    for _ in 0..forward_pulses {
        let mut probe = scratch.clone();
        let next = probe.advance(Command::Forward);
        if grid.is_obstacle(next.row(), next.col()) {
            break;
        }
        scratch = probe;
        steps.push(PlanStep {
            command: Command::Forward,
            duration_s: calib.forward_delay,
        });
    }

    NavigationPlan { steps }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calib() -> CalibrationParams {
        CalibrationParams {
            move_distance: 1.0,
            turn_angle: 90.0,
            ..CalibrationParams::default()
        }
    }

    #[test]
    fn test_scenario_2_straight_ahead() {
        let pose = Pose::new(10.0, 10.0, 90.0);
        let plan = plan((5, 10), pose, calib(), &Grid::new(20));
        assert_eq!(plan.steps.len(), 5);
        assert!(plan.steps.iter().all(|s| s.command == Command::Forward));
    }

    #[test]
    fn test_scenario_3_one_right_turn_then_forward() {
        let pose = Pose::new(10.0, 10.0, 90.0);
        let plan = plan((10, 15), pose, calib(), &Grid::new(20));
        assert_eq!(plan.steps[0].command, Command::Right);
        assert_eq!(plan.steps.iter().filter(|s| s.command == Command::Right).count(), 1);
        assert_eq!(plan.steps.iter().filter(|s| s.command == Command::Forward).count(), 5);
    }

    #[test]
    fn test_navigate_to_current_cell_is_empty() {
        let pose = Pose::new(10.0, 10.0, 90.0);
        let plan = plan((pose.row(), pose.col()), pose, calib(), &Grid::new(20));
        assert!(plan.is_empty());
    }

    #[test]
    fn test_plan_truncates_at_obstacle() {
        let pose = Pose::new(10.0, 10.0, 90.0);
        let mut grid = Grid::new(20);
        // Two cells straight ahead (north) of (row=10,col=10) is an obstacle.
        grid.set_obstacle(8, 10, true);
        let plan = plan((5, 10), pose, calib(), &grid);
        let forward_count = plan.steps.iter().filter(|s| s.command == Command::Forward).count();
        assert_eq!(forward_count, 2);
    }
}
