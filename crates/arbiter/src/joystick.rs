//! Joystick-to-command mapping (§4.1).

use types::{Command, ControlInput};

/// Normalized axis deadzone, applied after scaling to `[-1.0, 1.0]`.
pub const DEADZONE: f64 = 0.15;

/// Map a raw `ControlInput` to a command plus a magnitude in `[0.0, 1.0]`
/// that scales the pulse duration (never the command kind).
///
/// `|forward|` dominant -> `Forward`/`Backward`; otherwise `|turn|`
/// dominant -> `Right`/`Left`; both below the deadzone -> `Stop`.
pub fn map_control_input(input: ControlInput) -> (Command, f64) {
    let forward = (input.forward as f64 / 100.0).clamp(-1.0, 1.0);
    let turn = (input.turn as f64 / 100.0).clamp(-1.0, 1.0);

    let forward = if forward.abs() < DEADZONE { 0.0 } else { forward };
    let turn = if turn.abs() < DEADZONE { 0.0 } else { turn };

    if forward.abs() >= turn.abs() {
        if forward > 0.0 {
            (Command::Forward, forward.abs())
        } else if forward < 0.0 {
            (Command::Backward, forward.abs())
        } else {
            (Command::Stop, 0.0)
        }
    } else if turn > 0.0 {
        (Command::Right, turn.abs())
    } else {
        (Command::Left, turn.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_dominant() {
        let (cmd, mag) = map_control_input(ControlInput { forward: 80, turn: 5 });
        assert_eq!(cmd, Command::Forward);
        assert!((mag - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_backward_dominant() {
        let (cmd, _) = map_control_input(ControlInput { forward: -60, turn: 0 });
        assert_eq!(cmd, Command::Backward);
    }

    #[test]
    fn test_turn_right_dominant() {
        let (cmd, _) = map_control_input(ControlInput { forward: 0, turn: 50 });
        assert_eq!(cmd, Command::Right);
    }

    #[test]
    fn test_turn_left_dominant() {
        let (cmd, _) = map_control_input(ControlInput { forward: 10, turn: -50 });
        assert_eq!(cmd, Command::Left);
    }

    #[test]
    fn test_both_below_deadzone_is_stop() {
        let (cmd, mag) = map_control_input(ControlInput { forward: 10, turn: -10 });
        assert_eq!(cmd, Command::Stop);
        assert_eq!(mag, 0.0);
    }

    #[test]
    fn test_deadzone_boundary() {
        // Deadzone is a strict `<`, so exactly 15% clears it and still drives.
        let (cmd, _) = map_control_input(ControlInput { forward: 15, turn: 0 });
        assert_eq!(cmd, Command::Forward);
    }

    #[test]
    fn test_deadzone_just_under_threshold_is_stop() {
        let (cmd, _) = map_control_input(ControlInput { forward: 14, turn: 0 });
        assert_eq!(cmd, Command::Stop);
    }

    #[test]
    fn test_equal_magnitude_prefers_forward() {
        let (cmd, _) = map_control_input(ControlInput { forward: 50, turn: 50 });
        assert_eq!(cmd, Command::Forward);
    }
}
