//! Operator session wire protocol (§6): JSON-framed, externally tagged on
//! `type`, mirroring how the teacher tags its own dispatch protocol enums
//! (`DispatchToRover`/`RoverToDispatch`).

use serde::{Deserialize, Serialize};
use types::{Command, Telemetry};

/// Inbound message from an operator session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Joystick tick; expected ~20 Hz.
    Control { forward: i32, turn: i32 },
    EmergencyStop {},
    NavigateTo { row: i64, col: i64 },
    ClearTarget {},
    ResetStart {},
    GoUp {},
    Turn90Left {},
    Turn90Right {},
    /// `[[row, col], ...]` cells, carried here as a named field since the
    /// tagged envelope needs an object body.
    UpdateObstacles { cells: Vec<(i64, i64)> },
    UpdateTiming {
        forward_delay: f64,
        turn_left_delay: f64,
        turn_right_delay: f64,
    },
    /// `command` is one of `"F"|"B"|"L"|"R"`.
    CalibrateCommand { command: String },
    ApplyCalibration {
        #[serde(default)]
        distance: Option<f64>,
        #[serde(default)]
        angle: Option<f64>,
    },
    RequestCalibrationValues {},
}

impl ClientMessage {
    /// Parse `command` into a motion [`Command`]; only `F`/`B`/`L`/`R` are
    /// valid single-pulse calibration targets (§6).
    pub fn calibration_command(&self) -> Option<Command> {
        match self {
            ClientMessage::CalibrateCommand { command } => {
                command.chars().next().and_then(Command::from_code)
            }
            _ => None,
        }
    }
}

/// Outbound message to an operator session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    RobotUpdate { row: f64, col: f64, angle: f64 },
    Telemetry(Telemetry),
    Log { msg: String },
    CalibrationValues { move_distance: f64, turn_angle: f64 },
    EmergencyStopActivated {},
    VideoFrame { data_base64: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid operator message: {0}")]
    InvalidMessage(String),
}

pub fn parse_client_message(raw: &str) -> Result<ClientMessage, ProtocolError> {
    serde_json::from_str(raw).map_err(|e| ProtocolError::InvalidMessage(e.to_string()))
}

pub fn encode_server_message(msg: &ServerMessage) -> String {
    serde_json::to_string(msg).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_control_message() {
        let msg = parse_client_message(r#"{"type":"control","forward":80,"turn":5}"#).unwrap();
        assert_eq!(msg, ClientMessage::Control { forward: 80, turn: 5 });
    }

    #[test]
    fn test_parse_navigate_to() {
        let msg = parse_client_message(r#"{"type":"navigate_to","row":5,"col":10}"#).unwrap();
        assert_eq!(msg, ClientMessage::NavigateTo { row: 5, col: 10 });
    }

    #[test]
    fn test_parse_zero_arg_message() {
        let msg = parse_client_message(r#"{"type":"emergency_stop"}"#).unwrap();
        assert_eq!(msg, ClientMessage::EmergencyStop {});
    }

    #[test]
    fn test_parse_update_obstacles() {
        let msg = parse_client_message(r#"{"type":"update_obstacles","cells":[[1,2],[3,4]]}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::UpdateObstacles { cells: vec![(1, 2), (3, 4)] }
        );
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let result = parse_client_message("not json");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = parse_client_message(r#"{"type":"nonsense"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_calibration_command_parses_known_code() {
        let msg = ClientMessage::CalibrateCommand { command: "F".into() };
        assert_eq!(msg.calibration_command(), Some(Command::Forward));
    }

    #[test]
    fn test_calibration_command_rejects_unknown_code() {
        let msg = ClientMessage::CalibrateCommand { command: "Q".into() };
        assert_eq!(msg.calibration_command(), None);
    }

    #[test]
    fn test_server_message_encodes_tagged_json() {
        let encoded = encode_server_message(&ServerMessage::EmergencyStopActivated {});
        assert!(encoded.contains("\"type\":\"emergency_stop_activated\""));
    }
}
