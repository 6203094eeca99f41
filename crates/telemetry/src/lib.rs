//! Operator session protocol, telemetry fan-out, and video delivery for
//! the tank control core (§4.8, §6): the JSON-over-WebSocket session
//! protocol, the broadcast fan-out that feeds every attached session, and
//! the two video delivery paths (WebSocket base64 frames, MJPEG HTTP).

pub mod fanout;
pub mod log_layer;
pub mod mjpeg;
pub mod protocol;
pub mod video_ws;
pub mod ws;

pub use fanout::{TelemetryFanout, TelemetryObserver};
pub use log_layer::FanoutLogLayer;
pub use mjpeg::{MjpegConfig, MjpegServer};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage};
pub use video_ws::VideoStreamer;
pub use ws::{SessionError, WsConfig, WsServer};
