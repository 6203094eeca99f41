//! Operator session WebSocket server (§6, §3 Session lifecycle).
//!
//! Parsing and capability-gating of inbound messages happens here; routing
//! a valid message to the arbiter/planner/shared state is the daemon's job
//! (`tankd` owns all of those), so accepted messages are simply forwarded
//! up an `mpsc` channel tagged with their session id — the same
//! channel-decoupling the teacher uses between its teleop server and the
//! rest of `bvrd`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use types::{Session, SessionCapabilities};
use uuid::Uuid;

use crate::fanout::TelemetryFanout;
use crate::protocol::{encode_server_message, parse_client_message, ClientMessage, ServerMessage};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct WsConfig {
    pub port: u16,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self { port: 4850 }
    }
}

/// Operator session server: accepts WebSocket connections, forwards
/// accepted inbound messages to `inbound_tx`, and streams the telemetry
/// fan-out back out, filtered by each session's capability set.
pub struct WsServer {
    config: WsConfig,
    inbound_tx: mpsc::Sender<(ClientMessage, Uuid)>,
    fanout: TelemetryFanout,
}

impl WsServer {
    pub fn new(config: WsConfig, inbound_tx: mpsc::Sender<(ClientMessage, Uuid)>, fanout: TelemetryFanout) -> Self {
        Self { config, inbound_tx, fanout }
    }

    pub async fn run(self) -> Result<(), SessionError> {
        let addr = format!("0.0.0.0:{}", self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(addr, "operator session server listening");

        let inbound_tx = Arc::new(self.inbound_tx);
        let fanout = self.fanout;

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let inbound_tx = inbound_tx.clone();
                    let fanout = fanout.clone();
                    tokio::spawn(async move {
                        let session = Session::full_access();
                        info!(%addr, session_id = %session.id, "operator session attached");
                        if let Err(e) = handle_session(stream, session.clone(), inbound_tx, fanout).await {
                            error!(?e, session_id = %session.id, "operator session error");
                        }
                        info!(%addr, session_id = %session.id, "operator session detached");
                    });
                }
                Err(e) => error!(?e, "failed to accept operator session"),
            }
        }
    }
}

async fn handle_session(
    stream: TcpStream,
    session: Session,
    inbound_tx: Arc<mpsc::Sender<(ClientMessage, Uuid)>>,
    fanout: TelemetryFanout,
) -> Result<(), SessionError> {
    let _ = stream.set_nodelay(true);
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    let (mut sender, mut receiver) = ws_stream.split();

    let mut outbound_rx = fanout.subscribe();
    let capabilities = session.capabilities;
    let sender_task = tokio::spawn(async move {
        loop {
            match outbound_rx.recv().await {
                Ok(msg) => {
                    if !should_deliver(&msg, capabilities) {
                        continue;
                    }
                    let text = encode_server_message(&msg);
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "operator session lagged behind telemetry fan-out");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match parse_client_message(&text) {
                Ok(client_msg) => {
                    if let Err(e) = inbound_tx.send((client_msg, session.id)).await {
                        debug!(?e, "inbound router gone; closing session");
                        break;
                    }
                }
                Err(e) => {
                    fanout.log(format!("rejected operator message: {e}")).await;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) => {}
            Err(e) => {
                warn!(?e, "operator session receive error");
                break;
            }
            _ => {}
        }
    }

    sender_task.abort();
    Ok(())
}

fn should_deliver(msg: &ServerMessage, capabilities: SessionCapabilities) -> bool {
    match msg {
        ServerMessage::RobotUpdate { .. } => capabilities.contains(SessionCapabilities::RECEIVE_POSE),
        ServerMessage::Log { .. } => capabilities.contains(SessionCapabilities::RECEIVE_LOGS),
        ServerMessage::VideoFrame { .. } => capabilities.contains(SessionCapabilities::RECEIVE_FRAMES),
        ServerMessage::Telemetry(_)
        | ServerMessage::CalibrationValues { .. }
        | ServerMessage::EmergencyStopActivated {} => true,
    }
}

/// ~20Hz is the expected joystick tick rate (§6); this bound exists so a
/// misbehaving client can't flood the inbound channel unboundedly.
pub const EXPECTED_CONTROL_INTERVAL: Duration = Duration::from_millis(50);
