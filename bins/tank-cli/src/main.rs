//! tank-cli — command-line tool for driving and calibrating the tank over
//! an operator session WebSocket, without a browser dashboard attached.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use telemetry::{ClientMessage, ServerMessage};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[command(name = "tank-cli", about = "Tank operator session command-line interface")]
struct Args {
    /// Operator session WebSocket address (host:port).
    #[arg(short, long, default_value = "127.0.0.1:4850")]
    address: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a single joystick-style drive command, then stop.
    Drive {
        /// Forward axis, -100..100.
        #[arg(short, long, default_value_t = 0)]
        forward: i32,
        /// Turn axis, -100..100.
        #[arg(short, long, default_value_t = 0)]
        turn: i32,
    },
    /// Send an emergency stop.
    Estop,
    /// Drive to a grid cell via the navigator.
    NavigateTo {
        row: i64,
        col: i64,
    },
    /// Restore pose to the grid center.
    ResetStart,
    /// Pulse a single calibration command ("F", "B", "L", or "R").
    Calibrate {
        command: String,
    },
    /// Print server messages as they arrive until interrupted.
    Monitor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let url = format!("ws://{}", args.address);
    let (ws_stream, _) = connect_async(&url).await?;
    let (mut write, mut read) = ws_stream.split();

    let outbound = match args.command {
        Commands::Drive { forward, turn } => Some(ClientMessage::Control { forward, turn }),
        Commands::Estop => Some(ClientMessage::EmergencyStop {}),
        Commands::NavigateTo { row, col } => Some(ClientMessage::NavigateTo { row, col }),
        Commands::ResetStart => Some(ClientMessage::ResetStart {}),
        Commands::Calibrate { command } => Some(ClientMessage::CalibrateCommand { command }),
        Commands::Monitor => None,
    };

    if let Some(msg) = outbound {
        let text = serde_json::to_string(&msg)?;
        println!("-> {text}");
        write.send(Message::Text(text.into())).await?;
    }

    println!("listening for server messages (Ctrl+C to exit)...");
    while let Some(frame) = read.next().await {
        let frame = frame?;
        let Message::Text(text) = frame else { continue };
        match serde_json::from_str::<ServerMessage>(&text) {
            Ok(ServerMessage::VideoFrame { .. }) => println!("<- video_frame (omitted)"),
            Ok(msg) => println!("<- {msg:?}"),
            Err(err) => bail!("malformed server message: {err}"),
        }
    }

    Ok(())
}
