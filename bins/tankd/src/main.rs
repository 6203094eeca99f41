//! tankd — main control daemon for the tank control core.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use arbiter::{joystick::map_control_input, Arbiter, LoggingActuator};
use autonav::FollowPolicy;
use clap::Parser;
use localization::{PoseEstimator, PoseEstimatorObserver, VirtualRobot, VirtualRobotObserver};
use planner::{NavigatorHandle, SharedState};
use serde::Deserialize;
use telemetry::{
    ClientMessage, MjpegConfig, MjpegServer, ServerMessage, TelemetryFanout, TelemetryObserver, VideoStreamer, WsConfig,
    WsServer,
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use types::{CalibrationParams, Command, ControlInput, Grid, Pose, SourceTag};
use vision::{CaptureLoop, Detector, FilteredDetector, NullDetector, TestPatternSource};

/// `tankd.toml` structure, mirroring the teacher's `FileConfig` layering:
/// CLI overrides file, file overrides these defaults.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FileConfig {
    grid: GridFileConfig,
    camera: CameraFileConfig,
    calibration: CalibrationFileConfig,
    detector: DetectorFileConfig,
    autonav: AutonavFileConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GridFileConfig {
    size: usize,
}

impl Default for GridFileConfig {
    fn default() -> Self {
        Self { size: 20 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct CameraFileConfig {
    width: u32,
    height: u32,
}

impl Default for CameraFileConfig {
    fn default() -> Self {
        Self { width: 640, height: 480 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct CalibrationFileConfig {
    move_distance: f64,
    turn_angle: f64,
    forward_delay: f64,
    turn_delay_left: f64,
    turn_delay_right: f64,
}

impl Default for CalibrationFileConfig {
    fn default() -> Self {
        let c = CalibrationParams::default();
        Self {
            move_distance: c.move_distance,
            turn_angle: c.turn_angle,
            forward_delay: c.forward_delay,
            turn_delay_left: c.turn_delay_left,
            turn_delay_right: c.turn_delay_right,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct DetectorFileConfig {
    model_path: Option<PathBuf>,
    confidence: f64,
    classes: Vec<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct AutonavFileConfig {
    enabled: bool,
}

impl Default for AutonavFileConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

impl FileConfig {
    fn load(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            Ok(FileConfig::default())
        }
    }
}

#[derive(Parser)]
#[command(name = "tankd", about = "Tank control core daemon")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, default_value = "config/tankd.toml")]
    config: PathBuf,

    /// Directory for rolling log files.
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Base log level.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Operator session WebSocket port (0 disables).
    #[arg(long)]
    ws_port: Option<u16>,

    /// MJPEG multipart HTTP stream port (0 disables).
    #[arg(long)]
    mjpeg_port: Option<u16>,

    /// Navigation grid size (cells per side). Overrides config file.
    #[arg(long)]
    grid_size: Option<usize>,

    /// Camera capture resolution, e.g. "1280x720". Overrides config file.
    #[arg(long)]
    camera_resolution: Option<String>,

    /// Object detector model path. Overrides config file; omitted means
    /// no model is loaded and detections are always empty.
    #[arg(long)]
    detector_model: Option<PathBuf>,

    /// Minimum detection confidence to keep a box.
    #[arg(long)]
    detector_confidence: Option<f64>,

    /// Enable person-following auto-navigation at startup.
    #[arg(long)]
    auto_navigation: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The fan-out must exist before logging is wired up: a `tracing` layer
    // forwards every log line into it as the operator-facing `log` event
    // (§4.8), not just the handful of call sites that invoke
    // `TelemetryFanout::log` directly.
    let fanout = TelemetryFanout::new();
    let _log_guard = init_logging(&args.log_dir, &args.log_level, fanout.clone())?;

    let file_config = FileConfig::load(&args.config)?;
    info!(path = %args.config.display(), "loaded config");

    let grid_size = args.grid_size.unwrap_or(file_config.grid.size);
    let (camera_width, camera_height) = resolve_camera_resolution(&args.camera_resolution, &file_config.camera);

    let calib = CalibrationParams {
        move_distance: file_config.calibration.move_distance,
        turn_angle: file_config.calibration.turn_angle,
        forward_delay: file_config.calibration.forward_delay,
        turn_delay_left: file_config.calibration.turn_delay_left,
        turn_delay_right: file_config.calibration.turn_delay_right,
    };

    // Start pose: grid center, θ=90° (§6 `reset_start` convention).
    let center = (grid_size / 2) as f64;
    let start_pose = Pose::new(center, center, 90.0);

    let pose_estimator = Arc::new(Mutex::new(PoseEstimator::new(start_pose, grid_size, calib)));
    let virtual_robot = Arc::new(Mutex::new(VirtualRobot::new(start_pose, grid_size, calib)));

    let telemetry_observer = Arc::new(TelemetryObserver::new(fanout.clone(), pose_estimator.clone()));

    // Registration order matters: the estimator/virtual-robot mirror-write
    // must advance before telemetry reads the resulting pose (§3).
    let arbiter = Arc::new(
        Arbiter::new(Arc::new(LoggingActuator))
            .with_observer(Arc::new(PoseEstimatorObserver(pose_estimator.clone())))
            .with_observer(Arc::new(VirtualRobotObserver(virtual_robot.clone())))
            .with_observer(telemetry_observer),
    );

    let shared = Arc::new(SharedState::new(
        Grid::new(grid_size),
        calib,
        pose_estimator.clone(),
        virtual_robot.clone(),
    ));

    let navigator = NavigatorHandle::new(arbiter.clone(), shared.clone());
    arbiter.register_planner(navigator.clone());

    // Camera capture: the real driver is an opaque external collaborator
    // (out of scope); this core always runs the deterministic test
    // pattern source, the same way the teacher's `bvrd` falls back to
    // `SimBus` when no real CAN hardware is wired in.
    let (capture, frame_rx) = CaptureLoop::new(Box::new(TestPatternSource::new(camera_width, camera_height)));
    tokio::task::spawn_blocking(move || capture.run());
    info!(width = camera_width, height = camera_height, "camera capture loop started");

    let detector_confidence = args.detector_confidence.unwrap_or(file_config.detector.confidence);
    let detector_model = args.detector_model.clone().or(file_config.detector.model_path.clone());
    let detector_classes = if file_config.detector.classes.is_empty() {
        vec![0]
    } else {
        file_config.detector.classes.clone()
    };

    let detector: Arc<dyn Detector> = match &detector_model {
        Some(path) => {
            info!(path = %path.display(), "detector model configured (loading is host-specific and out of scope)");
            fanout.set_object_detection(true);
            Arc::new(FilteredDetector::new(
                Box::new(NullDetector),
                detector_confidence,
                Some(detector_classes.clone()),
            ))
        }
        None => {
            info!("no detector model configured; detections are always empty");
            fanout.set_object_detection(false);
            Arc::new(NullDetector)
        }
    };

    let auto_navigation_enabled = args.auto_navigation || file_config.autonav.enabled;
    fanout.set_auto_navigation(auto_navigation_enabled);
    if auto_navigation_enabled {
        let detector = detector.clone();
        let policy = FollowPolicy::new(detector_classes);
        let arbiter = arbiter.clone();
        let mut frame_rx = frame_rx.clone();
        tokio::spawn(async move {
            loop {
                if frame_rx.changed().await.is_err() {
                    break;
                }
                let frame = frame_rx.borrow_and_update().clone();
                let Some(frame) = frame else { continue };
                let detections = detector.infer(&frame);
                let cmd = policy.decide(&detections, frame.width);
                if let Err(err) = arbiter.dispatch(cmd, SourceTag::AutoNav).await {
                    warn!(?err, "auto-nav dispatch rejected");
                }
            }
        });
        info!("auto-navigation enabled at startup");
    }

    // Video streaming: MJPEG HTTP and base64 WebSocket, both reading the
    // same latest-frame slot independently (§6).
    let mjpeg_port = args.mjpeg_port.unwrap_or(8080);
    if mjpeg_port > 0 {
        let mjpeg_server = MjpegServer::new(MjpegConfig { port: mjpeg_port, quality: 70 }, frame_rx.clone());
        tokio::spawn(async move {
            if let Err(e) = mjpeg_server.run().await {
                error!(?e, "MJPEG server error");
            }
        });
        info!(port = mjpeg_port, "MJPEG stream server started");
    }

    let video_streamer = VideoStreamer::new(frame_rx.clone(), fanout.clone());
    tokio::spawn(video_streamer.run());

    tokio::spawn({
        let fanout = fanout.clone();
        async move { fanout.run_battery_tick().await }
    });

    // Operator session WebSocket server: parsed inbound messages are
    // forwarded here, tagged with the originating session id.
    let (inbound_tx, mut inbound_rx) = mpsc::channel::<(ClientMessage, uuid::Uuid)>(128);
    let ws_port = args.ws_port.unwrap_or(4850);
    if ws_port > 0 {
        let ws_server = WsServer::new(WsConfig { port: ws_port }, inbound_tx, fanout.clone());
        tokio::spawn(async move {
            if let Err(e) = ws_server.run().await {
                error!(?e, "operator session server error");
            }
        });
        info!(port = ws_port, "operator session server started");
    }

    info!("tankd entering inbound message loop");
    while let Some((msg, _session_id)) = inbound_rx.recv().await {
        route_inbound(msg, &arbiter, &navigator, &shared, &fanout).await;
    }

    Ok(())
}

fn resolve_camera_resolution(cli: &Option<String>, file: &CameraFileConfig) -> (u32, u32) {
    if let Some(res) = cli {
        let parts: Vec<&str> = res.split('x').collect();
        if parts.len() == 2 {
            if let (Ok(w), Ok(h)) = (parts[0].parse(), parts[1].parse()) {
                return (w, h);
            }
        }
    }
    (file.width, file.height)
}

/// Translate one accepted operator message into arbiter/planner/shared
/// state calls (§6). Invalid or out-of-range input is rejected with a
/// `log` event to the fan-out rather than ever panicking (§7.4).
async fn route_inbound(
    msg: ClientMessage,
    arbiter: &Arc<Arbiter>,
    navigator: &Arc<NavigatorHandle>,
    shared: &Arc<SharedState>,
    fanout: &TelemetryFanout,
) {
    match msg {
        ClientMessage::Control { forward, turn } => {
            let (cmd, _magnitude) = map_control_input(ControlInput { forward, turn });
            if let Err(err) = arbiter.dispatch(cmd, SourceTag::Joystick).await {
                fanout.log(format!("control command rejected: {err}")).await;
            }
        }
        ClientMessage::EmergencyStop {} => {
            arbiter.emergency_stop().await;
            fanout.emergency_stop_activated();
        }
        ClientMessage::NavigateTo { row, col } => {
            let navigator = navigator.clone();
            tokio::spawn(async move {
                if let Err(err) = navigator.navigate((row, col)).await {
                    info!(?err, "navigate_to plan did not complete");
                }
            });
        }
        ClientMessage::ClearTarget {} => {
            navigator.cancel();
        }
        ClientMessage::ResetStart {} => {
            let pose0 = shared.reset_pose();
            fanout.log(format!("pose reset to {pose0:?}")).await;
            fanout.publish(ServerMessage::RobotUpdate {
                row: pose0.y,
                col: pose0.x,
                angle: pose0.theta_deg,
            });
        }
        ClientMessage::GoUp {} => {
            let navigator = navigator.clone();
            tokio::spawn(async move {
                let _ = navigator.go_up_one_cell().await;
            });
        }
        ClientMessage::Turn90Left {} => {
            let navigator = navigator.clone();
            tokio::spawn(async move {
                let _ = navigator.turn_90_left().await;
            });
        }
        ClientMessage::Turn90Right {} => {
            let navigator = navigator.clone();
            tokio::spawn(async move {
                let _ = navigator.turn_90_right().await;
            });
        }
        ClientMessage::UpdateObstacles { cells } => {
            shared.update_obstacles(&cells);
        }
        ClientMessage::UpdateTiming { forward_delay, turn_left_delay, turn_right_delay } => {
            shared.update_timing(forward_delay, turn_left_delay, turn_right_delay);
        }
        ClientMessage::CalibrateCommand { command } => match command.chars().next().and_then(Command::from_code) {
            Some(cmd) => {
                let duration = shared.nominal_duration(cmd);
                if let Err(err) = arbiter.dispatch(cmd, SourceTag::ManualOverride).await {
                    fanout.log(format!("calibration pulse rejected: {err}")).await;
                    return;
                }
                tokio::time::sleep(std::time::Duration::from_secs_f64(duration)).await;
                let _ = arbiter.dispatch(Command::Stop, SourceTag::ManualOverride).await;
            }
            None => {
                fanout.log("calibrate_command: unknown command code".to_string()).await;
            }
        },
        ClientMessage::ApplyCalibration { distance, angle } => {
            shared.apply_calibration(distance, angle);
        }
        ClientMessage::RequestCalibrationValues {} => {
            let calib = shared.calibration();
            fanout.calibration_values(calib.move_distance, calib.turn_angle);
        }
    }
}

/// Rolling daily log file plus stdout, matching the teacher's
/// `init_logging`, plus a [`FanoutLogLayer`] that mirrors every log line
/// to attached operator sessions as a `log` telemetry event (§4.8). The
/// returned guard must be held for the program's lifetime so buffered
/// file writes are flushed on shutdown.
fn init_logging(
    log_dir: &std::path::Path,
    level: &str,
    fanout: TelemetryFanout,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "tankd.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("{level},tankd={level}")));

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true).with_thread_ids(false);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);
    let (fanout_layer, forwarder) = telemetry::FanoutLogLayer::new(fanout);
    tokio::spawn(forwarder);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .with(fanout_layer)
        .init();

    Ok(guard)
}
