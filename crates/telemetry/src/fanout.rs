//! Telemetry fan-out (§4.8): broadcasts pose, battery, current motion,
//! mode flags, and log lines to all connected sessions on change, plus a
//! 1Hz periodic battery tick.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use arbiter::CommandObserver;
use localization::PoseEstimator;
use tokio::sync::broadcast;
use tokio::sync::Mutex as AsyncMutex;
use types::{Command, SourceTag, Telemetry};

use crate::protocol::ServerMessage;

const BROADCAST_CAPACITY: usize = 256;
/// Ticks (at 1Hz) per 1% battery decrement (§4.8: "1% every 60 ticks").
const BATTERY_TICKS_PER_PERCENT: u32 = 60;
/// Identical consecutive log lines within this window are coalesced.
const LOG_COALESCE_WINDOW: Duration = Duration::from_millis(250);

struct TelemetryState {
    battery: AtomicU8,
    current_motion: Mutex<Command>,
    auto_navigation: AtomicBool,
    object_detection: AtomicBool,
}

impl Default for TelemetryState {
    fn default() -> Self {
        Self {
            battery: AtomicU8::new(100),
            current_motion: Mutex::new(Command::Stop),
            auto_navigation: AtomicBool::new(false),
            object_detection: AtomicBool::new(false),
        }
    }
}

/// Central broadcast point. Cloning is cheap — it's a handle around an
/// `Arc`'d broadcast sender.
#[derive(Clone)]
pub struct TelemetryFanout {
    tx: broadcast::Sender<ServerMessage>,
    state: Arc<TelemetryState>,
    last_log: Arc<AsyncMutex<Option<(String, Instant)>>>,
}

impl TelemetryFanout {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            tx,
            state: Arc::new(TelemetryState::default()),
            last_log: Arc::new(AsyncMutex::new(None)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.tx.subscribe()
    }

    pub fn publish(&self, msg: ServerMessage) {
        // A lagging/absent subscriber is not this layer's problem (§5: "no
        // ordering is guaranteed across sessions").
        let _ = self.tx.send(msg);
    }

    pub fn set_auto_navigation(&self, enabled: bool) {
        self.state.auto_navigation.store(enabled, Ordering::SeqCst);
        self.publish_telemetry();
    }

    pub fn set_object_detection(&self, enabled: bool) {
        self.state.object_detection.store(enabled, Ordering::SeqCst);
        self.publish_telemetry();
    }

    pub fn emergency_stop_activated(&self) {
        self.publish(ServerMessage::EmergencyStopActivated {});
    }

    pub fn calibration_values(&self, move_distance: f64, turn_angle: f64) {
        self.publish(ServerMessage::CalibrationValues { move_distance, turn_angle });
    }

    fn snapshot(&self) -> Telemetry {
        Telemetry {
            battery: self.state.battery.load(Ordering::SeqCst),
            current_motion: *self.state.current_motion.lock().unwrap(),
            auto_navigation: self.state.auto_navigation.load(Ordering::SeqCst),
            object_detection: self.state.object_detection.load(Ordering::SeqCst),
        }
    }

    fn publish_telemetry(&self) {
        self.publish(ServerMessage::Telemetry(self.snapshot()));
    }

    /// Rate-limited log emission (§4.8): identical consecutive lines within
    /// [`LOG_COALESCE_WINDOW`] are dropped rather than re-broadcast.
    pub async fn log(&self, msg: impl Into<String>) {
        let msg = msg.into();
        let mut last = self.last_log.lock().await;
        if let Some((prev, at)) = last.as_ref() {
            if prev == &msg && at.elapsed() < LOG_COALESCE_WINDOW {
                return;
            }
        }
        *last = Some((msg.clone(), Instant::now()));
        drop(last);
        self.publish(ServerMessage::Log { msg });
    }

    /// 1Hz battery decay tick (§4.8): 1% every 60 ticks, floor 0. Always
    /// publishes, matching "periodic battery tick every 1s".
    pub async fn run_battery_tick(&self) {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        let mut ticks: u32 = 0;
        loop {
            interval.tick().await;
            ticks += 1;
            if ticks >= BATTERY_TICKS_PER_PERCENT {
                ticks = 0;
                let _ = self
                    .state
                    .battery
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |b| Some(b.saturating_sub(1)));
            }
            self.publish_telemetry();
        }
    }
}

impl Default for TelemetryFanout {
    fn default() -> Self {
        Self::new()
    }
}

/// Bridges the arbiter's command fan-out into telemetry: every dispatched
/// command updates `current_motion` and the pose broadcast (§3 "mirror-
/// write pattern", generalized to a third observer).
pub struct TelemetryObserver {
    fanout: TelemetryFanout,
    pose_estimator: Arc<Mutex<PoseEstimator>>,
}

impl TelemetryObserver {
    pub fn new(fanout: TelemetryFanout, pose_estimator: Arc<Mutex<PoseEstimator>>) -> Self {
        Self { fanout, pose_estimator }
    }
}

impl CommandObserver for TelemetryObserver {
    fn on_command(&self, cmd: Command, _source: SourceTag) {
        *self.fanout.state.current_motion.lock().unwrap() = cmd;
        self.fanout.publish_telemetry();

        let pose = self.pose_estimator.lock().unwrap().pose();
        self.fanout.publish(ServerMessage::RobotUpdate {
            row: pose.y,
            col: pose.x,
            angle: pose.theta_deg,
        });
    }
}
