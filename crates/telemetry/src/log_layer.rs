//! Bridges `tracing` events into the operator-facing `log` telemetry event
//! (§4.8): every `warn!`/`info!`/etc. fired anywhere in the workspace is
//! also broadcast to attached sessions, not just the handful of call sites
//! that invoke [`TelemetryFanout::log`] directly.
//!
//! `on_event` runs inside whatever thread emitted the tracing event, so it
//! cannot `.await` the fan-out's rate-limited async `log`; it only
//! formats the line and pushes it onto an unbounded channel. A background
//! task drains that channel and does the actual (coalesced) publish.

use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::fanout::TelemetryFanout;

/// A `tracing_subscriber::Layer` that formats each event's `message` field
/// (ignoring events with none, e.g. span lifecycle events) and forwards it
/// to a channel drained by [`spawn_log_forwarder`].
pub struct FanoutLogLayer {
    tx: mpsc::UnboundedSender<String>,
}

impl FanoutLogLayer {
    /// Returns the layer plus the forwarder task; the caller is expected
    /// to `tokio::spawn` the returned future once a runtime is running.
    pub fn new(fanout: TelemetryFanout) -> (Self, impl std::future::Future<Output = ()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let forwarder = async move {
            while let Some(line) = rx.recv().await {
                fanout.log(line).await;
            }
        };
        (Self { tx }, forwarder)
    }
}

#[derive(Default)]
struct MessageVisitor(Option<String>);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = Some(format!("{value:?}"));
        }
    }
}

impl<S: Subscriber> Layer<S> for FanoutLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        if let Some(msg) = visitor.0 {
            let level = *event.metadata().level();
            let _ = self.tx.send(format!("{level} {msg}"));
        }
    }
}
