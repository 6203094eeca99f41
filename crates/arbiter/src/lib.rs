//! Command arbitration and safety gate (§4.1).
//!
//! The arbiter is the single writer to the actuator. Every command —
//! joystick, manual override, a planner step, auto-nav — passes through
//! [`Arbiter::dispatch`], which enforces the emergency latch and source
//! priority before the actuator ever sees it.

pub mod joystick;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};
use types::{Command, SourceTag};

/// Bound on how long an actuator write may take before the arbiter gives
/// up and reports the link as unresponsive.
pub const ACTUATOR_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("emergency stop is latched; call release_emergency() first")]
    EmergencyLatched,
    #[error("preempted by higher-priority source {0:?}")]
    Preempted(SourceTag),
    #[error("actuator write did not complete within {0:?}")]
    ActuatorTimeout(Duration),
    #[error("actuator error: {0}")]
    Actuator(String),
}

/// The single write path to vehicle hardware (or its simulated stand-in).
///
/// Implementations must be idempotent and return promptly; the arbiter
/// bounds every call with [`ACTUATOR_TIMEOUT`] regardless.
pub trait ActuatorDriver: Send + Sync {
    fn send(&self, cmd: Command) -> Result<(), String>;
}

/// A logging-only actuator for simulation and tests — grounded on the
/// teacher's `CanInterface::Sim` swap-in pattern, generalized from a CAN
/// bus stand-in to a bare command sink.
pub struct LoggingActuator;

impl ActuatorDriver for LoggingActuator {
    fn send(&self, cmd: Command) -> Result<(), String> {
        debug!(?cmd, "sim actuator received command");
        Ok(())
    }
}

/// Notified, best-effort, of every command that clears arbitration.
/// Implementations must not block; heavy work belongs behind a channel.
pub trait CommandObserver: Send + Sync {
    fn on_command(&self, cmd: Command, source: SourceTag);
}

/// Something with an in-progress multi-step plan that can be told to
/// stop early when preempted by a higher-priority source.
pub trait Preemptable: Send + Sync {
    fn cancel(&self);
}

/// The command arbiter: emergency latch, priority gate, actuator write,
/// and observer fan-out, in that order.
pub struct Arbiter {
    actuator: Arc<dyn ActuatorDriver>,
    observers: Vec<Arc<dyn CommandObserver>>,
    planner: Mutex<Option<Arc<dyn Preemptable>>>,
    emergency_latched: AtomicBool,
    /// Set by the navigator when a `MapPlanner`-sourced plan is executing,
    /// cleared when it reaches `Idle` (completion, cancellation, or
    /// error) — not inferred from `last_source`, since a plan that
    /// finishes cleanly never dispatches a trailing `S` to overwrite it.
    plan_active: AtomicBool,
    last_source: Mutex<Option<SourceTag>>,
}

impl Arbiter {
    pub fn new(actuator: Arc<dyn ActuatorDriver>) -> Self {
        Self {
            actuator,
            observers: Vec::new(),
            planner: Mutex::new(None),
            emergency_latched: AtomicBool::new(false),
            plan_active: AtomicBool::new(false),
            last_source: Mutex::new(None),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CommandObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Register the navigation planner so in-progress plans can be
    /// cancelled on preemption. At most one is tracked; a later call
    /// replaces the earlier one.
    pub fn register_planner(&self, planner: Arc<dyn Preemptable>) {
        *self.planner.lock().unwrap() = Some(planner);
    }

    pub fn is_emergency_latched(&self) -> bool {
        self.emergency_latched.load(Ordering::SeqCst)
    }

    /// Latch the emergency stop, unconditionally halt the actuator, and
    /// cancel any in-progress plan. Never rejected.
    pub async fn emergency_stop(&self) {
        self.emergency_latched.store(true, Ordering::SeqCst);
        if let Some(planner) = self.planner.lock().unwrap().clone() {
            planner.cancel();
        }
        *self.last_source.lock().unwrap() = Some(SourceTag::Emergency);
        if let Err(err) = self.write_actuator(Command::Stop).await {
            warn!(?err, "actuator write failed during emergency stop");
        }
        for observer in &self.observers {
            observer.on_command(Command::Stop, SourceTag::Emergency);
        }
    }

    /// Clear the emergency latch. The vehicle remains stopped until the
    /// next command is dispatched.
    pub fn release_emergency(&self) {
        self.emergency_latched.store(false, Ordering::SeqCst);
    }

    /// Returns the source of the most recently accepted command, if any —
    /// purely informational (e.g. for tests); preemption decisions are
    /// made from [`Arbiter::plan_active`], not this.
    pub fn last_source(&self) -> Option<SourceTag> {
        *self.last_source.lock().unwrap()
    }

    /// Mark whether a `MapPlanner`-sourced plan is currently executing.
    /// Called by the navigator on entering its execute loop and on every
    /// path back to `Idle`; read here to gate non-planner dispatches
    /// without relying on `last_source` ever having been overwritten.
    pub fn set_plan_active(&self, active: bool) {
        self.plan_active.store(active, Ordering::SeqCst);
    }

    pub fn is_plan_active(&self) -> bool {
        self.plan_active.load(Ordering::SeqCst)
    }

    /// Dispatch a command from `source`. Rejected outright if the
    /// emergency latch is set (unless `source` is itself `Emergency`,
    /// which only ever arrives via [`Arbiter::emergency_stop`]).
    ///
    /// A command from a source strictly lower priority than `MapPlanner`
    /// is rejected while a plan is active; a command from a source that
    /// outranks `MapPlanner` instead preempts it, cancelling the
    /// in-progress plan and clearing the active flag immediately (the
    /// navigator's own loop also clears it when it notices, redundantly
    /// but harmlessly).
    pub async fn dispatch(&self, cmd: Command, source: SourceTag) -> Result<(), DispatchError> {
        if self.is_emergency_latched() {
            return Err(DispatchError::EmergencyLatched);
        }

        if self.is_plan_active() && source != SourceTag::MapPlanner {
            if source.preempts(&SourceTag::MapPlanner) {
                self.plan_active.store(false, Ordering::SeqCst);
                if let Some(planner) = self.planner.lock().unwrap().clone() {
                    planner.cancel();
                }
            } else {
                return Err(DispatchError::Preempted(SourceTag::MapPlanner));
            }
        }

        *self.last_source.lock().unwrap() = Some(source);

        // The actuator write is the hard commit but its failure does not
        // withhold the other three notifications: the estimator and
        // virtual robot still advance, and telemetry still reflects the
        // commanded motion, even when the physical link faulted.
        if let Err(err) = self.write_actuator(cmd).await {
            warn!(?err, ?cmd, ?source, "actuator write failed; continuing with observer fan-out");
        }

        for observer in &self.observers {
            observer.on_command(cmd, source);
        }

        Ok(())
    }

    async fn write_actuator(&self, cmd: Command) -> Result<(), DispatchError> {
        let actuator = self.actuator.clone();
        let result = tokio::time::timeout(
            ACTUATOR_TIMEOUT,
            tokio::task::spawn_blocking(move || actuator.send(cmd)),
        )
        .await;

        match result {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(DispatchError::Actuator(e)),
            Ok(Err(join_err)) => Err(DispatchError::Actuator(join_err.to_string())),
            Err(_) => Err(DispatchError::ActuatorTimeout(ACTUATOR_TIMEOUT)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingObserver(AtomicUsize);

    impl CommandObserver for CountingObserver {
        fn on_command(&self, _cmd: Command, _source: SourceTag) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FailingActuator;

    impl ActuatorDriver for FailingActuator {
        fn send(&self, _cmd: Command) -> Result<(), String> {
            Err("link down".into())
        }
    }

    #[tokio::test]
    async fn test_dispatch_notifies_observers() {
        let observer = Arc::new(CountingObserver(AtomicUsize::new(0)));
        let arbiter = Arbiter::new(Arc::new(LoggingActuator)).with_observer(observer.clone());

        arbiter.dispatch(Command::Forward, SourceTag::Joystick).await.unwrap();

        assert_eq!(observer.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_emergency_latch_rejects_dispatch() {
        let arbiter = Arbiter::new(Arc::new(LoggingActuator));
        arbiter.emergency_stop().await;

        let result = arbiter.dispatch(Command::Forward, SourceTag::Joystick).await;
        assert!(matches!(result, Err(DispatchError::EmergencyLatched)));
    }

    #[tokio::test]
    async fn test_release_emergency_allows_dispatch_again() {
        let arbiter = Arbiter::new(Arc::new(LoggingActuator));
        arbiter.emergency_stop().await;
        arbiter.release_emergency();

        let result = arbiter.dispatch(Command::Stop, SourceTag::Joystick).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_autonav_rejected_during_active_plan() {
        let arbiter = Arbiter::new(Arc::new(LoggingActuator));
        arbiter.dispatch(Command::Forward, SourceTag::MapPlanner).await.unwrap();
        arbiter.set_plan_active(true);

        let result = arbiter.dispatch(Command::Forward, SourceTag::AutoNav).await;
        assert!(matches!(result, Err(DispatchError::Preempted(SourceTag::MapPlanner))));
    }

    #[tokio::test]
    async fn test_plan_active_cleared_on_completion_lets_autonav_through() {
        // A plan that finishes cleanly (no trailing `S`) must not leave
        // auto-nav permanently locked out.
        let arbiter = Arbiter::new(Arc::new(LoggingActuator));
        arbiter.dispatch(Command::Forward, SourceTag::MapPlanner).await.unwrap();
        arbiter.set_plan_active(true);
        arbiter.set_plan_active(false);

        let result = arbiter.dispatch(Command::Forward, SourceTag::AutoNav).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_joystick_preempts_active_plan_and_cancels_it() {
        struct FlagPlanner(AtomicBool);
        impl Preemptable for FlagPlanner {
            fn cancel(&self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let arbiter = Arbiter::new(Arc::new(LoggingActuator));
        let planner = Arc::new(FlagPlanner(AtomicBool::new(false)));
        arbiter.register_planner(planner.clone());

        arbiter.dispatch(Command::Forward, SourceTag::MapPlanner).await.unwrap();
        arbiter.set_plan_active(true);
        arbiter.dispatch(Command::Stop, SourceTag::Joystick).await.unwrap();

        assert!(planner.0.load(Ordering::SeqCst));
        assert_eq!(arbiter.last_source(), Some(SourceTag::Joystick));
        assert!(!arbiter.is_plan_active());
    }

    #[tokio::test]
    async fn test_actuator_error_is_logged_but_dispatch_still_accepted() {
        let observer = Arc::new(CountingObserver(AtomicUsize::new(0)));
        let arbiter = Arbiter::new(Arc::new(FailingActuator)).with_observer(observer.clone());

        let result = arbiter.dispatch(Command::Forward, SourceTag::Joystick).await;

        assert!(result.is_ok());
        assert_eq!(observer.0.load(Ordering::SeqCst), 1);
    }
}
