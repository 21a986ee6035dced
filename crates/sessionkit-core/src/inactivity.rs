//! Inactivity tracking and forced logout.
//!
//! `InactivityTimer` is the countdown state machine:
//!
//! ```text
//! Idle --start--> Active --remaining <= warning--> Warning --0--> Expired
//!                  ^  |activity                      |activity, stay_logged_in
//!                  |__|______________________________|
//! ```
//!
//! `InactivityMonitor` drives it from a tokio task on a fixed 1-second
//! cadence and runs the expiry callback (the controller's logout) when the
//! countdown reaches zero.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Countdown cadence
const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum InactivityState {
    /// No session
    #[default]
    Idle,
    /// Countdown running, warning hidden
    Active,
    /// Countdown running, warning visible
    Warning,
    /// Countdown reached zero; logout pending
    Expired,
}

/// Result of a single countdown step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running
    Idle,
    Counting,
    /// Crossed the warning threshold on this tick
    WarningShown,
    Expired,
}

/// What a warning dialog binds to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct MonitorSnapshot {
    pub state: InactivityState,
    pub remaining_secs: u64,
    pub warning_visible: bool,
}

#[derive(Debug, Clone)]
pub struct InactivityTimer {
    timeout_secs: u64,
    warning_secs: u64,
    remaining: u64,
    state: InactivityState,
}

impl InactivityTimer {
    /// `warning_secs` is clamped to the timeout
    pub fn new(timeout_secs: u64, warning_secs: u64) -> Self {
        let timeout_secs = timeout_secs.max(1);
        Self {
            timeout_secs,
            warning_secs: warning_secs.min(timeout_secs),
            remaining: 0,
            state: InactivityState::Idle,
        }
    }

    pub fn state(&self) -> InactivityState {
        self.state
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    fn is_running(&self) -> bool {
        matches!(self.state, InactivityState::Active | InactivityState::Warning)
    }

    fn reset(&mut self) {
        self.remaining = self.timeout_secs;
        self.state = InactivityState::Active;
        self.promote_to_warning();
    }

    fn promote_to_warning(&mut self) {
        if self.state == InactivityState::Active && self.remaining <= self.warning_secs {
            self.state = InactivityState::Warning;
        }
    }

    /// Session created
    pub fn start(&mut self) {
        self.reset();
    }

    /// Tracked user interaction. Resets the countdown and hides the warning.
    pub fn activity(&mut self) -> bool {
        if self.is_running() {
            self.reset();
            true
        } else {
            false
        }
    }

    /// "Stay logged in" from the warning dialog
    pub fn stay_logged_in(&mut self) -> bool {
        self.activity()
    }

    /// Advance the countdown by one second
    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_running() {
            return TickOutcome::Idle;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.state = InactivityState::Expired;
            return TickOutcome::Expired;
        }

        let was_warning = self.state == InactivityState::Warning;
        self.promote_to_warning();
        if !was_warning && self.state == InactivityState::Warning {
            TickOutcome::WarningShown
        } else {
            TickOutcome::Counting
        }
    }

    /// Replace the countdown with an externally computed remaining time
    pub fn resync(&mut self, remaining: u64) -> InactivityState {
        if self.is_running() {
            self.remaining = remaining.min(self.timeout_secs);
            if self.remaining == 0 {
                self.state = InactivityState::Expired;
            } else {
                self.promote_to_warning();
            }
        }
        self.state
    }

    /// Session destroyed
    pub fn stop(&mut self) {
        self.state = InactivityState::Idle;
        self.remaining = 0;
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            state: self.state,
            remaining_secs: self.remaining,
            warning_visible: self.state == InactivityState::Warning,
        }
    }
}

/// Called once when the countdown expires
pub type ExpiryCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct Clock {
    timer: InactivityTimer,
    deadline: Option<Instant>,
}

struct MonitorShared {
    clock: Mutex<Clock>,
    snapshot: watch::Sender<MonitorSnapshot>,
}

impl MonitorShared {
    fn lock(&self) -> MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, clock: &Clock) {
        self.snapshot.send_replace(clock.timer.snapshot());
    }

    /// Apply one tick, then re-synchronize against the deadline so a late
    /// or skipped tick cannot drift the displayed countdown.
    fn on_tick(&self) -> TickOutcome {
        let mut clock = self.lock();
        let mut outcome = clock.timer.tick();

        if matches!(outcome, TickOutcome::Counting | TickOutcome::WarningShown) {
            if let Some(deadline) = clock.deadline {
                let expected = secs_until(deadline);
                if expected != clock.timer.remaining() {
                    debug!(
                        expected,
                        counted = clock.timer.remaining(),
                        "Resynchronizing inactivity countdown"
                    );
                    if clock.timer.resync(expected) == InactivityState::Expired {
                        outcome = TickOutcome::Expired;
                    }
                }
            }
        }

        if outcome == TickOutcome::WarningShown {
            info!(remaining = clock.timer.remaining(), "Inactivity warning shown");
        }
        self.publish(&clock);
        outcome
    }
}

/// Whole seconds left until `deadline`, rounded up
fn secs_until(deadline: Instant) -> u64 {
    let left = deadline.saturating_duration_since(Instant::now());
    let millis = left.as_millis() as u64;
    millis.div_ceil(1000)
}

pub struct InactivityMonitor {
    shared: Arc<MonitorShared>,
    task: Mutex<Option<JoinHandle<()>>>,
    on_expire: ExpiryCallback,
}

impl InactivityMonitor {
    pub fn new(timeout_secs: u64, warning_secs: u64, on_expire: ExpiryCallback) -> Self {
        let timer = InactivityTimer::new(timeout_secs, warning_secs);
        let (snapshot, _) = watch::channel(timer.snapshot());
        Self {
            shared: Arc::new(MonitorShared {
                clock: Mutex::new(Clock {
                    timer,
                    deadline: None,
                }),
                snapshot,
            }),
            task: Mutex::new(None),
            on_expire,
        }
    }

    /// Start (or restart) the countdown. Must be called within a tokio runtime.
    pub fn start(&self) {
        {
            let mut clock = self.shared.lock();
            clock.timer.start();
            clock.deadline = Some(Instant::now() + Duration::from_secs(clock.timer.timeout_secs()));
            self.shared.publish(&clock);
        }

        let shared = Arc::clone(&self.shared);
        let on_expire = Arc::clone(&self.on_expire);
        let handle = tokio::spawn(run_countdown(shared, on_expire));

        if let Some(previous) = self.task_slot().replace(handle) {
            previous.abort();
        }
        debug!("Inactivity monitor started");
    }

    /// Stop the countdown and return to `Idle`
    pub fn stop(&self) {
        if let Some(task) = self.task_slot().take() {
            task.abort();
        }
        let mut clock = self.shared.lock();
        clock.timer.stop();
        clock.deadline = None;
        self.shared.publish(&clock);
    }

    /// Record user activity. Ignored unless the countdown is running.
    pub fn activity(&self) -> bool {
        self.reset_with(InactivityTimer::activity)
    }

    /// Dismiss the warning and restart the countdown
    pub fn stay_logged_in(&self) -> bool {
        self.reset_with(InactivityTimer::stay_logged_in)
    }

    fn reset_with(&self, op: fn(&mut InactivityTimer) -> bool) -> bool {
        let mut clock = self.shared.lock();
        let reset = op(&mut clock.timer);
        if reset {
            clock.deadline = Some(Instant::now() + Duration::from_secs(clock.timer.timeout_secs()));
            self.shared.publish(&clock);
        }
        reset
    }

    pub fn state(&self) -> InactivityState {
        self.shared.lock().timer.state()
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.shared.lock().timer.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorSnapshot> {
        self.shared.snapshot.subscribe()
    }

    fn task_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for InactivityMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task_slot().take() {
            task.abort();
        }
    }
}

async fn run_countdown(shared: Arc<MonitorShared>, on_expire: ExpiryCallback) {
    let mut ticker = tokio::time::interval_at(Instant::now() + TICK, TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match shared.on_tick() {
            TickOutcome::Counting | TickOutcome::WarningShown => {}
            TickOutcome::Idle => return,
            TickOutcome::Expired => {
                info!("Inactivity timeout reached, logging out");
                // Run detached: the callback stops this monitor, which aborts this task
                tokio::spawn(on_expire());
                return;
            }
        }
    }
}
