use std::cell::RefCell;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use framelink_channel::panic_message;
use tracing::{debug, warn};

use crate::timer::{Scheduler, TimerId};

/// Callback receiving the elapsed time since the monitor started.
pub type ElapsedCallback = Rc<dyn Fn(Duration)>;

/// Configuration for a [`TimeoutMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Elapsed time after which the monitor times out.
    pub timeout: Duration,
    /// Delay between ticks.
    pub interval: Duration,
}

impl MonitorConfig {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_millis(100),
        }
    }
}

/// Lifecycle of a [`TimeoutMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    None,
    Starting,
    /// The only state holding a live timer.
    Running {
        started_at: Instant,
        elapsed: Duration,
        timer: TimerId,
    },
    TimedOut {
        elapsed: Duration,
    },
    Stopped,
}

impl MonitorState {
    pub fn label(&self) -> &'static str {
        match self {
            MonitorState::None => "none",
            MonitorState::Starting => "starting",
            MonitorState::Running { .. } => "running",
            MonitorState::TimedOut { .. } => "timed-out",
            MonitorState::Stopped => "stopped",
        }
    }
}

struct MonitorInner {
    scheduler: Rc<dyn Scheduler>,
    config: MonitorConfig,
    on_timeout: ElapsedCallback,
    on_interval: RefCell<Option<ElapsedCallback>>,
    state: RefCell<MonitorState>,
}

/// Deadline watchdog that ticks on a self re-arming single-shot timer.
///
/// Each tick is scheduled only after the previous tick's callback returned,
/// so a slow interval callback delays the next tick instead of overlapping
/// with it.
#[derive(Clone)]
pub struct TimeoutMonitor {
    inner: Rc<MonitorInner>,
}

impl TimeoutMonitor {
    pub fn new<F>(scheduler: Rc<dyn Scheduler>, config: MonitorConfig, on_timeout: F) -> Self
    where
        F: Fn(Duration) + 'static,
    {
        Self {
            inner: Rc::new(MonitorInner {
                scheduler,
                config,
                on_timeout: Rc::new(on_timeout),
                on_interval: RefCell::new(None),
                state: RefCell::new(MonitorState::None),
            }),
        }
    }

    /// Attach the interval callback.
    pub fn with_on_interval<F>(self, on_interval: F) -> Self
    where
        F: Fn(Duration) + 'static,
    {
        *self.inner.on_interval.borrow_mut() = Some(Rc::new(on_interval));
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    pub fn state(&self) -> MonitorState {
        *self.inner.state.borrow()
    }

    /// Start ticking. No-op unless the monitor was never started.
    pub fn start(&self) {
        {
            let mut state = self.inner.state.borrow_mut();
            if *state != MonitorState::None {
                debug!(state = state.label(), "timeout monitor already started");
                return;
            }
            *state = MonitorState::Starting;
        }

        let started_at = self.inner.scheduler.now();
        self.inner.notify_interval(Duration::ZERO);

        let timer = MonitorInner::arm(&self.inner);
        *self.inner.state.borrow_mut() = MonitorState::Running {
            started_at,
            elapsed: Duration::ZERO,
            timer,
        };
    }

    /// Cancel the pending tick. No-op unless running.
    pub fn stop(&self) {
        let timer = {
            let mut state = self.inner.state.borrow_mut();
            let MonitorState::Running { timer, elapsed, .. } = *state else {
                return;
            };
            debug!(elapsed = ?elapsed, "timeout monitor stopped");
            *state = MonitorState::Stopped;
            timer
        };
        self.inner.scheduler.cancel(timer);
    }
}

impl MonitorInner {
    fn arm(inner: &Rc<MonitorInner>) -> TimerId {
        let weak: Weak<MonitorInner> = Rc::downgrade(inner);
        inner.scheduler.schedule(
            inner.config.interval,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    MonitorInner::tick(&inner);
                }
            }),
        )
    }

    fn tick(inner: &Rc<MonitorInner>) {
        let started_at = match *inner.state.borrow() {
            MonitorState::Running { started_at, .. } => started_at,
            _ => return,
        };
        let elapsed = inner.scheduler.now().saturating_duration_since(started_at);

        if elapsed > inner.config.timeout {
            *inner.state.borrow_mut() = MonitorState::TimedOut { elapsed };
            warn!(elapsed = ?elapsed, timeout = ?inner.config.timeout, "timeout monitor expired");
            let on_timeout = Rc::clone(&inner.on_timeout);
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| on_timeout(elapsed))) {
                warn!("timeout callback panicked: {}", panic_message(&*panic));
            }
            return;
        }

        if let MonitorState::Running { elapsed: seen, .. } = &mut *inner.state.borrow_mut() {
            *seen = elapsed;
        }
        inner.notify_interval(elapsed);

        // The callback may have stopped the monitor.
        if !matches!(*inner.state.borrow(), MonitorState::Running { .. }) {
            return;
        }
        let next = MonitorInner::arm(inner);
        if let MonitorState::Running { timer, .. } = &mut *inner.state.borrow_mut() {
            *timer = next;
        }
    }

    fn notify_interval(&self, elapsed: Duration) {
        let callback = self.on_interval.borrow().clone();
        if let Some(callback) = callback {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(elapsed))) {
                warn!("interval callback panicked: {}", panic_message(&*panic));
            }
        }
    }
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        if let MonitorState::Running { timer, .. } = *self.state.get_mut() {
            self.scheduler.cancel(timer);
        }
    }
}

impl fmt::Debug for TimeoutMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutMonitor")
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .finish()
    }
}
