//! Single-shot timers behind an injectable clock.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use tracing::trace;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce()>;

/// Identifies a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

/// Clock and single-shot timer source.
///
/// Timers never repeat; callers that want a periodic tick re-arm from inside
/// the task.
pub trait Scheduler {
    fn now(&self) -> Instant;

    /// Run `task` once after `delay`.
    fn schedule(&self, delay: Duration, task: Task) -> TimerId;

    /// Cancel a pending timer. Unknown or already-fired ids are ignored.
    fn cancel(&self, id: TimerId);
}

/// Deterministic scheduler driven by [`ManualScheduler::advance`].
pub struct ManualScheduler {
    origin: Instant,
    offset: Cell<Duration>,
    next_id: Cell<u64>,
    timers: RefCell<BTreeMap<(Duration, TimerId), Task>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Cell::new(Duration::ZERO),
            next_id: Cell::new(1),
            timers: RefCell::new(BTreeMap::new()),
        }
    }

    /// Virtual time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }

    pub fn pending(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Move the clock forward by `duration`, firing due timers in deadline
    /// order. Timers armed by a firing task run too if they fall inside the
    /// window. Returns the number of timers fired.
    pub fn advance(&self, duration: Duration) -> usize {
        let until = self.offset.get() + duration;
        let mut fired = 0;
        loop {
            let due = {
                let mut timers = self.timers.borrow_mut();
                match timers.first_key_value() {
                    Some((&(deadline, _), _)) if deadline <= until => timers.pop_first(),
                    _ => None,
                }
            };
            let Some(((deadline, id), task)) = due else {
                break;
            };
            self.offset.set(deadline);
            trace!(timer = id.0, at = ?deadline, "firing timer");
            task();
            fired += 1;
        }
        self.offset.set(until);
        fired
    }

    /// Advance straight to the next pending deadline, if any.
    pub fn advance_to_next(&self) -> Option<Duration> {
        let next = self
            .timers
            .borrow()
            .first_key_value()
            .map(|(&(deadline, _), _)| deadline)?;
        let step = next.saturating_sub(self.offset.get());
        self.advance(step);
        Some(step)
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }

    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let deadline = self.offset.get() + delay;
        self.timers.borrow_mut().insert((deadline, id), task);
        id
    }

    fn cancel(&self, id: TimerId) {
        self.timers.borrow_mut().retain(|(_, existing), _| *existing != id);
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("elapsed", &self.offset.get())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(feature = "async")]
pub use self::tokio_impl::TokioScheduler;

#[cfg(feature = "async")]
mod tokio_impl {
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::rc::Rc;
    use std::time::{Duration, Instant};

    use tokio::task::JoinHandle;

    use super::{Scheduler, Task, TimerId};

    /// Scheduler backed by the tokio timer wheel.
    ///
    /// Tasks are spawned with [`tokio::task::spawn_local`], so every call must
    /// happen inside a [`tokio::task::LocalSet`].
    #[derive(Default)]
    pub struct TokioScheduler {
        next_id: Cell<u64>,
        handles: Rc<RefCell<HashMap<TimerId, JoinHandle<()>>>>,
    }

    impl TokioScheduler {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn pending(&self) -> usize {
            self.handles.borrow().len()
        }
    }

    impl Scheduler for TokioScheduler {
        fn now(&self) -> Instant {
            tokio::time::Instant::now().into_std()
        }

        fn schedule(&self, delay: Duration, task: Task) -> TimerId {
            let id = TimerId(self.next_id.get() + 1);
            self.next_id.set(id.0);

            let handles = Rc::clone(&self.handles);
            let handle = tokio::task::spawn_local(async move {
                tokio::time::sleep(delay).await;
                handles.borrow_mut().remove(&id);
                task();
            });
            self.handles.borrow_mut().insert(id, handle);
            id
        }

        fn cancel(&self, id: TimerId) {
            if let Some(handle) = self.handles.borrow_mut().remove(&id) {
                handle.abort();
            }
        }
    }

    impl Drop for TokioScheduler {
        fn drop(&mut self) {
            for (_, handle) in self.handles.borrow_mut().drain() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    fn log() -> Rc<RefCell<Vec<&'static str>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let scheduler = ManualScheduler::new();
        let fired = log();
        for (delay, label) in [(30, "c"), (10, "a"), (20, "b")] {
            let sink = Rc::clone(&fired);
            scheduler.schedule(
                Duration::from_millis(delay),
                Box::new(move || sink.borrow_mut().push(label)),
            );
        }

        assert_eq!(scheduler.advance(Duration::from_millis(25)), 2);
        assert_eq!(*fired.borrow(), vec!["a", "b"]);
        assert_eq!(scheduler.elapsed(), Duration::from_millis(25));
        assert_eq!(scheduler.advance(Duration::from_millis(5)), 1);
        assert_eq!(*fired.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let scheduler = ManualScheduler::new();
        let fired = log();
        let sink = Rc::clone(&fired);
        let id = scheduler.schedule(
            Duration::from_millis(10),
            Box::new(move || sink.borrow_mut().push("x")),
        );
        scheduler.cancel(id);
        scheduler.cancel(id);
        assert_eq!(scheduler.advance(Duration::from_secs(1)), 0);
        assert!(fired.borrow().is_empty());
    }

    #[test]
    fn rearmed_timers_inside_window_fire() {
        let scheduler = Rc::new(ManualScheduler::new());
        let ticks = Rc::new(Cell::new(0u32));

        fn arm(scheduler: &Rc<ManualScheduler>, ticks: &Rc<Cell<u32>>) {
            let next = Rc::clone(scheduler);
            let count = Rc::clone(ticks);
            scheduler.schedule(
                Duration::from_millis(100),
                Box::new(move || {
                    count.set(count.get() + 1);
                    arm(&next, &count);
                }),
            );
        }

        arm(&scheduler, &ticks);
        scheduler.advance(Duration::from_millis(350));
        assert_eq!(ticks.get(), 3);
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn now_follows_virtual_clock() {
        let scheduler = ManualScheduler::new();
        let start = scheduler.now();
        scheduler.advance(Duration::from_millis(1500));
        assert_eq!(scheduler.now() - start, Duration::from_millis(1500));
        assert_eq!(scheduler.advance_to_next(), None);
    }

    #[cfg(feature = "async")]
    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn tokio_scheduler_fires_and_cancels() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let scheduler = TokioScheduler::new();
                let fired = log();

                let sink = Rc::clone(&fired);
                scheduler.schedule(
                    Duration::from_millis(50),
                    Box::new(move || sink.borrow_mut().push("kept")),
                );
                let sink = Rc::clone(&fired);
                let cancelled = scheduler.schedule(
                    Duration::from_millis(50),
                    Box::new(move || sink.borrow_mut().push("cancelled")),
                );
                scheduler.cancel(cancelled);

                tokio::time::sleep(Duration::from_millis(100)).await;
                assert_eq!(*fired.borrow(), vec!["kept"]);
                assert_eq!(scheduler.pending(), 0);
            })
            .await;
    }
}
