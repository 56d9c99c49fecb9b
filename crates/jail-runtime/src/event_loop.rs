//! Per-cell timer scheduling.
//!
//! Scripts register callbacks through `setTimeout`, `setInterval` and
//! `setImmediate`. The callbacks are stored here and fired later by a single
//! background runner per cell (see [`Cell::run_in_background`]), after the
//! call that registered them has already returned.
//!
//! [`Cell::run_in_background`]: crate::Cell::run_in_background

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rhai::{Engine, FnPtr, INT};

pub type TimerId = INT;

#[derive(Debug, Clone)]
pub struct Timer {
    pub id: TimerId,
    pub callback: FnPtr,
    pub generation: u64,
    due: Instant,
    interval: Option<Duration>,
}

#[derive(Debug, Default)]
struct TimerQueue {
    timers: Vec<Timer>,
    next_id: TimerId,
    generation: u64,
    running: bool,
    firing: Option<TimerId>,
    firing_cancelled: bool,
}

impl TimerQueue {
    fn earliest(&self) -> Option<(usize, Instant)> {
        self.timers
            .iter()
            .enumerate()
            .min_by_key(|(_, timer)| (timer.due, timer.id))
            .map(|(index, timer)| (index, timer.due))
    }
}

#[derive(Debug, Default)]
pub struct EventLoop {
    queue: Mutex<TimerQueue>,
    wakeup: Condvar,
    idle: Condvar,
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TimerQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds the timer functions into `engine`.
    pub fn register(event_loop: &Arc<Self>, engine: &mut Engine) {
        let timers = Arc::clone(event_loop);
        engine.register_fn("setTimeout", move |callback: FnPtr, delay: INT| {
            timers.schedule(callback, delay, false)
        });
        let timers = Arc::clone(event_loop);
        engine.register_fn("setTimeout", move |callback: FnPtr| {
            timers.schedule(callback, 0, false)
        });
        let timers = Arc::clone(event_loop);
        engine.register_fn("setInterval", move |callback: FnPtr, delay: INT| {
            timers.schedule(callback, delay, true)
        });
        let timers = Arc::clone(event_loop);
        engine.register_fn("setImmediate", move |callback: FnPtr| {
            timers.schedule(callback, 0, false)
        });
        let timers = Arc::clone(event_loop);
        engine.register_fn("clearTimeout", move |id: INT| timers.cancel(id));
        let timers = Arc::clone(event_loop);
        engine.register_fn("clearInterval", move |id: INT| timers.cancel(id));
    }

    pub fn schedule(&self, callback: FnPtr, delay_ms: INT, repeat: bool) -> TimerId {
        let delay = Duration::from_millis(delay_ms.max(0) as u64);
        let mut queue = self.lock();
        queue.next_id += 1;
        let id = queue.next_id;
        let generation = queue.generation;
        queue.timers.push(Timer {
            id,
            callback,
            generation,
            due: Instant::now() + delay,
            interval: repeat.then_some(delay),
        });
        drop(queue);
        self.wakeup.notify_all();
        id
    }

    pub fn cancel(&self, id: TimerId) {
        let mut queue = self.lock();
        queue.timers.retain(|timer| timer.id != id);
        if queue.firing == Some(id) {
            queue.firing_cancelled = true;
        }
        drop(queue);
        self.wakeup.notify_all();
    }

    /// Drops every pending timer. Callbacks already handed to the runner are
    /// discarded because their generation no longer matches.
    pub fn clear(&self) {
        let mut queue = self.lock();
        queue.timers.clear();
        queue.generation += 1;
        queue.firing_cancelled = true;
        drop(queue);
        self.wakeup.notify_all();
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn pending(&self) -> usize {
        self.lock().timers.len()
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Claims the single runner slot. Returns `false` when a runner is
    /// already active; that runner is woken so it sees new timers.
    pub fn try_activate(&self) -> bool {
        let mut queue = self.lock();
        if queue.running {
            drop(queue);
            self.wakeup.notify_all();
            return false;
        }
        queue.running = true;
        true
    }

    pub fn deactivate(&self) {
        let mut queue = self.lock();
        queue.running = false;
        drop(queue);
        self.idle.notify_all();
    }

    /// Blocks until the next timer is due and removes it from the queue.
    /// Returns `None` and releases the runner slot once the queue is empty.
    pub fn next_due(&self) -> Option<Timer> {
        let mut queue = self.lock();
        loop {
            let Some((index, due)) = queue.earliest() else {
                queue.running = false;
                queue.firing = None;
                drop(queue);
                self.idle.notify_all();
                return None;
            };
            let now = Instant::now();
            if due <= now {
                let timer = queue.timers.remove(index);
                queue.firing = Some(timer.id);
                queue.firing_cancelled = false;
                return Some(timer);
            }
            queue = self
                .wakeup
                .wait_timeout(queue, due - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Re-arms an interval timer after it fired, unless it was cleared while
    /// its callback ran or the loop was reset.
    pub fn finish(&self, timer: Timer) {
        let mut queue = self.lock();
        let cancelled = queue.firing_cancelled || timer.generation != queue.generation;
        queue.firing = None;
        queue.firing_cancelled = false;
        if let (Some(interval), false) = (timer.interval, cancelled) {
            queue.timers.push(Timer {
                due: Instant::now() + interval,
                ..timer
            });
        }
    }

    /// Waits until no runner is active. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let queue = self.lock();
        let (queue, result) = self
            .idle
            .wait_timeout_while(queue, timeout, |queue| queue.running)
            .unwrap_or_else(PoisonError::into_inner);
        drop(queue);
        !result.timed_out()
    }
}
