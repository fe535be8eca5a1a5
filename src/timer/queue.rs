// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The timer queue: one worker thread, one deadline-ordered heap.
//!
//! concurrencpp splits this into a lock-free request queue (so producers
//! never block the timer thread mid-wait) plus the heap the thread owns
//! outright. `std::sync::Condvar` already lets a producer push onto a
//! shared heap and wake the waiter without that extra indirection, so the
//! two are folded into one mutex-guarded [`State`] here.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::RuntimeError;
use crate::executor::{Executor, ExecutorExt};
use crate::result::{LazyResult, ResultState};

use super::timer::Timer;

pub(super) struct TimerInner {
    pub(super) id: u64,
    pub(super) executor: Arc<dyn Executor>,
    pub(super) callback: Mutex<Option<Box<dyn FnMut() + Send>>>,
    pub(super) frequency: Mutex<Option<Duration>>,
    pub(super) cancelled: AtomicBool,
    pub(super) due_time: Duration,
    /// Run once, instead of `callback`, if the queue shuts down while this
    /// timer is still pending. `make_timer`'s timers leave this empty —
    /// nobody but `make_delay_object`'s awaiting future needs telling that
    /// its wait was abandoned rather than fulfilled.
    on_broken: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

struct State {
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    timers: HashMap<u64, Arc<TimerInner>>,
}

pub(super) struct Shared {
    state: Mutex<State>,
    woke: Condvar,
    shutdown: AtomicBool,
    next_id: AtomicU64,
    max_worker_idle_time: Duration,
    worker_alive: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn register(
        self: &Arc<Self>,
        due_time: Duration,
        frequency: Option<Duration>,
        executor: Arc<dyn Executor>,
        callback: Box<dyn FnMut() + Send>,
        on_broken: Option<Box<dyn FnOnce() + Send>>,
    ) -> Arc<TimerInner> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::new(TimerInner {
            id,
            executor,
            callback: Mutex::new(Some(callback)),
            frequency: Mutex::new(frequency),
            cancelled: AtomicBool::new(false),
            due_time,
            on_broken: Mutex::new(on_broken),
        });
        {
            let mut state = self.state.lock().unwrap();
            let due = Instant::now() + due_time;
            state.heap.push(Reverse((due, id)));
            state.timers.insert(id, inner.clone());
        }
        self.woke.notify_one();
        ensure_worker(self);
        tracing::debug!(timer = id, due_ms = ?due_time, "concurra timer armed");
        inner
    }

    fn fire_due(&self, now: Instant) -> Option<Instant> {
        let mut state = self.state.lock().unwrap();
        loop {
            let Some(&Reverse((due, id))) = state.heap.peek() else {
                return None;
            };
            if due > now {
                return Some(due);
            }
            state.heap.pop();
            let Some(entry) = state.timers.get(&id).cloned() else {
                continue;
            };
            if entry.cancelled.load(Ordering::Acquire) {
                state.timers.remove(&id);
                continue;
            }
            let frequency = *entry.frequency.lock().unwrap();
            if let Some(period) = frequency {
                state.heap.push(Reverse((now + period, id)));
            } else {
                state.timers.remove(&id);
            }
            drop(state);

            tracing::debug!(timer = id, "concurra timer fired");
            let fire = entry.clone();
            let executor = fire.executor.clone();
            executor.post(move || {
                if fire.cancelled.load(Ordering::Acquire) {
                    return;
                }
                if let Some(callback) = fire.callback.lock().unwrap().as_mut() {
                    callback();
                }
            });

            state = self.state.lock().unwrap();
        }
    }

    pub(super) fn wake_from_outside(&self) {
        self.woke.notify_one();
    }
}

fn ensure_worker(shared: &Arc<Shared>) {
    if shared.worker_alive.swap(true, Ordering::AcqRel) {
        return;
    }
    let worker = shared.clone();
    let stale = std::thread::Builder::new()
        .name("concurra-timer-queue".to_string())
        .spawn(move || worker_loop(worker))
        .ok()
        .and_then(|handle| shared.handle.lock().unwrap().replace(handle));
    if let Some(stale) = stale {
        let _ = stale.join();
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let now = Instant::now();
        let next_due = shared.fire_due(now);

        let wait_for = match next_due {
            Some(due) => due.saturating_duration_since(Instant::now()),
            None => shared.max_worker_idle_time,
        };

        let state = shared.state.lock().unwrap();
        let (_state, timed_out) = shared.woke.wait_timeout(state, wait_for).unwrap();
        if shared.shutdown.load(Ordering::Acquire) {
            return;
        }
        if timed_out.timed_out() && next_due.is_none() {
            // Nothing was pending before the wait and nothing woke us: the
            // idle window elapsed, so this thread retires. `make_timer`
            // respawns it lazily on the next call.
            let empty = shared.state.lock().unwrap().timers.is_empty();
            if empty {
                tracing::debug!("concurra timer queue worker retiring (idle)");
                shared.worker_alive.store(false, Ordering::Release);
                return;
            }
        }
    }
}

/// Owns the background thread that fires every [`Timer`] registered
/// through it. Respawns the thread lazily the next time a timer is added
/// after an idle retirement.
pub struct TimerQueue {
    shared: Arc<Shared>,
}

impl TimerQueue {
    pub fn new(max_worker_idle_time: Duration) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                heap: BinaryHeap::new(),
                timers: HashMap::new(),
            }),
            woke: Condvar::new(),
            shutdown: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            max_worker_idle_time,
            worker_alive: AtomicBool::new(false),
            handle: Mutex::new(None),
        });
        Self { shared }
    }

    /// Register a new timer, due `due_time` from now and repeating every
    /// `frequency` if given (`None` for a one-shot timer). `callback` runs
    /// on `executor` each time the timer fires.
    pub fn make_timer<F>(
        &self,
        due_time: Duration,
        frequency: Option<Duration>,
        executor: Arc<dyn Executor>,
        callback: F,
    ) -> std::result::Result<Timer, RuntimeError>
    where
        F: FnMut() + Send + 'static,
    {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(RuntimeError::RuntimeShutdown {
                component: "concurra::timer_queue",
            });
        }
        let inner = self
            .shared
            .register(due_time, frequency, executor, Box::new(callback), None);
        Ok(Timer::new(inner, self.shared.clone()))
    }

    /// A suspension point that resumes on `executor` no earlier than
    /// `due_time` from now. Nothing is scheduled until the returned
    /// [`LazyResult`] is actually awaited — dropping it unpolled arms no
    /// timer. If the queue shuts down while the delay is still pending, it
    /// resolves to [`RuntimeError::BrokenTask`] instead of hanging.
    pub fn make_delay_object(&self, due_time: Duration, executor: Arc<dyn Executor>) -> LazyResult<()> {
        let shared = self.shared.clone();
        LazyResult::new(async move {
            if shared.shutdown.load(Ordering::Acquire) {
                return Err(RuntimeError::RuntimeShutdown {
                    component: "concurra::timer_queue",
                });
            }
            let state = ResultState::<()>::new();
            let on_fire = state.clone();
            let on_broken = state.clone();
            shared.register(
                due_time,
                None,
                executor,
                Box::new(move || on_fire.set_result(())),
                Some(Box::new(move || on_broken.set_exception(RuntimeError::BrokenTask))),
            );
            crate::result::Result::new(state).await
        })
    }

    /// Stop the worker thread and cancel every outstanding timer.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!("concurra timer queue shutting down");
        {
            let mut state = self.shared.state.lock().unwrap();
            for (_, timer) in state.timers.drain() {
                timer.cancelled.store(true, Ordering::Release);
                if let Some(hook) = timer.on_broken.lock().unwrap().take() {
                    hook();
                }
            }
            state.heap.clear();
        }
        self.shared.woke.notify_all();
        if let Some(handle) = self.shared.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }
}

impl Drop for TimerQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::inline::InlineExecutor;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn delay_object_resumes_no_earlier_than_due_time() {
        let queue = TimerQueue::new(Duration::from_millis(200));
        let exec = Arc::new(InlineExecutor::new());
        let started = Instant::now();
        let delay = queue.make_delay_object(Duration::from_millis(20), exec);
        delay.get().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
        queue.shutdown();
    }

    #[test]
    fn delay_object_never_polled_arms_no_timer() {
        let queue = TimerQueue::new(Duration::from_millis(200));
        let exec = Arc::new(InlineExecutor::new());
        let delay = queue.make_delay_object(Duration::from_millis(5), exec);
        drop(delay);
        std::thread::sleep(Duration::from_millis(20));
        assert!(!queue.shared.worker_alive.load(Ordering::Acquire));
        queue.shutdown();
    }

    #[test]
    fn delay_object_is_broken_task_on_shutdown() {
        let queue = Arc::new(TimerQueue::new(Duration::from_millis(200)));
        let exec = Arc::new(InlineExecutor::new());
        let delay = queue.make_delay_object(Duration::from_secs(5), exec);
        let q = queue.clone();
        let handle = std::thread::spawn(move || delay.get());
        std::thread::sleep(Duration::from_millis(20));
        q.shutdown();
        assert!(matches!(handle.join().unwrap(), Err(RuntimeError::BrokenTask)));
    }

    #[test]
    fn repeated_timer_fires_more_than_once() {
        let queue = TimerQueue::new(Duration::from_millis(200));
        let exec = Arc::new(InlineExecutor::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let flag = fired.clone();
        let _timer = queue
            .make_timer(
                Duration::from_millis(5),
                Some(Duration::from_millis(5)),
                exec,
                move || {
                    flag.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap();
        std::thread::sleep(Duration::from_millis(40));
        assert!(fired.load(Ordering::SeqCst) >= 2);
        queue.shutdown();
    }
}
