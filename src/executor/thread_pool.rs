// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The thread-pool executor: a fixed set of workers, each with its own
//! local queue, stealing from one another when idle.
//!
//! Shaped after the teacher's work-stealing scheduler (per-worker queue +
//! round-robin dispatch + idle-worker tracking), generalized from one fixed
//! "green task" scheduler into a reusable `Executor` any number of pools can
//! be built from (this crate uses it for both the CPU pool and the
//! background pool).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::RuntimeError;
use crate::task::Task;

use super::Executor;

/// Pads a flag to its own cache line so workers scanning the idle-worker
/// set don't bounce each other's line on every poll.
#[repr(align(64))]
struct CachePadded<T>(T);

struct WorkerSlot {
    queue: Mutex<VecDeque<Task>>,
    has_work: Condvar,
    idle: CachePadded<AtomicBool>,
    alive: CachePadded<AtomicBool>,
}

impl WorkerSlot {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            has_work: Condvar::new(),
            idle: CachePadded(AtomicBool::new(true)),
            alive: CachePadded(AtomicBool::new(false)),
        }
    }
}

/// Fired when a pool worker thread starts or stops, named after its pool
/// (used by [`crate::runtime::RuntimeOptions`] to hook thread lifecycle for
/// logging/metrics).
pub type ThreadHook = Arc<dyn Fn(&str) + Send + Sync>;

struct Shared {
    name: &'static str,
    slots: Vec<Arc<WorkerSlot>>,
    shutdown: AtomicBool,
    max_idle: Duration,
    on_thread_start: Option<ThreadHook>,
    on_thread_stop: Option<ThreadHook>,
}

impl Shared {
    fn steal_one(&self, thief: usize) -> Option<Task> {
        let n = self.slots.len();
        for offset in 1..n {
            let victim = (thief + offset) % n;
            if let Ok(mut queue) = self.slots[victim].queue.try_lock() {
                if let Some(task) = queue.pop_front() {
                    return Some(task);
                }
            }
        }
        None
    }

    fn cancel_all_pending(&self) {
        for slot in &self.slots {
            let mut queue = slot.queue.lock().unwrap();
            for task in queue.drain(..) {
                task.cancel(RuntimeError::RuntimeShutdown {
                    component: self.name,
                });
            }
        }
    }
}

fn worker_loop(shared: Arc<Shared>, idx: usize) {
    let slot = shared.slots[idx].clone();
    slot.alive.0.store(true, Ordering::Release);
    let thread_name = format!("{}-{idx}", shared.name);
    if let Some(hook) = &shared.on_thread_start {
        hook(&thread_name);
    }

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| worker_body(&shared, &slot, idx)));

    if let Some(hook) = &shared.on_thread_stop {
        hook(&thread_name);
    }
    if result.is_err() {
        tracing::error!(worker = %thread_name, "concurra pool worker panicked");
    }
}

fn worker_body(shared: &Arc<Shared>, slot: &Arc<WorkerSlot>, idx: usize) {
    loop {
        let own_task = slot.queue.lock().unwrap().pop_back();
        let task = own_task.or_else(|| shared.steal_one(idx));

        let task = match task {
            Some(task) => task,
            None => {
                slot.idle.0.store(true, Ordering::Release);
                let queue = slot.queue.lock().unwrap();
                if !queue.is_empty() {
                    continue;
                }
                if shared.shutdown.load(Ordering::Acquire) {
                    slot.alive.0.store(false, Ordering::Release);
                    return;
                }
                let (_queue, timeout) =
                    slot.has_work.wait_timeout(queue, shared.max_idle).unwrap();
                if timeout.timed_out() && !shared.shutdown.load(Ordering::Acquire) {
                    // Nothing arrived during the idle window: retire. The
                    // next `enqueue` that targets this slot respawns it.
                    slot.alive.0.store(false, Ordering::Release);
                    return;
                }
                continue;
            }
        };

        slot.idle.0.store(false, Ordering::Release);
        task.invoke();

        if shared.shutdown.load(Ordering::Acquire) && slot.queue.lock().unwrap().is_empty() {
            slot.alive.0.store(false, Ordering::Release);
            return;
        }
    }
}

/// A fixed-size work-stealing pool. Workers retire after sitting idle for
/// `max_worker_idle_time` and are respawned lazily the next time a task
/// lands on their slot.
pub struct ThreadPoolExecutor {
    shared: Arc<Shared>,
    next_slot: AtomicUsize,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown_done: AtomicBool,
}

impl ThreadPoolExecutor {
    pub fn new(pool_size: usize, max_worker_idle_time: Duration, name: &'static str) -> Self {
        Self::with_hooks(pool_size, max_worker_idle_time, name, None, None)
    }

    /// Like [`ThreadPoolExecutor::new`], firing `on_thread_start`/
    /// `on_thread_stop` around each worker thread's lifetime.
    pub fn with_hooks(
        pool_size: usize,
        max_worker_idle_time: Duration,
        name: &'static str,
        on_thread_start: Option<ThreadHook>,
        on_thread_stop: Option<ThreadHook>,
    ) -> Self {
        let pool_size = pool_size.max(1);
        let slots = (0..pool_size).map(|_| Arc::new(WorkerSlot::new())).collect();
        let shared = Arc::new(Shared {
            name,
            slots,
            shutdown: AtomicBool::new(false),
            max_idle: max_worker_idle_time,
            on_thread_start,
            on_thread_stop,
        });
        let pool = Self {
            shared: shared.clone(),
            next_slot: AtomicUsize::new(0),
            handles: Mutex::new(Vec::with_capacity(pool_size)),
            shutdown_done: AtomicBool::new(false),
        };
        for idx in 0..pool_size {
            pool.spawn_worker(idx);
        }
        pool
    }

    fn spawn_worker(&self, idx: usize) {
        let shared = self.shared.clone();
        let name = format!("{}-{idx}", self.shared.name);
        if let Ok(handle) = std::thread::Builder::new()
            .name(name)
            .spawn(move || worker_loop(shared, idx))
        {
            self.handles.lock().unwrap().push(handle);
        }
    }

    fn respawn_if_dead(&self, idx: usize) {
        let slot = &self.shared.slots[idx];
        if !slot.alive.0.load(Ordering::Acquire) && !self.shared.shutdown.load(Ordering::Acquire) {
            self.spawn_worker(idx);
        }
    }
}

impl Executor for ThreadPoolExecutor {
    fn name(&self) -> &str {
        self.shared.name
    }

    fn max_concurrency_level(&self) -> usize {
        self.shared.slots.len()
    }

    fn enqueue(&self, task: Task) {
        if self.shared.shutdown.load(Ordering::Acquire) {
            task.cancel(RuntimeError::RuntimeShutdown {
                component: self.shared.name,
            });
            return;
        }
        let idx = self.next_slot.fetch_add(1, Ordering::Relaxed) % self.shared.slots.len();
        let slot = &self.shared.slots[idx];
        slot.queue.lock().unwrap().push_back(task);
        slot.has_work.notify_one();
        self.respawn_if_dead(idx);
    }

    fn shutdown(&self) {
        if self.shutdown_done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.shutdown.store(true, Ordering::Release);
        for slot in &self.shared.slots {
            slot.has_work.notify_all();
        }
        for handle in self.handles.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
        self.shared.cancel_all_pending();
    }

    fn shutdown_requested(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorExt;
    use std::sync::Arc as StdArc;

    #[test]
    fn runs_tasks_across_workers() {
        let exec = StdArc::new(ThreadPoolExecutor::new(4, Duration::from_millis(50), "test_pool"));
        let handles: Vec<_> = (0..20).map(|i| exec.submit(move || i * i)).collect();
        let results: Vec<i32> = handles.into_iter().map(|h| h.get().unwrap()).collect();
        assert_eq!(results, (0..20).map(|i| i * i).collect::<Vec<_>>());
        exec.shutdown();
    }

    #[test]
    fn shutdown_cancels_pending_work() {
        let exec = StdArc::new(ThreadPoolExecutor::new(1, Duration::from_secs(5), "test_pool"));
        exec.shutdown();
        let handle = exec.submit(|| 1);
        assert!(matches!(
            handle.get(),
            Err(RuntimeError::RuntimeShutdown { .. })
        ));
    }

    #[test]
    fn max_concurrency_level_matches_pool_size() {
        let exec = ThreadPoolExecutor::new(3, Duration::from_secs(5), "test_pool");
        assert_eq!(exec.max_concurrency_level(), 3);
    }
}
