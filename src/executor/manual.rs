// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The manual executor: tasks accumulate in a FIFO queue and only run when
//! the owner explicitly drains it — useful for running a coroutine-based
//! pipeline in lockstep with, say, a single-threaded event loop or a test.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::RuntimeError;
use crate::task::Task;

use super::Executor;

/// A queue of tasks that never runs on its own; call [`ManualExecutor::loop_once`]
/// (or one of its variants) to drain it.
pub struct ManualExecutor {
    queue: Mutex<VecDeque<Task>>,
    has_work: Condvar,
    shutdown: AtomicBool,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            has_work: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Run exactly one pending task, if any. Returns `true` if a task ran.
    pub fn loop_once(&self) -> bool {
        let task = self.queue.lock().unwrap().pop_front();
        match task {
            Some(task) => {
                task.invoke();
                true
            }
            None => false,
        }
    }

    /// Block up to `timeout` waiting for a task to become available, then
    /// run it. Returns `true` if a task ran before the deadline.
    pub fn loop_once_timeout(&self, timeout: Duration) -> bool {
        let mut queue = self.queue.lock().unwrap();
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(task) = queue.pop_front() {
                drop(queue);
                task.invoke();
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, timed_out) = self.has_work.wait_timeout(queue, deadline - now).unwrap();
            queue = guard;
            if timed_out.timed_out() && queue.is_empty() {
                return false;
            }
        }
    }

    /// Run up to `max_count` pending tasks without blocking for more to
    /// arrive. Returns the number actually run.
    pub fn run_loop(&self, max_count: usize) -> usize {
        let mut ran = 0;
        while ran < max_count {
            if !self.loop_once() {
                break;
            }
            ran += 1;
        }
        ran
    }

    /// Block until at least one task is queued, without running it.
    pub fn wait_for_task(&self) {
        let mut queue = self.queue.lock().unwrap();
        while queue.is_empty() && !self.shutdown.load(Ordering::Acquire) {
            queue = self.has_work.wait(queue).unwrap();
        }
    }

    /// Drop every queued task without running it, cancelling each with
    /// [`RuntimeError::BrokenTask`] (distinct from a `shutdown()`-induced
    /// cancellation, since the executor itself stays usable afterward).
    pub fn clear(&self) {
        let mut queue = self.queue.lock().unwrap();
        for task in queue.drain(..) {
            task.cancel(RuntimeError::BrokenTask);
        }
    }
}

impl Default for ManualExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for ManualExecutor {
    fn name(&self) -> &str {
        "concurra::manual_executor"
    }

    fn max_concurrency_level(&self) -> usize {
        usize::MAX
    }

    fn enqueue(&self, task: Task) {
        if self.shutdown.load(Ordering::Acquire) {
            task.cancel(RuntimeError::RuntimeShutdown {
                component: "concurra::manual_executor",
            });
            return;
        }
        self.queue.lock().unwrap().push_back(task);
        self.has_work.notify_one();
    }

    fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.has_work.notify_all();
        self.clear();
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorExt;

    #[test]
    fn loop_once_runs_fifo() {
        let exec = std::sync::Arc::new(ManualExecutor::new());
        let order = std::sync::Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            exec.post(move || order.lock().unwrap().push(i));
        }
        assert_eq!(exec.run_loop(10), 3);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn loop_once_on_empty_queue_returns_false() {
        let exec = ManualExecutor::new();
        assert!(!exec.loop_once());
    }

    #[test]
    fn clear_cancels_without_running() {
        let exec = std::sync::Arc::new(ManualExecutor::new());
        let handle = exec.submit(|| 1);
        exec.clear();
        assert!(matches!(handle.get(), Err(RuntimeError::BrokenTask)));
    }
}
