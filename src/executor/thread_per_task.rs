// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The thread-per-task executor: every enqueued task gets its own
//! short-lived, uniquely-named OS thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::error::RuntimeError;
use crate::task::Task;

use super::Executor;

struct Inner {
    shutdown: AtomicBool,
    live_count: Mutex<usize>,
    idle: Condvar,
}

/// Spawns a dedicated thread for each task and lets it exit on its own.
/// Appropriate for long-running or blocking work that shouldn't tie up a
/// shared pool. Previously-finished threads are joined lazily, one at a
/// time, the next time a task is enqueued — so the executor never
/// accumulates more than one un-joined handle between enqueues.
pub struct ThreadPerTaskExecutor {
    inner: Arc<Inner>,
    next_id: AtomicU64,
    retired: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadPerTaskExecutor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                shutdown: AtomicBool::new(false),
                live_count: Mutex::new(0),
                idle: Condvar::new(),
            }),
            next_id: AtomicU64::new(0),
            retired: Mutex::new(None),
        }
    }

    fn join_previous_retiree(&self) {
        let previous = self.retired.lock().unwrap().take();
        if let Some(handle) = previous {
            let _ = handle.join();
        }
    }
}

impl Default for ThreadPerTaskExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for ThreadPerTaskExecutor {
    fn name(&self) -> &str {
        "concurra::thread_executor"
    }

    fn max_concurrency_level(&self) -> usize {
        usize::MAX
    }

    fn enqueue(&self, task: Task) {
        self.join_previous_retiree();

        if self.inner.shutdown.load(Ordering::Acquire) {
            task.cancel(RuntimeError::RuntimeShutdown {
                component: "concurra::thread_executor",
            });
            return;
        }

        *self.inner.live_count.lock().unwrap() += 1;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.clone();

        let built = std::thread::Builder::new()
            .name(format!("concurra-task-{id}"))
            .spawn(move || {
                task.invoke();
                let mut count = inner.live_count.lock().unwrap();
                *count -= 1;
                if *count == 0 {
                    inner.idle.notify_all();
                }
            });

        match built {
            Ok(handle) => {
                let stale = self.retired.lock().unwrap().replace(handle);
                if let Some(handle) = stale {
                    let _ = handle.join();
                }
            }
            Err(_) => {
                let mut count = self.inner.live_count.lock().unwrap();
                *count -= 1;
            }
        }
    }

    fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut count = self.inner.live_count.lock().unwrap();
        while *count > 0 {
            count = self.inner.idle.wait(count).unwrap();
        }
        drop(count);
        self.join_previous_retiree();
    }

    fn shutdown_requested(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorExt;
    use std::sync::Arc as StdArc;

    #[test]
    fn submit_runs_on_another_thread() {
        let exec = StdArc::new(ThreadPerTaskExecutor::new());
        let main_id = std::thread::current().id();
        let handle = exec.submit(move || std::thread::current().id() != main_id);
        assert!(handle.get().unwrap());
    }

    #[test]
    fn shutdown_waits_for_in_flight_tasks() {
        let exec = StdArc::new(ThreadPerTaskExecutor::new());
        let done = StdArc::new(AtomicBool::new(false));
        let flag = done.clone();
        exec.post(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            flag.store(true, Ordering::SeqCst);
        });
        exec.shutdown();
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn enqueue_after_shutdown_is_refused() {
        let exec = StdArc::new(ThreadPerTaskExecutor::new());
        exec.shutdown();
        let handle = exec.submit(|| 1);
        assert!(matches!(
            handle.get(),
            Err(RuntimeError::RuntimeShutdown { .. })
        ));
    }
}
