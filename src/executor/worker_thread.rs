// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The worker-thread executor: a single dedicated background thread
//! draining one FIFO queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::error::RuntimeError;
use crate::task::Task;

use super::Executor;

struct Inner {
    queue: Mutex<VecDeque<Task>>,
    has_work: Condvar,
    shutdown: AtomicBool,
}

impl Inner {
    fn worker_loop(self: Arc<Self>) {
        loop {
            let mut queue = self.queue.lock().unwrap();
            loop {
                if let Some(task) = queue.pop_front() {
                    drop(queue);
                    task.invoke();
                    break;
                }
                if self.shutdown.load(Ordering::Acquire) {
                    return;
                }
                queue = self.has_work.wait(queue).unwrap();
            }
        }
    }
}

/// Runs every enqueued task, in order, on one dedicated background thread.
/// Unlike the thread pool, there's exactly one worker: tasks never run
/// concurrently with each other, only with the caller.
pub struct WorkerThreadExecutor {
    inner: Arc<Inner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerThreadExecutor {
    pub fn new() -> Self {
        let inner = Arc::new(Inner {
            queue: Mutex::new(VecDeque::new()),
            has_work: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });
        let worker = inner.clone();
        let handle = std::thread::Builder::new()
            .name("concurra-worker".to_string())
            .spawn(move || worker.worker_loop())
            .expect("failed to spawn concurra worker thread");
        Self {
            inner,
            handle: Mutex::new(Some(handle)),
        }
    }
}

impl Default for WorkerThreadExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for WorkerThreadExecutor {
    fn name(&self) -> &str {
        "concurra::worker_thread_executor"
    }

    fn max_concurrency_level(&self) -> usize {
        1
    }

    fn enqueue(&self, task: Task) {
        if self.inner.shutdown.load(Ordering::Acquire) {
            task.cancel(RuntimeError::RuntimeShutdown {
                component: "concurra::worker_thread_executor",
            });
            return;
        }
        self.inner.queue.lock().unwrap().push_back(task);
        self.inner.has_work.notify_one();
    }

    fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.has_work.notify_all();
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        let mut queue = self.inner.queue.lock().unwrap();
        for task in queue.drain(..) {
            task.cancel(RuntimeError::RuntimeShutdown {
                component: "concurra::worker_thread_executor",
            });
        }
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
    fn tasks_run_in_fifo_order() {
        let exec = StdArc::new(WorkerThreadExecutor::new());
        let order = StdArc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = order.clone();
            exec.post(move || order.lock().unwrap().push(i));
        }
        exec.shutdown();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn max_concurrency_level_is_one() {
        assert_eq!(WorkerThreadExecutor::new().max_concurrency_level(), 1);
    }
}
