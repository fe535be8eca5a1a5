// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The inline executor: runs every task synchronously on the calling
//! thread, as soon as it's enqueued.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::RuntimeError;
use crate::task::Task;

use super::Executor;

/// Runs tasks on whichever thread calls `enqueue` — no worker threads, no
/// concurrency, no queueing. Useful as a default "resume here" executor and
/// in tests.
pub struct InlineExecutor {
    shutdown: AtomicBool,
}

impl InlineExecutor {
    pub fn new() -> Self {
        Self {
            shutdown: AtomicBool::new(false),
        }
    }
}

impl Default for InlineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for InlineExecutor {
    fn name(&self) -> &str {
        "concurra::inline_executor"
    }

    fn max_concurrency_level(&self) -> usize {
        0
    }

    fn enqueue(&self, task: Task) {
        if self.shutdown.load(Ordering::Acquire) {
            task.cancel(RuntimeError::RuntimeShutdown {
                component: "concurra::inline_executor",
            });
            return;
        }
        task.invoke();
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorExt;
    use std::sync::Arc;

    #[test]
    fn enqueue_runs_before_returning() {
        let exec = InlineExecutor::new();
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = ran.clone();
        exec.enqueue(Task::new(move || flag.store(true, Ordering::SeqCst)));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn submit_after_shutdown_is_broken_task() {
        let exec = Arc::new(InlineExecutor::new());
        exec.shutdown();
        let handle = exec.submit(|| 1);
        assert!(matches!(
            handle.get(),
            Err(RuntimeError::RuntimeShutdown { .. })
        ));
    }

    #[test]
    fn max_concurrency_level_is_zero() {
        assert_eq!(InlineExecutor::new().max_concurrency_level(), 0);
    }
}
