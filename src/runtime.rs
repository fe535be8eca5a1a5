// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! [`Runtime`]: the façade that owns one of everything and shuts it all
//! down together.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::executor::inline::InlineExecutor;
use crate::executor::manual::ManualExecutor;
use crate::executor::thread_per_task::ThreadPerTaskExecutor;
use crate::executor::thread_pool::{ThreadHook, ThreadPoolExecutor};
use crate::executor::worker_thread::WorkerThreadExecutor;
use crate::executor::Executor;
use crate::timer::TimerQueue;

const DEFAULT_CORE_COUNT: usize = 8;
const DEFAULT_MAX_WORKER_IDLE_TIME: Duration = Duration::from_secs(120);
const CPU_POOL_FACTOR: usize = 1;
const BACKGROUND_POOL_FACTOR: usize = 4;

fn hardware_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(DEFAULT_CORE_COUNT)
}

/// Configuration for a [`Runtime`], mirroring the constructor
/// `concurrencpp::runtime` takes: pool sizes default to a multiple of the
/// detected core count, idle timeouts default to two minutes.
pub struct RuntimeOptions {
    pub max_cpu_threads: usize,
    pub max_thread_pool_executor_waiting_time: Duration,
    pub max_background_threads: usize,
    pub max_background_executor_waiting_time: Duration,
    pub max_timer_queue_waiting_time: Duration,
    pub thread_started_callback: Option<ThreadHook>,
    pub thread_terminated_callback: Option<ThreadHook>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        let cores = hardware_concurrency();
        RuntimeOptions {
            max_cpu_threads: cores * CPU_POOL_FACTOR,
            max_thread_pool_executor_waiting_time: DEFAULT_MAX_WORKER_IDLE_TIME,
            max_background_threads: cores * BACKGROUND_POOL_FACTOR,
            max_background_executor_waiting_time: DEFAULT_MAX_WORKER_IDLE_TIME,
            max_timer_queue_waiting_time: DEFAULT_MAX_WORKER_IDLE_TIME,
            thread_started_callback: None,
            thread_terminated_callback: None,
        }
    }
}

impl RuntimeOptions {
    pub fn builder() -> RuntimeOptionsBuilder {
        RuntimeOptionsBuilder(RuntimeOptions::default())
    }
}

/// Builder for [`RuntimeOptions`], following the same fluent style as the
/// rest of this crate's constructors.
pub struct RuntimeOptionsBuilder(RuntimeOptions);

impl RuntimeOptionsBuilder {
    pub fn max_cpu_threads(mut self, n: usize) -> Self {
        self.0.max_cpu_threads = n;
        self
    }

    pub fn max_background_threads(mut self, n: usize) -> Self {
        self.0.max_background_threads = n;
        self
    }

    pub fn max_thread_pool_executor_waiting_time(mut self, d: Duration) -> Self {
        self.0.max_thread_pool_executor_waiting_time = d;
        self
    }

    pub fn max_background_executor_waiting_time(mut self, d: Duration) -> Self {
        self.0.max_background_executor_waiting_time = d;
        self
    }

    pub fn max_timer_queue_waiting_time(mut self, d: Duration) -> Self {
        self.0.max_timer_queue_waiting_time = d;
        self
    }

    pub fn thread_started_callback(mut self, f: ThreadHook) -> Self {
        self.0.thread_started_callback = Some(f);
        self
    }

    pub fn thread_terminated_callback(mut self, f: ThreadHook) -> Self {
        self.0.thread_terminated_callback = Some(f);
        self
    }

    pub fn build(self) -> RuntimeOptions {
        self.0
    }
}

/// Owns one inline executor, a CPU-bound thread pool, a background thread
/// pool (for blocking-ish work that shouldn't compete with CPU work), one
/// thread-per-task executor, and one timer queue — and tears all of them
/// down together on [`Runtime::shutdown`] or drop.
pub struct Runtime {
    inline: Arc<InlineExecutor>,
    thread_pool: Arc<ThreadPoolExecutor>,
    background_pool: Arc<ThreadPoolExecutor>,
    thread_per_task: Arc<ThreadPerTaskExecutor>,
    timer_queue: Arc<TimerQueue>,
    /// Executors built via [`Runtime::make_executor`] and friends, torn down
    /// alongside the built-in ones on [`Runtime::shutdown`].
    registry: Mutex<Vec<Arc<dyn Executor>>>,
}

impl Runtime {
    pub fn new(options: RuntimeOptions) -> Self {
        tracing::debug!(
            cpu_threads = options.max_cpu_threads,
            background_threads = options.max_background_threads,
            "starting concurra runtime"
        );
        Runtime {
            inline: Arc::new(InlineExecutor::new()),
            thread_pool: Arc::new(ThreadPoolExecutor::with_hooks(
                options.max_cpu_threads,
                options.max_thread_pool_executor_waiting_time,
                "concurra::thread_pool_executor",
                options.thread_started_callback.clone(),
                options.thread_terminated_callback.clone(),
            )),
            background_pool: Arc::new(ThreadPoolExecutor::with_hooks(
                options.max_background_threads,
                options.max_background_executor_waiting_time,
                "concurra::background_executor",
                options.thread_started_callback.clone(),
                options.thread_terminated_callback.clone(),
            )),
            thread_per_task: Arc::new(ThreadPerTaskExecutor::new()),
            timer_queue: Arc::new(TimerQueue::new(options.max_timer_queue_waiting_time)),
            registry: Mutex::new(Vec::new()),
        }
    }

    pub fn builder() -> RuntimeOptionsBuilder {
        RuntimeOptions::builder()
    }

    pub fn inline_executor(&self) -> Arc<dyn Executor> {
        self.inline.clone()
    }

    pub fn thread_pool_executor(&self) -> Arc<dyn Executor> {
        self.thread_pool.clone()
    }

    pub fn background_executor(&self) -> Arc<dyn Executor> {
        self.background_pool.clone()
    }

    pub fn thread_executor(&self) -> Arc<dyn Executor> {
        self.thread_per_task.clone()
    }

    pub fn timer_queue(&self) -> Arc<TimerQueue> {
        self.timer_queue.clone()
    }

    /// Build `executor`, register it so [`Runtime::shutdown`] tears it down
    /// alongside the built-in executors, and hand back the concrete `Arc<T>`
    /// so the caller can still reach type-specific methods (e.g.
    /// `ManualExecutor::loop_once`) that aren't on the object-safe
    /// [`Executor`] trait.
    pub fn make_executor<T: Executor + 'static>(&self, executor: T) -> Arc<T> {
        let executor = Arc::new(executor);
        self.registry.lock().unwrap().push(executor.clone());
        executor
    }

    /// A dedicated background thread draining one FIFO queue.
    pub fn make_worker_thread_executor(&self) -> Arc<WorkerThreadExecutor> {
        self.make_executor(WorkerThreadExecutor::new())
    }

    /// A queue of tasks that only runs when explicitly drained.
    pub fn make_manual_executor(&self) -> Arc<ManualExecutor> {
        self.make_executor(ManualExecutor::new())
    }

    /// The crate's `(major, minor, revision)` version triple.
    pub fn version(&self) -> (u32, u32, u32) {
        crate::version()
    }

    /// Shut down every owned component. Safe to call more than once; each
    /// component's own `shutdown()` is already idempotent.
    pub fn shutdown(&self) {
        tracing::debug!("shutting down concurra runtime");
        self.inline.shutdown();
        self.thread_pool.shutdown();
        self.background_pool.shutdown();
        self.thread_per_task.shutdown();
        self.timer_queue.shutdown();
        for executor in self.registry.lock().unwrap().drain(..) {
            executor.shutdown();
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorExt;

    #[test]
    fn submits_work_to_the_cpu_pool() {
        let runtime = Runtime::new(RuntimeOptions::default());
        let exec = runtime.thread_pool_executor();
        let handle = exec.submit(|| 2 + 2);
        assert_eq!(handle.get().unwrap(), 4);
    }

    #[test]
    fn default_pool_sizes_scale_with_hardware_concurrency() {
        let options = RuntimeOptions::default();
        assert!(options.max_cpu_threads >= 1);
        assert_eq!(options.max_background_threads, options.max_cpu_threads * BACKGROUND_POOL_FACTOR);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let runtime = Runtime::new(RuntimeOptions::default());
        runtime.shutdown();
        runtime.shutdown();
    }

    #[test]
    fn make_worker_thread_executor_runs_submitted_work() {
        let runtime = Runtime::new(RuntimeOptions::default());
        let exec = runtime.make_worker_thread_executor();
        let handle = exec.submit(|| 2 + 2);
        assert_eq!(handle.get().unwrap(), 4);
    }

    #[test]
    fn make_manual_executor_only_runs_when_drained() {
        let runtime = Runtime::new(RuntimeOptions::default());
        let exec = runtime.make_manual_executor();
        let handle = exec.submit(|| 1);
        assert!(exec.loop_once());
        assert_eq!(handle.get().unwrap(), 1);
    }

    #[test]
    fn runtime_shutdown_tears_down_registered_executors() {
        let runtime = Runtime::new(RuntimeOptions::default());
        let worker = runtime.make_worker_thread_executor();
        let manual = runtime.make_manual_executor();
        runtime.shutdown();
        assert!(worker.shutdown_requested());
        assert!(manual.shutdown_requested());
    }
}
