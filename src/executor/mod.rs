// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The executor hierarchy: one object-safe contract ([`Executor`]) plus a
//! generic convenience layer ([`ExecutorExt`]) that can't live on the trait
//! itself without losing `Arc<dyn Executor>` polymorphism.

pub mod inline;
pub mod manual;
pub mod thread_per_task;
pub mod thread_pool;
pub mod worker_thread;

use std::future::Future;
use std::sync::Arc;

use crate::error::RuntimeError;
use crate::result::{Result, ResultState};
use crate::task::{self, Task};

/// Something that can accept [`Task`]s and run them, eventually, on some
/// thread.
///
/// Kept intentionally small and non-generic so it can be used as
/// `Arc<dyn Executor>` — the shape every other component (results, timers,
/// sync primitives) holds onto when it needs to resume work on "whichever
/// executor the caller asked for". The ergonomic, generic submission API
/// ([`ExecutorExt::post`], [`ExecutorExt::submit`], ...) lives in a separate
/// extension trait for exactly this reason.
pub trait Executor: Send + Sync {
    /// A short, stable name used in diagnostics and `tracing` spans (e.g.
    /// `"thread_pool_executor"`).
    fn name(&self) -> &str;

    /// Upper bound on tasks this executor may run concurrently. `0` means
    /// "runs inline, no concurrency"; `usize::MAX` means "unbounded" (one
    /// thread per task, or a manually-driven queue).
    fn max_concurrency_level(&self) -> usize;

    /// Hand a single task to the executor. Implementations must run (or
    /// cancel) every task they accept exactly once.
    fn enqueue(&self, task: Task);

    /// Hand a batch of tasks to the executor. The default just loops over
    /// `enqueue`; executors with a bulk-friendly internal queue may override
    /// it to take one lock instead of one per task.
    fn enqueue_many(&self, tasks: Vec<Task>) {
        for task in tasks {
            self.enqueue(task);
        }
    }

    /// Begin shutting down: stop accepting new work and cancel anything
    /// still queued with [`RuntimeError::RuntimeShutdown`]. Idempotent.
    fn shutdown(&self);

    /// `true` once [`Executor::shutdown`] has been called.
    fn shutdown_requested(&self) -> bool;
}

/// Generic submission helpers built on top of [`Executor`]. Implemented for
/// every `Arc<E>` where `E: Executor + ?Sized`, so it works uniformly on
/// concrete executors and on `Arc<dyn Executor>` handles alike.
pub trait ExecutorExt: Executor {
    /// Fire-and-forget: run `f` once, somewhere, and discard its result. A
    /// panic inside `f` is caught and logged rather than left to unwind
    /// into whichever executor thread happens to run it.
    fn post<F>(self: &Arc<Self>, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let name = self.name().to_string();
        self.enqueue(Task::new(move || {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)).is_err() {
                tracing::error!(executor = %name, "concurra task posted via post() panicked");
            }
        }));
    }

    /// Run `f` once and return a [`Result`] that resolves to its return
    /// value (or to [`RuntimeError::BrokenTask`] if `f` is cancelled before
    /// it runs, or to [`RuntimeError::Panicked`] if it panics).
    fn submit<F, T>(self: &Arc<Self>, f: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let state = ResultState::<T>::new();
        let producer = state.clone();
        let on_cancel = state.clone();
        let task = Task::with_cancel_hook(
            move || match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
                Ok(value) => producer.set_result(value),
                Err(payload) => producer.set_exception(RuntimeError::from_panic(payload)),
            },
            move |reason| on_cancel.set_exception(reason),
        );
        self.enqueue(task);
        Result::new(state)
    }

    /// [`ExecutorExt::post`] for a batch of callables, submitted together.
    fn bulk_post<F, I>(self: &Arc<Self>, callables: I)
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() + Send + 'static,
    {
        let tasks = callables.into_iter().map(Task::new).collect();
        self.enqueue_many(tasks);
    }

    /// [`ExecutorExt::submit`] for a batch of callables, submitted together
    /// and returned in the same order.
    fn bulk_submit<F, T, I>(self: &Arc<Self>, callables: I) -> Vec<Result<T>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        callables.into_iter().map(|f| self.submit(f)).collect()
    }

    /// Spawn an `async` block onto this executor: it runs until its first
    /// suspension point, then gets re-enqueued by its waker each time it's
    /// woken, rather than blocking a worker thread while pending.
    fn spawn<Fut>(self: &Arc<Self>, future: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
        Self: Sized + 'static,
    {
        let exec: Arc<dyn Executor> = self.clone();
        task::spawn_coroutine(exec, Box::pin(future));
    }
}

impl<E: Executor + ?Sized> ExecutorExt for E {}
