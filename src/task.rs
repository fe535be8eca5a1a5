// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The type-erased, move-only unit of work every executor schedules.
//!
//! A [`Task`] is either a plain callable (`post`/`bulk_post`) or the
//! single-poll driver of a suspended coroutine (`submit`/`bulk_submit`,
//! built by [`spawn_coroutine`]). Both shapes share one contract: construct,
//! move, invoke-and-destroy once, or cancel-with-reason instead of running.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};

use crate::error::RuntimeError;
use crate::executor::Executor;

type CancelHook = Box<dyn FnOnce(RuntimeError) + Send>;

/// A move-only, type-erased unit of work with one-shot invocation semantics.
///
/// `Task` does not implement the inline-storage (small-buffer) optimization
/// real production executors use to avoid heap-allocating small callables —
/// that's a performance contract, not an observable behavior, and is out of
/// scope here. The move-only, invoke-once contract itself is preserved: a
/// moved-from `Task` is simply gone (Rust ownership), and dropping a
/// non-empty `Task` drops the callable without running it.
pub struct Task {
    body: Option<Box<dyn FnOnce() + Send>>,
    on_cancel: Option<CancelHook>,
}

impl Task {
    /// Wrap a plain callable. Invoking runs it once; cancelling drops it.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Task {
            body: Some(Box::new(f)),
            on_cancel: None,
        }
    }

    /// Wrap a callable together with a hook run instead, if this task is
    /// cancelled before it's invoked (used by `submit` to route a
    /// *broken-task* failure into the associated result state).
    pub fn with_cancel_hook<F, C>(f: F, on_cancel: C) -> Self
    where
        F: FnOnce() + Send + 'static,
        C: FnOnce(RuntimeError) + Send + 'static,
    {
        Task {
            body: Some(Box::new(f)),
            on_cancel: Some(Box::new(on_cancel)),
        }
    }

    /// Run the callable once, consuming the task.
    pub fn invoke(mut self) {
        if let Some(body) = self.body.take() {
            body();
        }
    }

    /// Drop the callable without running it, signalling `reason` to
    /// whatever result state depends on this task, if any.
    pub fn cancel(mut self, reason: RuntimeError) {
        self.body = None;
        if let Some(hook) = self.on_cancel.take() {
            hook(reason);
        }
    }

    /// True once the callable has already been taken (invoked or
    /// cancelled) — a `Task` in this state does nothing on drop.
    pub fn is_empty(&self) -> bool {
        self.body.is_none()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("empty", &self.is_empty()).finish()
    }
}

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoroutineState {
    Ready = 0,
    Running = 1,
    Waiting = 2,
    Complete = 3,
}

impl CoroutineState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Ready,
            1 => Self::Running,
            2 => Self::Waiting,
            _ => Self::Complete,
        }
    }
}

/// The shared state backing a coroutine task: a boxed future plus the
/// executor it gets re-enqueued onto whenever its waker fires.
///
/// This is the generalization of the classic "green task" shape (state word
/// + mutex-guarded future + waker that re-enqueues) to an arbitrary
/// `Executor` rather than one fixed scheduler, so any executor in the
/// hierarchy can drive coroutine-shaped work, not just the thread pool.
struct RawCoroutine {
    state: AtomicU8,
    future: Mutex<Option<BoxFuture>>,
    executor: Arc<dyn Executor>,
}

impl RawCoroutine {
    fn drive(self: Arc<Self>) {
        if CoroutineState::from_u8(self.state.load(Ordering::Acquire)) == CoroutineState::Complete
        {
            return;
        }
        self.state
            .store(CoroutineState::Running as u8, Ordering::Release);

        let waker = Waker::from(Arc::new(CoroutineWaker {
            raw: self.clone(),
        }));
        let mut cx = Context::from_waker(&waker);

        let completed = {
            let mut slot = self.future.lock().unwrap();
            match slot.as_mut() {
                None => true,
                Some(fut) => match fut.as_mut().poll(&mut cx) {
                    Poll::Ready(()) => {
                        *slot = None;
                        true
                    }
                    Poll::Pending => false,
                },
            }
        };

        if completed {
            self.state
                .store(CoroutineState::Complete as u8, Ordering::Release);
            return;
        }

        // Transition Running -> Waiting; if the waker already fired during
        // poll() it will have tried (and failed) to move Waiting -> Ready,
        // so detect that race and re-enqueue immediately instead of losing
        // the wakeup.
        let prev = self.state.compare_exchange(
            CoroutineState::Running as u8,
            CoroutineState::Waiting as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if prev.is_err() {
            self.enqueue_self();
        }
    }

    fn enqueue_self(self: &Arc<Self>) {
        let raw = self.clone();
        self.executor.enqueue(Task::new(move || raw.drive()));
    }
}

struct CoroutineWaker {
    raw: Arc<RawCoroutine>,
}

impl Wake for CoroutineWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        loop {
            let state = self.raw.state.load(Ordering::Acquire);
            match CoroutineState::from_u8(state) {
                CoroutineState::Waiting => {
                    let prev = self.raw.state.compare_exchange(
                        CoroutineState::Waiting as u8,
                        CoroutineState::Ready as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                    if prev.is_err() {
                        continue;
                    }
                    self.raw.enqueue_self();
                    return;
                }
                CoroutineState::Running => {
                    // Fired mid-poll: bump to Ready so drive()'s CAS fails
                    // and it re-enqueues once it's done polling.
                    let prev = self.raw.state.compare_exchange(
                        CoroutineState::Running as u8,
                        CoroutineState::Ready as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                    if prev.is_err() {
                        continue;
                    }
                    return;
                }
                CoroutineState::Ready | CoroutineState::Complete => return,
            }
        }
    }
}

/// Schedule a future for execution on `executor`, driving it to completion
/// one poll at a time via re-enqueued [`Task`]s rather than blocking a
/// worker thread while it's pending.
pub(crate) fn spawn_coroutine(executor: Arc<dyn Executor>, future: BoxFuture) {
    let raw = Arc::new(RawCoroutine {
        state: AtomicU8::new(CoroutineState::Ready as u8),
        future: Mutex::new(Some(future)),
        executor: executor.clone(),
    });
    executor.enqueue(Task::new(move || raw.drive()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::inline::InlineExecutor;
    use std::sync::atomic::{AtomicI32, Ordering as AtoOrdering};

    #[test]
    fn invoke_runs_once() {
        let counter = Arc::new(AtomicI32::new(0));
        let c = counter.clone();
        let task = Task::new(move || {
            c.fetch_add(1, AtoOrdering::SeqCst);
        });
        task.invoke();
        assert_eq!(counter.load(AtoOrdering::SeqCst), 1);
    }

    #[test]
    fn drop_without_invoke_does_not_run() {
        let counter = Arc::new(AtomicI32::new(0));
        let c = counter.clone();
        let task = Task::new(move || {
            c.fetch_add(1, AtoOrdering::SeqCst);
        });
        drop(task);
        assert_eq!(counter.load(AtoOrdering::SeqCst), 0);
    }

    #[test]
    fn cancel_runs_hook_not_body() {
        let body_ran = Arc::new(AtomicI32::new(0));
        let hook_ran = Arc::new(AtomicI32::new(0));
        let b = body_ran.clone();
        let h = hook_ran.clone();
        let task = Task::with_cancel_hook(
            move || {
                b.fetch_add(1, AtoOrdering::SeqCst);
            },
            move |_reason| {
                h.fetch_add(1, AtoOrdering::SeqCst);
            },
        );
        task.cancel(RuntimeError::BrokenTask);
        assert_eq!(body_ran.load(AtoOrdering::SeqCst), 0);
        assert_eq!(hook_ran.load(AtoOrdering::SeqCst), 1);
    }

    #[test]
    fn spawn_coroutine_runs_to_completion_on_inline_executor() {
        let exec: Arc<dyn Executor> = Arc::new(InlineExecutor::new());
        let counter = Arc::new(AtomicI32::new(0));
        let c = counter.clone();
        spawn_coroutine(
            exec,
            Box::pin(async move {
                c.fetch_add(1, AtoOrdering::SeqCst);
            }),
        );
        assert_eq!(counter.load(AtoOrdering::SeqCst), 1);
    }
}
