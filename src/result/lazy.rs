// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The cold/lazy result: work that doesn't start until something actually
//! awaits it.
//!
//! concurrencpp models this with a coroutine whose `initial_suspend` always
//! suspends and whose `final_suspend` symmetric-transfers straight back to
//! the awaiting frame. Rust futures are cold by construction — nothing runs
//! until `poll` is called — so [`LazyResult`] gets that property for free by
//! simply wrapping a boxed future and never scheduling it anywhere; polling
//! it *is* resuming it, and dropping it before it's ever polled drops the
//! suspended frame along with everything it had captured.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Wake, Waker};

use crate::error::RuntimeError;

type Outcome<T> = std::result::Result<T, RuntimeError>;
type BoxFuture<T> = Pin<Box<dyn Future<Output = Outcome<T>> + Send>>;

/// Holds the not-yet-started future backing a [`LazyResult`]. Kept as a
/// distinct type (rather than inlining it into `LazyResult`) to mirror the
/// producer/consumer split the other result states use, even though here
/// there's only ever one owner at a time.
pub struct LazyResultState<T> {
    future: Option<BoxFuture<T>>,
}

impl<T> LazyResultState<T> {
    fn new(future: BoxFuture<T>) -> Self {
        Self {
            future: Some(future),
        }
    }

    fn poll_state(&mut self, cx: &mut Context<'_>) -> Poll<Outcome<T>> {
        match self.future.as_mut() {
            None => Poll::Ready(Err(RuntimeError::AlreadyRetrieved)),
            Some(fut) => match fut.as_mut().poll(cx) {
                Poll::Ready(value) => {
                    self.future = None;
                    Poll::Ready(value)
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

/// A single-consumer, cold result: the wrapped work doesn't run at all
/// until this is polled (via `.await` or [`LazyResult::get`]).
pub struct LazyResult<T> {
    state: LazyResultState<T>,
}

impl<T> LazyResult<T> {
    /// Wrap a future as a lazy result. Nothing in `future` runs until this
    /// value is awaited or [`LazyResult::get`] is called.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Outcome<T>> + Send + 'static,
    {
        LazyResult {
            state: LazyResultState::new(Box::pin(future)),
        }
    }

    /// Drive this result to completion on the calling thread, blocking it
    /// if the wrapped future suspends. Use `.await` instead when already
    /// inside an async context.
    pub fn get(self) -> Outcome<T> {
        block_on(self)
    }
}

impl<T> Future for LazyResult<T> {
    type Output = Outcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.state.poll_state(cx)
    }
}

/// Parks the calling thread between polls instead of busy-spinning; used to
/// support [`LazyResult::get`] outside of an async runtime.
struct ThreadWaker {
    thread: std::thread::Thread,
}

impl Wake for ThreadWaker {
    fn wake(self: std::sync::Arc<Self>) {
        self.thread.unpark();
    }

    fn wake_by_ref(self: &std::sync::Arc<Self>) {
        self.thread.unpark();
    }
}

fn block_on<F: Future>(mut future: F) -> F::Output {
    let waker = Waker::from(std::sync::Arc::new(ThreadWaker {
        thread: std::thread::current(),
    }));
    let mut cx = Context::from_waker(&waker);
    // SAFETY: `future` is a local owned by this stack frame for the whole
    // duration of the loop and is never moved after being pinned.
    let mut future = unsafe { Pin::new_unchecked(&mut future) };
    loop {
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(value) => return value,
            Poll::Pending => std::thread::park(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_polled_never_runs() {
        let ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = ran.clone();
        let lazy = LazyResult::<i32>::new(async move {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(1)
        });
        drop(lazy);
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn get_drives_to_completion() {
        let lazy = LazyResult::<i32>::new(async { Ok(41) });
        assert_eq!(lazy.get().unwrap(), 41);
    }

    #[test]
    fn get_propagates_error() {
        let lazy = LazyResult::<i32>::new(async { Err(RuntimeError::BrokenTask) });
        assert!(matches!(lazy.get(), Err(RuntimeError::BrokenTask)));
    }

    #[test]
    fn suspends_across_an_actual_await_point() {
        let lazy = LazyResult::<i32>::new(async {
            let state = crate::result::state::ResultState::<i32>::new();
            let producer = state.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(10));
                producer.set_result(99);
            });
            crate::result::future::Result::new(state).await
        });
        assert_eq!(lazy.get().unwrap(), 99);
    }
}
