// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The fan-out result: many consumers, each able to read the same terminal
//! value or error, as many times as they like.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use crate::error::RuntimeError;

type Outcome<T> = std::result::Result<T, RuntimeError>;

enum Inner<T> {
    Pending(Vec<Waker>),
    Done(Outcome<T>),
}

/// The rendezvous backing [`SharedResult`]: unlike [`super::ResultState`], a
/// completed outcome here is never consumed — it's cloned out to however
/// many awaiters ask for it, in whatever order they ask.
pub struct SharedResultState<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone> SharedResultState<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::Pending(Vec::new())),
        })
    }

    pub fn set_result(&self, value: T) {
        self.complete(Ok(value));
    }

    pub fn set_exception(&self, error: RuntimeError) {
        self.complete(Err(error));
    }

    fn complete(&self, outcome: Outcome<T>) {
        let waiters = {
            let mut inner = self.inner.lock().unwrap();
            match std::mem::replace(&mut *inner, Inner::Done(outcome)) {
                Inner::Pending(waiters) => waiters,
                Inner::Done(_) => panic!("concurra: shared result completed more than once"),
            }
        };
        for waker in waiters {
            waker.wake();
        }
    }

    /// Register `waker` if the result isn't ready yet; returns `true` if
    /// it's already ready and the caller can proceed without suspending.
    pub fn poll_await(&self, waker: &Waker) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match &mut *inner {
            Inner::Done(_) => true,
            Inner::Pending(waiters) => {
                if !waiters.iter().any(|w| w.will_wake(waker)) {
                    waiters.push(waker.clone());
                }
                false
            }
        }
    }

    /// Clone of the terminal outcome. May be called any number of times,
    /// by any number of consumers, once the producer has completed.
    pub fn get(&self) -> Outcome<T> {
        match &*self.inner.lock().unwrap() {
            Inner::Done(outcome) => outcome.clone(),
            Inner::Pending(_) => Err(RuntimeError::EmptyHandle),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.inner.lock().unwrap(), Inner::Done(_))
    }
}

/// A cloneable handle onto a single producer's outcome. Every clone sees
/// the same value (or error) once the producer completes, and can read it
/// more than once.
pub struct SharedResult<T> {
    state: Arc<SharedResultState<T>>,
}

impl<T: Clone> SharedResult<T> {
    pub fn new(state: Arc<SharedResultState<T>>) -> Self {
        SharedResult { state }
    }

    pub fn status(&self) -> bool {
        self.state.is_ready()
    }

    /// Read the outcome without consuming it. Returns
    /// [`RuntimeError::EmptyHandle`] if the producer hasn't completed yet.
    pub fn get(&self) -> Outcome<T> {
        self.state.get()
    }
}

impl<T> Clone for SharedResult<T> {
    fn clone(&self) -> Self {
        SharedResult {
            state: self.state.clone(),
        }
    }
}

impl<T: Clone> Future for SharedResult<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.state.poll_await(cx.waker()) {
            Poll::Ready(self.state.get())
        } else {
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_clone_sees_the_same_value() {
        let state = SharedResultState::<i32>::new();
        let a = SharedResult::new(state.clone());
        let b = a.clone();
        state.set_result(7);
        assert_eq!(a.get().unwrap(), 7);
        assert_eq!(b.get().unwrap(), 7);
    }

    #[test]
    fn get_before_completion_is_empty_handle() {
        let state = SharedResultState::<i32>::new();
        let handle = SharedResult::new(state);
        assert!(matches!(handle.get(), Err(RuntimeError::EmptyHandle)));
    }

    #[test]
    fn get_may_be_called_more_than_once() {
        let state = SharedResultState::<i32>::new();
        let handle = SharedResult::new(state.clone());
        state.set_result(3);
        assert_eq!(handle.get().unwrap(), 3);
        assert_eq!(handle.get().unwrap(), 3);
    }
}
