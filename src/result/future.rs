// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! [`Result`]: the one-shot consumer handle returned by `submit`/`spawn`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use super::state::{ResultState, ResultStatus};
use crate::error::RuntimeError;
use crate::executor::Executor;

/// A one-shot handle to a value or error produced elsewhere, possibly by
/// another thread or a suspended coroutine.
///
/// `Result<T>` can be consumed three ways: blocking (`get`, `wait`,
/// `wait_for`), or asynchronously by `.await`ing it (which resumes inline
/// when it completes) or by [`Result::resolve_via`] (which resumes on a
/// chosen executor and never propagates the producer's error — it hands the
/// caller the result state itself, to be materialized later via `get`).
pub struct Result<T> {
    state: Option<Arc<ResultState<T>>>,
}

impl<T> Result<T> {
    pub(crate) fn new(state: Arc<ResultState<T>>) -> Self {
        Result { state: Some(state) }
    }

    fn state(&self) -> std::result::Result<&Arc<ResultState<T>>, RuntimeError> {
        self.state.as_ref().ok_or(RuntimeError::EmptyHandle)
    }

    /// `{idle, value, exception}` without consuming anything.
    pub fn status(&self) -> std::result::Result<ResultStatus, RuntimeError> {
        Ok(self.state()?.status())
    }

    /// Block the calling thread until the producer completes.
    pub fn wait(&self) -> std::result::Result<(), RuntimeError> {
        self.state()?.wait();
        Ok(())
    }

    /// Block up to `timeout`; `true` means the producer completed in time.
    pub fn wait_for(&self, timeout: Duration) -> std::result::Result<bool, RuntimeError> {
        Ok(self.state()?.wait_for(timeout))
    }

    /// Move the value out, or return the captured error. May only be
    /// called once the producer has completed.
    pub fn get(self) -> std::result::Result<T, RuntimeError> {
        self.state.ok_or(RuntimeError::EmptyHandle)?.get()
    }

    /// Like `.await`, but resumes the consumer on `resume_executor` and
    /// never throws: the caller gets this same handle back to materialize
    /// later via `get`, even if the producer failed.
    pub fn resolve_via(self, resume_executor: Arc<dyn Executor>) -> ResolveFuture<T> {
        ResolveFuture {
            state: self.state,
            resume_executor: Some(resume_executor),
            registered: false,
        }
    }

    /// Returns `true` if this handle was moved-from or already consumed.
    pub fn is_empty(&self) -> bool {
        self.state.is_none()
    }
}

impl<T> Future for Result<T> {
    type Output = std::result::Result<T, RuntimeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(state) = self.state.as_ref() else {
            return Poll::Ready(Err(RuntimeError::EmptyHandle));
        };
        if state.poll_await(cx.waker()) {
            let state = self.state.take().unwrap();
            Poll::Ready(state.get())
        } else {
            Poll::Pending
        }
    }
}

/// Future returned by [`Result::resolve_via`]. Always resolves to the
/// original handle, with the producer's outcome materialized inside it.
pub struct ResolveFuture<T> {
    state: Option<Arc<ResultState<T>>>,
    resume_executor: Option<Arc<dyn Executor>>,
    registered: bool,
}

impl<T> Future for ResolveFuture<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(state) = self.state.clone() else {
            return Poll::Ready(Result { state: None });
        };
        let exec = self.resume_executor.clone();
        let ready = state.poll_await_via(cx.waker(), exec, !self.registered);
        self.registered = true;
        if ready {
            Poll::Ready(Result { state: self.state.take() })
        } else {
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::inline::InlineExecutor;
    use crate::executor::ExecutorExt;

    #[test]
    fn blocking_get_returns_value() {
        let state = ResultState::<i32>::new();
        state.set_result(10);
        let handle = Result::new(state);
        assert_eq!(handle.get().unwrap(), 10);
    }

    #[test]
    fn submit_via_inline_executor_roundtrips() {
        let exec = Arc::new(InlineExecutor::new());
        let handle = exec.submit(|| 5 + 5);
        assert_eq!(handle.get().unwrap(), 10);
    }
}
