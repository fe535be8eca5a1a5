// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! `when_all`/`when_any`: combinators over a batch of [`super::Result`]
//! handles.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::RuntimeError;

use super::future::Result;

type Outcome<T> = std::result::Result<T, RuntimeError>;

/// Wait for every result in `results` to complete, preserving order.
/// Unlike a short-circuiting `try_join`, this collects every outcome —
/// including individual failures — rather than bailing out on the first
/// error.
pub fn when_all<T>(results: Vec<Result<T>>) -> WhenAll<T> {
    let len = results.len();
    WhenAll {
        pending: results.into_iter().map(Some).collect(),
        done: (0..len).map(|_| None).collect(),
    }
}

pub struct WhenAll<T> {
    pending: Vec<Option<Result<T>>>,
    done: Vec<Option<Outcome<T>>>,
}

impl<T> Future for WhenAll<T> {
    type Output = Vec<Outcome<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `WhenAll` is never structurally pinned — none of its
        // fields are ever projected into a `Pin`, so moving them via a
        // plain `&mut` reference is sound regardless of `T: Unpin`.
        let this = unsafe { self.get_unchecked_mut() };
        let mut all_done = true;
        for (slot, done) in this.pending.iter_mut().zip(this.done.iter_mut()) {
            if let Some(fut) = slot {
                match Pin::new(fut).poll(cx) {
                    Poll::Ready(outcome) => {
                        *done = Some(outcome);
                        *slot = None;
                    }
                    Poll::Pending => all_done = false,
                }
            }
        }
        if all_done {
            let results = this.done.iter_mut().map(|d| d.take().unwrap()).collect();
            Poll::Ready(results)
        } else {
            Poll::Pending
        }
    }
}

/// Wait for whichever result in `results` completes first. Resolves to the
/// winning index, its outcome, and every other handle that hadn't completed
/// yet — the losers aren't cancelled or dropped, so the caller can keep
/// awaiting them.
pub fn when_any<T>(results: Vec<Result<T>>) -> WhenAny<T> {
    WhenAny {
        pending: results.into_iter().map(Some).collect(),
    }
}

pub struct WhenAny<T> {
    pending: Vec<Option<Result<T>>>,
}

impl<T> Future for WhenAny<T> {
    type Output = (usize, Outcome<T>, Vec<Result<T>>);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        for (idx, slot) in this.pending.iter_mut().enumerate() {
            if let Some(fut) = slot {
                if let Poll::Ready(outcome) = Pin::new(fut).poll(cx) {
                    *slot = None;
                    let rest = this.pending.iter_mut().filter_map(|s| s.take()).collect();
                    return Poll::Ready((idx, outcome, rest));
                }
            }
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::inline::InlineExecutor;
    use crate::executor::ExecutorExt;
    use crate::result::lazy::LazyResult;
    use std::sync::Arc;

    #[test]
    fn when_all_collects_every_outcome_in_order() {
        let exec = Arc::new(InlineExecutor::new());
        let handles = vec![exec.submit(|| 1), exec.submit(|| 2), exec.submit(|| 3)];
        let combined = when_all(handles);
        let results = LazyResult::new(async move { Ok(combined.await) }).get().unwrap();
        let values: Vec<i32> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn when_any_returns_the_first_winner() {
        let exec = Arc::new(InlineExecutor::new());
        let handles = vec![exec.submit(|| 10)];
        let combined = when_any(handles);
        let (idx, outcome, rest) = LazyResult::new(async move { Ok(combined.await) }).get().unwrap();
        assert_eq!(idx, 0);
        assert_eq!(outcome.unwrap(), 10);
        assert!(rest.is_empty());
    }

    #[test]
    fn when_any_hands_back_the_losers_still_awaitable() {
        let exec = Arc::new(InlineExecutor::new());
        // Both submissions run inline before `when_any` is even constructed,
        // so both handles are already `Done` — the loser still has to come
        // back usable even though it never actually suspended anything.
        let handles = vec![exec.submit(|| 1), exec.submit(|| 2)];
        let combined = when_any(handles);
        let (idx, outcome, mut rest) = LazyResult::new(async move { Ok(combined.await) }).get().unwrap();
        assert_eq!(idx, 0);
        assert_eq!(outcome.unwrap(), 1);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest.remove(0).get().unwrap(), 2);
    }
}
