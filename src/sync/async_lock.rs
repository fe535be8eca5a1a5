// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! An async mutex: `lock()` suspends the awaiting task instead of blocking
//! a thread, and hands the lock directly to the next waiter on unlock
//! rather than letting every waiter race to re-acquire it.

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use crate::executor::{Executor, ExecutorExt};

struct Waiter {
    granted: AtomicBool,
    waker: Mutex<Option<Waker>>,
    resume_executor: Option<Arc<dyn Executor>>,
}

struct State {
    locked: bool,
    waiters: VecDeque<Arc<Waiter>>,
}

struct Inner<T> {
    state: Mutex<State>,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is only ever granted to the single task holding
// the lock, the same contract a `std::sync::Mutex<T>` makes.
unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

impl<T> Inner<T> {
    fn unlock(&self) {
        let mut state = self.state.lock().unwrap();
        match state.waiters.pop_front() {
            Some(next) => {
                // Hand off directly: `locked` stays `true`, ownership just
                // moves to `next` so nobody else can steal it in between.
                drop(state);
                next.granted.store(true, Ordering::Release);
                let waker = next.waker.lock().unwrap().take();
                if let Some(waker) = waker {
                    match &next.resume_executor {
                        Some(exec) => exec.post(move || waker.wake()),
                        None => waker.wake(),
                    }
                }
            }
            None => state.locked = false,
        }
    }
}

/// An async mutex guarding a `T`. Cloning it clones the handle, not the
/// data — every clone guards the same value.
pub struct AsyncMutex<T> {
    inner: Arc<Inner<T>>,
}

impl<T> AsyncMutex<T> {
    pub fn new(value: T) -> Self {
        AsyncMutex {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    locked: false,
                    waiters: VecDeque::new(),
                }),
                data: UnsafeCell::new(value),
            }),
        }
    }

    /// Acquire the lock, suspending until it's available. If
    /// `resume_executor` is given, the waiting task resumes on that
    /// executor instead of wherever `unlock` happened to run.
    pub fn lock(&self, resume_executor: Option<Arc<dyn Executor>>) -> LockFuture<T> {
        LockFuture {
            inner: self.inner.clone(),
            resume_executor,
            waiter: None,
        }
    }

    /// Acquire the lock only if it's free right now.
    pub fn try_lock(&self) -> Option<ScopedLock<T>> {
        let mut state = self.inner.state.lock().unwrap();
        if state.locked {
            None
        } else {
            state.locked = true;
            Some(ScopedLock {
                inner: Some(self.inner.clone()),
            })
        }
    }
}

impl<T> Clone for AsyncMutex<T> {
    fn clone(&self) -> Self {
        AsyncMutex {
            inner: self.inner.clone(),
        }
    }
}

pub struct LockFuture<T> {
    inner: Arc<Inner<T>>,
    resume_executor: Option<Arc<dyn Executor>>,
    waiter: Option<Arc<Waiter>>,
}

impl<T> Future for LockFuture<T> {
    type Output = ScopedLock<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(waiter) = &this.waiter {
            if waiter.granted.load(Ordering::Acquire) {
                this.waiter = None;
                return Poll::Ready(ScopedLock {
                    inner: Some(this.inner.clone()),
                });
            }
            *waiter.waker.lock().unwrap() = Some(cx.waker().clone());
            return Poll::Pending;
        }

        let mut state = this.inner.state.lock().unwrap();
        if !state.locked {
            state.locked = true;
            return Poll::Ready(ScopedLock {
                inner: Some(this.inner.clone()),
            });
        }
        let waiter = Arc::new(Waiter {
            granted: AtomicBool::new(false),
            waker: Mutex::new(Some(cx.waker().clone())),
            resume_executor: this.resume_executor.clone(),
        });
        state.waiters.push_back(waiter.clone());
        drop(state);
        this.waiter = Some(waiter);
        Poll::Pending
    }
}

/// An RAII guard for an [`AsyncMutex`]'s contents. Unlocks automatically on
/// drop, or earlier via [`ScopedLock::unlock`].
pub struct ScopedLock<T> {
    inner: Option<Arc<Inner<T>>>,
}

impl<T> ScopedLock<T> {
    pub fn owns_lock(&self) -> bool {
        self.inner.is_some()
    }

    /// Release the lock early, before this guard is dropped.
    pub fn unlock(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.unlock();
        }
    }

    /// Consume the guard and hand back a handle to the mutex it locked,
    /// *without* unlocking it — the caller takes over responsibility for
    /// eventually unlocking (e.g. by converting back into a guard).
    pub fn release(mut self) -> AsyncMutex<T> {
        let inner = self.inner.take().expect("scoped lock already released");
        AsyncMutex { inner }
    }

    /// The mutex this guard belongs to, independent of whether it's still
    /// held.
    pub fn mutex(&self) -> Option<AsyncMutex<T>> {
        self.inner.clone().map(|inner| AsyncMutex { inner })
    }

    pub fn swap(&mut self, other: &mut ScopedLock<T>) {
        std::mem::swap(&mut self.inner, &mut other.inner);
    }
}

impl<T> Deref for ScopedLock<T> {
    type Target = T;

    fn deref(&self) -> &T {
        let inner = self.inner.as_ref().expect("scoped lock does not own the mutex");
        unsafe { &*inner.data.get() }
    }
}

impl<T> DerefMut for ScopedLock<T> {
    fn deref_mut(&mut self) -> &mut T {
        let inner = self.inner.as_ref().expect("scoped lock does not own the mutex");
        unsafe { &mut *inner.data.get() }
    }
}

impl<T> Drop for ScopedLock<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.unlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::LazyResult;

    #[test]
    fn try_lock_fails_while_held() {
        let mutex = AsyncMutex::new(0);
        let guard = mutex.try_lock().unwrap();
        assert!(mutex.try_lock().is_none());
        drop(guard);
        assert!(mutex.try_lock().is_some());
    }

    #[test]
    fn lock_hands_off_in_fifo_order() {
        let mutex = AsyncMutex::new(Vec::<i32>::new());
        let a = mutex.clone();
        let b = mutex.clone();
        let order: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));

        let first_guard = a.try_lock().unwrap();

        let order2 = order.clone();
        let waiter = std::thread::spawn(move || {
            LazyResult::new(async move {
                let mut guard = b.lock(None).await;
                guard.push(2);
                order2.lock().unwrap().push(2);
                Ok::<(), crate::error::RuntimeError>(())
            })
            .get()
            .unwrap();
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        order.lock().unwrap().push(1);
        drop(first_guard);
        waiter.join().unwrap();

        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }
}
