// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! An async condition variable: `wait` atomically releases a
//! [`ScopedLock`] and suspends, resuming (and re-acquiring the lock) once
//! notified.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use crate::executor::Executor;

use super::async_lock::{AsyncMutex, LockFuture, ScopedLock};

struct CondWaiter {
    signaled: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

/// Park awaiting tasks in FIFO order and wake them (optionally on a chosen
/// executor) when notified. Unlike `std::sync::Condvar`, waiting here
/// suspends a logical task rather than blocking an OS thread.
pub struct AsyncCondvar {
    waiters: Mutex<VecDeque<Arc<CondWaiter>>>,
}

impl AsyncCondvar {
    pub fn new() -> Self {
        AsyncCondvar {
            waiters: Mutex::new(VecDeque::new()),
        }
    }

    /// Atomically release `guard` and suspend. Resolves once notified, with
    /// the lock re-acquired (possibly after other tasks had their turn at
    /// it in between).
    ///
    /// # Panics
    ///
    /// Panics if `guard` does not currently own its lock.
    pub fn wait<T>(&self, resume_executor: Option<Arc<dyn Executor>>, mut guard: ScopedLock<T>) -> CondvarWait<T> {
        assert!(guard.owns_lock(), "concurra: condvar wait requires a held lock");
        let mutex = guard.mutex().expect("a held lock always has a mutex");
        let waiter = Arc::new(CondWaiter {
            signaled: AtomicBool::new(false),
            waker: Mutex::new(None),
        });
        // Register before unlocking: any `notify` that subsequently manages
        // to acquire `guard`'s mutex necessarily runs after this push, so a
        // wakeup can never be missed between releasing the lock and parking.
        self.waiters.lock().unwrap().push_back(waiter.clone());
        guard.unlock();
        CondvarWait {
            state: Some(WaitState::Waiting(waiter, mutex, resume_executor)),
        }
    }

    /// `wait` in a loop until `predicate` holds, re-checking it each time
    /// this task is woken (guards against spurious and stale wakeups).
    pub async fn wait_while<T, F>(
        &self,
        resume_executor: Option<Arc<dyn Executor>>,
        mut guard: ScopedLock<T>,
        mut predicate: F,
    ) -> ScopedLock<T>
    where
        F: FnMut(&T) -> bool,
    {
        while predicate(&guard) {
            guard = self.wait(resume_executor.clone(), guard).await;
        }
        guard
    }

    /// Wake one waiting task, if any.
    pub fn notify_one(&self) {
        if let Some(waiter) = self.waiters.lock().unwrap().pop_front() {
            signal(&waiter);
        }
    }

    /// Wake every waiting task.
    pub fn notify_all(&self) {
        let waiters = std::mem::take(&mut *self.waiters.lock().unwrap());
        for waiter in waiters {
            signal(&waiter);
        }
    }
}

impl Default for AsyncCondvar {
    fn default() -> Self {
        Self::new()
    }
}

fn signal(waiter: &CondWaiter) {
    waiter.signaled.store(true, Ordering::Release);
    if let Some(waker) = waiter.waker.lock().unwrap().take() {
        waker.wake();
    }
}

enum WaitState<T> {
    Waiting(Arc<CondWaiter>, AsyncMutex<T>, Option<Arc<dyn Executor>>),
    Relocking(LockFuture<T>),
}

/// The future returned by [`AsyncCondvar::wait`].
pub struct CondvarWait<T> {
    state: Option<WaitState<T>>,
}

impl<T> Future for CondvarWait<T> {
    type Output = ScopedLock<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            match this.state.take().expect("polled after completion") {
                WaitState::Waiting(waiter, mutex, resume_executor) => {
                    if waiter.signaled.load(Ordering::Acquire) {
                        this.state = Some(WaitState::Relocking(mutex.lock(resume_executor)));
                        continue;
                    }
                    *waiter.waker.lock().unwrap() = Some(cx.waker().clone());
                    this.state = Some(WaitState::Waiting(waiter, mutex, resume_executor));
                    return Poll::Pending;
                }
                WaitState::Relocking(mut fut) => match Pin::new(&mut fut).poll(cx) {
                    Poll::Ready(guard) => return Poll::Ready(guard),
                    Poll::Pending => {
                        this.state = Some(WaitState::Relocking(fut));
                        return Poll::Pending;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::LazyResult;
    use std::time::Duration;

    #[test]
    fn notify_one_wakes_a_single_waiter() {
        let mutex = AsyncMutex::new(0);
        let condvar = Arc::new(AsyncCondvar::new());

        let guard = mutex.try_lock().unwrap();
        let mutex2 = mutex.clone();
        let condvar2 = condvar.clone();
        let waiter = std::thread::spawn(move || {
            LazyResult::new(async move {
                let guard = mutex2.lock(None).await;
                let _guard = condvar2.wait(None, guard).await;
                Ok::<(), crate::error::RuntimeError>(())
            })
            .get()
            .unwrap();
        });

        std::thread::sleep(Duration::from_millis(20));
        drop(guard);
        std::thread::sleep(Duration::from_millis(20));
        condvar.notify_one();
        waiter.join().unwrap();
    }

    #[test]
    fn wait_while_rechecks_predicate_after_each_wake() {
        let mutex = AsyncMutex::new(0);
        let condvar = Arc::new(AsyncCondvar::new());

        let mutex2 = mutex.clone();
        let condvar2 = condvar.clone();
        let waiter = std::thread::spawn(move || {
            LazyResult::new(async move {
                let guard = mutex2.lock(None).await;
                let guard = condvar2.wait_while(None, guard, |v: &i32| *v < 3).await;
                Ok::<i32, crate::error::RuntimeError>(*guard)
            })
            .get()
            .unwrap()
        });

        for expected in 1..=3 {
            std::thread::sleep(Duration::from_millis(15));
            let mut guard = LazyResult::new({
                let mutex = mutex.clone();
                async move { Ok::<_, crate::error::RuntimeError>(mutex.lock(None).await) }
            })
            .get()
            .unwrap();
            *guard = expected;
            drop(guard);
            condvar.notify_all();
        }

        assert_eq!(waiter.join().unwrap(), 3);
    }
}
