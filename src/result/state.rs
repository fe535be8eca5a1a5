// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The producer/consumer rendezvous shared by [`super::Result`].
//!
//! Shaped after the teacher's task header (an `AtomicU8` state word next to
//! a `Mutex`/`Condvar` pair for blocking waiters): a fast-path status tag
//! backed by a mutex-guarded slot that holds exactly one of {nothing yet,
//! a parked consumer, the terminal value/exception}. Rust's ownership model
//! gets the "destroy the frame exactly once" invariant for free — the state
//! is an `Arc`, dropped when both the producer closure and the consumer
//! handle are gone, so there's no separate "done" handle to manage.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::task::Waker;
use std::time::Duration;

use crate::error::RuntimeError;
use crate::executor::Executor;

/// Outcome of [`ResultState::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    /// Neither a value nor an exception has been produced yet.
    Idle,
    /// `get()` will return a value.
    Value,
    /// `get()` will return an error.
    Exception,
}

const IDLE: u8 = 0;
const CONSUMER_SET: u8 = 1;
const CONSUMER_WAITING: u8 = 2;
const PRODUCER_DONE: u8 = 3;

enum Slot<T> {
    Idle,
    /// An async consumer is parked, to be resumed on `resume_executor` (or
    /// inline, if `resume_executor` is `None`) once the producer completes.
    ConsumerWaker {
        waker: Waker,
        resume_executor: Option<Arc<dyn Executor>>,
        force_reschedule: bool,
    },
    /// A thread is blocked in `wait`/`wait_for`.
    ConsumerBlocking,
    /// Completion should fan out into a [`super::shared::SharedResultState`].
    ConsumerSink(Box<dyn FnOnce(Result<T, RuntimeError>) + Send>),
    /// The producer's outcome, not yet retrieved.
    Done(Result<T, RuntimeError>),
    /// The producer's outcome, already retrieved via `get()`.
    Consumed,
}

/// The shared rendezvous carrying exactly one of {pending, value, exception}
/// from a producer to a consumer.
pub struct ResultState<T> {
    tag: AtomicU8,
    slot: Mutex<Slot<T>>,
    blocking: Condvar,
}

impl<T> ResultState<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tag: AtomicU8::new(IDLE),
            slot: Mutex::new(Slot::Idle),
            blocking: Condvar::new(),
        })
    }

    /// Producer: complete with a value. Must be called at most once.
    pub fn set_result(&self, value: T) {
        self.complete(Ok(value));
    }

    /// Producer: complete with an error. Must be called at most once.
    pub fn set_exception(&self, error: RuntimeError) {
        self.complete(Err(error));
    }

    fn complete(&self, outcome: Result<T, RuntimeError>) {
        let mut slot = self.slot.lock().unwrap();
        let prev = std::mem::replace(&mut *slot, Slot::Done(outcome));
        self.tag.store(PRODUCER_DONE, Ordering::Release);
        match prev {
            Slot::Idle => {
                // No consumer yet; it'll see `Done` when it arrives.
            }
            Slot::ConsumerWaker {
                waker,
                resume_executor,
                ..
            } => {
                drop(slot);
                match resume_executor {
                    Some(exec) => {
                        use crate::executor::ExecutorExt;
                        exec.post(move || waker.wake());
                    }
                    None => waker.wake(),
                }
            }
            Slot::ConsumerBlocking => {
                drop(slot);
                self.blocking.notify_all();
            }
            Slot::ConsumerSink(sink) => {
                // Re-read what we just stored so the sink gets the outcome,
                // not a second, separately-moved copy.
                let outcome = match std::mem::replace(&mut *slot, Slot::Consumed) {
                    Slot::Done(outcome) => outcome,
                    _ => unreachable!("just stored Done above"),
                };
                drop(slot);
                sink(outcome);
            }
            Slot::Done(_) | Slot::Consumed => {
                drop(slot);
                panic!("concurra: result state completed more than once");
            }
        }
    }

    /// Current status without consuming anything.
    pub fn status(&self) -> ResultStatus {
        match self.tag.load(Ordering::Acquire) {
            PRODUCER_DONE => {
                let slot = self.slot.lock().unwrap();
                match &*slot {
                    Slot::Done(Ok(_)) | Slot::Consumed => ResultStatus::Value,
                    Slot::Done(Err(_)) => ResultStatus::Exception,
                    _ => ResultStatus::Idle,
                }
            }
            _ => ResultStatus::Idle,
        }
    }

    /// Block the calling thread until the producer completes.
    pub fn wait(&self) {
        let mut slot = self.slot.lock().unwrap();
        loop {
            match &*slot {
                Slot::Done(_) | Slot::Consumed => return,
                Slot::Idle => {
                    *slot = Slot::ConsumerBlocking;
                    self.tag.store(CONSUMER_WAITING, Ordering::Release);
                }
                Slot::ConsumerBlocking => {}
                Slot::ConsumerWaker { .. } | Slot::ConsumerSink(_) => {
                    panic!("concurra: result already has a registered consumer")
                }
            }
            slot = self.blocking.wait(slot).unwrap();
        }
    }

    /// Block up to `timeout`. Returns `true` if the producer completed
    /// before the deadline, `false` on timeout (the producer may still
    /// complete later).
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut slot = self.slot.lock().unwrap();
        let deadline = std::time::Instant::now() + timeout;
        loop {
            match &*slot {
                Slot::Done(_) | Slot::Consumed => return true,
                Slot::Idle => {
                    *slot = Slot::ConsumerBlocking;
                    self.tag.store(CONSUMER_WAITING, Ordering::Release);
                }
                Slot::ConsumerBlocking => {}
                Slot::ConsumerWaker { .. } | Slot::ConsumerSink(_) => {
                    panic!("concurra: result already has a registered consumer")
                }
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return matches!(*slot, Slot::Done(_) | Slot::Consumed);
            }
            let (guard, timeout_result) = self.blocking.wait_timeout(slot, deadline - now).unwrap();
            slot = guard;
            if timeout_result.timed_out() {
                return matches!(*slot, Slot::Done(_) | Slot::Consumed);
            }
        }
    }

    /// `await`: install `waker` as the consumer, resumed inline (no
    /// executor hop) when the producer completes. Returns `false` if the
    /// caller should suspend, `true` if the result is already ready.
    pub fn poll_await(&self, waker: &Waker) -> bool {
        self.poll_await_via(waker, None, false)
    }

    /// `await_via`: like `poll_await`, but resumes the consumer on
    /// `resume_executor`. If `force_reschedule` is set, the consumer is
    /// rescheduled through the executor even when the producer has already
    /// completed; otherwise an already-complete producer lets the caller
    /// proceed without suspending.
    pub fn poll_await_via(
        &self,
        waker: &Waker,
        resume_executor: Option<Arc<dyn Executor>>,
        force_reschedule: bool,
    ) -> bool {
        let mut slot = self.slot.lock().unwrap();
        match &*slot {
            Slot::Done(_) | Slot::Consumed => {
                if force_reschedule {
                    if let Some(exec) = resume_executor {
                        let waker = waker.clone();
                        drop(slot);
                        use crate::executor::ExecutorExt;
                        exec.post(move || waker.wake());
                        return false;
                    }
                }
                true
            }
            Slot::Idle => {
                *slot = Slot::ConsumerWaker {
                    waker: waker.clone(),
                    resume_executor,
                    force_reschedule,
                };
                self.tag.store(CONSUMER_SET, Ordering::Release);
                false
            }
            Slot::ConsumerWaker { .. } => {
                // Still pending: a `Future` must tolerate being polled more
                // than once while `Pending` (e.g. a sibling in `when_all`
                // waking the combinator, which re-polls every child). Just
                // refresh the stored waker rather than treating this as a
                // second, conflicting consumer.
                *slot = Slot::ConsumerWaker {
                    waker: waker.clone(),
                    resume_executor,
                    force_reschedule,
                };
                false
            }
            Slot::ConsumerBlocking | Slot::ConsumerSink(_) => {
                panic!("concurra: result already has a registered consumer")
            }
        }
    }

    /// Route completion into a fan-out sink (used by `SharedResult`)
    /// instead of a single waker.
    pub fn share<F>(&self, sink: F)
    where
        F: FnOnce(Result<T, RuntimeError>) + Send + 'static,
    {
        let mut slot = self.slot.lock().unwrap();
        match std::mem::replace(&mut *slot, Slot::Idle) {
            Slot::Done(outcome) => {
                *slot = Slot::Consumed;
                drop(slot);
                sink(outcome);
            }
            Slot::Idle => {
                *slot = Slot::ConsumerSink(Box::new(sink));
                self.tag.store(CONSUMER_SET, Ordering::Release);
            }
            other @ (Slot::ConsumerBlocking | Slot::ConsumerWaker { .. } | Slot::ConsumerSink(_)) => {
                *slot = other;
                drop(slot);
                panic!("concurra: result already has a registered consumer")
            }
            Slot::Consumed => {
                drop(slot);
                panic!("concurra: result already retrieved")
            }
        }
    }

    /// May only be called once, after `status()` is not `Idle`. Moves the
    /// value out or returns the captured error; a second call returns
    /// `AlreadyRetrieved`.
    pub fn get(&self) -> Result<T, RuntimeError> {
        let mut slot = self.slot.lock().unwrap();
        match std::mem::replace(&mut *slot, Slot::Consumed) {
            Slot::Done(outcome) => outcome,
            Slot::Consumed => Err(RuntimeError::AlreadyRetrieved),
            other => {
                *slot = other;
                Err(RuntimeError::EmptyHandle)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_result_then_get() {
        let state = ResultState::<i32>::new();
        state.set_result(42);
        assert_eq!(state.status(), ResultStatus::Value);
        assert_eq!(state.get().unwrap(), 42);
    }

    #[test]
    fn get_twice_is_already_retrieved() {
        let state = ResultState::<i32>::new();
        state.set_result(1);
        assert!(state.get().is_ok());
        assert!(matches!(state.get(), Err(RuntimeError::AlreadyRetrieved)));
    }

    #[test]
    fn status_never_reverses() {
        let state = ResultState::<i32>::new();
        assert_eq!(state.status(), ResultStatus::Idle);
        state.set_exception(RuntimeError::BrokenTask);
        assert_eq!(state.status(), ResultStatus::Exception);
    }

    #[test]
    fn wait_blocks_until_producer_completes() {
        let state = ResultState::<i32>::new();
        let producer = state.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.set_result(7);
        });
        state.wait();
        assert_eq!(state.get().unwrap(), 7);
        handle.join().unwrap();
    }

    #[test]
    fn wait_for_times_out_before_completion() {
        let state = ResultState::<i32>::new();
        assert!(!state.wait_for(Duration::from_millis(10)));
        state.set_result(1);
        assert!(state.wait_for(Duration::from_millis(10)));
    }
}
