// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! [`Timer`]: a handle onto a single registration inside a [`super::TimerQueue`].

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use super::queue::{Shared, TimerInner};
use crate::executor::Executor;

/// A handle to a timer registered with a [`super::TimerQueue`]. Dropping
/// this handle does not cancel the timer — call [`Timer::cancel`]
/// explicitly, the same way the queue itself would on shutdown.
pub struct Timer {
    inner: Arc<TimerInner>,
    queue: Arc<Shared>,
}

impl Timer {
    pub(super) fn new(inner: Arc<TimerInner>, queue: Arc<Shared>) -> Self {
        Timer { inner, queue }
    }

    /// Stop this timer from firing again. Idempotent; a timer already
    /// mid-fire on its executor still runs that one last time.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Change how often a periodic timer fires. Passing `None` turns a
    /// periodic timer into one that fires once more and then stops.
    pub fn set_frequency(&self, frequency: Option<Duration>) {
        *self.inner.frequency.lock().unwrap() = frequency;
        self.queue.wake_from_outside();
    }

    pub fn frequency(&self) -> Option<Duration> {
        *self.inner.frequency.lock().unwrap()
    }

    /// The delay this timer was originally scheduled with (its first due
    /// time, not the due time of its next firing).
    pub fn due_time(&self) -> Duration {
        self.inner.due_time
    }

    pub fn executor(&self) -> Arc<dyn Executor> {
        self.inner.executor.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::inline::InlineExecutor;
    use crate::timer::TimerQueue;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn one_shot_timer_fires_once() {
        let queue = TimerQueue::new(Duration::from_millis(200));
        let exec = Arc::new(InlineExecutor::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let flag = fired.clone();
        let _timer = queue
            .make_timer(Duration::from_millis(5), None, exec, move || {
                flag.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        queue.shutdown();
    }

    #[test]
    fn cancel_stops_further_firings() {
        let queue = TimerQueue::new(Duration::from_millis(200));
        let exec = Arc::new(InlineExecutor::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let flag = fired.clone();
        let timer = queue
            .make_timer(
                Duration::from_millis(5),
                Some(Duration::from_millis(5)),
                exec,
                move || {
                    flag.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        timer.cancel();
        let seen_before_cancel = fired.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(fired.load(Ordering::SeqCst), seen_before_cancel);
        queue.shutdown();
    }
}
