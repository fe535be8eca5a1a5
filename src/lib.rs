// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! A composable concurrency runtime.
//!
//! `concurra` provides task execution, asynchronous result propagation,
//! timed scheduling, and asynchronous synchronization primitives on top of
//! real OS threads. It is built around four pieces:
//!
//! - an [`executor`] hierarchy (inline, thread-pool, thread-per-task,
//!   single worker thread, manually driven), all sharing one submission
//!   contract ([`executor::Executor`]);
//! - a [`result`] state machine that carries a value or error across
//!   suspension boundaries (one-shot [`result::Result`], cold
//!   [`result::LazyResult`], fan-out [`result::SharedResult`], and
//!   [`result::when_any`]/[`result::when_all`] composition);
//! - a work-stealing [`executor::thread_pool`] used as the default CPU pool;
//! - a single-worker [`timer`] queue for periodic and one-shot timers.
//!
//! [`runtime::Runtime`] ties these together: it owns one inline executor,
//! two thread pools (CPU and background), one thread-per-task executor, and
//! one timer queue, and shuts all of them down together when dropped.

pub mod error;
pub mod executor;
pub mod result;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod timer;

pub use error::RuntimeError;
pub use runtime::{Runtime, RuntimeOptions};

/// The crate's `(major, minor, revision)` version triple.
pub fn version() -> (u32, u32, u32) {
    (0, 1, 0)
}
