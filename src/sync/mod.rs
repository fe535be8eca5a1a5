// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Asynchronous synchronization primitives: a mutex and a condition
//! variable that suspend the *logical* task instead of blocking an OS
//! thread while they wait.

mod async_condvar;
mod async_lock;

pub use async_condvar::AsyncCondvar;
pub use async_lock::{AsyncMutex, ScopedLock};
