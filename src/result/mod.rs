// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The result state machine: one-shot, lazy/cold, shared/fan-out, and the
//! `when_any`/`when_all` combinators built on top of them.

mod future;
mod lazy;
mod shared;
mod state;
mod when;

pub use future::{ResolveFuture, Result};
pub use lazy::{LazyResult, LazyResultState};
pub use shared::{SharedResult, SharedResultState};
pub use state::{ResultState, ResultStatus};
pub use when::{when_all, when_any};
