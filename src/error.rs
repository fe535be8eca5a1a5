// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Failure taxonomy surfaced to callers.

/// Errors raised by `concurra`'s public API.
///
/// Failures raised *inside* a callable posted via [`crate::executor::Executor::post`]
/// are swallowed; failures from a callable posted via `submit` are captured
/// in its result state and returned to the consumer on `get`/await instead
/// of being raised here directly.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    /// Operating on a moved-from / default `Result`, `LazyResult`,
    /// `SharedResult`, or `Timer`.
    #[error("operation attempted on an empty handle")]
    EmptyHandle,

    /// A result's value was already moved out by a previous `get()`.
    #[error("result value has already been retrieved")]
    AlreadyRetrieved,

    /// `enqueue`/`make_timer`/`make_delay_object` called after `shutdown()`
    /// on the owning component.
    #[error("{component} has been shut down")]
    RuntimeShutdown {
        /// Name of the component that refused the request.
        component: &'static str,
    },

    /// A consumer awaited a producer that was destroyed, cancelled, or whose
    /// executor refused to run it.
    #[error("task was abandoned before it completed")]
    BrokenTask,

    /// A required argument (e.g. a resume executor) was null/absent.
    #[error("argument `{argument}` must not be null")]
    NullArgument {
        /// Name of the offending argument.
        argument: &'static str,
    },

    /// An executor failed to enqueue a continuation.
    #[error("executor `{executor}` failed to enqueue a continuation")]
    ExecutorException {
        /// Name of the executor that failed to enqueue.
        executor: &'static str,
        /// The failure that caused the enqueue to be refused.
        #[source]
        source: Box<RuntimeError>,
    },

    /// The callable captured in a [`crate::task::Task`] panicked during
    /// `submit`. Carries the panic payload, stringified.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl RuntimeError {
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let msg = panic_message(&payload);
        RuntimeError::Panicked(msg)
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Display-only wrapper so `RuntimeError` can be boxed as a trait object
/// where call sites only have a message, not a typed error (e.g. a captured
/// `Box<dyn Any>` already turned into text).
impl From<String> for RuntimeError {
    fn from(msg: String) -> Self {
        RuntimeError::Panicked(msg)
    }
}

impl RuntimeError {
    /// Short tag used in `tracing` events.
    pub(crate) fn kind_label(&self) -> &'static str {
        match self {
            RuntimeError::EmptyHandle => "empty-handle",
            RuntimeError::AlreadyRetrieved => "already-retrieved",
            RuntimeError::RuntimeShutdown { .. } => "runtime-shutdown",
            RuntimeError::BrokenTask => "broken-task",
            RuntimeError::NullArgument { .. } => "null-argument",
            RuntimeError::ExecutorException { .. } => "executor-exception",
            RuntimeError::Panicked(_) => "panicked",
        }
    }
}
