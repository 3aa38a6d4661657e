//! Error types for the invocation engine.

use thiserror::Error;

/// Errors an `Invocation` can raise synchronously (as opposed to
/// delivering them through the future — see spec.md §7's "propagation"
/// note: synchronous failures during `invoke()` bubble to the caller,
/// everything else is surfaced through the future).
#[derive(Error, Debug)]
pub enum InvocationError {
    /// `invoke()` or `invoke_async()` called a second time on the same
    /// operation.
    #[error("operation already invoked (call id already assigned)")]
    AlreadyInvoked,

    /// `invoke()` called from a thread not permitted to block for this
    /// operation kind.
    #[error("invoking thread discipline violated")]
    ThreadDiscipline,

    /// The node engine is not active.
    #[error("engine is not active")]
    EngineNotActive,

    /// A duplicate `sendResponse` after the first.
    #[error("response already sent for this invocation")]
    ResponseAlreadySent,
}

pub type Result<T> = std::result::Result<T, InvocationError>;
