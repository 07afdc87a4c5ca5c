//! Error types for the debounce engine

use thiserror::Error;

/// Result type for debounce operations
pub type Result<T> = std::result::Result<T, DebounceError>;

/// Errors surfaced by [`Debouncer`](crate::Debouncer)
///
/// Supersession is not an error; it is reported as
/// [`WaitOutcome::Superseded`](crate::WaitOutcome::Superseded).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebounceError {
    /// `cancel_all` has started; the event was not accepted
    #[error("debouncer is shutting down, event rejected")]
    ShuttingDown,

    /// The timer for the burst could not be scheduled
    #[error("failed to schedule debounce timer: {0}")]
    Schedule(String),

    /// The processing callback returned an error
    #[error("processing callback failed: {0}")]
    Processing(String),

    /// The processing callback panicked
    #[error("processing callback panicked: {0}")]
    Panicked(String),

    /// The engine was dropped before the waiter resolved
    #[error("debouncer dropped before the burst resolved")]
    WaiterDropped,
}
