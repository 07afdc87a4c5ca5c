//! Timer scheduling for debounce bursts
//!
//! A [`Scheduler`] runs a task once after a delay and returns a
//! [`TimerHandle`] that can cancel it. Cancelling only stops a timer that has
//! not started its work yet; whether a woken timer still owns its burst is
//! decided by the engine under the store lock.

use crate::error::{DebounceError, Result};
use futures::future::BoxFuture;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

/// Work executed when a timer expires
pub type TimerTask = BoxFuture<'static, ()>;

/// Schedules delayed tasks
pub trait Scheduler: Send + Sync + 'static {
    /// Run `task` after `delay`
    ///
    /// Returns an error if the timer cannot be created. The caller is then
    /// responsible for dropping whatever state the timer was meant to drive.
    fn schedule(&self, delay: Duration, task: TimerTask) -> Result<TimerHandle>;
}

/// Cancellable handle to a scheduled timer
#[derive(Debug)]
pub struct TimerHandle {
    abort: AbortHandle,
}

impl TimerHandle {
    /// Wrap a tokio abort handle
    pub fn from_abort_handle(abort: AbortHandle) -> Self {
        Self { abort }
    }

    /// Cancel the timer
    ///
    /// No-op if the timer already ran.
    pub fn cancel(&self) {
        self.abort.abort();
    }
}

/// Scheduler backed by the tokio runtime
///
/// Without an explicit handle the runtime is resolved on every call, so a
/// submit from outside any runtime fails with [`DebounceError::Schedule`]
/// instead of panicking.
#[derive(Debug, Clone, Default)]
pub struct TokioScheduler {
    handle: Option<Handle>,
}

impl TokioScheduler {
    /// Use the runtime the caller is running on
    pub fn new() -> Self {
        Self::default()
    }

    /// Always spawn timers on the given runtime
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    fn runtime(&self) -> Result<Handle> {
        match &self.handle {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current().map_err(|e| DebounceError::Schedule(e.to_string())),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Result<TimerHandle> {
        let runtime = self.runtime()?;

        let join = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });

        Ok(TimerHandle::from_abort_handle(join.abort_handle()))
    }
}
