//! Result routing for blocking submitters
//!
//! Every blocking caller is bound to the generation its own event produced.
//! When a burst is extended, waiters of older generations resolve right away
//! with [`WaitOutcome::Superseded`]; only the generation that survives until
//! the timer fires receives the processing result.

use crate::error::{DebounceError, Result};
use tokio::sync::oneshot;

/// How a blocking submit resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<R> {
    /// This caller's event was the last of the burst; carries the result
    Fired(R),
    /// A later event for the same key took over the burst
    Superseded,
    /// The burst was discarded before it fired (shutdown or scheduling failure)
    Cancelled,
}

impl<R> WaitOutcome<R> {
    /// The processing result, if this caller owned the firing generation
    pub fn into_fired(self) -> Option<R> {
        match self {
            WaitOutcome::Fired(result) => Some(result),
            WaitOutcome::Superseded | WaitOutcome::Cancelled => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, WaitOutcome::Superseded)
    }
}

pub(crate) type Resolution<R> = Result<WaitOutcome<R>>;

/// Receiving side of a waiter, held by the blocked caller
#[derive(Debug)]
pub struct WaitTicket<R> {
    generation: u64,
    rx: oneshot::Receiver<Resolution<R>>,
}

impl<R> WaitTicket<R> {
    /// Generation this ticket is bound to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait until the bound generation resolves
    pub async fn wait(self) -> Resolution<R> {
        self.rx.await.unwrap_or(Err(DebounceError::WaiterDropped))
    }
}

/// Waiters registered against one pending burst
#[derive(Debug)]
pub(crate) struct Waiters<R> {
    bound: Vec<(u64, oneshot::Sender<Resolution<R>>)>,
}

impl<R> Waiters<R> {
    pub(crate) fn new() -> Self {
        Self { bound: Vec::new() }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.bound.len()
    }

    /// Register a waiter for `generation`
    pub(crate) fn bind(&mut self, generation: u64) -> WaitTicket<R> {
        let (tx, rx) = oneshot::channel();
        self.bound.push((generation, tx));
        WaitTicket { generation, rx }
    }

    /// Resolve every waiter older than `generation` as superseded
    ///
    /// Returns how many waiters were resolved.
    pub(crate) fn supersede_before(&mut self, generation: u64) -> usize {
        let (stale, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.bound)
            .into_iter()
            .partition(|(bound_to, _)| *bound_to < generation);
        self.bound = live;

        let superseded = stale.len();
        for (_, tx) in stale {
            let _ = tx.send(Ok(WaitOutcome::Superseded));
        }
        superseded
    }

    /// Resolve every waiter as cancelled
    pub(crate) fn cancel_all(&mut self) {
        for (_, tx) in self.bound.drain(..) {
            let _ = tx.send(Ok(WaitOutcome::Cancelled));
        }
    }

    /// Split off the waiter that owns the firing generation
    ///
    /// Anything bound to an older generation is resolved as superseded.
    pub(crate) fn into_firing(mut self, generation: u64) -> FiringWaiter<R> {
        self.supersede_before(generation);
        FiringWaiter {
            senders: self.bound.drain(..).map(|(_, tx)| tx).collect(),
        }
    }
}

/// Waiter(s) bound to the generation that fired
#[derive(Debug)]
pub(crate) struct FiringWaiter<R> {
    senders: Vec<oneshot::Sender<Resolution<R>>>,
}

impl<R> FiringWaiter<R> {
    /// Deliver the outcome of the processing callback
    ///
    /// A generation is produced by exactly one event, so at most one waiter
    /// is bound to it.
    pub(crate) fn resolve(self, resolution: Resolution<R>) {
        if let Some(tx) = self.senders.into_iter().next() {
            let _ = tx.send(resolution);
        }
    }
}
