//! Debounce engine
//!
//! Turns a burst of rapid events for the same key into a single processing
//! call. Each event either starts a burst or extends the pending one: the
//! event is appended, the context replaced, the generation bumped and the
//! timer restarted. When a timer expires the burst is removed from the store
//! and its callback runs on the timer task with the coalesced payload.
//!
//! ```no_run
//! # async fn demo() -> debounce::Result<()> {
//! use debounce::{Burst, Debouncer};
//! use std::time::Duration;
//!
//! let debouncer: Debouncer<(), String> = Debouncer::new();
//! debouncer.submit("+1555", "hello", (), Duration::from_secs(2), |burst: Burst<()>| async move {
//!     Ok::<_, anyhow::Error>(burst.combined)
//! })?;
//! # Ok(())
//! # }
//! ```

use crate::broker::{WaitOutcome, WaitTicket};
use crate::coalesce::{Combiner, JoinWith};
use crate::config::DebounceConfig;
use crate::error::{DebounceError, Result};
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::store::{Admission, OnFire, PendingEntry, PendingStore, TimerId};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// A coalesced burst handed to the processing callback
#[derive(Debug, Clone)]
pub struct Burst<C> {
    /// Key the events were submitted under
    pub key: String,
    /// Events merged by the configured combiner
    pub combined: String,
    /// Raw events in arrival order
    pub events: Vec<String>,
    /// Context of the most recent event
    pub context: C,
    /// Generation that fired (number of extensions)
    pub generation: u64,
    /// When the first event of the burst was accepted
    pub created_at: Instant,
}

/// Keyed debouncer
///
/// Cheap to clone; clones share the same pending state. Dropping the last
/// clone cancels every pending burst, like [`Debouncer::cancel_all`].
pub struct Debouncer<C, R> {
    inner: Arc<Inner<C, R>>,
}

struct Inner<C, R> {
    store: PendingStore<C, R>,
    scheduler: Arc<dyn Scheduler>,
    combiner: Arc<dyn Combiner>,
    /// Intake gate: `true` while new events are accepted.
    /// Submits hold the read side for their whole critical section so that
    /// `cancel_all` (write side) observes either all or none of a submit.
    accepting: RwLock<bool>,
    /// Bursts taken from the store whose callback has not returned yet
    in_flight: AtomicUsize,
}

/// Builder for [`Debouncer`]
pub struct DebouncerBuilder {
    scheduler: Arc<dyn Scheduler>,
    combiner: Arc<dyn Combiner>,
}

impl DebouncerBuilder {
    /// Tokio scheduler on the ambient runtime, space-joined payloads
    pub fn new() -> Self {
        Self {
            scheduler: Arc::new(TokioScheduler::new()),
            combiner: Arc::new(JoinWith::default()),
        }
    }

    /// Start from a loaded configuration
    pub fn from_config(config: &DebounceConfig) -> Self {
        Self::new().combiner(config.combiner())
    }

    pub fn scheduler(mut self, scheduler: impl Scheduler) -> Self {
        self.scheduler = Arc::new(scheduler);
        self
    }

    pub fn combiner(mut self, combiner: impl Combiner) -> Self {
        self.combiner = Arc::new(combiner);
        self
    }

    pub fn build<C, R>(self) -> Debouncer<C, R> {
        Debouncer {
            inner: Arc::new(Inner {
                store: PendingStore::new(),
                scheduler: self.scheduler,
                combiner: self.combiner,
                accepting: RwLock::new(true),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }
}

impl Default for DebouncerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, R> Debouncer<C, R>
where
    C: Send + Sync + 'static,
    R: Send + 'static,
{
    /// Create a debouncer with default settings
    pub fn new() -> Self {
        DebouncerBuilder::new().build()
    }

    /// Add an event to the burst for `key` without waiting for the outcome
    ///
    /// The burst fires `delay` after the most recent event. The callback and
    /// context of the latest event replace those of earlier ones.
    ///
    /// Returns an error if the engine is shutting down or the timer could not
    /// be scheduled; in the latter case the whole burst for `key` is dropped.
    pub fn submit<F, Fut>(
        &self,
        key: impl Into<String>,
        event: impl Into<String>,
        context: C,
        delay: Duration,
        on_fire: F,
    ) -> Result<()>
    where
        F: FnOnce(Burst<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        self.admit(key.into(), event.into(), context, delay, boxed(on_fire), false)
            .map(|_| ())
    }

    /// Add an event and get a ticket bound to the generation it produced
    ///
    /// The event is accepted before this returns; the ticket resolves later.
    pub fn submit_waiting<F, Fut>(
        &self,
        key: impl Into<String>,
        event: impl Into<String>,
        context: C,
        delay: Duration,
        on_fire: F,
    ) -> Result<WaitTicket<R>>
    where
        F: FnOnce(Burst<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let admission = self.admit(key.into(), event.into(), context, delay, boxed(on_fire), true)?;
        admission.ticket.ok_or(DebounceError::WaiterDropped)
    }

    /// Add an event and wait until its generation resolves
    ///
    /// Resolves with [`WaitOutcome::Fired`] if this event was the last of the
    /// burst, [`WaitOutcome::Superseded`] as soon as a later event extends the
    /// burst, or [`WaitOutcome::Cancelled`] if the burst is discarded. A
    /// failing callback resolves with the error instead.
    pub async fn submit_and_wait<F, Fut>(
        &self,
        key: impl Into<String>,
        event: impl Into<String>,
        context: C,
        delay: Duration,
        on_fire: F,
    ) -> Result<WaitOutcome<R>>
    where
        F: FnOnce(Burst<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let ticket = self.submit_waiting(key, event, context, delay, on_fire)?;
        ticket.wait().await
    }

    fn admit(
        &self,
        key: String,
        event: String,
        context: C,
        delay: Duration,
        on_fire: OnFire<C, R>,
        wait: bool,
    ) -> Result<Admission<R>> {
        let accepting = self.inner.accepting.read();
        if !*accepting {
            debug!("Rejecting event for {}: debouncer is shutting down", key);
            return Err(DebounceError::ShuttingDown);
        }

        let weak = Arc::downgrade(&self.inner);
        let scheduler = Arc::clone(&self.inner.scheduler);
        let timer_key = key.clone();

        let result = self
            .inner
            .store
            .admit(&key, event, context, on_fire, wait, move |id| {
                scheduler.schedule(delay, Box::pin(Inner::fire(weak, timer_key, id)))
            });
        drop(accepting);

        match result {
            Ok(admission) => {
                if admission.started() {
                    debug!("Starting debounce timer for {} (delay: {:?})", key, delay);
                } else {
                    debug!(
                        "Adding to debounce buffer for {} ({} events, generation {})",
                        key, admission.buffered, admission.generation
                    );
                }
                if admission.superseded > 0 {
                    debug!("Superseded {} waiter(s) for {}", admission.superseded, key);
                }
                Ok(admission)
            }
            Err(err) => {
                warn!("Dropping debounce burst for {}: {}", key, err);
                Err(err)
            }
        }
    }

    /// Whether a burst is currently pending for `key`
    pub fn is_pending(&self, key: &str) -> bool {
        self.inner.store.contains(key)
    }

    /// Number of keys with a pending burst
    pub fn pending_count(&self) -> usize {
        self.inner.store.len()
    }

    /// Snapshot of the keys with a pending burst
    pub fn pending_keys(&self) -> Vec<String> {
        self.inner.store.keys()
    }

    /// Number of fired bursts whose callback is still running
    ///
    /// A key is no longer pending while its callback runs; this counts those.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Whether new events are still accepted
    pub fn is_accepting(&self) -> bool {
        *self.inner.accepting.read()
    }

    /// Stop accepting events and discard every pending burst
    ///
    /// No callback runs for a discarded burst and its waiters resolve with
    /// [`WaitOutcome::Cancelled`]. Every later submit fails with
    /// [`DebounceError::ShuttingDown`]. Returns the number of bursts
    /// discarded.
    pub fn cancel_all(&self) -> usize {
        *self.inner.accepting.write() = false;

        let drained = self.inner.store.drain();
        let cancelled = drained.len();
        drained.into_iter().for_each(PendingEntry::discard);

        info!("Debouncer shut down, cancelled {} pending burst(s)", cancelled);
        cancelled
    }
}

impl<C, R> Inner<C, R>
where
    C: Send + Sync + 'static,
    R: Send + 'static,
{
    /// Timer expiry for one burst
    async fn fire(inner: Weak<Self>, key: String, id: TimerId) {
        let Some(inner) = inner.upgrade() else {
            return;
        };

        // Atomic with respect to submits for the same key: either the entry
        // is still ours and leaves the store here, or a later event replaced
        // the timer and this one must not fire.
        let Some(entry) = inner.store.take_if_current(&key, id) else {
            debug!("Ignoring stale timer for {} (generation {})", key, id.generation);
            return;
        };

        let _running = InFlight::enter(&inner.in_flight);
        let PendingEntry {
            buffer,
            context,
            generation,
            created_at,
            on_fire,
            waiters,
            ..
        } = entry;

        let waiter = waiters.into_firing(generation);
        let combiner = Arc::clone(&inner.combiner);
        let burst_key = key.clone();

        // The combiner is user code as well and runs under the unwind guard.
        let outcome = AssertUnwindSafe(async move {
            let burst = Burst {
                combined: buffer.combine(combiner.as_ref()),
                events: buffer.into_events(),
                key: burst_key,
                context,
                generation,
                created_at,
            };
            info!(
                "Processing debounced burst for {} ({} events, {:?} since first)",
                burst.key,
                burst.events.len(),
                created_at.elapsed()
            );
            on_fire(burst).await
        })
        .catch_unwind()
        .await;

        let resolution = match outcome {
            Ok(Ok(result)) => Ok(WaitOutcome::Fired(result)),
            Ok(Err(err)) => {
                error!("Processing failed for {}: {:#}", key, err);
                Err(DebounceError::Processing(format!("{:#}", err)))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Processing callback for {} panicked: {}", key, message);
                Err(DebounceError::Panicked(message))
            }
        };

        waiter.resolve(resolution);
    }
}

impl<C, R> Drop for Inner<C, R> {
    fn drop(&mut self) {
        self.store
            .drain()
            .into_iter()
            .for_each(PendingEntry::discard);
    }
}

impl<C, R> Clone for Debouncer<C, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, R> Default for Debouncer<C, R>
where
    C: Send + Sync + 'static,
    R: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C, R> fmt::Debug for Debouncer<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("pending", &self.inner.store.len())
            .field("accepting", &*self.inner.accepting.read())
            .finish()
    }
}

/// Counts one running callback for as long as it is alive
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn boxed<C, R, F, Fut>(on_fire: F) -> OnFire<C, R>
where
    F: FnOnce(Burst<C>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    Box::new(move |burst| -> BoxFuture<'static, anyhow::Result<R>> { Box::pin(on_fire(burst)) })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
