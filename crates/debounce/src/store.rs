//! Pending entry store
//!
//! Holds at most one [`PendingEntry`] per key. Every mutation of an entry
//! (start, extend, fire, discard) happens while holding the key's shard lock,
//! which gives per-key linearizability without a global lock. Critical
//! sections only touch in-memory state; callbacks run after the entry has
//! left the store.

use crate::broker::{WaitTicket, Waiters};
use crate::coalesce::EventBuffer;
use crate::engine::Burst;
use crate::error::Result;
use crate::scheduler::TimerHandle;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

/// Boxed processing callback stored with a pending entry
pub(crate) type OnFire<C, R> =
    Box<dyn FnOnce(Burst<C>) -> BoxFuture<'static, anyhow::Result<R>> + Send + Sync>;

/// Identity of one scheduled timer
///
/// `burst_id` is unique per entry for the lifetime of the engine, so a stale
/// timer from a discarded entry never matches a newer entry for the same key
/// even though generations restart at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimerId {
    pub burst_id: u64,
    pub generation: u64,
}

/// State of one in-flight burst
pub(crate) struct PendingEntry<C, R> {
    pub buffer: EventBuffer,
    pub context: C,
    pub generation: u64,
    pub burst_id: u64,
    pub timer: TimerHandle,
    pub created_at: Instant,
    pub on_fire: OnFire<C, R>,
    pub waiters: Waiters<R>,
}

impl<C, R> PendingEntry<C, R> {
    fn timer_id(&self) -> TimerId {
        TimerId {
            burst_id: self.burst_id,
            generation: self.generation,
        }
    }

    /// Drop the burst without running its callback
    pub(crate) fn discard(mut self) {
        self.timer.cancel();
        self.waiters.cancel_all();
    }
}

/// Everything a caller needs to know about its accepted event
#[derive(Debug)]
pub(crate) struct Admission<R> {
    /// Generation produced by this event
    pub generation: u64,
    /// Number of events now buffered for the key
    pub buffered: usize,
    /// Waiters resolved as superseded by this event
    pub superseded: usize,
    /// Waiter bound to `generation`, for blocking submits
    pub ticket: Option<WaitTicket<R>>,
}

impl<R> Admission<R> {
    pub fn started(&self) -> bool {
        self.generation == 0
    }
}

/// Concurrent map of key -> pending entry
pub(crate) struct PendingStore<C, R> {
    entries: DashMap<String, PendingEntry<C, R>>,
    next_burst_id: AtomicU64,
}

impl<C, R> PendingStore<C, R> {
    pub(crate) fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_burst_id: AtomicU64::new(0),
        }
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Start or extend the burst for `key`
    ///
    /// `schedule` is called exactly once, under the key's lock, with the
    /// identity the new timer must carry. When extending, the previous timer
    /// is cancelled before `schedule` runs. If scheduling fails the entry is
    /// discarded (its waiters resolve as cancelled) and the error returned.
    pub(crate) fn admit<S>(
        &self,
        key: &str,
        event: String,
        context: C,
        on_fire: OnFire<C, R>,
        wait: bool,
        schedule: S,
    ) -> Result<Admission<R>>
    where
        S: FnOnce(TimerId) -> Result<TimerHandle>,
    {
        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let next = TimerId {
                    burst_id: entry.burst_id,
                    generation: entry.generation + 1,
                };

                entry.timer.cancel();
                let timer = match schedule(next) {
                    Ok(timer) => timer,
                    Err(err) => {
                        occupied.remove().discard();
                        return Err(err);
                    }
                };

                entry.timer = timer;
                entry.generation = next.generation;
                entry.buffer.push(event);
                entry.context = context;
                entry.on_fire = on_fire;

                let superseded = entry.waiters.supersede_before(next.generation);
                let ticket = wait.then(|| entry.waiters.bind(next.generation));

                Ok(Admission {
                    generation: next.generation,
                    buffered: entry.buffer.len(),
                    superseded,
                    ticket,
                })
            }
            Entry::Vacant(vacant) => {
                let id = TimerId {
                    burst_id: self.next_burst_id.fetch_add(1, Ordering::Relaxed),
                    generation: 0,
                };
                let timer = schedule(id)?;

                let mut waiters = Waiters::new();
                let ticket = wait.then(|| waiters.bind(id.generation));

                vacant.insert(PendingEntry {
                    buffer: EventBuffer::new(event),
                    context,
                    generation: id.generation,
                    burst_id: id.burst_id,
                    timer,
                    created_at: Instant::now(),
                    on_fire,
                    waiters,
                });

                Ok(Admission {
                    generation: id.generation,
                    buffered: 1,
                    superseded: 0,
                    ticket,
                })
            }
        }
    }

    /// Remove the entry for `key` if `id` is still its current timer
    ///
    /// A timer that was replaced or discarded gets `None` and must not fire.
    pub(crate) fn take_if_current(&self, key: &str, id: TimerId) -> Option<PendingEntry<C, R>> {
        self.entries
            .remove_if(key, |_, entry| entry.timer_id() == id)
            .map(|(_, entry)| entry)
    }

    /// Remove and return every pending entry
    pub(crate) fn drain(&self) -> Vec<PendingEntry<C, R>> {
        // Collect keys first; removing while iterating would deadlock on
        // the shard locks held by the iterator.
        let keys = self.keys();
        keys.iter()
            .filter_map(|key| self.entries.remove(key).map(|(_, entry)| entry))
            .collect()
    }
}
