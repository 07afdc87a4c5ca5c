//! Keyed debouncing for bursty event streams
//!
//! This crate provides:
//! - Per-key debouncing (delay measured from the most recent event)
//! - Event coalescing into one combined payload per burst
//! - A blocking mode that tells a caller whether its own event produced
//!   the result or was superseded by a later one
//! - Deterministic shutdown that cancels every pending burst

pub mod broker;
pub mod coalesce;
pub mod config;
pub mod engine;
pub mod error;
pub mod scheduler;
mod store;

// Re-exports
pub use broker::{WaitOutcome, WaitTicket};
pub use coalesce::{Combiner, JoinWith, KeepLast};
pub use config::DebounceConfig;
pub use engine::{Burst, Debouncer, DebouncerBuilder};
pub use error::{DebounceError, Result};
pub use scheduler::{Scheduler, TimerHandle, TimerTask, TokioScheduler};
