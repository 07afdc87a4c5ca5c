//! Event coalescing
//!
//! Events for a key are buffered in arrival order and merged into a single
//! payload when the burst fires. How they are merged is pluggable through
//! [`Combiner`].

/// Merges the buffered events of a burst into one payload
///
/// Implemented for any `Fn(&[String]) -> String` closure.
pub trait Combiner: Send + Sync + 'static {
    /// Combine events, given in arrival order
    fn combine(&self, events: &[String]) -> String;
}

/// Join events with a separator (default: a single space)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinWith(pub String);

impl JoinWith {
    pub fn new(separator: impl Into<String>) -> Self {
        Self(separator.into())
    }

    /// Join with a newline, one event per line
    pub fn lines() -> Self {
        Self::new("\n")
    }
}

impl Default for JoinWith {
    fn default() -> Self {
        Self::new(" ")
    }
}

impl Combiner for JoinWith {
    fn combine(&self, events: &[String]) -> String {
        events.join(&self.0)
    }
}

/// Keep only the most recent event
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepLast;

impl Combiner for KeepLast {
    fn combine(&self, events: &[String]) -> String {
        events.last().cloned().unwrap_or_default()
    }
}

impl<F> Combiner for F
where
    F: Fn(&[String]) -> String + Send + Sync + 'static,
{
    fn combine(&self, events: &[String]) -> String {
        self(events)
    }
}

/// Append-only buffer of raw events for one burst
#[derive(Debug, Clone, Default)]
pub struct EventBuffer {
    events: Vec<String>,
}

impl EventBuffer {
    /// Start a buffer with the first event of a burst
    pub fn new(first: String) -> Self {
        Self {
            events: vec![first],
        }
    }

    pub fn push(&mut self, event: String) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[String] {
        &self.events
    }

    /// Merge the buffered events with `combiner`
    pub fn combine(&self, combiner: &dyn Combiner) -> String {
        combiner.combine(&self.events)
    }

    pub fn into_events(self) -> Vec<String> {
        self.events
    }
}
