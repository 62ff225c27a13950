//! Handler registration: the callback pairs a promise fires on settlement.
//!
//! Entries are keyed by the opaque identity of the downstream sink that
//! registered them, so a dropped sink can remove its pair in O(1) before
//! the source ever settles. The map makes no ordering promise; the
//! settlement drain pops entries in arbitrary order. Each registered pair
//! fires at most once.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Rejection;

// ---------------------------------------------------------------------------
// SinkId — registry key identity
// ---------------------------------------------------------------------------

/// Opaque identity of a downstream promise. Used only as a registry key,
/// never dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SinkId(u64);

static NEXT_SINK_ID: AtomicU64 = AtomicU64::new(0);

impl SinkId {
    /// Allocates the next identity. Monotonic, never reused.
    pub(crate) fn next() -> Self {
        Self(NEXT_SINK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "promise-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Handler — optional callback pair
// ---------------------------------------------------------------------------

type FulfillFn<T> = Box<dyn FnOnce(T) + Send>;
type RejectFn = Box<dyn FnOnce(Rejection) + Send>;

/// A pair of optional settlement callbacks.
///
/// Either side may be absent; an absent side is skipped when the matching
/// outcome arrives.
pub struct Handler<T> {
    pub(crate) fulfilled: Option<FulfillFn<T>>,
    pub(crate) rejected: Option<RejectFn>,
}

impl<T> Handler<T> {
    /// An empty pair, both sides absent.
    pub fn new() -> Self {
        Self {
            fulfilled: None,
            rejected: None,
        }
    }

    /// Sets the fulfillment side.
    pub fn on_fulfilled(mut self, f: impl FnOnce(T) + Send + 'static) -> Self {
        self.fulfilled = Some(Box::new(f));
        self
    }

    /// Sets the rejection side.
    pub fn on_rejected(mut self, f: impl FnOnce(Rejection) + Send + 'static) -> Self {
        self.rejected = Some(Box::new(f));
        self
    }
}

impl<T> Default for Handler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Handler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("fulfilled", &self.fulfilled.is_some())
            .field("rejected", &self.rejected.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// HandlerMap
// ---------------------------------------------------------------------------

/// Registry of handler pairs keyed by sink identity. Callers synchronize
/// access through the owning promise's cell mutex.
pub(crate) struct HandlerMap<T> {
    entries: HashMap<SinkId, Handler<T>>,
}

impl<T> HandlerMap<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, sink: SinkId, handler: Handler<T>) {
        self.entries.insert(sink, handler);
    }

    /// Removes the entry registered by `sink`, if any. Idempotent.
    pub(crate) fn remove(&mut self, sink: SinkId) {
        self.entries.remove(&sink);
    }

    /// Pops an arbitrary entry for the settlement drain.
    pub(crate) fn pop_any(&mut self) -> Option<Handler<T>> {
        let key = self.entries.keys().next().copied()?;
        self.entries.remove(&key)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
