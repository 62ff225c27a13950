//! The promise cell: settlement state, outcome slots, registered handlers,
//! and the condition variable behind `wait`.
//!
//! The settlement protocol is lock-then-drain: the terminal outcome is
//! stored and waiters notified under the cell mutex, then handlers are
//! popped one at a time and invoked with the lock released. Draining
//! outside the lock lets a callback register further handlers on the same
//! promise without deadlocking, and a registration arriving after
//! settlement observes the stored outcome synchronously.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use log::trace;

use crate::error::{Rejection, SettleError};
use crate::registry::{Handler, HandlerMap, SinkId};
use crate::state::PromiseState;

/// Locks a mutex, recovering the guard if a prior holder panicked. Handlers
/// never run under a cell lock, so a poisoned cell is still consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Outcome — terminal slots
// ---------------------------------------------------------------------------

pub(crate) enum Outcome<T> {
    Pending,
    Fulfilled(T),
    Rejected(Rejection),
}

impl<T> Outcome<T> {
    fn state(&self) -> PromiseState {
        match self {
            Self::Pending => PromiseState::Pending,
            Self::Fulfilled(_) => PromiseState::Fulfilled,
            Self::Rejected(_) => PromiseState::Rejected,
        }
    }
}

// ---------------------------------------------------------------------------
// Upstream — lifetime linkage
// ---------------------------------------------------------------------------

/// Erased view of an ancestor promise, held by each sink so the ancestor
/// stays alive until the sink is released. Only handler deregistration
/// crosses this boundary.
pub(crate) trait Upstream: Send + Sync {
    fn remove_handler(&self, sink: SinkId);
}

// ---------------------------------------------------------------------------
// PromiseCore
// ---------------------------------------------------------------------------

struct Cell<T> {
    outcome: Outcome<T>,
    handlers: HandlerMap<T>,
}

/// Shared state behind one promise handle: identity, the guarded cell, the
/// settlement condvar, and the ancestor chain.
pub(crate) struct PromiseCore<T> {
    id: SinkId,
    cell: Mutex<Cell<T>>,
    settled: Condvar,
    /// Ancestors in chain order, direct parent last. Immutable after
    /// construction.
    upstream: Vec<Arc<dyn Upstream>>,
}

impl<T> PromiseCore<T> {
    pub(crate) fn new(upstream: Vec<Arc<dyn Upstream>>) -> Self {
        Self {
            id: SinkId::next(),
            cell: Mutex::new(Cell {
                outcome: Outcome::Pending,
                handlers: HandlerMap::new(),
            }),
            settled: Condvar::new(),
            upstream,
        }
    }

    pub(crate) fn id(&self) -> SinkId {
        self.id
    }

    pub(crate) fn upstream(&self) -> &[Arc<dyn Upstream>] {
        &self.upstream
    }

    pub(crate) fn state(&self) -> PromiseState {
        lock(&self.cell).outcome.state()
    }

    #[cfg(test)]
    pub(crate) fn handler_count(&self) -> usize {
        lock(&self.cell).handlers.len()
    }
}

impl<T: Clone> PromiseCore<T> {
    /// `Pending -> Fulfilled`. Fails without touching the cell if the
    /// promise is already terminal.
    pub(crate) fn fulfill(&self, value: T) -> Result<(), SettleError> {
        {
            let mut cell = lock(&self.cell);
            if cell.outcome.state().is_settled() {
                return Err(SettleError::AlreadySettled);
            }
            cell.outcome = Outcome::Fulfilled(value);
            self.settled.notify_all();
        }
        trace!("{} fulfilled", self.id);
        self.drain();
        Ok(())
    }

    /// `Pending -> Rejected`.
    pub(crate) fn reject(&self, error: Rejection) -> Result<(), SettleError> {
        {
            let mut cell = lock(&self.cell);
            if cell.outcome.state().is_settled() {
                return Err(SettleError::AlreadySettled);
            }
            cell.outcome = Outcome::Rejected(error);
            self.settled.notify_all();
        }
        trace!("{} rejected", self.id);
        self.drain();
        Ok(())
    }

    /// Registers a handler pair for `sink`. When the promise is already
    /// terminal the matching side fires synchronously before this call
    /// returns, exactly as if it had been registered before settlement.
    pub(crate) fn add_handler(&self, sink: SinkId, handler: Handler<T>) {
        let outcome: Result<T, Rejection> = {
            let mut cell = lock(&self.cell);
            match &cell.outcome {
                Outcome::Pending => {
                    cell.handlers.insert(sink, handler);
                    return;
                }
                Outcome::Fulfilled(value) => Ok(value.clone()),
                Outcome::Rejected(error) => Err(error.clone()),
            }
        };
        Self::fire(handler, outcome);
    }

    /// Blocks the calling thread until the promise is terminal, then clones
    /// out the outcome.
    pub(crate) fn wait(&self) -> Result<T, Rejection> {
        let mut cell = lock(&self.cell);
        loop {
            match &cell.outcome {
                Outcome::Fulfilled(value) => return Ok(value.clone()),
                Outcome::Rejected(error) => return Err(error.clone()),
                Outcome::Pending => {}
            }
            cell = self
                .settled
                .wait(cell)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Pops and fires handlers until the registry is empty. Each pop clones
    /// the stored outcome under the lock; the callback runs with the lock
    /// released, so it may register or remove handlers itself.
    fn drain(&self) {
        loop {
            let (handler, outcome) = {
                let mut cell = lock(&self.cell);
                let Some(handler) = cell.handlers.pop_any() else {
                    return;
                };
                let outcome: Result<T, Rejection> = match &cell.outcome {
                    Outcome::Fulfilled(value) => Ok(value.clone()),
                    Outcome::Rejected(error) => Err(error.clone()),
                    Outcome::Pending => return,
                };
                (handler, outcome)
            };
            Self::fire(handler, outcome);
        }
    }

    fn fire(handler: Handler<T>, outcome: Result<T, Rejection>) {
        match outcome {
            Ok(value) => {
                if let Some(f) = handler.fulfilled {
                    f(value);
                }
            }
            Err(error) => {
                if let Some(f) = handler.rejected {
                    f(error);
                }
            }
        }
    }
}

impl<T: Send + 'static> Upstream for PromiseCore<T> {
    fn remove_handler(&self, sink: SinkId) {
        lock(&self.cell).handlers.remove(sink);
    }
}

impl<T> Drop for PromiseCore<T> {
    fn drop(&mut self) {
        if let Some(parent) = self.upstream.last() {
            parent.remove_handler(self.id);
        }
    }
}
