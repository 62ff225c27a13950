//! Settlement state tags.
//!
//! A promise is born `Pending` and moves exactly once to `Fulfilled` or
//! `Rejected`; there are no other transitions. This module carries the
//! tag-only view of that lifecycle. The settled value and rejection token
//! live in the promise cell itself; the tags are what state snapshots and
//! the settlement-reporting aggregates traffic in.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The three-state lifecycle of a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PromiseState {
    /// Not yet settled.
    Pending,
    /// Settled with a value.
    Fulfilled,
    /// Settled with a rejection token.
    Rejected,
}

impl PromiseState {
    /// Returns `true` if the promise has not settled yet.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Returns `true` if the promise is no longer pending.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Returns `true` if fulfilled.
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled)
    }

    /// Returns `true` if rejected.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected)
    }
}

impl fmt::Display for PromiseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Fulfilled => f.write_str("fulfilled"),
            Self::Rejected => f.write_str("rejected"),
        }
    }
}
