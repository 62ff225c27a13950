//! Rejection tokens and settlement protocol errors.
//!
//! [`Rejection`] is the opaque carrier a rejected promise stores and hands
//! to every rejection callback: an `Arc`-shared [`anyhow::Error`], cheap to
//! clone and inspectable again by downcast. The library never looks inside
//! one; it only moves tokens along chains. [`SettleError`] reports
//! protocol-level failures from the fallible resolver surface, and
//! [`PanicError`] is the payload a token carries when it was produced from
//! a captured panic.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Rejection — opaque error token
// ---------------------------------------------------------------------------

/// Type-erased error token carried by a rejected promise.
///
/// Clones share the underlying [`anyhow::Error`].
#[derive(Clone)]
pub struct Rejection {
    inner: Arc<anyhow::Error>,
}

impl Rejection {
    /// Wraps an error value.
    pub fn new<E>(error: E) -> Self
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(anyhow::Error::msg(error)),
        }
    }

    /// Renders the error message.
    pub fn message(&self) -> String {
        self.inner.to_string()
    }

    /// Borrows the payload as a concrete type, if it is one.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.inner.downcast_ref()
    }

    /// Returns `true` if the payload is an `E`.
    pub fn is<E>(&self) -> bool
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.inner.is::<E>()
    }

    /// Converts a payload captured by `catch_unwind` into a token carrying
    /// a [`PanicError`]. Panic payloads are only `Send`, not `Sync`, so the
    /// message is extracted and the original payload dropped.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&'static str>() {
            (*text).to_owned()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Self::new(PanicError { message })
    }
}

impl From<anyhow::Error> for Rejection {
    fn from(error: anyhow::Error) -> Self {
        Self {
            inner: Arc::new(error),
        }
    }
}

impl fmt::Debug for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for Rejection {}

/// Runs a user callback, converting a panic into a [`Rejection`].
pub(crate) fn catch_user<R>(f: impl FnOnce() -> R) -> Result<R, Rejection> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(Rejection::from_panic)
}

// ---------------------------------------------------------------------------
// PanicError
// ---------------------------------------------------------------------------

/// Payload stored in a [`Rejection`] produced from a captured panic.
#[derive(Debug, Clone, Error)]
#[error("callback panicked: {message}")]
pub struct PanicError {
    /// The panic message, when the payload carried one.
    pub message: String,
}

// ---------------------------------------------------------------------------
// SettleError
// ---------------------------------------------------------------------------

/// Protocol errors reported by the fallible settlement surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SettleError {
    /// The promise has already been fulfilled or rejected.
    #[error("promise is already settled")]
    AlreadySettled,
    /// Every handle to the promise has been dropped; there is nothing left
    /// to settle.
    #[error("promise has been released")]
    Released,
}
