//! The typed promise façade: construction, settlement, observation, and the
//! continuation combinators.
//!
//! A [`Promise<T>`] is a shared handle to one settlement cell. Producers
//! get write access through a [`Resolver`], which holds the cell weakly so
//! an abandoned promise can be collected even while a producer closure
//! still owns its resolver. Every continuation builds a sink promise that
//! shared-owns its whole source chain, keeping ancestors alive until the
//! sink itself is released; sources know their sinks only by identity, so
//! an unobserved sink can be dropped and deregistered at any time.
//!
//! Each combinator family comes in three result shapes, dispatched by
//! method name: a plain-value mapping, a promise-returning form whose sink
//! adopts the inner promise's outcome, and a unit form that observes and
//! forwards the upstream outcome unchanged. A panic inside any user
//! callback becomes the sink's rejection; it never unwinds into the
//! settling thread or into sibling chains.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::cell::{lock, PromiseCore, Upstream};
use crate::error::{catch_user, Rejection, SettleError};
use crate::registry::{Handler, SinkId};
use crate::state::PromiseState;

// ---------------------------------------------------------------------------
// Promise
// ---------------------------------------------------------------------------

/// Shared handle to an asynchronously produced `T`.
///
/// Handles are cheap to clone; every clone observes the same settlement.
pub struct Promise<T> {
    core: Arc<PromiseCore<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.core.id())
            .field("state", &self.core.state())
            .finish()
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Constructs a pending promise and runs `executor` with its resolver,
    /// synchronously on the calling thread. The executor may settle on the
    /// spot or hand the resolver to another thread; a panic inside it
    /// rejects the promise, unless the executor already settled it.
    pub fn create<F>(executor: F) -> Self
    where
        F: FnOnce(Resolver<T>),
    {
        let promise = Self::pending(Vec::new());
        let resolver = promise.resolver();
        let fallback = promise.resolver();
        if let Err(rejection) = catch_user(move || executor(resolver)) {
            let _ = fallback.try_reject(rejection);
        }
        promise
    }

    /// A promise already fulfilled with `value`.
    pub fn resolved(value: T) -> Self {
        let promise = Self::pending(Vec::new());
        promise
            .core
            .fulfill(value)
            .expect("fresh promise cannot be already settled");
        promise
    }

    /// A promise already rejected with `error`.
    pub fn rejected(error: Rejection) -> Self {
        let promise = Self::pending(Vec::new());
        promise
            .core
            .reject(error)
            .expect("fresh promise cannot be already settled");
        promise
    }

    /// Current settlement tag. A snapshot; another thread may settle the
    /// promise immediately after this returns.
    pub fn state(&self) -> PromiseState {
        self.core.state()
    }

    /// Blocks the calling thread until settlement. Returns the value on
    /// fulfillment and the rejection token otherwise; any number of
    /// handles may wait concurrently.
    pub fn wait(&self) -> Result<T, Rejection> {
        self.core.wait()
    }

    /// Subscribes `handler` for side effects only.
    ///
    /// The registered pair keeps this promise alive until it settles, even
    /// when the caller retains no handle; each side fires at most once.
    pub fn stand_alone(&self, handler: Handler<T>) {
        let Handler { fulfilled, rejected } = handler;
        let keep_value = self.clone();
        let keep_error = self.clone();
        self.core.add_handler(
            SinkId::next(),
            Handler::new()
                .on_fulfilled(move |value| {
                    if let Some(f) = fulfilled {
                        f(value);
                    }
                    drop(keep_value);
                })
                .on_rejected(move |error| {
                    if let Some(f) = rejected {
                        f(error);
                    }
                    drop(keep_error);
                }),
        );
    }

    /// One-shot observer of the terminal tag: fires once with `Fulfilled`
    /// or `Rejected` when the promise settles, keeping it alive the same
    /// way [`stand_alone`](Self::stand_alone) does.
    pub fn watch(&self, observer: impl FnOnce(PromiseState) + Send + 'static) {
        let slot = Arc::new(Mutex::new(Some(observer)));
        let other = Arc::clone(&slot);
        self.stand_alone(
            Handler::new()
                .on_fulfilled(move |_| {
                    if let Some(f) = take_shared(&slot) {
                        f(PromiseState::Fulfilled);
                    }
                })
                .on_rejected(move |_| {
                    if let Some(f) = take_shared(&other) {
                        f(PromiseState::Rejected);
                    }
                }),
        );
    }

    /// Chains a transformation of the fulfillment value. The sink fulfills
    /// with `f`'s result, rejects if `f` panics, and passes an upstream
    /// rejection through unchanged.
    pub fn then<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let (sink, resolver) = self.sink::<U>();
        let pass = resolver.clone();
        self.core.add_handler(
            sink.core.id(),
            Handler::new()
                .on_fulfilled(move |value| match catch_user(move || f(value)) {
                    Ok(mapped) => resolver.resolve(mapped),
                    Err(rejection) => resolver.reject(rejection),
                })
                .on_rejected(move |error| pass.reject(error)),
        );
        sink
    }

    /// Chains a continuation that itself returns a promise; the sink
    /// adopts the inner promise's eventual outcome.
    pub fn and_then<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        let (sink, resolver) = self.sink::<U>();
        let pass = resolver.clone();
        self.core.add_handler(
            sink.core.id(),
            Handler::new()
                .on_fulfilled(move |value| match catch_user(move || f(value)) {
                    Ok(inner) => adopt(&inner, resolver),
                    Err(rejection) => resolver.reject(rejection),
                })
                .on_rejected(move |error| pass.reject(error)),
        );
        sink
    }

    /// Runs `f` on the fulfillment value by reference, then forwards the
    /// value unchanged. Rejections pass through.
    pub fn inspect<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let (sink, resolver) = self.sink::<T>();
        let pass = resolver.clone();
        self.core.add_handler(
            sink.core.id(),
            Handler::new()
                .on_fulfilled(move |value| match catch_user(|| f(&value)) {
                    Ok(()) => resolver.resolve(value),
                    Err(rejection) => resolver.reject(rejection),
                })
                .on_rejected(move |error| pass.reject(error)),
        );
        sink
    }

    /// Recovers from a rejection with a replacement value. Fulfillment
    /// passes through unchanged.
    pub fn catch<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce(Rejection) -> T + Send + 'static,
    {
        let (sink, resolver) = self.sink::<T>();
        let pass = resolver.clone();
        self.core.add_handler(
            sink.core.id(),
            Handler::new()
                .on_fulfilled(move |value| pass.resolve(value))
                .on_rejected(move |error| match catch_user(move || f(error)) {
                    Ok(recovered) => resolver.resolve(recovered),
                    Err(rejection) => resolver.reject(rejection),
                }),
        );
        sink
    }

    /// Recovers from a rejection with a promise; the sink adopts its
    /// outcome. Fulfillment passes through unchanged.
    pub fn or_else<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce(Rejection) -> Promise<T> + Send + 'static,
    {
        let (sink, resolver) = self.sink::<T>();
        let pass = resolver.clone();
        self.core.add_handler(
            sink.core.id(),
            Handler::new()
                .on_fulfilled(move |value| pass.resolve(value))
                .on_rejected(move |error| match catch_user(move || f(error)) {
                    Ok(inner) => adopt(&inner, resolver),
                    Err(rejection) => resolver.reject(rejection),
                }),
        );
        sink
    }

    /// Observes a rejection by reference; the sink then rejects with the
    /// original token. An observer, not a recovery.
    pub fn inspect_err<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce(&Rejection) + Send + 'static,
    {
        let (sink, resolver) = self.sink::<T>();
        let pass = resolver.clone();
        self.core.add_handler(
            sink.core.id(),
            Handler::new()
                .on_fulfilled(move |value| pass.resolve(value))
                .on_rejected(move |error| match catch_user(|| f(&error)) {
                    Ok(()) => resolver.reject(error),
                    Err(rejection) => resolver.reject(rejection),
                }),
        );
        sink
    }

    /// Runs `f` on either outcome, then forwards the outcome unchanged. A
    /// panic in `f` replaces the outcome with its rejection.
    pub fn finally<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce() + Send + 'static,
    {
        let (sink, resolver) = self.sink::<T>();
        self.register_outcome(sink.core.id(), move |outcome| {
            if let Err(rejection) = catch_user(f) {
                resolver.reject(rejection);
                return;
            }
            match outcome {
                Ok(value) => resolver.resolve(value),
                Err(error) => resolver.reject(error),
            }
        });
        sink
    }

    /// Runs `f` on either outcome and adopts the promise it returns; the
    /// upstream outcome itself is discarded.
    pub fn finally_then<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce() -> Promise<U> + Send + 'static,
    {
        let (sink, resolver) = self.sink::<U>();
        self.register_outcome(sink.core.id(), move |_outcome| match catch_user(f) {
            Ok(inner) => adopt(&inner, resolver),
            Err(rejection) => resolver.reject(rejection),
        });
        sink
    }

    pub(crate) fn resolver(&self) -> Resolver<T> {
        Resolver {
            target: Arc::downgrade(&self.core),
        }
    }

    fn pending(upstream: Vec<Arc<dyn Upstream>>) -> Self {
        Self {
            core: Arc::new(PromiseCore::new(upstream)),
        }
    }

    /// Builds the downstream promise for a combinator: it shared-owns this
    /// promise's whole ancestor chain plus this promise itself.
    fn sink<U: Clone + Send + 'static>(&self) -> (Promise<U>, Resolver<U>) {
        let mut lineage = self.core.upstream().to_vec();
        lineage.push(Arc::clone(&self.core) as Arc<dyn Upstream>);
        let sink = Promise::pending(lineage);
        let resolver = sink.resolver();
        (sink, resolver)
    }

    /// Registers a single completion callback for `sink`, fed the cloned
    /// outcome whichever way the settlement goes. The callback is shared
    /// between the two handler sides; exactly one side ever fires.
    fn register_outcome(
        &self,
        sink: SinkId,
        complete: impl FnOnce(Result<T, Rejection>) + Send + 'static,
    ) {
        let slot = Arc::new(Mutex::new(Some(complete)));
        let other = Arc::clone(&slot);
        self.core.add_handler(
            sink,
            Handler::new()
                .on_fulfilled(move |value| {
                    if let Some(f) = take_shared(&slot) {
                        f(Ok(value));
                    }
                })
                .on_rejected(move |error| {
                    if let Some(f) = take_shared(&other) {
                        f(Err(error));
                    }
                }),
        );
    }

    #[cfg(test)]
    pub(crate) fn handler_count(&self) -> usize {
        self.core.handler_count()
    }
}

impl<T: Clone + Send + 'static> From<Result<T, Rejection>> for Promise<T> {
    fn from(result: Result<T, Rejection>) -> Self {
        match result {
            Ok(value) => Self::resolved(value),
            Err(error) => Self::rejected(error),
        }
    }
}

/// Mirrors `inner`'s eventual outcome into the promise behind `resolver`.
fn adopt<U: Clone + Send + 'static>(inner: &Promise<U>, resolver: Resolver<U>) {
    let reject = resolver.clone();
    inner.stand_alone(
        Handler::new()
            .on_fulfilled(move |value| resolver.resolve(value))
            .on_rejected(move |error| reject.reject(error)),
    );
}

/// Takes the single callback out of a slot shared between the two handler
/// sides.
fn take_shared<F>(slot: &Arc<Mutex<Option<F>>>) -> Option<F> {
    lock(slot).take()
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// One-shot write handle to a promise's outcome.
///
/// Holds the promise weakly: a resolver outliving every promise handle
/// does not keep the cell alive, and settling a released promise is a
/// silent no-op.
pub struct Resolver<T> {
    target: Weak<PromiseCore<T>>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            target: Weak::clone(&self.target),
        }
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("live", &(self.target.strong_count() > 0))
            .finish()
    }
}

impl<T: Clone + Send + 'static> Resolver<T> {
    /// Fulfills the promise. Settling twice is a programmer error and
    /// asserts in debug builds; settling a released promise is a no-op.
    pub fn resolve(&self, value: T) {
        let result = self.try_resolve(value);
        debug_assert!(
            !matches!(result, Err(SettleError::AlreadySettled)),
            "promise settled more than once"
        );
    }

    /// Rejects the promise. Same double-settlement and released-promise
    /// rules as [`resolve`](Self::resolve).
    pub fn reject(&self, error: Rejection) {
        let result = self.try_reject(error);
        debug_assert!(
            !matches!(result, Err(SettleError::AlreadySettled)),
            "promise settled more than once"
        );
    }

    /// Fallible fulfillment: reports double settlement and released
    /// promises instead of asserting.
    pub fn try_resolve(&self, value: T) -> Result<(), SettleError> {
        match self.target.upgrade() {
            Some(core) => core.fulfill(value),
            None => Err(SettleError::Released),
        }
    }

    /// Fallible rejection.
    pub fn try_reject(&self, error: Rejection) -> Result<(), SettleError> {
        match self.target.upgrade() {
            Some(core) => core.reject(error),
            None => Err(SettleError::Released),
        }
    }
}
