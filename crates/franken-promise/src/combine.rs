//! Aggregate operations over collections of promises.
//!
//! Every aggregate funnels its inputs' settlements into a single output
//! promise. A shared `emitted` flag under a mutex guards the output so it
//! settles exactly once no matter how the inputs interleave. Inputs are
//! subscribed with `stand_alone`, which keeps each of them alive until it
//! settles even though the aggregate consumes the handles.
//!
//! The homogeneous forms ([`all`], [`race`], [`all_settled`]) take any
//! iterator of same-typed promises. The heterogeneous variadic forms are
//! macros: [`all_of!`](crate::all_of) accumulates a tuple by chaining its
//! inputs in declaration order, [`all_settled_of!`](crate::all_settled_of)
//! reports terminal tags, and [`states_of!`](crate::states_of) snapshots
//! current tags without waiting.

use std::sync::{Arc, Mutex};

use log::debug;

use crate::cell::lock;
use crate::promise::Promise;
use crate::registry::Handler;
use crate::state::PromiseState;

// ---------------------------------------------------------------------------
// SettleOnce — single-emission guard
// ---------------------------------------------------------------------------

/// Claimable flag ensuring an aggregate output settles exactly once.
#[derive(Clone, Default)]
struct SettleOnce {
    emitted: Arc<Mutex<bool>>,
}

impl SettleOnce {
    fn new() -> Self {
        Self::default()
    }

    /// Returns `true` for exactly one caller.
    fn claim(&self) -> bool {
        let mut emitted = lock(&self.emitted);
        if *emitted {
            false
        } else {
            *emitted = true;
            true
        }
    }
}

// ---------------------------------------------------------------------------
// all
// ---------------------------------------------------------------------------

struct AllGather<T> {
    values: Vec<Option<T>>,
    fulfilled: usize,
}

/// Resolves with every input's value, in input order, once all inputs have
/// fulfilled; rejects with the first rejection to arrive. Settlements of
/// the remaining inputs after that are ignored. An empty input resolves
/// immediately with an empty vector.
pub fn all<T, I>(promises: I) -> Promise<Vec<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let promises: Vec<Promise<T>> = promises.into_iter().collect();
    Promise::create(move |resolver| {
        let total = promises.len();
        debug!("all: gathering {} inputs", total);
        if total == 0 {
            resolver.resolve(Vec::new());
            return;
        }
        let emitted = SettleOnce::new();
        let gather = Arc::new(Mutex::new(AllGather {
            values: (0..total).map(|_| None).collect(),
            fulfilled: 0,
        }));
        for (index, promise) in promises.into_iter().enumerate() {
            let gather = Arc::clone(&gather);
            let fulfill_guard = emitted.clone();
            let reject_guard = emitted.clone();
            let on_value = resolver.clone();
            let on_error = resolver.clone();
            promise.stand_alone(
                Handler::new()
                    .on_fulfilled(move |value| {
                        let ready = {
                            let mut gather = lock(&gather);
                            gather.values[index] = Some(value);
                            gather.fulfilled += 1;
                            if gather.fulfilled == total {
                                Some(std::mem::take(&mut gather.values))
                            } else {
                                None
                            }
                        };
                        if let Some(slots) = ready {
                            if fulfill_guard.claim() {
                                on_value.resolve(slots.into_iter().flatten().collect());
                            }
                        }
                    })
                    .on_rejected(move |error| {
                        if reject_guard.claim() {
                            on_error.reject(error);
                        }
                    }),
            );
        }
    })
}

// ---------------------------------------------------------------------------
// race
// ---------------------------------------------------------------------------

/// Settles with the outcome of whichever input settles first in wall-clock
/// time; every later settlement is ignored. An empty input never settles.
pub fn race<T, I>(promises: I) -> Promise<T>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let promises: Vec<Promise<T>> = promises.into_iter().collect();
    Promise::create(move |resolver| {
        let emitted = SettleOnce::new();
        for promise in promises {
            let fulfill_guard = emitted.clone();
            let reject_guard = emitted.clone();
            let on_value = resolver.clone();
            let on_error = resolver.clone();
            promise.stand_alone(
                Handler::new()
                    .on_fulfilled(move |value| {
                        if fulfill_guard.claim() {
                            on_value.resolve(value);
                        }
                    })
                    .on_rejected(move |error| {
                        if reject_guard.claim() {
                            on_error.reject(error);
                        }
                    }),
            );
        }
    })
}

// ---------------------------------------------------------------------------
// all_settled
// ---------------------------------------------------------------------------

struct StateGather {
    states: Vec<PromiseState>,
    settled: usize,
}

/// Type-erased subscription to one input's terminal tag. The variadic
/// macro wraps heterogeneous promises into this common shape.
#[doc(hidden)]
pub type SettledWatch = Box<dyn FnOnce(Box<dyn FnOnce(PromiseState) + Send>) + Send>;

/// Resolves (never rejects) with every input's terminal tag, in input
/// order, once all inputs have settled. Values and rejection tokens are
/// discarded; only the tags are reported. An empty input resolves
/// immediately with an empty vector.
pub fn all_settled<T, I>(promises: I) -> Promise<Vec<PromiseState>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    all_settled_watchers(
        promises
            .into_iter()
            .map(|promise| -> SettledWatch {
                Box::new(move |report| promise.watch(move |state| report(state)))
            })
            .collect(),
    )
}

#[doc(hidden)]
pub fn all_settled_watchers(watchers: Vec<SettledWatch>) -> Promise<Vec<PromiseState>> {
    Promise::create(move |resolver| {
        let total = watchers.len();
        if total == 0 {
            resolver.resolve(Vec::new());
            return;
        }
        let gather = Arc::new(Mutex::new(StateGather {
            states: vec![PromiseState::Pending; total],
            settled: 0,
        }));
        for (index, watch) in watchers.into_iter().enumerate() {
            let gather = Arc::clone(&gather);
            let resolver = resolver.clone();
            watch(Box::new(move |state| {
                let ready = {
                    let mut gather = lock(&gather);
                    gather.states[index] = state;
                    gather.settled += 1;
                    if gather.settled == total {
                        Some(std::mem::take(&mut gather.states))
                    } else {
                        None
                    }
                };
                if let Some(states) = ready {
                    resolver.resolve(states);
                }
            }));
        }
    })
}

// ---------------------------------------------------------------------------
// Variadic macros
// ---------------------------------------------------------------------------

/// Heterogeneous variadic [`all`]: fulfills with the tuple of its inputs'
/// values, or rejects with the first failure reached.
///
/// Inputs are chained in declaration order: each promise is subscribed
/// only after the previous one fulfills, and the tuple accumulates
/// progressively. The macro consumes its inputs; pass clones to keep the
/// handles. Note the result tuple of a single input is `(T,)`.
///
/// ```
/// use franken_promise::{all_of, Promise};
///
/// let combined = all_of!(
///     Promise::resolved(1),
///     Promise::resolved("x"),
///     Promise::resolved(3.14),
/// );
/// assert_eq!(combined.wait().unwrap(), (1, "x", 3.14));
/// ```
#[macro_export]
macro_rules! all_of {
    (@bind [$($bound:ident)*] $head:expr $(, $tail:expr)*) => {{
        let __promise = $head;
        $crate::all_of!(@bind [$($bound)* __promise] $($tail),*)
    }};
    (@bind [$($bound:ident)*]) => {
        $crate::Promise::create(move |__resolver| {
            $crate::all_of!(@chain __resolver [] [$($bound)*]);
        })
    };
    (@chain $resolver:ident [$($value:ident)*] [$head:ident]) => {{
        let __fulfill = $resolver.clone();
        let __reject = $resolver.clone();
        $head.stand_alone(
            $crate::Handler::new()
                .on_fulfilled(move |__value| __fulfill.resolve(($($value,)* __value,)))
                .on_rejected(move |__error| __reject.reject(__error)),
        );
    }};
    (@chain $resolver:ident [$($value:ident)*] [$head:ident $($tail:ident)+]) => {{
        let __next = $resolver.clone();
        let __reject = $resolver.clone();
        $head.stand_alone(
            $crate::Handler::new()
                .on_fulfilled(move |__value| {
                    $crate::all_of!(@chain __next [$($value)* __value] [$($tail)+]);
                })
                .on_rejected(move |__error| __reject.reject(__error)),
        );
    }};
    ($($promise:expr),+ $(,)?) => {
        $crate::all_of!(@bind [] $($promise),+)
    };
}

/// Heterogeneous variadic [`all_settled`]: resolves with the terminal tag
/// of every input, in declaration order, once all have settled. Consumes
/// its inputs.
///
/// ```
/// use franken_promise::{all_settled_of, Promise, PromiseState, Rejection};
///
/// let report = all_settled_of!(
///     Promise::resolved(1),
///     Promise::<u32>::rejected(Rejection::new("boom")),
/// );
/// assert_eq!(
///     report.wait().unwrap(),
///     vec![PromiseState::Fulfilled, PromiseState::Rejected],
/// );
/// ```
#[macro_export]
macro_rules! all_settled_of {
    ($($promise:expr),+ $(,)?) => {
        $crate::combine::all_settled_watchers(::std::vec![
            $({
                let __promise = $promise;
                ::std::boxed::Box::new(
                    move |__report: ::std::boxed::Box<dyn FnOnce($crate::PromiseState) + Send>| {
                        __promise.watch(move |__state| __report(__state))
                    },
                ) as $crate::combine::SettledWatch
            }),+
        ])
    };
}

/// Synchronous snapshot of its inputs' current tags, in declaration order,
/// wrapped in an already-fulfilled promise. Borrows its inputs.
///
/// ```
/// use franken_promise::{states_of, Promise, PromiseState, Rejection};
///
/// let done = Promise::resolved(1);
/// let failed: Promise<u32> = Promise::rejected(Rejection::new("boom"));
/// let snapshot = states_of!(done, failed);
/// assert_eq!(
///     snapshot.wait().unwrap(),
///     vec![PromiseState::Fulfilled, PromiseState::Rejected],
/// );
/// ```
#[macro_export]
macro_rules! states_of {
    ($($promise:expr),+ $(,)?) => {
        $crate::Promise::resolved(::std::vec![$(($promise).state()),+])
    };
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use crate::error::Rejection;

    use super::*;

    fn delayed<T: Clone + Send + 'static>(value: T, delay_ms: u64) -> Promise<T> {
        Promise::create(move |resolver| {
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(delay_ms));
                resolver.resolve(value);
            });
        })
    }

    fn delayed_failure<T: Clone + Send + 'static>(message: &str, delay_ms: u64) -> Promise<T> {
        let error = Rejection::new(message.to_owned());
        Promise::create(move |resolver| {
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(delay_ms));
                resolver.reject(error);
            });
        })
    }

    // ----- all -----

    #[test]
    fn all_preserves_input_order() {
        let combined = all(vec![delayed(1, 60), delayed(2, 10), delayed(3, 30)]);
        assert_eq!(combined.wait().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn all_accepts_settled_inputs() {
        let combined = all(vec![Promise::resolved(1), Promise::resolved(2)]);
        assert_eq!(combined.wait().unwrap(), vec![1, 2]);
    }

    #[test]
    fn all_rejects_with_the_first_failure() {
        let combined = all(vec![
            delayed(1, 60),
            delayed_failure("first", 10),
            delayed(3, 30),
        ]);
        assert_eq!(combined.wait().unwrap_err().message(), "first");
        // The surviving inputs settle afterwards without disturbing the
        // sealed output.
        thread::sleep(Duration::from_millis(90));
        assert_eq!(combined.wait().unwrap_err().message(), "first");
    }

    #[test]
    fn all_with_no_inputs_resolves_immediately() {
        let combined: Promise<Vec<u32>> = all(Vec::new());
        assert_eq!(combined.wait().unwrap(), Vec::<u32>::new());
    }

    // ----- race -----

    #[test]
    fn race_takes_the_first_settlement() {
        let winner = race(vec![delayed(1, 80), delayed(2, 10), delayed(3, 140)]);
        assert_eq!(winner.wait().unwrap(), 2);
    }

    #[test]
    fn race_may_reject_if_a_failure_is_first() {
        let winner: Promise<u32> = race(vec![delayed(1, 80), delayed_failure("fast", 10)]);
        assert_eq!(winner.wait().unwrap_err().message(), "fast");
    }

    #[test]
    fn race_of_nothing_stays_pending() {
        let winner: Promise<u32> = race(Vec::new());
        thread::sleep(Duration::from_millis(20));
        assert_eq!(winner.state(), PromiseState::Pending);
    }

    #[test]
    fn race_ignores_later_settlements() {
        let winner = race(vec![delayed(1, 10), delayed(2, 30)]);
        assert_eq!(winner.wait().unwrap(), 1);
        thread::sleep(Duration::from_millis(40));
        assert_eq!(winner.wait().unwrap(), 1);
    }

    // ----- all_settled -----

    #[test]
    fn all_settled_reports_tags_in_order() {
        let report = all_settled(vec![
            delayed(1, 10),
            delayed_failure("boom", 30),
            delayed(3, 20),
        ]);
        assert_eq!(
            report.wait().unwrap(),
            vec![
                PromiseState::Fulfilled,
                PromiseState::Rejected,
                PromiseState::Fulfilled,
            ]
        );
    }

    #[test]
    fn all_settled_never_rejects() {
        let report = all_settled(vec![delayed_failure::<u32>("a", 10), delayed_failure("b", 20)]);
        assert_eq!(
            report.wait().unwrap(),
            vec![PromiseState::Rejected, PromiseState::Rejected]
        );
    }

    #[test]
    fn all_settled_with_no_inputs_resolves_immediately() {
        let report = all_settled(Vec::<Promise<u32>>::new());
        assert_eq!(report.wait().unwrap(), Vec::new());
    }

    // ----- variadic macros -----

    #[test]
    fn all_of_accumulates_a_heterogeneous_tuple() {
        let combined = all_of!(
            Promise::resolved(1),
            Promise::resolved("x"),
            Promise::resolved(3.14),
        );
        assert_eq!(combined.wait().unwrap(), (1, "x", 3.14));
    }

    #[test]
    fn all_of_waits_for_delayed_inputs() {
        let combined = all_of!(delayed(1u32, 40), delayed("x", 10));
        assert_eq!(combined.wait().unwrap(), (1, "x"));
    }

    #[test]
    fn all_of_single_input_yields_a_unary_tuple() {
        let combined = all_of!(Promise::resolved(9));
        assert_eq!(combined.wait().unwrap(), (9,));
    }

    #[test]
    fn all_of_rejects_on_the_first_reached_failure() {
        let combined = all_of!(
            delayed(1u32, 10),
            delayed_failure::<&str>("middle", 20),
            delayed(3u32, 30),
        );
        assert_eq!(combined.wait().unwrap_err().message(), "middle");
    }

    #[test]
    fn all_of_reaches_inputs_in_declaration_order() {
        // The second input is already rejected, but the chain only reaches
        // it once the first input fulfills.
        let slot = Arc::new(Mutex::new(None));
        let stash = Arc::clone(&slot);
        let first: Promise<u32> = Promise::create(move |resolver| {
            *stash.lock().unwrap() = Some(resolver);
        });
        let resolver = slot.lock().unwrap().take().unwrap();
        let second: Promise<&str> = Promise::rejected(Rejection::new("early failure"));

        let combined = all_of!(first, second);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(combined.state(), PromiseState::Pending);

        resolver.resolve(1);
        assert_eq!(combined.wait().unwrap_err().message(), "early failure");
    }

    #[test]
    fn all_settled_of_mixes_types() {
        let report = all_settled_of!(
            delayed(1u32, 20),
            delayed_failure::<&str>("boom", 10),
            Promise::resolved(3.5),
        );
        assert_eq!(
            report.wait().unwrap(),
            vec![
                PromiseState::Fulfilled,
                PromiseState::Rejected,
                PromiseState::Fulfilled,
            ]
        );
    }

    #[test]
    fn states_of_snapshots_without_waiting() {
        let pending = delayed(1u32, 200);
        let done = Promise::resolved("x");
        let failed: Promise<f64> = Promise::rejected(Rejection::new("boom"));
        let snapshot = states_of!(pending, done, failed);
        assert_eq!(
            snapshot.wait().unwrap(),
            vec![
                PromiseState::Pending,
                PromiseState::Fulfilled,
                PromiseState::Rejected,
            ]
        );
        // The snapshot was taken eagerly; the pending input is untouched.
        assert_eq!(pending.wait().unwrap(), 1);
    }

    #[test]
    fn single_emission_guard_claims_once() {
        let guard = SettleOnce::new();
        assert!(guard.claim());
        assert!(!guard.claim());
        let clone = guard.clone();
        assert!(!clone.claim());
    }
}
