//! Integration tests for the aggregate operations: `all`, `race`,
//! `all_settled`, and the variadic macros, exercised with threaded
//! producers settling in scrambled orders.

use std::thread;
use std::time::Duration;

use franken_promise::{
    all, all_of, all_settled, all_settled_of, race, states_of, Promise, PromiseState, Rejection,
};

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

// ===========================================================================
// all — homogeneous gather
// ===========================================================================

#[test]
fn all_orders_values_by_input_index() {
    // Settlement order is 3, 1, 2; the report stays in input order.
    let combined = all(vec![delayed(1, 50), delayed(2, 90), delayed(3, 10)]);
    assert_eq!(combined.wait().unwrap(), vec![1, 2, 3]);
}

#[test]
fn all_short_circuits_on_the_first_rejection() {
    let combined = all(vec![
        delayed(1, 90),
        delayed_failure("fastest failure", 10),
        delayed_failure("slower failure", 50),
    ]);
    assert_eq!(combined.wait().unwrap_err().message(), "fastest failure");
}

#[test]
fn all_result_is_sealed_after_rejection() {
    let combined = all(vec![delayed(1, 60), delayed_failure("sealed", 10)]);
    assert_eq!(combined.wait().unwrap_err().message(), "sealed");
    // The remaining input settles afterwards; the output must not change.
    thread::sleep(Duration::from_millis(80));
    assert_eq!(combined.wait().unwrap_err().message(), "sealed");
}

#[test]
fn all_with_empty_input_is_immediate() {
    let combined: Promise<Vec<String>> = all(Vec::new());
    assert_eq!(combined.state(), PromiseState::Fulfilled);
    assert!(combined.wait().unwrap().is_empty());
}

// ===========================================================================
// race — first settlement wins
// ===========================================================================

#[test]
fn race_yields_the_fastest_input() {
    let winner = race(vec![delayed(1, 100), delayed(2, 50), delayed(3, 200)]);
    assert_eq!(winner.wait().unwrap(), 2);
}

#[test]
fn race_propagates_a_fast_rejection() {
    let winner: Promise<u32> = race(vec![delayed(9, 100), delayed_failure("lost", 20)]);
    assert_eq!(winner.wait().unwrap_err().message(), "lost");
}

#[test]
fn race_with_empty_input_never_settles() {
    let winner: Promise<u32> = race(Vec::new());
    thread::sleep(Duration::from_millis(30));
    assert_eq!(winner.state(), PromiseState::Pending);
}

// ===========================================================================
// all_settled — tag reports
// ===========================================================================

#[test]
fn all_settled_reports_every_terminal_tag() {
    let report = all_settled(vec![
        delayed(1, 10),
        delayed_failure("boom", 40),
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
fn all_settled_resolves_even_when_everything_fails() {
    let report = all_settled(vec![
        delayed_failure::<u32>("a", 10),
        delayed_failure::<u32>("b", 30),
    ]);
    assert_eq!(
        report.wait().unwrap(),
        vec![PromiseState::Rejected, PromiseState::Rejected]
    );
}

// ===========================================================================
// Variadic forms
// ===========================================================================

#[test]
fn all_of_gathers_a_mixed_type_tuple() {
    let combined = all_of!(
        Promise::resolved(1),
        Promise::resolved("x"),
        Promise::resolved(3.14),
    );
    assert_eq!(combined.wait().unwrap(), (1, "x", 3.14));
}

#[test]
fn all_of_handles_scrambled_settlement_order() {
    let combined = all_of!(
        delayed(1u32, 60),
        delayed(String::from("x"), 10),
        delayed(3.5f64, 30),
    );
    assert_eq!(combined.wait().unwrap(), (1, String::from("x"), 3.5));
}

#[test]
fn all_of_rejects_through_the_chain() {
    let combined = all_of!(delayed(1u32, 10), delayed_failure::<&str>("broken link", 30));
    assert_eq!(combined.wait().unwrap_err().message(), "broken link");
}

#[test]
fn all_settled_of_reports_mixed_types_in_order() {
    let report = all_settled_of!(
        delayed(1u32, 30),
        delayed_failure::<&str>("boom", 10),
        Promise::resolved(2.5),
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
fn states_of_reads_tags_without_blocking() {
    let slow = delayed(1u32, 150);
    let done = Promise::resolved("x");
    let failed: Promise<f64> = Promise::rejected(Rejection::new("boom"));

    let snapshot = states_of!(slow, done, failed);
    assert_eq!(snapshot.state(), PromiseState::Fulfilled);
    assert_eq!(
        snapshot.wait().unwrap(),
        vec![
            PromiseState::Pending,
            PromiseState::Fulfilled,
            PromiseState::Rejected,
        ]
    );

    // The inputs are only borrowed; the slow one is still usable.
    assert_eq!(slow.wait().unwrap(), 1);
}

#[test]
fn timeout_can_be_layered_with_race() {
    // The library has no timers; a timeout is a race against a sleeping
    // producer.
    let work: Promise<Result<u32, String>> = delayed(Ok(5), 200);
    let deadline: Promise<Result<u32, String>> =
        delayed(Err(String::from("timed out")), 20);
    let first = race(vec![work, deadline]);
    assert_eq!(first.wait().unwrap(), Err(String::from("timed out")));
}
