#![forbid(unsafe_code)]

//! Typed, thread-safe promises.
//!
//! A [`Promise<T>`] is a shared handle to a value that some other thread (or
//! the same one, later) will eventually produce. Producers settle a promise
//! exactly once through a [`Resolver`], either fulfilling it with a value or
//! rejecting it with an opaque [`Rejection`] token; consumers block on
//! [`Promise::wait`] or attach continuations that run after settlement and
//! return new promises, forming chains.
//!
//! The library owns no threads and schedules nothing. Any thread may
//! construct, settle, chain, or observe any promise; callbacks run on
//! whichever thread performs the settlement (or, for subscribers arriving
//! after settlement, synchronously on the registering thread).
//!
//! ```
//! use std::thread;
//! use std::time::Duration;
//!
//! use franken_promise::Promise;
//!
//! let word = Promise::create(|resolver| {
//!     thread::spawn(move || {
//!         thread::sleep(Duration::from_millis(10));
//!         resolver.resolve(String::from("a"));
//!     });
//! });
//! let chained = word.then(|s| s + "b");
//! assert_eq!(chained.wait().unwrap(), "ab");
//! ```

pub mod combine;
pub mod error;
pub mod promise;
pub mod registry;
pub mod state;

mod cell;

pub use crate::combine::{all, all_settled, race};
pub use crate::error::{PanicError, Rejection, SettleError};
pub use crate::promise::{Promise, Resolver};
pub use crate::registry::Handler;
pub use crate::state::PromiseState;
