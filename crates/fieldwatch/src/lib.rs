#![forbid(unsafe_code)]

//! Fieldwatch
//!
//! A small reactive validation engine. A subject (typically the text of a
//! form field) is tested against a mix of synchronous and asynchronous
//! conditions, their outcomes are merged into a single all-must-pass verdict,
//! and that verdict is fanned out to every interested observer.
//!
//! # Key Components
//!
//! - [`Condition`] - Inline predicate over the subject
//! - [`AsyncCondition`] - Check that runs on its own worker and reports through a [`Completion`]
//! - [`Criteria`] - Subject plus conditions; evaluates a round and reports exactly once
//! - [`Observer`] - Binds a display target to a verdict callback
//! - [`Validator`] - One criteria fanned out to many observers
//! - [`ValidatorSet`] - Several validators driven together
//! - [`CoordinationContext`] - Owner-thread job queue that async results can be marshalled to
//!
//! # Guarantees
//!
//! - Within one round the completion callback fires at most once, and exactly
//!   once if every async condition reports and nothing is cancelled.
//! - Results from cancelled or superseded dispatches never affect any round.
//! - Conditions, observers and validators are held by identity: adding the
//!   same instance twice is a no-op.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use fieldwatch::{Completion, CoordinationContext, Criteria, Observer, Validation, Validator};
//!
//! struct NotTaken;
//!
//! impl fieldwatch::AsyncCondition<str> for NotTaken {
//!     fn evaluate(&self, name: &str, completion: Completion) {
//!         completion.complete(name != "realkiwi");
//!     }
//! }
//!
//! let context = CoordinationContext::new();
//! let available = Arc::new(Observer::new(AtomicBool::new(false), |flag, result| {
//!     flag.store(result.is_valid(), Ordering::SeqCst);
//! }));
//!
//! let mut validator = Validator::new(
//!     Criteria::<str>::new("happykiwi")
//!         .on_context(&context)
//!         .test(|s: &str| s.chars().all(|c| c.is_ascii_alphanumeric()))
//!         .async_test(NotTaken),
//! );
//! validator.observe(available.clone());
//! validator.validate().unwrap();
//!
//! let flag = available.target();
//! context.run_until(std::time::Duration::from_secs(5), || flag.load(Ordering::SeqCst));
//! assert!(flag.load(Ordering::SeqCst));
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod async_condition;
pub mod condition;
pub mod config;
pub mod context;
pub mod criteria;
pub mod debug_trace;
pub mod error;
pub mod identity;
pub mod interrupt;
pub mod observer;
pub mod result;
pub mod trace;
pub mod validator;
pub mod validator_set;

pub use async_condition::{AsyncCondition, Completion};
pub use condition::Condition;
pub use config::DispatchConfig;
pub use context::{ContextHandle, CoordinationContext, Delivery};
pub use criteria::Criteria;
pub use error::{DispatchError, DispatchResult};
pub use identity::IdentitySet;
pub use interrupt::InterruptSignal;
pub use observer::{Observe, Observer};
pub use result::ValidationResult;
pub use trace::{DiscardReason, RoundEvent, RoundToken, RoundTrace};
pub use validator::{Validation, Validator};
pub use validator_set::ValidatorSet;

/// Lock `mutex`, recovering the guard if a previous holder panicked.
///
/// Critical sections in this crate are panic-free bookkeeping; the data
/// behind a poisoned lock is still consistent.
pub(crate) fn lock_unpoisoned<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
