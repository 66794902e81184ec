#![forbid(unsafe_code)]

//! Validators: one criteria fanned out to many observers.

use std::fmt;
use std::sync::Arc;

use crate::criteria::Criteria;
use crate::error::DispatchResult;
use crate::identity::IdentitySet;
use crate::observer::Observe;

/// Something that can be validated and cancelled.
///
/// Implemented by [`Validator`] and [`ValidatorSet`](crate::ValidatorSet), so
/// sets can hold validators over different subject types and even nest.
pub trait Validation: Send + Sync {
    /// Start a validation round.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`](crate::DispatchError) if an async condition
    /// worker could not be started.
    fn validate(&self) -> DispatchResult;

    /// Cancel every in-flight async condition.
    ///
    /// The cancelled round never notifies.
    fn cancel_validation(&self);
}

/// Binds a [`Criteria`] to the observers interested in its verdict.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use fieldwatch::{Criteria, Observer, Validation, Validator};
///
/// let enabled = Arc::new(Observer::new(AtomicBool::new(false), |flag, result| {
///     flag.store(result.is_valid(), Ordering::SeqCst);
/// }));
///
/// let mut validator = Validator::new(
///     Criteria::<str>::new("kiwi").test(|s: &str| s.len() >= 4),
/// );
/// validator.observe(enabled.clone());
/// validator.validate().unwrap();
///
/// assert!(enabled.target().load(Ordering::SeqCst));
/// ```
pub struct Validator<S: ?Sized> {
    criteria: Criteria<S>,
    observers: IdentitySet<dyn Observe>,
}

impl<S: ?Sized + Send + Sync + 'static> Validator<S> {
    /// Create a validator with no observers.
    pub fn new(criteria: Criteria<S>) -> Self {
        Self {
            criteria,
            observers: IdentitySet::new(),
        }
    }

    /// Add an observer. Returns `false` if this instance already observes.
    pub fn observe(&mut self, observer: Arc<dyn Observe>) -> bool {
        self.observers.insert(observer)
    }

    /// Add several observers. Returns `true` if any was new.
    pub fn observe_all(&mut self, observers: impl IntoIterator<Item = Arc<dyn Observe>>) -> bool {
        observers
            .into_iter()
            .fold(false, |changed, observer| self.observe(observer) | changed)
    }

    /// Stop notifying `observer`. Returns whether it was observing.
    pub fn stop_observing<U: ?Sized>(&mut self, observer: &Arc<U>) -> bool {
        self.observers.remove(observer)
    }

    /// Number of distinct observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// The criteria this validator evaluates.
    #[must_use]
    pub fn criteria(&self) -> &Criteria<S> {
        &self.criteria
    }
}

impl<S: ?Sized + Send + Sync + 'static> Validation for Validator<S> {
    /// Evaluate the criteria and notify every observer with the verdict.
    ///
    /// The observers notified are the ones registered when `validate` was
    /// called.
    fn validate(&self) -> DispatchResult {
        let observers = self.observers.snapshot();
        self.criteria.evaluate(move |result| {
            for observer in observers.iter() {
                observer.update(result);
            }
        })
    }

    fn cancel_validation(&self) {
        self.criteria.cancel_validation();
    }
}

impl<S: ?Sized> fmt::Debug for Validator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("criteria", &self.criteria)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Observer, ValidationResult};
    use std::sync::Mutex;

    fn recorder() -> Arc<Observer<Mutex<Vec<ValidationResult>>>> {
        Arc::new(Observer::new(Mutex::new(Vec::new()), |log, result| {
            log.lock().unwrap().push(result);
        }))
    }

    #[test]
    fn every_observer_gets_the_verdict() {
        let a = recorder();
        let b = recorder();
        let mut validator = Validator::new(Criteria::<str>::new("ab").test(|s: &str| s.len() > 2));
        assert!(validator.observe_all([a.clone() as Arc<dyn Observe>, b.clone()]));
        validator.validate().unwrap();
        assert_eq!(*a.target().lock().unwrap(), vec![ValidationResult::Invalid]);
        assert_eq!(*b.target().lock().unwrap(), vec![ValidationResult::Invalid]);
    }

    #[test]
    fn duplicate_observer_notified_once() {
        let a = recorder();
        let mut validator = Validator::new(Criteria::<str>::new("x"));
        assert!(validator.observe(a.clone()));
        assert!(!validator.observe(a.clone()));
        assert_eq!(validator.observer_count(), 1);
        validator.validate().unwrap();
        assert_eq!(a.target().lock().unwrap().len(), 1);
    }

    #[test]
    fn removed_observer_is_not_notified() {
        let a = recorder();
        let mut validator = Validator::new(Criteria::<str>::new("x"));
        validator.observe(a.clone());
        assert!(validator.stop_observing(&a));
        assert!(!validator.stop_observing(&a));
        validator.validate().unwrap();
        assert!(a.target().lock().unwrap().is_empty());
    }

    #[test]
    fn zero_observers_still_evaluates() {
        let calls = Arc::new(Mutex::new(0));
        let counted = Arc::clone(&calls);
        let validator = Validator::new(Criteria::<str>::new("x").test(move |_: &str| {
            *counted.lock().unwrap() += 1;
            true
        }));
        validator.validate().unwrap();
        assert_eq!(*calls.lock().unwrap(), 1);
        assert!(!validator.criteria().is_pending());
    }
}
