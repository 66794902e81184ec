#![forbid(unsafe_code)]

//! Verdict consumers.
//!
//! An [`Observer`] binds a target (typically a display element) to the
//! closure that updates it with a verdict. Validators hold observers as
//! `Arc<dyn Observe>`, so targets of different types can watch the same
//! validator.

use std::fmt;
use std::sync::Arc;

use crate::result::ValidationResult;

/// Anything that can receive an aggregated verdict.
pub trait Observe: Send + Sync {
    /// Deliver the verdict of a completed round.
    fn update(&self, result: ValidationResult);
}

type Callback<T> = Box<dyn Fn(&T, ValidationResult) + Send + Sync>;

/// A target paired with the callback that renders verdicts onto it.
///
/// Observers carry no state across rounds. The target is shared, so it
/// needs interior mutability to change in response to a verdict.
///
/// # Example
///
/// ```rust
/// use std::sync::Mutex;
/// use fieldwatch::{Observe, Observer, ValidationResult};
///
/// let label = Observer::new(Mutex::new(String::new()), |label, result| {
///     *label.lock().unwrap() = result.to_string();
/// });
/// label.update(ValidationResult::Invalid);
/// assert_eq!(*label.target().lock().unwrap(), "invalid");
/// ```
pub struct Observer<T> {
    target: Arc<T>,
    on_complete: Callback<T>,
}

impl<T: Send + Sync> Observer<T> {
    /// Bind `target` to `on_complete`.
    pub fn new<F>(target: T, on_complete: F) -> Self
    where
        F: Fn(&T, ValidationResult) + Send + Sync + 'static,
    {
        Self::shared(Arc::new(target), on_complete)
    }

    /// Bind a target that is also held elsewhere.
    pub fn shared<F>(target: Arc<T>, on_complete: F) -> Self
    where
        F: Fn(&T, ValidationResult) + Send + Sync + 'static,
    {
        Self {
            target,
            on_complete: Box::new(on_complete),
        }
    }

    /// The bound target.
    #[must_use]
    pub fn target(&self) -> &Arc<T> {
        &self.target
    }
}

impl<T: Send + Sync> Observe for Observer<T> {
    fn update(&self, result: ValidationResult) {
        (self.on_complete)(&self.target, result);
    }
}

impl<T> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("target", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn update_passes_target_and_result() {
        let seen = Observer::new(Mutex::new(Vec::new()), |log: &Mutex<Vec<_>>, result| {
            log.lock().unwrap().push(result);
        });
        seen.update(ValidationResult::Valid);
        seen.update(ValidationResult::Invalid);
        assert_eq!(
            *seen.target().lock().unwrap(),
            vec![ValidationResult::Valid, ValidationResult::Invalid]
        );
    }

    #[test]
    fn observers_can_share_a_target() {
        let hits = Arc::new(AtomicUsize::new(0));
        let a = Observer::shared(Arc::clone(&hits), |h, _| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let b = Observer::shared(Arc::clone(&hits), |h, _| {
            h.fetch_add(10, Ordering::SeqCst);
        });
        a.update(ValidationResult::Valid);
        b.update(ValidationResult::Valid);
        assert_eq!(hits.load(Ordering::SeqCst), 11);
        assert!(Arc::ptr_eq(a.target(), b.target()));
    }

    #[test]
    fn usable_as_trait_object() {
        let counter = Arc::new(Observer::new(AtomicUsize::new(0), |n, r| {
            if r.is_invalid() {
                n.fetch_add(1, Ordering::SeqCst);
            }
        }));
        let observer: Arc<dyn Observe> = counter.clone();
        observer.update(ValidationResult::Invalid);
        observer.update(ValidationResult::Valid);
        assert_eq!(counter.target().load(Ordering::SeqCst), 1);
    }
}
