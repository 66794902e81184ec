#![forbid(unsafe_code)]

//! Synchronous conditions.

/// A pure predicate over the subject under test.
///
/// Conditions run inline on the thread that calls
/// [`Criteria::evaluate`](crate::Criteria::evaluate) and must return promptly.
/// Each condition should test a single scenario; add one condition per rule.
///
/// Any `Fn(&S) -> bool` closure is a condition:
///
/// ```rust
/// use fieldwatch::{Condition, Criteria};
///
/// let criteria = Criteria::<str>::new("kiwi42")
///     .test(|s: &str| s.chars().all(|c| c.is_ascii_alphanumeric()));
/// assert_eq!(criteria.condition_count(), 1);
/// ```
pub trait Condition<S: ?Sized>: Send + Sync {
    /// Returns `true` if the subject passes this condition.
    fn evaluate(&self, subject: &S) -> bool;
}

impl<S: ?Sized, F> Condition<S> for F
where
    F: Fn(&S) -> bool + Send + Sync,
{
    fn evaluate(&self, subject: &S) -> bool {
        self(subject)
    }
}
