#![forbid(unsafe_code)]

//! Validating several independent validators as one.

use std::fmt;
use std::sync::Arc;

use crate::error::DispatchResult;
use crate::identity::IdentitySet;
use crate::validator::Validation;

/// A set of validators driven together.
///
/// Members are independent: each has its own criteria and observers, and one
/// member's rounds never wait on another's.
#[derive(Default, Clone)]
pub struct ValidatorSet {
    validators: IdentitySet<dyn Validation>,
}

impl ValidatorSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set from `validators`, collapsing duplicates.
    pub fn from_validators(validators: impl IntoIterator<Item = Arc<dyn Validation>>) -> Self {
        let mut set = Self::new();
        set.add_all(validators);
        set
    }

    /// Add a validator. Returns `false` if this instance is already a member.
    pub fn add(&mut self, validator: Arc<dyn Validation>) -> bool {
        self.validators.insert(validator)
    }

    /// Add several validators. Returns `true` if the set changed.
    pub fn add_all(&mut self, validators: impl IntoIterator<Item = Arc<dyn Validation>>) -> bool {
        validators
            .into_iter()
            .fold(false, |changed, validator| self.add(validator) | changed)
    }

    /// Remove `validator`. Returns whether it was a member.
    pub fn remove<U: ?Sized>(&mut self, validator: &Arc<U>) -> bool {
        self.validators.remove(validator)
    }

    /// Returns `true` if `validator` is a member.
    #[must_use]
    pub fn contains<U: ?Sized>(&self, validator: &Arc<U>) -> bool {
        self.validators.contains(validator)
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Returns `true` if the set has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl Validation for ValidatorSet {
    /// Validate every member.
    ///
    /// A member that fails to dispatch does not stop the others; the first
    /// error is returned once all members have been started.
    fn validate(&self) -> DispatchResult {
        let mut first_error = None;
        for validator in &self.validators {
            if let Err(err) = validator.validate() {
                tracing::warn!(error = %err, "validator failed to start");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn cancel_validation(&self) {
        for validator in &self.validators {
            validator.cancel_validation();
        }
    }
}

impl fmt::Debug for ValidatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorSet")
            .field("len", &self.validators.len())
            .finish()
    }
}
