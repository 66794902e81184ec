#![forbid(unsafe_code)]

//! The aggregated verdict delivered to observers.

use std::fmt;

/// The outcome of one validation round.
///
/// `Valid` is the neutral element: a round with no conditions is valid, and
/// any single failing condition makes the whole round `Invalid`. There is no
/// partial or unknown state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValidationResult {
    /// Every condition passed.
    #[default]
    Valid,
    /// At least one condition failed.
    Invalid,
}

impl ValidationResult {
    /// Map a single condition outcome to a verdict.
    #[must_use]
    pub const fn from_passed(passed: bool) -> Self {
        if passed { Self::Valid } else { Self::Invalid }
    }

    /// Returns `true` if the result is `Valid`.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Returns `true` if the result is `Invalid`.
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        matches!(self, Self::Invalid)
    }

    /// Logical AND of two verdicts. `Invalid` is sticky.
    #[must_use]
    pub const fn and(self, other: Self) -> Self {
        match self {
            Self::Valid => other,
            Self::Invalid => Self::Invalid,
        }
    }

    /// Fold one condition outcome into this verdict.
    #[must_use]
    pub const fn and_passed(self, passed: bool) -> Self {
        self.and(Self::from_passed(passed))
    }
}

impl From<bool> for ValidationResult {
    fn from(passed: bool) -> Self {
        Self::from_passed(passed)
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => f.write_str("valid"),
            Self::Invalid => f.write_str("invalid"),
        }
    }
}
