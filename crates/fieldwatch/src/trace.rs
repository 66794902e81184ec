#![forbid(unsafe_code)]

//! Round tokens and the optional round event trace.
//!
//! Every call to [`Criteria::evaluate`](crate::Criteria::evaluate) opens a new
//! round identified by a [`RoundToken`]. Completions carry the token of the
//! round they were dispatched in, and a completion whose token is not the
//! current one is discarded. This replaces a single "cancelled" flag with a
//! generation check that also covers superseded dispatches.
//!
//! When [`DispatchConfig::record_trace`](crate::DispatchConfig) is set, the
//! criteria records a [`RoundTrace`] of lifecycle events. Traces can be
//! checksummed for golden comparison and checked against the round invariants
//! with [`RoundTrace::verify_invariants`].

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::ValidationResult;

// ---------------------------------------------------------------------------
// RoundToken
// ---------------------------------------------------------------------------

/// A monotonically increasing identifier for one evaluation round.
///
/// # Invariants
///
/// - Tokens issued by one criteria are strictly increasing.
/// - Token 0 is reserved for "no round".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RoundToken(u64);

impl RoundToken {
    /// The null token representing no round.
    pub const NONE: Self = Self(0);

    /// Create a token from a raw value (for tests and replay).
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw token value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Check if this is the null token.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// The token that follows this one.
    #[must_use]
    pub(crate) const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RoundToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Round({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// RoundEvent
// ---------------------------------------------------------------------------

/// Why a reported async result was not counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscardReason {
    /// The condition was cancelled before its result reached the criteria.
    Cancelled,
    /// A newer round was started before the result arrived.
    Stale,
}

/// An event in the round lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoundEvent {
    /// A round was opened.
    Started {
        round: RoundToken,
        /// Number of async conditions the round waits for.
        pending: usize,
    },
    /// An async condition was handed to a worker.
    Dispatched { round: RoundToken, condition: usize },
    /// A running worker was replaced by a newer dispatch.
    Superseded {
        round: RoundToken,
        condition: usize,
        superseded_by: RoundToken,
    },
    /// An async condition was cancelled.
    ///
    /// `round` is [`RoundToken::NONE`] if the condition was idle.
    Cancelled { round: RoundToken, condition: usize },
    /// An async result was counted towards its round.
    Applied {
        round: RoundToken,
        condition: usize,
        passed: bool,
    },
    /// An async result arrived but was not counted.
    Discarded {
        round: RoundToken,
        condition: usize,
        reason: DiscardReason,
    },
    /// The round's completion callback fired.
    Completed {
        round: RoundToken,
        result: ValidationResult,
    },
    /// The round was abandoned because a worker could not be started.
    Abandoned { round: RoundToken },
}

impl RoundEvent {
    /// Get the round this event belongs to.
    #[must_use]
    pub fn round(&self) -> RoundToken {
        match self {
            Self::Started { round, .. }
            | Self::Dispatched { round, .. }
            | Self::Superseded { round, .. }
            | Self::Cancelled { round, .. }
            | Self::Applied { round, .. }
            | Self::Discarded { round, .. }
            | Self::Completed { round, .. }
            | Self::Abandoned { round } => *round,
        }
    }

    /// Get the event type name for logging.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Dispatched { .. } => "dispatched",
            Self::Superseded { .. } => "superseded",
            Self::Cancelled { .. } => "cancelled",
            Self::Applied { .. } => "applied",
            Self::Discarded { .. } => "discarded",
            Self::Completed { .. } => "completed",
            Self::Abandoned { .. } => "abandoned",
        }
    }
}

// ---------------------------------------------------------------------------
// RoundTrace
// ---------------------------------------------------------------------------

/// A bounded log of round events, oldest dropped first.
#[derive(Debug, Clone)]
pub struct RoundTrace {
    events: VecDeque<RoundEvent>,
    capacity: usize,
}

impl RoundTrace {
    /// Create an empty trace that keeps at most `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Append an event, evicting the oldest one when full.
    pub fn push(&mut self, event: RoundEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Iterate over events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &RoundEvent> {
        self.events.iter()
    }

    /// Check if the trace contains an event of `event_type` for `round`.
    #[must_use]
    pub fn contains_event_type(&self, round: RoundToken, event_type: &str) -> bool {
        self.events
            .iter()
            .any(|e| e.round() == round && e.event_type() == event_type)
    }

    /// Count events of `event_type` for `round`.
    #[must_use]
    pub fn count_event_type(&self, round: RoundToken, event_type: &str) -> usize {
        self.events
            .iter()
            .filter(|e| e.round() == round && e.event_type() == event_type)
            .count()
    }

    /// Get all events for one round.
    #[must_use]
    pub fn events_for_round(&self, round: RoundToken) -> Vec<&RoundEvent> {
        self.events.iter().filter(|e| e.round() == round).collect()
    }

    /// Checksum of event data and ordering, for golden comparison.
    #[must_use]
    pub fn checksum(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for event in &self.events {
            event.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Number of retained events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if no events are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drop every retained event.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Verify round invariants over the retained window.
    ///
    /// Rounds whose `Started` event has been evicted are skipped. Returns a
    /// list of violations; empty means the trace is consistent.
    #[must_use]
    pub fn verify_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();

        // Started tokens strictly increase.
        let mut last_started = RoundToken::NONE;
        for event in &self.events {
            if let RoundEvent::Started { round, .. } = event {
                if *round <= last_started {
                    violations.push(format!(
                        "non-monotonic round token: {round} after {last_started}"
                    ));
                }
                last_started = *round;
            }
        }

        #[derive(Default)]
        struct Tally {
            pending: usize,
            applied: usize,
            completed: usize,
            completed_before_all_applied: bool,
        }

        let mut rounds: HashMap<RoundToken, Tally> = HashMap::new();
        for event in &self.events {
            match event {
                RoundEvent::Started { round, pending } => {
                    rounds.entry(*round).or_default().pending = *pending;
                }
                RoundEvent::Applied { round, .. } => {
                    if let Some(t) = rounds.get_mut(round) {
                        t.applied += 1;
                    }
                }
                RoundEvent::Completed { round, .. } => {
                    if let Some(t) = rounds.get_mut(round) {
                        t.completed += 1;
                        if t.applied < t.pending {
                            t.completed_before_all_applied = true;
                        }
                    }
                }
                _ => {}
            }
        }

        let mut ordered: Vec<_> = rounds.into_iter().collect();
        ordered.sort_by_key(|(round, _)| *round);
        for (round, tally) in ordered {
            if tally.completed > 1 {
                violations.push(format!(
                    "{round} completed {} times",
                    tally.completed
                ));
            }
            if tally.applied > tally.pending {
                violations.push(format!(
                    "{round} applied {} results for {} async conditions",
                    tally.applied, tally.pending
                ));
            }
            if tally.completed_before_all_applied {
                violations.push(format!("{round} completed before all results arrived"));
            }
        }

        violations
    }
}

impl Default for RoundTrace {
    fn default() -> Self {
        Self::with_capacity(256)
    }
}
