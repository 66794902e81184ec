#![forbid(unsafe_code)]

//! Criteria: one subject, many conditions, one verdict per round.
//!
//! A [`Criteria`] owns the subject under test together with its synchronous
//! [`Condition`]s and [`AsyncCondition`]s. [`Criteria::evaluate`] opens a
//! round, dispatches every async condition to its own worker, folds in the
//! synchronous conditions inline, and invokes the completion callback exactly
//! once when the last outcome is known. The verdict is the logical AND of
//! every outcome; there is no short-circuiting, every condition runs.
//!
//! # Round State
//!
//! Round state (completed count, aggregated verdict, pending callback) lives
//! behind one mutex, so completions arriving from worker threads are
//! serialized. Every round has a [`RoundToken`]; results tagged with an older
//! token are discarded. It is reset to `{0, Valid}` as soon as completion
//! fires.
//!
//! # Cancellation
//!
//! [`Criteria::cancel_validation`] withdraws the current round's callback
//! under the round lock, then cancels every async condition. A round is
//! therefore either finished before the cancel or never. Callers should treat
//! "cancelled" and "will never report" as the same thing.
//!
//! With [`Delivery::Inline`] a worker may have taken the callback out just
//! before the cancel; that callback still runs, possibly at the same time as
//! the cancellation hooks.

use std::sync::{Arc, Mutex};

use crate::async_condition::{AsyncCondition, AsyncSlot, Dispatch};
use crate::condition::Condition;
use crate::config::DispatchConfig;
use crate::context::{CoordinationContext, Delivery};
use crate::error::DispatchResult;
use crate::identity::IdentitySet;
use crate::lock_unpoisoned;
use crate::result::ValidationResult;
use crate::trace::{DiscardReason, RoundEvent, RoundToken, RoundTrace};

type OnComplete = Box<dyn FnOnce(ValidationResult) + Send>;

/// Round state shared between a criteria and its in-flight reports.
pub(crate) type SharedRound = Arc<Mutex<RoundState>>;

// ---------------------------------------------------------------------------
// RoundState
// ---------------------------------------------------------------------------

pub(crate) struct RoundState {
    current: RoundToken,
    expected: usize,
    completed: usize,
    aggregate: ValidationResult,
    sync_pending: bool,
    cancelled: bool,
    on_complete: Option<OnComplete>,
    trace: Option<RoundTrace>,
}

/// A round whose callback is ready to run, outside every lock.
pub(crate) struct Finished {
    round: RoundToken,
    result: ValidationResult,
    callback: OnComplete,
}

impl Finished {
    pub(crate) fn fire(self) {
        tracing::debug!(
            round = self.round.raw(),
            result = %self.result,
            "validation round completed"
        );
        (self.callback)(self.result);
    }
}

impl RoundState {
    fn new(config: &DispatchConfig) -> Self {
        Self {
            current: RoundToken::NONE,
            expected: 0,
            completed: 0,
            aggregate: ValidationResult::Valid,
            sync_pending: false,
            cancelled: false,
            on_complete: None,
            trace: config
                .record_trace
                .then(|| RoundTrace::with_capacity(config.trace_capacity)),
        }
    }

    pub(crate) fn record(&mut self, event: RoundEvent) {
        if let Some(trace) = &mut self.trace {
            trace.push(event);
        }
    }

    /// Open a new round, superseding any unfinished one.
    fn begin(&mut self, expected: usize, on_complete: OnComplete) -> RoundToken {
        self.current = self.current.next();
        self.expected = expected;
        self.completed = 0;
        self.aggregate = ValidationResult::Valid;
        self.sync_pending = true;
        self.cancelled = false;
        self.on_complete = Some(on_complete);
        self.record(RoundEvent::Started {
            round: self.current,
            pending: expected,
        });
        self.current
    }

    /// Fold the synchronous verdict of `round` in.
    fn fold_sync(&mut self, round: RoundToken, passed: bool) -> Option<Finished> {
        if round != self.current {
            return None;
        }
        self.aggregate = self.aggregate.and_passed(passed);
        self.sync_pending = false;
        self.try_finish()
    }

    /// Count one async result towards `round`.
    pub(crate) fn apply_async(
        &mut self,
        round: RoundToken,
        condition: usize,
        passed: bool,
    ) -> Result<Option<Finished>, DiscardReason> {
        if round != self.current {
            return Err(DiscardReason::Stale);
        }
        if self.cancelled {
            return Err(DiscardReason::Cancelled);
        }
        if self.on_complete.is_none() {
            return Err(DiscardReason::Stale);
        }
        self.aggregate = self.aggregate.and_passed(passed);
        self.completed += 1;
        self.record(RoundEvent::Applied {
            round,
            condition,
            passed,
        });
        Ok(self.try_finish())
    }

    fn try_finish(&mut self) -> Option<Finished> {
        if self.sync_pending || self.completed < self.expected {
            return None;
        }
        let callback = self.on_complete.take()?;
        let result = self.aggregate;
        self.record(RoundEvent::Completed {
            round: self.current,
            result,
        });
        self.completed = 0;
        self.aggregate = ValidationResult::Valid;
        Some(Finished {
            round: self.current,
            result,
            callback,
        })
    }

    /// Withdraw the current round's callback. Returns `true` if one was
    /// still outstanding.
    fn cancel(&mut self) -> bool {
        self.cancelled = true;
        self.on_complete.take().is_some()
    }

    fn abandon(&mut self, round: RoundToken) {
        if round == self.current {
            self.on_complete = None;
            self.sync_pending = false;
            self.record(RoundEvent::Abandoned { round });
        }
    }
}

// ---------------------------------------------------------------------------
// Criteria
// ---------------------------------------------------------------------------

/// A subject and the conditions it must satisfy.
///
/// # Example
///
/// ```rust
/// use std::sync::mpsc;
/// use fieldwatch::{Criteria, ValidationResult};
///
/// let criteria = Criteria::<str>::new("bananas")
///     .test(|s: &str| s.len() > 3)
///     .test(|s: &str| s.contains("banana"));
///
/// let (tx, rx) = mpsc::channel();
/// criteria.evaluate(move |result| tx.send(result).unwrap()).unwrap();
///
/// // No async conditions: the callback already ran.
/// assert_eq!(rx.try_recv().unwrap(), ValidationResult::Valid);
/// ```
pub struct Criteria<S: ?Sized> {
    subject: Arc<S>,
    conditions: IdentitySet<dyn Condition<S>>,
    async_conditions: Vec<AsyncSlot<S>>,
    round: SharedRound,
    delivery: Delivery,
    config: DispatchConfig,
}

impl<S: ?Sized + Send + Sync + 'static> Criteria<S> {
    /// Create a criteria for `subject` with no conditions.
    ///
    /// Async completions are applied inline on the reporting worker. Use
    /// [`on_context`](Self::on_context) to marshal them to a coordination
    /// context instead.
    pub fn new(subject: impl Into<Arc<S>>) -> Self {
        let config = DispatchConfig::default();
        Self {
            subject: subject.into(),
            conditions: IdentitySet::new(),
            async_conditions: Vec::new(),
            round: Arc::new(Mutex::new(RoundState::new(&config))),
            delivery: Delivery::Inline,
            config,
        }
    }

    /// Replace the dispatch configuration.
    #[must_use]
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        {
            let mut state = lock_unpoisoned(&self.round);
            state.trace = config
                .record_trace
                .then(|| RoundTrace::with_capacity(config.trace_capacity));
        }
        self.config = config;
        self
    }

    /// Choose where async completions are applied.
    #[must_use]
    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Apply async completions (and notify) on `context`'s owner thread.
    #[must_use]
    pub fn on_context(self, context: &CoordinationContext) -> Self {
        self.with_delivery(context.delivery())
    }

    /// Add a synchronous condition.
    #[must_use]
    pub fn test<C: Condition<S> + 'static>(self, condition: C) -> Self {
        self.test_shared(Arc::new(condition))
    }

    /// Add a shared synchronous condition. Adding the same instance twice
    /// has no effect.
    #[must_use]
    pub fn test_shared(mut self, condition: Arc<dyn Condition<S>>) -> Self {
        self.conditions.insert(condition);
        self
    }

    /// Add an asynchronous condition.
    #[must_use]
    pub fn async_test<A: AsyncCondition<S> + 'static>(self, condition: A) -> Self {
        self.async_test_shared(Arc::new(condition))
    }

    /// Add a shared asynchronous condition. Adding the same instance twice
    /// has no effect.
    #[must_use]
    pub fn async_test_shared(mut self, condition: Arc<dyn AsyncCondition<S>>) -> Self {
        let present = self
            .async_conditions
            .iter()
            .any(|slot| std::ptr::addr_eq(Arc::as_ptr(slot.condition()), Arc::as_ptr(&condition)));
        if !present {
            self.async_conditions.push(AsyncSlot::new(condition));
        }
        self
    }

    /// Evaluate every condition and report the aggregated verdict once.
    ///
    /// Async conditions are dispatched first, then the synchronous conditions
    /// run inline. With no async conditions, `on_complete` runs before this
    /// method returns. Otherwise it runs when the last async condition
    /// reports: on the reporting worker for [`Delivery::Inline`], or when
    /// the coordination context is drained for [`Delivery::Context`].
    ///
    /// Calling `evaluate` again before the previous round completed
    /// supersedes it: stale workers are interrupted and the previous callback
    /// is never invoked.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Spawn`](crate::DispatchError::Spawn) if a
    /// worker thread cannot be started. The round is abandoned and
    /// `on_complete` is dropped without being called.
    pub fn evaluate<F>(&self, on_complete: F) -> DispatchResult
    where
        F: FnOnce(ValidationResult) + Send + 'static,
    {
        let round =
            lock_unpoisoned(&self.round).begin(self.async_conditions.len(), Box::new(on_complete));
        tracing::debug!(
            round = round.raw(),
            conditions = self.conditions.len(),
            async_conditions = self.async_conditions.len(),
            "validation round started"
        );

        for (index, slot) in self.async_conditions.iter().enumerate() {
            let dispatch = Dispatch {
                round,
                condition: index,
                subject: Arc::clone(&self.subject),
                shared: Arc::clone(&self.round),
                delivery: self.delivery.clone(),
            };
            if let Err(err) = slot.dispatch(dispatch, &self.config) {
                tracing::warn!(round = round.raw(), error = %err, "abandoning validation round");
                for started in &self.async_conditions[..index] {
                    started.abandon(round);
                }
                lock_unpoisoned(&self.round).abandon(round);
                return Err(err);
            }
        }

        let subject: &S = &self.subject;
        let mut passed = true;
        for condition in &self.conditions {
            passed &= condition.evaluate(subject);
        }

        let finished = lock_unpoisoned(&self.round).fold_sync(round, passed);
        if let Some(finished) = finished {
            finished.fire();
        }
        Ok(())
    }

    /// Cancel every async condition, running each one's cancellation hook.
    ///
    /// The current round's callback is dropped first, so it can no longer
    /// fire. Round counters are left as they are.
    pub fn cancel_validation(&self) {
        let (round, withdrawn) = {
            let mut state = lock_unpoisoned(&self.round);
            (state.current, state.cancel())
        };
        crate::debug_trace!("cancelling {} (callback outstanding: {})", round, withdrawn);
        for (index, slot) in self.async_conditions.iter().enumerate() {
            slot.cancel(index, &self.round);
        }
    }

    /// The subject under test.
    pub fn subject(&self) -> &S {
        &self.subject
    }

    /// Number of distinct synchronous conditions.
    pub fn condition_count(&self) -> usize {
        self.conditions.len()
    }

    /// Number of distinct asynchronous conditions.
    pub fn async_condition_count(&self) -> usize {
        self.async_conditions.len()
    }

    /// Token of the most recently started round.
    pub fn current_round(&self) -> RoundToken {
        lock_unpoisoned(&self.round).current
    }

    /// Returns `true` while the current round's callback has neither fired
    /// nor been withdrawn by a cancel or a failed dispatch.
    pub fn is_pending(&self) -> bool {
        lock_unpoisoned(&self.round).on_complete.is_some()
    }

    /// Number of async conditions whose result is still expected.
    pub fn in_flight_count(&self) -> usize {
        self.async_conditions
            .iter()
            .filter(|slot| slot.is_in_flight())
            .count()
    }

    /// Copy of the round trace, if recording is enabled.
    pub fn trace(&self) -> Option<RoundTrace> {
        lock_unpoisoned(&self.round).trace.clone()
    }

    /// The dispatch configuration in use.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }
}

impl<S: ?Sized> std::fmt::Debug for Criteria<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Criteria")
            .field("conditions", &self.conditions.len())
            .field("async_conditions", &self.async_conditions.len())
            .field("delivery", &self.delivery)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Completion;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    fn collect() -> (
        impl FnOnce(ValidationResult) + Send + 'static,
        mpsc::Receiver<ValidationResult>,
    ) {
        let (tx, rx) = mpsc::channel();
        (
            move |result| {
                let _ = tx.send(result);
            },
            rx,
        )
    }

    /// Reports `passed` immediately.
    struct Instant(bool);

    impl AsyncCondition<str> for Instant {
        fn evaluate(&self, _: &str, completion: Completion) {
            completion.complete(self.0);
        }
    }

    #[test]
    fn no_conditions_is_valid_synchronously() {
        let criteria = Criteria::<str>::new("anything");
        let (done, rx) = collect();
        criteria.evaluate(done).unwrap();
        assert_eq!(rx.try_recv().unwrap(), ValidationResult::Valid);
        assert!(!criteria.is_pending());
    }

    #[test]
    fn sync_conditions_are_anded() {
        let criteria = Criteria::<str>::new("kiwi")
            .test(|_: &str| true)
            .test(|_: &str| false)
            .test(|_: &str| true);
        let (done, rx) = collect();
        criteria.evaluate(done).unwrap();
        assert_eq!(rx.try_recv().unwrap(), ValidationResult::Invalid);
    }

    #[test]
    fn every_sync_condition_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut criteria = Criteria::<str>::new("x");
        for passed in [false, true, false] {
            let calls = Arc::clone(&calls);
            criteria = criteria.test(move |_: &str| {
                calls.fetch_add(1, Ordering::SeqCst);
                passed
            });
        }
        criteria.evaluate(|_| {}).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn distinct_conditions_are_counted_separately() {
        let criteria = Criteria::<str>::new("x")
            .test(|_: &str| true)
            .test(|_: &str| true)
            .test(|_: &str| true);
        assert_eq!(criteria.condition_count(), 3);
    }

    #[test]
    fn shared_condition_added_twice_collapses() {
        let shared: Arc<dyn Condition<str>> = Arc::new(|_: &str| true);
        let criteria = Criteria::<str>::new("x")
            .test_shared(Arc::clone(&shared))
            .test_shared(shared);
        assert_eq!(criteria.condition_count(), 1);

        let async_shared: Arc<dyn AsyncCondition<str>> = Arc::new(Instant(true));
        let criteria = criteria
            .async_test_shared(Arc::clone(&async_shared))
            .async_test_shared(async_shared)
            .async_test(Instant(true));
        assert_eq!(criteria.async_condition_count(), 2);
    }

    #[test]
    fn inline_async_results_are_combined_with_sync() {
        let criteria = Criteria::<str>::new("x")
            .test(|_: &str| false)
            .async_test(Instant(true));
        let (done, rx) = collect();
        criteria.evaluate(done).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            ValidationResult::Invalid
        );
    }

    #[test]
    fn subject_and_rounds_are_exposed() {
        let criteria = Criteria::<str>::new("kiwi");
        assert_eq!(criteria.subject(), "kiwi");
        assert!(criteria.current_round().is_none());
        criteria.evaluate(|_| {}).unwrap();
        criteria.evaluate(|_| {}).unwrap();
        assert_eq!(criteria.current_round().raw(), 2);
    }

    #[test]
    fn trace_is_off_by_default() {
        let criteria = Criteria::<str>::new("x");
        assert!(criteria.trace().is_none());
        let criteria = criteria.with_config(DispatchConfig::default().with_trace(true));
        criteria.evaluate(|_| {}).unwrap();
        let trace = criteria.trace().unwrap();
        assert!(trace.contains_event_type(RoundToken::from_raw(1), "completed"));
    }

    #[test]
    fn round_state_fires_once() {
        let mut state = RoundState::new(&DispatchConfig::default().with_trace(true));
        let round = state.begin(2, Box::new(|_: ValidationResult| {}));
        assert!(state.apply_async(round, 0, true).unwrap().is_none());
        assert!(state.apply_async(round, 1, false).unwrap().is_none());
        let finished = state.fold_sync(round, true).unwrap();
        assert_eq!(finished.result, ValidationResult::Invalid);
        finished.fire();
        assert_eq!(state.completed, 0);
        assert_eq!(state.aggregate, ValidationResult::Valid);
        assert_eq!(
            state.apply_async(round, 1, true).err(),
            Some(DiscardReason::Stale)
        );
        assert!(state.trace.unwrap().verify_invariants().is_empty());
    }

    #[test]
    fn results_for_old_rounds_are_stale() {
        let mut state = RoundState::new(&DispatchConfig::default());
        let first = state.begin(1, Box::new(|_: ValidationResult| {}));
        let second = state.begin(1, Box::new(|_: ValidationResult| {}));
        assert_eq!(
            state.apply_async(first, 0, true).err(),
            Some(DiscardReason::Stale)
        );
        assert!(state.fold_sync(first, true).is_none());
        assert!(state.fold_sync(second, true).is_none());
        assert!(state.apply_async(second, 0, true).unwrap().is_some());
    }

    #[test]
    fn cancelled_round_rejects_results_and_never_fires() {
        let mut state = RoundState::new(&DispatchConfig::default());
        let round = state.begin(1, Box::new(|_: ValidationResult| panic!("cancelled round fired")));
        assert!(state.cancel());
        assert!(!state.cancel());
        assert_eq!(
            state.apply_async(round, 0, true).err(),
            Some(DiscardReason::Cancelled)
        );
        assert!(state.fold_sync(round, true).is_none());

        let next = state.begin(1, Box::new(|_: ValidationResult| {}));
        assert!(state.apply_async(next, 0, true).unwrap().is_none());
        assert!(state.fold_sync(next, true).is_some());
    }

    #[test]
    fn abandoned_round_never_fires() {
        let mut state = RoundState::new(&DispatchConfig::default());
        let round = state.begin(1, Box::new(|_: ValidationResult| panic!("abandoned round fired")));
        state.abandon(round);
        assert!(
            state
                .apply_async(round, 0, true)
                .err()
                .is_some_and(|r| r == DiscardReason::Stale)
        );
    }
}
