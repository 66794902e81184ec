#![forbid(unsafe_code)]

//! Asynchronous conditions and their worker lifecycle.
//!
//! An [`AsyncCondition`] is a check that needs to wait on something slow,
//! such as a remote lookup. Each dispatch runs the condition's
//! [`evaluate`](AsyncCondition::evaluate) on a dedicated worker thread and
//! hands it a one-shot [`Completion`] to report through.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──dispatch──▶ Running ──complete──▶ Completed ──dispatch──▶ Running …
//!                       │
//!                       ├──cancel──▶ Cancelled ──dispatch──▶ Running …
//!                       └──dispatch──▶ Running (stale worker interrupted)
//! ```
//!
//! A new dispatch always supersedes an unfinished one: the stale worker is
//! interrupted and whatever it reports later is discarded. A cancelled
//! condition never counts towards its round.
//!
//! # Failure Modes
//!
//! If `evaluate` returns (or panics) without calling
//! [`Completion::complete`], its round never completes and no observer is
//! notified. There is no timeout; every exit path of a condition body must
//! report. A `warn` event is logged when a non-cancelled completion is
//! dropped unreported.

use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use crate::config::DispatchConfig;
use crate::context::Delivery;
use crate::criteria::SharedRound;
use crate::error::{DispatchError, DispatchResult};
use crate::interrupt::{InterruptSignal, InterruptTrigger};
use crate::trace::{DiscardReason, RoundEvent, RoundToken};
use crate::lock_unpoisoned;

/// A condition whose outcome is reported later, from a worker thread.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use fieldwatch::{AsyncCondition, Completion};
///
/// struct NotTaken;
///
/// impl AsyncCondition<str> for NotTaken {
///     fn evaluate(&self, name: &str, completion: Completion) {
///         // Simulated lookup; bail out early if cancelled.
///         if completion.interrupt().wait_timeout(Duration::from_millis(50)) {
///             return;
///         }
///         completion.complete(name != "taken");
///     }
/// }
/// ```
pub trait AsyncCondition<S: ?Sized>: Send + Sync {
    /// Test the subject and report through `completion`.
    ///
    /// Runs on a worker thread of its own. Must eventually call
    /// [`Completion::complete`] unless the completion is cancelled.
    fn evaluate(&self, subject: &S, completion: Completion);

    /// Called on the cancelling thread after the condition was cancelled.
    ///
    /// Use this to reset state that depends on the pending result.
    fn on_cancelled(&self) {}
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// One-shot handle for reporting an async condition's outcome.
///
/// Reporting consumes the handle, so a condition can report at most once per
/// dispatch.
pub struct Completion {
    report: Option<Report>,
    round: RoundToken,
    condition: usize,
    interrupt: InterruptSignal,
    origin: ThreadId,
}

impl Completion {
    /// Report whether the condition passed.
    ///
    /// The result is applied to the round unless the condition was cancelled
    /// or a newer round started in the meantime.
    pub fn complete(mut self, passed: bool) {
        if let Some(report) = self.report.take() {
            tracing::trace!(
                round = self.round.raw(),
                condition = self.condition,
                passed,
                "async condition reported"
            );
            report.deliver(passed);
        }
    }

    /// Returns `true` once the dispatch has been cancelled or superseded.
    ///
    /// Reporting after this point is harmless but the result is discarded.
    pub fn is_cancelled(&self) -> bool {
        self.interrupt.is_interrupted()
    }

    /// The interrupt signal for this dispatch, for interruptible waits.
    pub fn interrupt(&self) -> &InterruptSignal {
        &self.interrupt
    }

    /// The round this dispatch belongs to.
    pub fn round(&self) -> RoundToken {
        self.round
    }

    /// Index of the condition within its criteria.
    pub fn condition(&self) -> usize {
        self.condition
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        // Dropped on the dispatching thread means the worker never started.
        if self.report.is_some()
            && !self.interrupt.is_interrupted()
            && thread::current().id() != self.origin
        {
            tracing::warn!(
                round = self.round.raw(),
                condition = self.condition,
                "async condition finished without reporting; round will never complete"
            );
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("round", &self.round)
            .field("condition", &self.condition)
            .field("reported", &self.report.is_none())
            .finish()
    }
}

/// Routing data for one reported result.
struct Report {
    round: RoundToken,
    condition: usize,
    slot: Arc<Mutex<SlotState>>,
    shared: SharedRound,
    delivery: Delivery,
}

impl Report {
    fn deliver(self, passed: bool) {
        match self.delivery.clone() {
            Delivery::Inline => self.apply(passed),
            Delivery::Context(handle) => {
                let (round, condition) = (self.round, self.condition);
                let posted = handle.post(move || {
                    crate::debug_trace!("context applying condition {} for {}", condition, round);
                    self.apply(passed);
                });
                if !posted {
                    tracing::warn!(
                        round = round.raw(),
                        condition,
                        "coordination context is gone; async result dropped"
                    );
                }
            }
        }
    }

    /// Check the slot and count the result in one critical section.
    ///
    /// Both locks are held together (slot, then round) so a concurrent
    /// [`AsyncSlot::cancel`] either sees the result already counted or makes
    /// it discarded.
    fn apply(self, passed: bool) {
        let finished = {
            let mut slot = lock_unpoisoned(&self.slot);
            let mut state = lock_unpoisoned(&self.shared);
            let accepted = if slot.cancelled {
                Err(DiscardReason::Cancelled)
            } else if slot.armed != Some(self.round) {
                Err(DiscardReason::Stale)
            } else {
                slot.armed = None;
                state.apply_async(self.round, self.condition, passed)
            };
            match accepted {
                Ok(finished) => finished,
                Err(reason) => {
                    state.record(RoundEvent::Discarded {
                        round: self.round,
                        condition: self.condition,
                        reason,
                    });
                    tracing::debug!(
                        round = self.round.raw(),
                        condition = self.condition,
                        ?reason,
                        "async result discarded"
                    );
                    None
                }
            }
        };

        if let Some(finished) = finished {
            finished.fire();
        }
    }
}

// ---------------------------------------------------------------------------
// AsyncSlot
// ---------------------------------------------------------------------------

/// Per-condition dispatch state, shared with in-flight reports.
#[derive(Default)]
pub(crate) struct SlotState {
    /// Round the condition is expected to report for; `None` once reported,
    /// cancelled or never dispatched.
    armed: Option<RoundToken>,
    cancelled: bool,
    worker: Option<Worker>,
}

struct Worker {
    round: RoundToken,
    trigger: InterruptTrigger,
}

/// Everything a slot needs to start one dispatch.
pub(crate) struct Dispatch<S: ?Sized> {
    pub(crate) round: RoundToken,
    pub(crate) condition: usize,
    pub(crate) subject: Arc<S>,
    pub(crate) shared: SharedRound,
    pub(crate) delivery: Delivery,
}

/// An async condition registered with a criteria.
pub(crate) struct AsyncSlot<S: ?Sized> {
    condition: Arc<dyn AsyncCondition<S>>,
    state: Arc<Mutex<SlotState>>,
}

impl<S: ?Sized + Send + Sync + 'static> AsyncSlot<S> {
    pub(crate) fn new(condition: Arc<dyn AsyncCondition<S>>) -> Self {
        Self {
            condition,
            state: Arc::new(Mutex::new(SlotState::default())),
        }
    }

    pub(crate) fn condition(&self) -> &Arc<dyn AsyncCondition<S>> {
        &self.condition
    }

    /// Returns `true` while a dispatched result is still expected.
    pub(crate) fn is_in_flight(&self) -> bool {
        lock_unpoisoned(&self.state).armed.is_some()
    }

    /// Start `condition.evaluate` on a fresh worker for `dispatch.round`.
    ///
    /// A still-running worker from an earlier round is interrupted first.
    pub(crate) fn dispatch(&self, dispatch: Dispatch<S>, config: &DispatchConfig) -> DispatchResult {
        let Dispatch {
            round,
            condition: index,
            subject,
            shared,
            delivery,
        } = dispatch;

        let mut slot = lock_unpoisoned(&self.state);
        if let Some(stale) = slot.worker.take() {
            stale.trigger.interrupt();
            if slot.armed.is_some() {
                lock_unpoisoned(&shared).record(RoundEvent::Superseded {
                    round: stale.round,
                    condition: index,
                    superseded_by: round,
                });
                tracing::debug!(
                    round = stale.round.raw(),
                    superseded_by = round.raw(),
                    condition = index,
                    "interrupting superseded async condition"
                );
            }
        }
        slot.cancelled = false;
        slot.armed = Some(round);
        lock_unpoisoned(&shared).record(RoundEvent::Dispatched {
            round,
            condition: index,
        });

        let (signal, trigger) = InterruptSignal::new();
        let completion = Completion {
            report: Some(Report {
                round,
                condition: index,
                slot: Arc::clone(&self.state),
                shared: Arc::clone(&shared),
                delivery,
            }),
            round,
            condition: index,
            interrupt: signal,
            origin: thread::current().id(),
        };
        let condition = Arc::clone(&self.condition);

        let spawned = thread::Builder::new()
            .name(format!("{}-{index}", config.worker_name))
            .spawn(move || {
                crate::debug_trace!("async condition {} evaluating for {}", index, round);
                condition.evaluate(&*subject, completion);
                crate::debug_trace!("async condition {} body returned", index);
            });

        match spawned {
            Ok(_detached) => {
                slot.worker = Some(Worker { round, trigger });
                Ok(())
            }
            Err(source) => {
                slot.armed = None;
                Err(DispatchError::Spawn {
                    condition: index,
                    source,
                })
            }
        }
    }

    /// Cancel the condition and run its cancellation hook.
    ///
    /// The hook runs even if nothing was in flight.
    pub(crate) fn cancel(&self, index: usize, shared: &SharedRound) {
        let round = {
            let mut slot = lock_unpoisoned(&self.state);
            slot.cancelled = true;
            if let Some(worker) = slot.worker.take() {
                worker.trigger.interrupt();
            }
            slot.armed.take().unwrap_or(RoundToken::NONE)
        };

        lock_unpoisoned(shared).record(RoundEvent::Cancelled {
            round,
            condition: index,
        });
        tracing::debug!(round = round.raw(), condition = index, "async condition cancelled");

        self.condition.on_cancelled();
    }

    /// Drop interest in `round` without running the cancellation hook.
    pub(crate) fn abandon(&self, round: RoundToken) {
        let mut slot = lock_unpoisoned(&self.state);
        if slot.armed == Some(round) {
            slot.armed = None;
            if let Some(worker) = slot.worker.take() {
                worker.trigger.interrupt();
            }
        }
    }
}
