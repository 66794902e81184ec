#![forbid(unsafe_code)]

//! The coordination context that owns round state updates.
//!
//! Async conditions run on their own worker threads, but the host usually
//! wants verdicts (and therefore observer callbacks) delivered on one thread,
//! typically its UI or event loop. A [`CoordinationContext`] is that thread's
//! job queue: workers post completions through a [`ContextHandle`], and the
//! owner drains them with [`run_pending`](CoordinationContext::run_pending),
//! [`run_for`](CoordinationContext::run_for) or
//! [`run_until`](CoordinationContext::run_until).
//!
//! Criteria that are not bound to a context use [`Delivery::Inline`]: the
//! completion is applied on the worker thread under the criteria's round lock
//! and observers are notified from that worker.

use std::fmt;
use std::sync::mpsc;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send>;

/// Where async completions are applied.
#[derive(Clone, Default)]
pub enum Delivery {
    /// Apply on the reporting worker thread, serialized by the round lock.
    #[default]
    Inline,
    /// Marshal to a coordination context and apply when its owner drains it.
    Context(ContextHandle),
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => f.write_str("Inline"),
            Self::Context(_) => f.write_str("Context"),
        }
    }
}

/// A single-consumer job queue drained by the thread that owns it.
pub struct CoordinationContext {
    sender: mpsc::Sender<Job>,
    receiver: mpsc::Receiver<Job>,
}

impl CoordinationContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver }
    }

    /// A handle that worker threads can post to.
    #[must_use]
    pub fn handle(&self) -> ContextHandle {
        ContextHandle {
            sender: self.sender.clone(),
        }
    }

    /// Delivery mode that routes completions to this context.
    #[must_use]
    pub fn delivery(&self) -> Delivery {
        Delivery::Context(self.handle())
    }

    /// Run every job that is already queued. Never blocks.
    ///
    /// Returns the number of jobs run.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            ran += 1;
        }
        if ran > 0 {
            crate::debug_trace!("context drained {} job(s)", ran);
        }
        ran
    }

    /// Run jobs as they arrive until `duration` has elapsed.
    ///
    /// Returns the number of jobs run.
    pub fn run_for(&self, duration: Duration) -> usize {
        let deadline = Instant::now() + duration;
        let mut ran = 0;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match self.receiver.recv_timeout(deadline - now) {
                Ok(job) => {
                    job();
                    ran += 1;
                }
                Err(_) => break,
            }
        }
        ran + self.run_pending()
    }

    /// Run jobs until `done` returns `true` or `timeout` elapses.
    ///
    /// `done` is checked before waiting and after every job. Returns the
    /// final value of `done`.
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            match self.receiver.recv_timeout(deadline - now) {
                Ok(job) => job(),
                Err(mpsc::RecvTimeoutError::Timeout) => return done(),
                Err(mpsc::RecvTimeoutError::Disconnected) => return done(),
            }
        }
    }
}

impl Default for CoordinationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CoordinationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinationContext").finish_non_exhaustive()
    }
}

/// Cloneable, thread-safe handle for posting jobs to a [`CoordinationContext`].
#[derive(Clone)]
pub struct ContextHandle {
    sender: mpsc::Sender<Job>,
}

impl ContextHandle {
    /// Queue `job` to run on the context's owner thread.
    ///
    /// Returns `false` if the context has been dropped; the job is discarded.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.sender.send(Box::new(job)).is_ok()
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn run_pending_runs_queued_jobs_in_order() {
        let ctx = CoordinationContext::new();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = Arc::clone(&log);
            assert!(ctx.handle().post(move || log.lock().unwrap().push(i)));
        }
        assert_eq!(ctx.run_pending(), 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(ctx.run_pending(), 0);
    }

    #[test]
    fn jobs_posted_from_worker_run_on_owner_thread() {
        let ctx = CoordinationContext::new();
        let handle = ctx.handle();
        let owner = thread::current().id();
        let ran_on = Arc::new(std::sync::Mutex::new(None));
        let ran_on_job = Arc::clone(&ran_on);

        thread::spawn(move || {
            handle.post(move || {
                *ran_on_job.lock().unwrap() = Some(thread::current().id());
            });
        })
        .join()
        .unwrap();

        assert!(ctx.run_until(Duration::from_secs(5), || ran_on.lock().unwrap().is_some()));
        assert_eq!(*ran_on.lock().unwrap(), Some(owner));
    }

    #[test]
    fn run_until_times_out() {
        let ctx = CoordinationContext::new();
        let start = Instant::now();
        assert!(!ctx.run_until(Duration::from_millis(20), || false));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn run_for_picks_up_late_jobs() {
        let ctx = CoordinationContext::new();
        let handle = ctx.handle();
        let count = Arc::new(AtomicUsize::new(0));
        let count_job = Arc::clone(&count);
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            handle.post(move || {
                count_job.fetch_add(1, Ordering::SeqCst);
            });
        });
        ctx.run_for(Duration::from_millis(200));
        worker.join().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn post_fails_after_context_dropped() {
        let ctx = CoordinationContext::new();
        let handle = ctx.handle();
        drop(ctx);
        assert!(!handle.post(|| {}));
    }
}
