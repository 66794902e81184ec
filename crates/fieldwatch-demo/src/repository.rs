#![forbid(unsafe_code)]

//! A mock user repository with artificial latency.
//!
//! Lookups wait a pseudo-random delay to stand in for a remote service. The
//! delay is drawn from a seeded xorshift generator so scripted runs are
//! reproducible.

use std::ops::Range;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use fieldwatch::InterruptSignal;

/// Usernames that already exist.
pub const EXISTING_USERS: [&str; 4] = ["realkiwi", "happyorange", "iceapple", "coolblueberry"];

/// Default lookup latency range in milliseconds.
pub const DEFAULT_LATENCY_MS: Range<u64> = 300..1500;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
}

/// Deterministic xorshift64 generator.
#[derive(Debug)]
struct SeededRng {
    state: u64,
}

impl SeededRng {
    fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_add(1).max(1),
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    fn next_range(&mut self, range: &Range<u64>) -> u64 {
        if range.end <= range.start {
            return range.start;
        }
        range.start + self.next_u64() % (range.end - range.start)
    }
}

/// In-memory user store with interruptible, delayed lookups.
#[derive(Debug)]
pub struct UserRepository {
    users: Vec<User>,
    latency_ms: Range<u64>,
    rng: Mutex<SeededRng>,
}

impl UserRepository {
    /// Repository holding [`EXISTING_USERS`].
    #[must_use]
    pub fn new(latency_ms: Range<u64>, seed: u64) -> Self {
        Self::with_users(EXISTING_USERS, latency_ms, seed)
    }

    /// Repository holding `users`.
    pub fn with_users<I, N>(users: I, latency_ms: Range<u64>, seed: u64) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self {
            users: users
                .into_iter()
                .map(|name| User { name: name.into() })
                .collect(),
            latency_ms,
            rng: Mutex::new(SeededRng::new(seed)),
        }
    }

    /// Find a user by name, ignoring ASCII case. Returns immediately.
    #[must_use]
    pub fn find_user(&self, name: &str) -> Option<User> {
        self.users
            .iter()
            .find(|user| user.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Look `name` up after a simulated network delay.
    ///
    /// Blocks the calling thread. If `interrupt` fires during the delay the
    /// lookup is abandoned and `on_retrieved` is never called.
    pub fn get_user(
        &self,
        name: &str,
        interrupt: &InterruptSignal,
        on_retrieved: impl FnOnce(Option<User>),
    ) {
        let delay = self.next_latency();
        tracing::trace!(name, delay_ms = delay.as_millis() as u64, "user lookup");
        if interrupt.wait_timeout(delay) {
            tracing::debug!(name, "user lookup interrupted");
            return;
        }
        on_retrieved(self.find_user(name));
    }

    /// Draw the next lookup delay.
    pub fn next_latency(&self) -> Duration {
        let ms = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_range(&self.latency_ms);
        Duration::from_millis(ms)
    }
}

impl Default for UserRepository {
    fn default() -> Self {
        Self::new(DEFAULT_LATENCY_MS, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let repo = UserRepository::default();
        assert_eq!(
            repo.find_user("RealKiwi"),
            Some(User {
                name: "realkiwi".into()
            })
        );
        assert!(repo.find_user("realkiwis").is_none());
        assert!(repo.find_user("").is_none());
    }

    #[test]
    fn latency_stays_in_range() {
        let repo = UserRepository::new(10..20, 7);
        for _ in 0..100 {
            let ms = repo.next_latency().as_millis() as u64;
            assert!((10..20).contains(&ms), "latency {ms} out of range");
        }
    }

    #[test]
    fn same_seed_same_latencies() {
        let a = UserRepository::new(DEFAULT_LATENCY_MS, 42);
        let b = UserRepository::new(DEFAULT_LATENCY_MS, 42);
        for _ in 0..10 {
            assert_eq!(a.next_latency(), b.next_latency());
        }
    }

    #[test]
    fn empty_range_is_fixed_latency() {
        let repo = UserRepository::new(5..5, 0);
        assert_eq!(repo.next_latency(), Duration::from_millis(5));
    }

    #[test]
    fn xorshift_never_yields_zero() {
        for seed in [0, 1, u64::MAX] {
            let mut rng = SeededRng::new(seed);
            for _ in 0..1000 {
                assert_ne!(rng.next_u64(), 0);
            }
        }
    }
}
