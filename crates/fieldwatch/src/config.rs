#![forbid(unsafe_code)]

//! Dispatch configuration for criteria.
//!
//! # Environment Variables
//!
//! [`DispatchConfig::from_env`] starts from the defaults and applies:
//!
//! | Variable | Effect |
//! |---|---|
//! | `FIELDWATCH_RECORD_TRACE` | `1`/`true` enables round event recording |
//! | `FIELDWATCH_TRACE_CAPACITY` | maximum retained round events |
//! | `FIELDWATCH_WORKER_NAME` | prefix for async worker thread names |

use std::env;

/// Default number of round events retained when tracing is enabled.
pub const DEFAULT_TRACE_CAPACITY: usize = 256;

/// Default worker thread name prefix.
pub const DEFAULT_WORKER_NAME: &str = "fieldwatch-async";

/// How a criteria dispatches async conditions and what it records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Prefix for async worker thread names; the condition index is appended.
    pub worker_name: String,
    /// Record a [`RoundTrace`](crate::RoundTrace) of lifecycle events.
    pub record_trace: bool,
    /// Maximum number of retained trace events.
    pub trace_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_name: DEFAULT_WORKER_NAME.to_string(),
            record_trace: false,
            trace_capacity: DEFAULT_TRACE_CAPACITY,
        }
    }
}

impl DispatchConfig {
    /// Defaults overridden by `FIELDWATCH_*` environment variables.
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(val) = lookup("FIELDWATCH_RECORD_TRACE") {
            config.record_trace = val == "1" || val.eq_ignore_ascii_case("true");
        }
        if let Some(val) = lookup("FIELDWATCH_TRACE_CAPACITY")
            && let Ok(n) = val.parse()
        {
            config.trace_capacity = n;
        }
        if let Some(val) = lookup("FIELDWATCH_WORKER_NAME")
            && !val.is_empty()
        {
            config.worker_name = val;
        }
        config
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    /// Enable or disable round event recording.
    #[must_use]
    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.record_trace = enabled;
        self
    }

    /// Set the maximum number of retained trace events.
    #[must_use]
    pub fn with_trace_capacity(mut self, capacity: usize) -> Self {
        self.trace_capacity = capacity;
        self
    }
}
