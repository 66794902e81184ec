#![forbid(unsafe_code)]

//! Stderr breadcrumbs for thread interleavings.
//!
//! With `FIELDWATCH_DEBUG_TRACE=1` (or `true`) every `debug_trace!` line is
//! printed with the milliseconds since the first line and the thread name.
//! Messages carry the round token, so a worker's dispatch can be lined up
//! with the context drain that applies its result. Otherwise a call site
//! costs one static bool read.
//!
//! Structured events for log pipelines go through `tracing`.

use std::sync::LazyLock;
use std::time::Instant;

static DEBUG_TRACE_ENABLED: LazyLock<bool> = LazyLock::new(|| {
    std::env::var("FIELDWATCH_DEBUG_TRACE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
});

static START_TIME: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Whether `FIELDWATCH_DEBUG_TRACE` was set at first use.
#[inline]
pub fn is_enabled() -> bool {
    *DEBUG_TRACE_ENABLED
}

/// Milliseconds since the first traced line.
#[inline]
pub fn elapsed_ms() -> u64 {
    START_TIME.elapsed().as_millis() as u64
}

/// Print a line to stderr when `FIELDWATCH_DEBUG_TRACE` is set.
///
/// ```ignore
/// debug_trace!("async condition {} evaluating for {}", index, round);
/// ```
#[macro_export]
macro_rules! debug_trace {
    ($($arg:tt)*) => {
        if $crate::debug_trace::is_enabled() {
            eprintln!(
                "[fieldwatch {:>8}ms {}] {}",
                $crate::debug_trace::elapsed_ms(),
                ::std::thread::current().name().unwrap_or("?"),
                format_args!($($arg)*)
            );
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_is_monotonic() {
        let a = elapsed_ms();
        let b = elapsed_ms();
        assert!(b >= a);
    }

    #[test]
    fn macro_expands_when_disabled() {
        // Compiles and runs regardless of the env flag.
        crate::debug_trace!("value={}", 42);
        let _ = is_enabled();
    }
}
