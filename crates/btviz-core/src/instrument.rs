//! In-process instrumentation entry point.
//!
//! Host Rust code that wants to trace itself calls `capture_step!` with the
//! run's [`TraceCollector`](crate::TraceCollector) as the first argument,
//! followed by the action tag, a narration string, and any number of
//! alternating key/value pairs:
//!
//! ```
//! use btviz_core::{capture_step, TraceCollector};
//!
//! let mut run = TraceCollector::new();
//! let nums = vec![1, 2, 3];
//! capture_step!(run, "swap", "swap nums[0] and nums[2]", "nums", nums.clone(), "i", 2);
//! capture_step!(run, "base_case", "done");
//! assert_eq!(run.steps()[1].sequence, 2);
//! ```
//!
//! Each call appends exactly one step and returns its sequence number.
//! Snippets compiled by the trace pipeline use the `btviz_trace` support
//! crate instead, which has the same argument contract minus the collector.

/// Records one step into an explicit collector. See the [module docs](self).
#[macro_export]
macro_rules! capture_step {
    ($collector:expr, $action:expr, $details:expr $(, $key:expr, $value:expr)*) => {{
        let vars: ::std::vec::Vec<(::std::string::String, $crate::TraceValue)> =
            ::std::vec![$((::std::string::String::from($key), $crate::TraceValue::from($value))),*];
        $collector.capture_step($action, $details, vars)
    }};
}
