//! # otrace
//!
//! In-process timeline tracer: annotate scopes, instants, counters, flows
//! and frames; flush everything as a single Chrome Trace Event JSON
//! document readable by Perfetto and `chrome://tracing`.
//!
//! Events are appended to per-thread lock-free ring buffers and published
//! with a per-slot commit flag, so producers never block and never
//! allocate past their buffer's creation. A flush pauses emission, copies
//! every committed slot, orders the snapshot by `(timestamp, thread,
//! sequence)`, optionally synthesizes derived tracks (fps, counter rates,
//! latency percentiles), and writes the document with optional rotation
//! and gzip.
//!
//! ```no_run
//! otrace::set_process_name("my-app");
//! {
//!     let _s = otrace::scope("startup", None);
//!     otrace::instant("config_loaded", Some("init"));
//! }
//! otrace::counter("queue_len", None, &[("queue_len", 3.0)]);
//! otrace::flush(None);
//! ```
//!
//! The tracer is a best-effort observer: overflow overwrites the oldest
//! events, oversized strings truncate, and flush failures degrade to log
//! lines. Nothing here is async-signal-safe.
//!
//! Cargo features: `enabled` (default; without it the whole API compiles
//! to no-ops), `on-exit` (default; final flush at process exit, registered
//! on first use so it runs before exit hooks installed later), `gzip`
//! (compress `.gz` outputs), `heap` (allocation accounting via
//! [`TracingAllocator`]).
//!
//! Environment, read once on first use: `OTRACE_DISABLE=1`,
//! `OTRACE_ENABLE=1` (wins when both are set), `OTRACE_SAMPLE=<float>`.

#[cfg(feature = "enabled")]
mod clock;
#[cfg(feature = "enabled")]
mod collect;
#[cfg(feature = "enabled")]
mod control;
#[cfg(feature = "enabled")]
mod emit;
#[cfg(feature = "enabled")]
mod error;
#[cfg(feature = "enabled")]
mod event;
#[cfg(feature = "enabled")]
mod gate;
#[cfg(feature = "heap")]
mod heap;
#[cfg(feature = "enabled")]
mod output;
#[cfg(feature = "enabled")]
mod registry;
#[cfg(feature = "enabled")]
mod ring;
#[cfg(feature = "enabled")]
mod scope;
#[cfg(feature = "enabled")]
mod synth;
#[cfg(feature = "enabled")]
mod writer;

#[cfg(feature = "enabled")]
pub use control::{
    clear_filter, configure_synth, disable, disable_categories, enable, enable_categories,
    enable_synthetic_tracks, is_enabled, set_clock_source, set_filter, set_output_path,
    set_output_pattern, set_sampling, touch,
};
#[cfg(feature = "enabled")]
pub use emit::{
    begin, complete, counter, end, flow_begin, flow_end, flow_step, instant, instant_kvs,
    mark_frame, mark_frame_labeled, set_next_color, set_process_name, set_thread_name,
    set_thread_sort_index,
};
#[cfg(feature = "enabled")]
pub use error::{Error, Result};
#[cfg(feature = "enabled")]
pub use event::{MAX_ARGS, MAX_CAT, MAX_NAME, THREAD_BUFFER_EVENTS};
#[cfg(feature = "enabled")]
pub use output::flush;
#[cfg(feature = "enabled")]
pub use scope::{scope, scope_with, zone, ScopeGuard};

#[cfg(feature = "heap")]
pub use heap::{
    heap_enable, heap_report, heap_set_sampling, heap_set_stack_capture, TracingAllocator,
};

#[cfg(not(feature = "enabled"))]
mod noop;
#[cfg(not(feature = "enabled"))]
pub use noop::*;

/// A key's value in an event's argument list.
#[derive(Debug, Clone, Copy)]
pub enum ArgValue<'a> {
    Number(f64),
    Str(&'a str),
}

impl<'a> From<&'a str> for ArgValue<'a> {
    fn from(value: &'a str) -> Self {
        ArgValue::Str(value)
    }
}

impl From<bool> for ArgValue<'static> {
    fn from(value: bool) -> Self {
        ArgValue::Number(if value { 1.0 } else { 0.0 })
    }
}

macro_rules! numeric_arg_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for ArgValue<'static> {
                fn from(value: $ty) -> Self {
                    ArgValue::Number(value as f64)
                }
            }
        )*
    };
}

numeric_arg_value!(f64, f32, i64, i32, i16, u64, u32, u16, usize, isize);

/// Timestamp source, selectable before the first timestamp is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    /// Monotonic OS clock; the default.
    Steady,
    /// CPU cycle counter, calibrated once against the steady clock;
    /// falls back to the steady clock off x86-64.
    CycleCounter,
    /// Wall clock; may jump under NTP or manual adjustment.
    Wall,
}

/// User admission predicate, the last gate before an event is recorded.
pub trait Filter: Send + Sync {
    fn allow(&self, name: &str, cat: &str) -> bool;
}

impl<F> Filter for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn allow(&self, name: &str, cat: &str) -> bool {
        self(name, cat)
    }
}

/// Times the rest of the enclosing block as a complete slice.
#[macro_export]
macro_rules! trace_scope {
    ($name:expr) => {
        let _otrace_scope = $crate::scope($name, ::core::option::Option::None);
    };
    ($name:expr, $cat:expr) => {
        let _otrace_scope = $crate::scope($name, ::core::option::Option::Some($cat));
    };
}

/// Times the rest of the enclosing block in the `"zone"` category.
#[macro_export]
macro_rules! trace_zone {
    ($name:expr) => {
        let _otrace_zone = $crate::zone($name);
    };
}

/// Records a point-in-time marker.
#[macro_export]
macro_rules! trace_instant {
    ($name:expr) => {
        $crate::instant($name, ::core::option::Option::None)
    };
    ($name:expr, $cat:expr) => {
        $crate::instant($name, ::core::option::Option::Some($cat))
    };
}

/// Records a single-series counter sample.
#[macro_export]
macro_rules! trace_counter {
    ($name:expr, $value:expr) => {{
        let name = $name;
        $crate::counter(name, ::core::option::Option::None, &[(name, ($value) as f64)])
    }};
}

/// Marks a frame boundary for the fps track.
#[macro_export]
macro_rules! trace_mark_frame {
    ($index:expr) => {
        $crate::mark_frame(($index) as u64)
    };
}
