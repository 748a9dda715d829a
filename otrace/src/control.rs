//! Runtime configuration of the process-wide tracer.
//!
//! Configuration records are swapped whole; emits racing a change see
//! either the old or the new record, never a torn one. Changes during a
//! flush take effect for subsequent emits only.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::registry::registry;
use crate::{clock, gate, synth, ClockSource, Filter};

/// Turns event capture on.
pub fn enable() {
    registry().set_enabled(true);
}

/// Turns event capture off; annotations become no-ops until re-enabled.
pub fn disable() {
    registry().set_enabled(false);
}

pub fn is_enabled() -> bool {
    registry().enabled()
}

/// Forces first-use initialization: environment bootstrap and, with the
/// `on-exit` feature, registration of the final flush.
pub fn touch() {
    let _ = registry();
}

/// Selects the timestamp source. Only effective before the first timestamp
/// is taken anywhere in the process.
pub fn set_clock_source(source: ClockSource) {
    clock::set_source(source);
}

/// Sends subsequent flushes to a single file, replacing any rotation
/// pattern.
pub fn set_output_path(path: impl AsRef<Path>) {
    let path = path.as_ref().to_path_buf();
    registry().update_output(|output| {
        output.path = path;
        output.pattern = None;
    });
}

/// Rotates output across `max_files` files named by `pattern` (printf-style
/// `%u`/`%d` index field; `-NNNNNN` appended when absent). `max_size_mb` is
/// advisory. An empty `pattern` restores single-file mode, flushing to the
/// configured output path again.
pub fn set_output_pattern(pattern: &str, max_size_mb: u32, max_files: u32) {
    let reg = registry();
    reg.update_output(|output| {
        output.pattern = if pattern.is_empty() {
            None
        } else {
            Some(pattern.to_string())
        };
        output.max_size_mb = max_size_mb;
        output.max_files = max_files.max(1);
    });
    reg.rotation_index.store(0, Ordering::Relaxed);
}

/// Installs a user predicate; events it rejects are dropped.
pub fn set_filter(filter: impl Filter + 'static) {
    registry().update_gate(|g| g.filter = Some(Arc::new(filter)));
}

pub fn clear_filter() {
    registry().update_gate(|g| g.filter = None);
}

/// Keeps only events whose category appears in the CSV; an empty string
/// deactivates the list.
pub fn enable_categories(csv: &str) {
    registry().update_gate(|g| g.allow = gate::parse_csv(csv));
}

/// Drops events whose category appears in the CSV; an empty string
/// deactivates the list.
pub fn disable_categories(csv: &str) {
    registry().update_gate(|g| g.deny = gate::parse_csv(csv));
}

/// Sets the probabilistic keep gate; clamped to `[0, 1]`.
pub fn set_sampling(p: f64) {
    registry().update_gate(|g| g.keep_probability = p.clamp(0.0, 1.0));
}

/// Turns flush-time derived tracks (fps, counter rates, latency
/// percentiles) on or off.
pub fn enable_synthetic_tracks(on: bool) {
    registry().set_synth_enabled(on);
}

/// Configures the derived tracks: trailing rate window in microseconds and
/// percentile labels in the `"p50,p95,p99"` form.
pub fn configure_synth(rate_window_us: u64, percentiles: &str) {
    registry().synth.store(Arc::new(synth::SynthConfig {
        rate_window_us: rate_window_us.max(1),
        percentiles: synth::parse_percentiles(percentiles),
    }));
}
