//! Signature-identical no-op rendition of the public API, compiled when the
//! `enabled` feature is off. Annotations cost nothing and produce nothing.

use std::path::Path;

use crate::{ArgValue, ClockSource, Filter};

pub fn enable() {}
pub fn disable() {}
pub fn is_enabled() -> bool {
    false
}
pub fn touch() {}
pub fn set_clock_source(_source: ClockSource) {}
pub fn set_output_path(_path: impl AsRef<Path>) {}
pub fn set_output_pattern(_pattern: &str, _max_size_mb: u32, _max_files: u32) {}
pub fn set_filter(_filter: impl Filter + 'static) {}
pub fn clear_filter() {}
pub fn enable_categories(_csv: &str) {}
pub fn disable_categories(_csv: &str) {}
pub fn set_sampling(_p: f64) {}
pub fn enable_synthetic_tracks(_on: bool) {}
pub fn configure_synth(_rate_window_us: u64, _percentiles: &str) {}

pub fn begin(_name: &str, _cat: Option<&str>) {}
pub fn end(_name: &str, _cat: Option<&str>) {}
pub fn complete(_name: &str, _dur_us: u64, _cat: Option<&str>, _args: &[(&str, ArgValue<'_>)]) {}
pub fn instant(_name: &str, _cat: Option<&str>) {}
pub fn instant_kvs(_name: &str, _cat: Option<&str>, _args: &[(&str, ArgValue<'_>)]) {}
pub fn counter(_name: &str, _cat: Option<&str>, _series: &[(&str, f64)]) {}
pub fn flow_begin(_id: u64) {}
pub fn flow_step(_id: u64) {}
pub fn flow_end(_id: u64) {}
pub fn mark_frame(_index: u64) {}
pub fn mark_frame_labeled(_label: &str) {}
pub fn set_thread_name(_name: &str) {}
pub fn set_thread_sort_index(_index: i32) {}
pub fn set_process_name(_name: &str) {}
pub fn set_next_color(_cname: &str) {}

pub fn flush(_path: Option<&Path>) {}

/// Inert stand-in for the real guard.
#[must_use = "the slice ends when the guard is dropped"]
pub struct ScopeGuard {
    _priv: (),
}

pub fn scope(_name: &str, _cat: Option<&str>) -> ScopeGuard {
    ScopeGuard { _priv: () }
}

pub fn scope_with(_name: &str, _cat: Option<&str>, _key: &str, _value: f64) -> ScopeGuard {
    ScopeGuard { _priv: () }
}

pub fn zone(_name: &str) -> ScopeGuard {
    ScopeGuard { _priv: () }
}
