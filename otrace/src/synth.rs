//! Derived tracks computed at flush time.
//!
//! A pure function over the sorted snapshot: fps from frame markers,
//! first-difference rates for counters, and latency percentiles for
//! complete slices. The caller concatenates the output and re-sorts.

use std::collections::BTreeMap;

use crate::collect::CleanEvent;
use crate::event::Phase;

#[derive(Clone)]
pub(crate) struct Percentile {
    pub(crate) label: String,
    pub(crate) q: f64,
}

#[derive(Clone)]
pub(crate) struct SynthConfig {
    /// Trailing window for the fps track, microseconds.
    pub(crate) rate_window_us: u64,
    pub(crate) percentiles: Vec<Percentile>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        SynthConfig {
            rate_window_us: 500_000,
            percentiles: parse_percentiles("p50,p95,p99"),
        }
    }
}

/// Parses `"p50,p95,p99"`-style labels into quantiles; malformed tokens
/// are dropped.
pub(crate) fn parse_percentiles(csv: &str) -> Vec<Percentile> {
    csv.split(',')
        .filter_map(|token| {
            let label = token.trim();
            let digits = label.strip_prefix(['p', 'P']).unwrap_or(label);
            let percent: f64 = digits.parse().ok()?;
            if !(0.0..=100.0).contains(&percent) {
                return None;
            }
            Some(Percentile {
                label: label.to_string(),
                q: percent / 100.0,
            })
        })
        .collect()
}

/// Produces the derived events for one snapshot. The snapshot must already
/// be in flush order so per-name sample runs come out time-sorted.
pub(crate) fn synthesize(snapshot: &[CleanEvent], cfg: &SynthConfig, pid: u32) -> Vec<CleanEvent> {
    let mut out = Vec::new();
    fps_track(snapshot, cfg, pid, &mut out);
    rate_tracks(snapshot, pid, &mut out);
    latency_tracks(snapshot, cfg, pid, &mut out);
    out
}

/// A counter named `fps` at every frame marker: marker count in the
/// trailing window (inclusive) scaled to events per second. The divisor is
/// the full window even before it has filled.
fn fps_track(snapshot: &[CleanEvent], cfg: &SynthConfig, pid: u32, out: &mut Vec<CleanEvent>) {
    let frames: Vec<u64> = snapshot
        .iter()
        .filter(|e| e.ph == Phase::Instant && e.name() == "frame" && e.cat() == "frame")
        .map(|e| e.ts_us)
        .collect();
    let window = cfg.rate_window_us.max(1);

    let mut lo = 0;
    for (i, &ts) in frames.iter().enumerate() {
        while frames[lo] + window <= ts {
            lo += 1;
        }
        let count = (i - lo + 1) as f64;
        let fps = 1e6 * count / window as f64;
        let mut event = CleanEvent::synthetic(Phase::Counter, "fps", "synth", ts, pid);
        event.push_number("fps", fps);
        out.push(event);
    }
}

/// A `rate(<name>)` counter for every counter name with at least two
/// samples of its first numeric series; consecutive samples with identical
/// timestamps are skipped.
fn rate_tracks(snapshot: &[CleanEvent], pid: u32, out: &mut Vec<CleanEvent>) {
    let mut series: BTreeMap<&str, Vec<(u64, f64)>> = BTreeMap::new();
    for event in snapshot.iter().filter(|e| e.ph == Phase::Counter) {
        if let Some(value) = event.first_number() {
            series
                .entry(event.name())
                .or_default()
                .push((event.ts_us, value));
        }
    }

    for (name, mut samples) in series {
        if samples.len() < 2 {
            continue;
        }
        samples.sort_by_key(|&(ts, _)| ts);
        let rate_name = format!("rate({name})");
        for pair in samples.windows(2) {
            let (t0, v0) = pair[0];
            let (t1, v1) = pair[1];
            if t1 == t0 {
                continue;
            }
            let rate = (v1 - v0) / ((t1 - t0) as f64 * 1e-6);
            let mut event = CleanEvent::synthetic(Phase::Counter, &rate_name, "synth", t1, pid);
            event.push_number(&rate_name, rate);
            out.push(event);
        }
    }
}

/// One `latency(<name>)` instant per distinct complete-event name, at the
/// snapshot's maximum timestamp, holding the configured duration quantiles
/// in milliseconds (floor indexing into the sorted durations).
fn latency_tracks(snapshot: &[CleanEvent], cfg: &SynthConfig, pid: u32, out: &mut Vec<CleanEvent>) {
    if cfg.percentiles.is_empty() {
        return;
    }
    let mut durations: BTreeMap<&str, Vec<u64>> = BTreeMap::new();
    for event in snapshot.iter().filter(|e| e.ph == Phase::Complete) {
        durations.entry(event.name()).or_default().push(event.dur_us);
    }
    let max_ts = snapshot.iter().map(|e| e.ts_us).max().unwrap_or(0);

    for (name, mut durs) in durations {
        durs.sort_unstable();
        let mut event = CleanEvent::synthetic(
            Phase::Instant,
            &format!("latency({name})"),
            "synth",
            max_ts,
            pid,
        );
        for percentile in &cfg.percentiles {
            let idx = (percentile.q * (durs.len() - 1) as f64).floor() as usize;
            event.push_number(&percentile.label, durs[idx] as f64 / 1000.0);
        }
        out.push(event);
    }
}
