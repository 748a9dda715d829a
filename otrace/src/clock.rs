//! Microsecond timestamps, measured from first use.
//!
//! The source is latched on the first `now_us` call; `set_source` has no
//! effect afterwards. Cycle-counter mode calibrates once against the steady
//! clock and converts cycles to microseconds from then on.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::{Instant, SystemTime};

use crate::ClockSource;

static REQUESTED: AtomicU8 = AtomicU8::new(0);
static STATE: OnceLock<ClockState> = OnceLock::new();

struct ClockState {
    source: ClockSource,
    origin_steady: Instant,
    origin_wall: SystemTime,
    origin_cycles: u64,
    cycles_per_us: f64,
}

/// Selects the timestamp source; only effective before the first timestamp
/// is taken.
pub(crate) fn set_source(source: ClockSource) {
    let tag = match source {
        ClockSource::Steady => 0,
        ClockSource::CycleCounter => 1,
        ClockSource::Wall => 2,
    };
    REQUESTED.store(tag, Ordering::Relaxed);
}

/// Monotonic microseconds since the first call (wall-clock mode may jump).
pub(crate) fn now_us() -> u64 {
    let state = STATE.get_or_init(ClockState::init);
    match state.source {
        ClockSource::Steady => state.origin_steady.elapsed().as_micros() as u64,
        ClockSource::Wall => SystemTime::now()
            .duration_since(state.origin_wall)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0),
        ClockSource::CycleCounter => {
            let cycles = read_cycles().wrapping_sub(state.origin_cycles);
            (cycles as f64 / state.cycles_per_us) as u64
        }
    }
}

impl ClockState {
    fn init() -> Self {
        let mut source = match REQUESTED.load(Ordering::Relaxed) {
            1 => ClockSource::CycleCounter,
            2 => ClockSource::Wall,
            _ => ClockSource::Steady,
        };
        if source == ClockSource::CycleCounter && !cfg!(target_arch = "x86_64") {
            source = ClockSource::Steady;
        }
        let cycles_per_us = if source == ClockSource::CycleCounter {
            calibrate_cycles_per_us()
        } else {
            1.0
        };
        ClockState {
            source,
            origin_steady: Instant::now(),
            origin_wall: SystemTime::now(),
            origin_cycles: read_cycles(),
            cycles_per_us,
        }
    }
}

#[cfg(target_arch = "x86_64")]
fn read_cycles() -> u64 {
    unsafe { core::arch::x86_64::_rdtsc() }
}

#[cfg(not(target_arch = "x86_64"))]
fn read_cycles() -> u64 {
    0
}

/// Five 1 ms trials against the steady clock; the minimum estimate is the
/// least disturbed by preemption.
fn calibrate_cycles_per_us() -> f64 {
    let mut best = f64::MAX;
    for _ in 0..5 {
        let t0 = Instant::now();
        let c0 = read_cycles();
        while t0.elapsed().as_micros() < 1000 {
            std::hint::spin_loop();
        }
        let us = t0.elapsed().as_micros() as f64;
        let cycles = read_cycles().wrapping_sub(c0) as f64;
        let estimate = cycles / us;
        if estimate < best {
            best = estimate;
        }
    }
    if best > 0.0 && best.is_finite() {
        best
    } else {
        1.0
    }
}
