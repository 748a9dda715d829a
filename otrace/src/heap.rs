//! Allocation accounting: live bytes, callsite attribution, leak report.
//!
//! The hooks run inside [`TracingAllocator`], a `GlobalAlloc` wrapper the
//! application installs with `#[global_allocator]` (the language enforces
//! that exactly one exists). Hooks short-circuit while the tracer or the
//! heap layer itself is on the stack, so tracer work and the bookkeeping
//! below never observe their own allocations.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::event::MAX_ARG_VAL;
use crate::registry::ReentrancyGuard;
use crate::{clock, emit, gate, ArgValue};

const HEAP_SHARDS: usize = 64;
const DEFAULT_STACK_DEPTH: usize = 16;
/// Frames belonging to the allocator shim itself, skipped before hashing.
const SHIM_FRAMES: usize = 2;
const COUNTER_PERIOD_US: u64 = 1_000_000;
const REPORT_TOP: usize = 10;

static HEAP_ENABLED: AtomicBool = AtomicBool::new(false);

thread_local! {
    static IN_HEAP_HOOK: Cell<bool> = const { Cell::new(false) };
}

struct HookGuard;

impl HookGuard {
    fn enter() -> Option<HookGuard> {
        IN_HEAP_HOOK
            .try_with(|flag| {
                if flag.get() {
                    None
                } else {
                    flag.set(true);
                    Some(HookGuard)
                }
            })
            .ok()
            .flatten()
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        let _ = IN_HEAP_HOOK.try_with(|flag| flag.set(false));
    }
}

struct LiveAlloc {
    size: usize,
    callsite: u64,
    #[allow(dead_code)]
    ts_us: u64,
}

#[derive(Default)]
struct CallsiteStats {
    total_bytes: u64,
    alloc_count: u64,
    live_bytes: u64,
    live_count: u64,
    /// Human-readable stack sample, resolved on first observation.
    sample: Option<String>,
}

struct HeapState {
    sample_rate_bits: AtomicU64,
    capture_stacks: AtomicBool,
    stack_depth: AtomicUsize,
    live_bytes: AtomicU64,
    total_allocations: AtomicU64,
    total_frees: AtomicU64,
    last_counter_us: AtomicU64,
    shards: Box<[Mutex<HashMap<usize, LiveAlloc>>]>,
    callsites: Mutex<HashMap<u64, CallsiteStats>>,
}

fn heap_state() -> &'static HeapState {
    static STATE: OnceLock<HeapState> = OnceLock::new();
    STATE.get_or_init(|| HeapState {
        sample_rate_bits: AtomicU64::new(1.0f64.to_bits()),
        capture_stacks: AtomicBool::new(true),
        stack_depth: AtomicUsize::new(DEFAULT_STACK_DEPTH),
        live_bytes: AtomicU64::new(0),
        total_allocations: AtomicU64::new(0),
        total_frees: AtomicU64::new(0),
        last_counter_us: AtomicU64::new(0),
        shards: (0..HEAP_SHARDS)
            .map(|_| Mutex::new(HashMap::new()))
            .collect(),
        callsites: Mutex::new(HashMap::new()),
    })
}

/// Arms or disarms the hooks. Arming initializes the state first so the
/// hooks themselves never allocate it.
pub fn heap_enable(on: bool) {
    if on {
        let _ = heap_state();
    }
    HEAP_ENABLED.store(on, Ordering::Relaxed);
}

/// Probability that an allocation's callsite stack is captured.
pub fn heap_set_sampling(p: f64) {
    heap_state()
        .sample_rate_bits
        .store(p.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
}

/// Turns callsite stack capture on or off without touching the sampling
/// rate.
pub fn heap_set_stack_capture(on: bool) {
    heap_state().capture_stacks.store(on, Ordering::Relaxed);
}

fn record_alloc(ptr: usize, size: usize) {
    if !HEAP_ENABLED.load(Ordering::Relaxed) || ReentrancyGuard::is_active() {
        return;
    }
    let Some(_hook) = HookGuard::enter() else {
        return;
    };
    let state = heap_state();
    state.live_bytes.fetch_add(size as u64, Ordering::Relaxed);
    state.total_allocations.fetch_add(1, Ordering::Relaxed);

    let rate = f64::from_bits(state.sample_rate_bits.load(Ordering::Relaxed));
    let callsite = if state.capture_stacks.load(Ordering::Relaxed) && gate::sample_keep(rate) {
        capture_callsite(state, size)
    } else {
        0
    };

    let ts_us = clock::now_us();
    state.shards[ptr % HEAP_SHARDS].lock().insert(
        ptr,
        LiveAlloc {
            size,
            callsite,
            ts_us,
        },
    );

    maybe_emit_live_counter(state, ts_us);
}

fn record_free(ptr: usize) {
    if !HEAP_ENABLED.load(Ordering::Relaxed) || ReentrancyGuard::is_active() {
        return;
    }
    let Some(_hook) = HookGuard::enter() else {
        return;
    };
    let state = heap_state();
    // A miss is fine: the allocation may predate arming.
    let Some(info) = state.shards[ptr % HEAP_SHARDS].lock().remove(&ptr) else {
        return;
    };
    state.live_bytes.fetch_sub(info.size as u64, Ordering::Relaxed);
    state.total_frees.fetch_add(1, Ordering::Relaxed);
    if info.callsite != 0 {
        let mut callsites = state.callsites.lock();
        if let Some(stats) = callsites.get_mut(&info.callsite) {
            stats.live_bytes = stats.live_bytes.saturating_sub(info.size as u64);
            stats.live_count = stats.live_count.saturating_sub(1);
        }
    }
}

/// Captures up to `stack_depth` frames past the allocator shim, hashes
/// them into a callsite id, and updates the callsite stats.
fn capture_callsite(state: &HeapState, size: usize) -> u64 {
    let depth = state.stack_depth.load(Ordering::Relaxed);
    let mut frames: Vec<usize> = Vec::with_capacity(depth + SHIM_FRAMES);
    backtrace::trace(|frame| {
        frames.push(frame.ip() as usize);
        frames.len() < depth + SHIM_FRAMES
    });
    if frames.len() <= SHIM_FRAMES {
        return 0;
    }
    let callsite = fnv1a(&frames[SHIM_FRAMES..]);

    let mut callsites = state.callsites.lock();
    let stats = callsites.entry(callsite).or_default();
    stats.total_bytes += size as u64;
    stats.alloc_count += 1;
    stats.live_bytes += size as u64;
    stats.live_count += 1;
    if stats.sample.is_none() {
        stats.sample = Some(symbolize(&frames[SHIM_FRAMES..]));
    }
    callsite
}

fn symbolize(frames: &[usize]) -> String {
    let mut parts = Vec::new();
    for &ip in frames.iter().take(3) {
        let mut name: Option<String> = None;
        backtrace::resolve(ip as *mut _, |symbol| {
            if name.is_none() {
                name = symbol.name().map(|n| n.to_string());
            }
        });
        parts.push(name.unwrap_or_else(|| format!("{ip:#x}")));
    }
    parts.join(" <- ")
}

fn fnv1a(addrs: &[usize]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &addr in addrs {
        hash ^= addr as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    if hash == 0 {
        1
    } else {
        hash
    }
}

/// At most one `heap_live_bytes` counter per second from the hook path.
fn maybe_emit_live_counter(state: &HeapState, now_us: u64) {
    let last = state.last_counter_us.load(Ordering::Relaxed);
    if now_us.saturating_sub(last) < COUNTER_PERIOD_US {
        return;
    }
    if state
        .last_counter_us
        .compare_exchange(last, now_us, Ordering::Relaxed, Ordering::Relaxed)
        .is_err()
    {
        return;
    }
    let live = state.live_bytes.load(Ordering::Relaxed) as f64;
    emit::counter("heap_live_bytes", Some("heap"), &[("heap_live_bytes", live)]);
}

/// `"<stack-sample> (<bytes> bytes, <count> allocations)"`, truncated so
/// the byte/count suffix always survives the bounded arg value.
fn site_label(sample: Option<&str>, callsite: u64, bytes: u64, count: u64) -> String {
    let suffix = format!(" ({bytes} bytes, {count} allocations)");
    let mut head = match sample {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => format!("hash=0x{callsite:016x}"),
    };
    let mut budget = (MAX_ARG_VAL - 1).saturating_sub(suffix.len());
    if head.len() > budget {
        while budget > 0 && !head.is_char_boundary(budget) {
            budget -= 1;
        }
        head.truncate(budget);
    }
    head + &suffix
}

/// Emits a leak/site report through the normal emit path:
/// `heap_report_started`, up to ten `heap_leaks` (live allocations grouped
/// by callsite, largest first), up to ten `heap_sites` (all-time totals),
/// a `heap_live_bytes` counter, then `heap_report_done`.
pub fn heap_report() {
    let Some(_hook) = HookGuard::enter() else {
        return;
    };
    let state = heap_state();

    emit::instant("heap_report_started", Some("heap"));

    let mut live_by_site: HashMap<u64, (u64, u64)> = HashMap::new();
    for shard in state.shards.iter() {
        let shard = shard.lock();
        for info in shard.values() {
            let entry = live_by_site.entry(info.callsite).or_insert((0, 0));
            entry.0 += info.size as u64;
            entry.1 += 1;
        }
    }
    let mut leaks: Vec<(u64, u64, u64)> = live_by_site
        .into_iter()
        .map(|(site, (bytes, count))| (site, bytes, count))
        .collect();
    leaks.sort_by(|a, b| b.1.cmp(&a.1));

    let (leak_labels, site_labels) = {
        let callsites = state.callsites.lock();
        let leak_labels: Vec<String> = leaks
            .iter()
            .take(REPORT_TOP)
            .map(|&(site, bytes, count)| {
                let sample = callsites.get(&site).and_then(|s| s.sample.as_deref());
                site_label(sample, site, bytes, count)
            })
            .collect();

        let mut sites: Vec<(&u64, &CallsiteStats)> = callsites.iter().collect();
        sites.sort_by(|a, b| b.1.total_bytes.cmp(&a.1.total_bytes));
        let site_labels: Vec<String> = sites
            .iter()
            .take(REPORT_TOP)
            .map(|(site, stats)| {
                site_label(
                    stats.sample.as_deref(),
                    **site,
                    stats.total_bytes,
                    stats.alloc_count,
                )
            })
            .collect();
        (leak_labels, site_labels)
    };

    for label in &leak_labels {
        emit::instant_kvs("heap_leaks", Some("heap"), &[("site", ArgValue::Str(label.as_str()))]);
    }
    for label in &site_labels {
        emit::instant_kvs("heap_sites", Some("heap"), &[("site", ArgValue::Str(label.as_str()))]);
    }

    let live = state.live_bytes.load(Ordering::Relaxed) as f64;
    emit::counter("heap_live_bytes", Some("heap"), &[("heap_live_bytes", live)]);

    emit::instant("heap_report_done", Some("heap"));
}

/// Global-allocator wrapper feeding the accounting layer.
///
/// ```ignore
/// #[global_allocator]
/// static ALLOC: otrace::TracingAllocator = otrace::TracingAllocator::system();
/// ```
pub struct TracingAllocator<A = System> {
    inner: A,
}

impl TracingAllocator<System> {
    pub const fn system() -> Self {
        TracingAllocator { inner: System }
    }
}

impl<A> TracingAllocator<A> {
    pub const fn new(inner: A) -> Self {
        TracingAllocator { inner }
    }
}

unsafe impl<A: GlobalAlloc> GlobalAlloc for TracingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            record_alloc(ptr as usize, layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        record_free(ptr as usize);
        self.inner.dealloc(ptr, layout);
    }

    // realloc and alloc_zeroed use the defaults, which route through
    // alloc/dealloc above, so moved blocks stay accounted.
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn reset_counters(state: &HeapState) {
        state.live_bytes.store(0, Ordering::Relaxed);
        for shard in state.shards.iter() {
            shard.lock().clear();
        }
    }

    #[test]
    #[serial]
    fn alloc_free_balances_live_bytes() {
        heap_enable(true);
        let state = heap_state();
        reset_counters(state);

        record_alloc(0x1000, 8192);
        record_alloc(0x2000, 1024);
        assert_eq!(state.live_bytes.load(Ordering::Relaxed), 9216);

        record_free(0x1000);
        assert_eq!(state.live_bytes.load(Ordering::Relaxed), 1024);

        record_free(0x2000);
        assert_eq!(state.live_bytes.load(Ordering::Relaxed), 0);
        heap_enable(false);
    }

    #[test]
    #[serial]
    fn free_of_unknown_pointer_is_ignored() {
        heap_enable(true);
        let state = heap_state();
        reset_counters(state);

        record_free(0xdead_0000);
        assert_eq!(state.live_bytes.load(Ordering::Relaxed), 0);
        heap_enable(false);
    }

    #[test]
    #[serial]
    fn disabled_hooks_record_nothing() {
        heap_enable(true);
        let state = heap_state();
        reset_counters(state);
        heap_enable(false);

        record_alloc(0x3000, 4096);
        assert_eq!(state.live_bytes.load(Ordering::Relaxed), 0);
        assert!(state.shards[0x3000 % HEAP_SHARDS].lock().is_empty());
    }

    #[test]
    #[serial]
    fn sampled_allocation_lands_in_callsite_map() {
        heap_enable(true);
        heap_set_sampling(1.0);
        let state = heap_state();
        reset_counters(state);

        record_alloc(0x4000, 2048);
        let shard = state.shards[0x4000 % HEAP_SHARDS].lock();
        let info = shard.get(&0x4000).expect("recorded");
        assert_eq!(info.size, 2048);
        if info.callsite != 0 {
            let callsites = state.callsites.lock();
            let stats = callsites.get(&info.callsite).expect("callsite stats");
            assert!(stats.alloc_count >= 1);
            assert!(stats.sample.is_some());
        }
        drop(shard);
        record_free(0x4000);
        heap_enable(false);
    }

    #[test]
    fn site_label_keeps_suffix_under_truncation() {
        let long_sample = "f".repeat(200);
        let label = site_label(Some(&long_sample), 0x1234, 819200, 100);
        assert!(label.len() < MAX_ARG_VAL + 40);
        assert!(label.ends_with("(819200 bytes, 100 allocations)"));
    }

    #[test]
    fn site_label_falls_back_to_hash() {
        let label = site_label(None, 0xabcd, 1024, 1);
        assert!(label.starts_with("hash=0x000000000000abcd"));
        assert!(label.contains("1024 bytes"));
    }

    #[test]
    fn fnv_hash_is_stable_and_nonzero() {
        let a = fnv1a(&[1, 2, 3]);
        assert_eq!(a, fnv1a(&[1, 2, 3]));
        assert_ne!(a, fnv1a(&[3, 2, 1]));
        assert_ne!(fnv1a(&[]), 0);
    }
}
