//! Process-global tracer state and per-thread buffer discovery.
//!
//! The registry is a lazily-initialized singleton. First use reads the
//! `OTRACE_*` environment and, with the `on-exit` feature, registers a final
//! flush via `atexit` (registered on first use, so it runs after exit hooks
//! the application registers later).
//!
//! Thread buffers are created on a thread's first emit, pushed onto an
//! intrusive append-only list with a release CAS, and never unlinked: a
//! flushing thread may be traversing the list at any time.

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::event::{BoundedStr, MAX_CNAME, MAX_NAME, THREAD_BUFFER_EVENTS};
use crate::gate::GateConfig;
use crate::output::OutputConfig;
use crate::ring::ThreadBuffer;
use crate::synth::SynthConfig;

pub(crate) struct Registry {
    pub(crate) head: AtomicPtr<ThreadBuffer>,
    enabled: AtomicBool,
    pid: AtomicU32,
    pub(crate) process_name: Mutex<BoundedStr<MAX_NAME>>,
    pub(crate) gate: ArcSwap<GateConfig>,
    pub(crate) output: ArcSwap<OutputConfig>,
    pub(crate) synth: ArcSwap<SynthConfig>,
    synth_enabled: AtomicBool,
    pub(crate) rotation_index: AtomicU32,
    /// Serializes concurrent flush callers.
    pub(crate) flush_gate: Mutex<()>,
}

impl Registry {
    fn new() -> Self {
        Registry {
            head: AtomicPtr::new(std::ptr::null_mut()),
            enabled: AtomicBool::new(true),
            pid: AtomicU32::new(std::process::id()),
            process_name: Mutex::new(BoundedStr::empty()),
            gate: ArcSwap::from_pointee(GateConfig::default()),
            output: ArcSwap::from_pointee(OutputConfig::default()),
            synth: ArcSwap::from_pointee(SynthConfig::default()),
            synth_enabled: AtomicBool::new(false),
            rotation_index: AtomicU32::new(0),
            flush_gate: Mutex::new(()),
        }
    }

    pub(crate) fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub(crate) fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::Release);
    }

    /// Current pid, re-read on every call so a fork is picked up lazily.
    pub(crate) fn refresh_pid(&self) -> u32 {
        let current = std::process::id();
        if self.pid.load(Ordering::Relaxed) != current {
            self.pid.store(current, Ordering::Relaxed);
        }
        current
    }

    pub(crate) fn synth_enabled(&self) -> bool {
        self.synth_enabled.load(Ordering::Relaxed)
    }

    pub(crate) fn set_synth_enabled(&self, on: bool) {
        self.synth_enabled.store(on, Ordering::Relaxed);
    }

    pub(crate) fn update_gate(&self, f: impl FnOnce(&mut GateConfig)) {
        let mut cfg = (**self.gate.load()).clone();
        f(&mut cfg);
        self.gate.store(Arc::new(cfg));
    }

    pub(crate) fn update_output(&self, f: impl FnOnce(&mut OutputConfig)) {
        let mut cfg = (**self.output.load()).clone();
        f(&mut cfg);
        self.output.store(Arc::new(cfg));
    }
}

pub(crate) fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let reg = Registry::new();
        apply_env(&reg);
        #[cfg(feature = "on-exit")]
        unsafe {
            libc::atexit(exit_flush);
        }
        reg
    })
}

/// `OTRACE_DISABLE`, `OTRACE_SAMPLE`, then `OTRACE_ENABLE` last so an
/// explicit enable wins when both are set.
fn apply_env(reg: &Registry) {
    if std::env::var("OTRACE_DISABLE").as_deref() == Ok("1") {
        reg.enabled.store(false, Ordering::Relaxed);
    }
    if let Ok(raw) = std::env::var("OTRACE_SAMPLE") {
        if let Ok(p) = raw.trim().parse::<f64>() {
            reg.update_gate(|g| g.keep_probability = p.clamp(0.0, 1.0));
        }
    }
    if std::env::var("OTRACE_ENABLE").as_deref() == Ok("1") {
        reg.enabled.store(true, Ordering::Relaxed);
    }
}

#[cfg(feature = "on-exit")]
extern "C" fn exit_flush() {
    crate::output::flush(None);
}

/// Swaps `enabled` off for the duration of a flush and restores the prior
/// value on every exit path.
pub(crate) struct PauseEmission {
    reg: &'static Registry,
    prev: bool,
}

impl PauseEmission {
    pub(crate) fn new(reg: &'static Registry) -> Self {
        let prev = reg.enabled.swap(false, Ordering::AcqRel);
        PauseEmission { reg, prev }
    }
}

impl Drop for PauseEmission {
    fn drop(&mut self) {
        self.reg.enabled.store(self.prev, Ordering::Release);
    }
}

/// Owner-side state of a thread's ring: the buffer reference plus the
/// fields only the producing thread touches.
pub(crate) struct Local {
    pub(crate) buf: &'static ThreadBuffer,
    pub(crate) seq: u64,
    pub(crate) pending_cname: BoundedStr<MAX_CNAME>,
}

impl Local {
    fn register() -> Local {
        let reg = registry();
        let ptr = Box::into_raw(Box::new(ThreadBuffer::new(
            current_tid(),
            THREAD_BUFFER_EVENTS,
        )));
        let mut old = reg.head.load(Ordering::Relaxed);
        loop {
            // next is written before the CAS publishes the node.
            unsafe { (*ptr).next = old };
            match reg
                .head
                .compare_exchange_weak(old, ptr, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(current) => old = current,
            }
        }
        Local {
            buf: unsafe { &*ptr },
            seq: 0,
            pending_cname: BoundedStr::empty(),
        }
    }
}

thread_local! {
    static LOCAL: RefCell<Option<Local>> = const { RefCell::new(None) };
    static TID: Cell<u32> = const { Cell::new(0) };
    static IN_TRACER: Cell<bool> = const { Cell::new(false) };
}

/// Runs `f` with this thread's buffer state, creating and registering the
/// buffer on first use. Returns `None` when thread-local storage is already
/// torn down (the event is dropped, per the best-effort contract).
pub(crate) fn with_local<R>(f: impl FnOnce(&mut Local) -> R) -> Option<R> {
    LOCAL
        .try_with(|cell| {
            let mut slot = cell.borrow_mut();
            let local = slot.get_or_insert_with(Local::register);
            f(local)
        })
        .ok()
}

pub(crate) fn current_tid() -> u32 {
    TID.with(|cached| {
        let tid = cached.get();
        if tid != 0 {
            return tid;
        }
        let tid = read_tid();
        cached.set(tid);
        tid
    })
}

#[cfg(target_os = "linux")]
fn read_tid() -> u32 {
    unsafe { libc::syscall(libc::SYS_gettid) as u32 }
}

#[cfg(not(target_os = "linux"))]
fn read_tid() -> u32 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    hasher.finish() as u32
}

/// Keeps tracer work from recursively entering the tracer (heap hooks,
/// user predicates, formatting). Cleared on drop on all exit paths.
pub(crate) struct ReentrancyGuard {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl ReentrancyGuard {
    pub(crate) fn enter() -> Option<ReentrancyGuard> {
        IN_TRACER
            .try_with(|flag| {
                if flag.get() {
                    None
                } else {
                    flag.set(true);
                    Some(ReentrancyGuard {
                        _not_send: std::marker::PhantomData,
                    })
                }
            })
            .ok()
            .flatten()
    }

    /// True while this thread is inside tracer work.
    pub(crate) fn is_active() -> bool {
        IN_TRACER.try_with(Cell::get).unwrap_or(true)
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        let _ = IN_TRACER.try_with(|flag| flag.set(false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_buffer_is_stable_across_calls() {
        let first = with_local(|l| l.buf as *const _ as usize).unwrap();
        let second = with_local(|l| l.buf as *const _ as usize).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn each_thread_registers_its_own_buffer() {
        let mine = with_local(|l| l.buf as *const _ as usize).unwrap();
        let theirs = std::thread::spawn(|| with_local(|l| l.buf as *const _ as usize).unwrap())
            .join()
            .unwrap();
        assert_ne!(mine, theirs);
    }

    #[test]
    fn reentrancy_guard_blocks_nested_entry() {
        let outer = ReentrancyGuard::enter();
        assert!(outer.is_some());
        assert!(ReentrancyGuard::enter().is_none());
        drop(outer);
        assert!(ReentrancyGuard::enter().is_some());
    }

    #[test]
    fn tid_is_nonzero_and_cached() {
        assert_ne!(current_tid(), 0);
        assert_eq!(current_tid(), current_tid());
    }

    #[test]
    #[serial_test::serial]
    fn env_enable_wins_over_disable() {
        std::env::set_var("OTRACE_DISABLE", "1");
        std::env::set_var("OTRACE_ENABLE", "1");
        std::env::set_var("OTRACE_SAMPLE", "0.25");

        let reg = Registry::new();
        apply_env(&reg);
        assert!(reg.enabled());
        assert!((reg.gate.load().keep_probability - 0.25).abs() < 1e-9);

        std::env::remove_var("OTRACE_DISABLE");
        std::env::remove_var("OTRACE_ENABLE");
        std::env::remove_var("OTRACE_SAMPLE");
    }

    #[test]
    #[serial_test::serial]
    fn env_disable_alone_disables() {
        std::env::set_var("OTRACE_DISABLE", "1");

        let reg = Registry::new();
        apply_env(&reg);
        assert!(!reg.enabled());

        std::env::remove_var("OTRACE_DISABLE");
    }
}
