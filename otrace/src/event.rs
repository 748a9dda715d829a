//! Fixed-capacity event records stored in the per-thread rings.
//!
//! Everything in a slot is inline and bounded so that filling an event never
//! allocates. Strings are NUL-terminated byte arrays truncated at a UTF-8
//! character boundary; truncation is not an error.

use std::sync::atomic::AtomicU8;

/// Ring capacity per thread.
pub const THREAD_BUFFER_EVENTS: usize = 32768;
/// Maximum key/value pairs per event; surplus pairs are dropped.
pub const MAX_ARGS: usize = 4;
/// Bounded string capacities, including the trailing NUL.
pub const MAX_NAME: usize = 64;
pub const MAX_CAT: usize = 32;
pub const MAX_ARG_KEY: usize = 32;
pub const MAX_ARG_VAL: usize = 64;
pub const MAX_CNAME: usize = 16;

/// Inline NUL-terminated string of at most `N - 1` bytes.
#[derive(Clone, Copy)]
pub(crate) struct BoundedStr<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> BoundedStr<N> {
    pub(crate) const fn empty() -> Self {
        BoundedStr { bytes: [0; N] }
    }

    /// Copies `s`, truncating at the last character boundary that fits.
    pub(crate) fn set(&mut self, s: &str) {
        let mut len = s.len().min(N - 1);
        while len > 0 && !s.is_char_boundary(len) {
            len -= 1;
        }
        self.bytes[..len].copy_from_slice(&s.as_bytes()[..len]);
        self.bytes[len] = 0;
    }

    pub(crate) fn clear(&mut self) {
        self.bytes[0] = 0;
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.bytes[0] == 0
    }

    pub(crate) fn as_str(&self) -> &str {
        let len = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(N - 1);
        std::str::from_utf8(&self.bytes[..len]).unwrap_or("")
    }
}

impl<const N: usize> Default for BoundedStr<N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const N: usize> std::fmt::Debug for BoundedStr<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

/// Phase tag of a recorded event; a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Begin,
    End,
    Complete,
    Instant,
    Counter,
    FlowStart,
    FlowStep,
    FlowEnd,
    ThreadName,
    ProcessName,
    ThreadSortIndex,
}

impl Phase {
    pub(crate) fn is_metadata(self) -> bool {
        matches!(
            self,
            Phase::ThreadName | Phase::ProcessName | Phase::ThreadSortIndex
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum ArgKind {
    #[default]
    None,
    Number,
    Str,
}

/// One stored key/value pair.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Arg {
    pub(crate) key: BoundedStr<MAX_ARG_KEY>,
    pub(crate) kind: ArgKind,
    pub(crate) num: f64,
    pub(crate) text: BoundedStr<MAX_ARG_VAL>,
}

/// One slot of a thread ring.
///
/// The commit flag is the only field a reader may inspect before copying:
/// a release store of 1 publishes every prior write by the producer.
pub(crate) struct Event {
    pub(crate) ts_us: u64,
    pub(crate) dur_us: u64,
    pub(crate) flow_id: u64,
    pub(crate) seq: u64,
    pub(crate) pid: u32,
    pub(crate) tid: u32,
    pub(crate) ph: Phase,
    pub(crate) name: BoundedStr<MAX_NAME>,
    pub(crate) cat: BoundedStr<MAX_CAT>,
    pub(crate) cname: BoundedStr<MAX_CNAME>,
    pub(crate) argc: u8,
    pub(crate) args: [Arg; MAX_ARGS],
    pub(crate) committed: AtomicU8,
}

impl Event {
    pub(crate) fn empty() -> Self {
        Event {
            ts_us: 0,
            dur_us: 0,
            flow_id: 0,
            seq: 0,
            pid: 0,
            tid: 0,
            ph: Phase::Instant,
            name: BoundedStr::empty(),
            cat: BoundedStr::empty(),
            cname: BoundedStr::empty(),
            argc: 0,
            args: [Arg::default(); MAX_ARGS],
            committed: AtomicU8::new(0),
        }
    }

    /// Appends a numeric arg; a full arg table drops the pair.
    pub(crate) fn push_number(&mut self, key: &str, value: f64) {
        if (self.argc as usize) >= MAX_ARGS {
            return;
        }
        let arg = &mut self.args[self.argc as usize];
        arg.key.set(key);
        arg.kind = ArgKind::Number;
        arg.num = value;
        arg.text.clear();
        self.argc += 1;
    }

    /// Appends a string arg; a full arg table drops the pair.
    pub(crate) fn push_text(&mut self, key: &str, value: &str) {
        if (self.argc as usize) >= MAX_ARGS {
            return;
        }
        let arg = &mut self.args[self.argc as usize];
        arg.key.set(key);
        arg.kind = ArgKind::Str;
        arg.num = 0.0;
        arg.text.set(value);
        self.argc += 1;
    }
}
