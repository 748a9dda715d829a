//! Snapshotting committed events for a flush.
//!
//! The collector walks the registry's buffer list and copies every
//! committed slot into a plain `CleanEvent`, then appends per-thread and
//! process metadata re-synthesized from the registry mirrors (the viewer
//! treats repeated metadata idempotently). The caller pauses emission
//! around the walk; in-flight slots are skipped via the commit flag.

use std::sync::atomic::Ordering;

use crate::event::{Arg, ArgKind, BoundedStr, Event, Phase, MAX_ARGS, MAX_CAT, MAX_CNAME, MAX_NAME};
use crate::registry::Registry;

/// A plain, atomic-free copy of an event, suitable for sorting and
/// serialization.
#[derive(Clone)]
pub(crate) struct CleanEvent {
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
}

impl CleanEvent {
    fn from_slot(event: &Event) -> CleanEvent {
        CleanEvent {
            ts_us: event.ts_us,
            dur_us: event.dur_us,
            flow_id: event.flow_id,
            seq: event.seq,
            pid: event.pid,
            tid: event.tid,
            ph: event.ph,
            name: event.name,
            cat: event.cat,
            cname: event.cname,
            argc: event.argc,
            args: event.args,
        }
    }

    /// A collector- or synthesizer-made event: ts as given, tid 0, seq 0.
    pub(crate) fn synthetic(ph: Phase, name: &str, cat: &str, ts_us: u64, pid: u32) -> CleanEvent {
        let mut event = CleanEvent {
            ts_us,
            dur_us: 0,
            flow_id: 0,
            seq: 0,
            pid,
            tid: 0,
            ph,
            name: BoundedStr::empty(),
            cat: BoundedStr::empty(),
            cname: BoundedStr::empty(),
            argc: 0,
            args: [Arg::default(); MAX_ARGS],
        };
        event.name.set(name);
        event.cat.set(cat);
        event
    }

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

    pub(crate) fn name(&self) -> &str {
        self.name.as_str()
    }

    pub(crate) fn cat(&self) -> &str {
        self.cat.as_str()
    }

    pub(crate) fn args(&self) -> &[Arg] {
        &self.args[..self.argc as usize]
    }

    /// Value of the first numeric series, if any.
    pub(crate) fn first_number(&self) -> Option<f64> {
        self.args()
            .iter()
            .find(|a| a.kind == ArgKind::Number)
            .map(|a| a.num)
    }
}

/// Copies all committed events plus re-synthesized metadata. Emission must
/// already be paused by the caller.
pub(crate) fn collect(reg: &Registry) -> Vec<CleanEvent> {
    let pid = reg.refresh_pid();
    let mut out = Vec::with_capacity(4096);

    let mut cursor = reg.head.load(Ordering::Acquire);
    while !cursor.is_null() {
        let buf = unsafe { &*cursor };
        let (start, count) = buf.snapshot_bounds();
        for i in 0..count {
            let mut idx = start + i;
            if idx >= buf.capacity() {
                idx -= buf.capacity();
            }
            let slot = buf.slot(idx);
            // Acquire on the commit flag pairs with the producer's release;
            // emission is paused, so a committed slot is stable here.
            let committed = unsafe { (*slot).committed.load(Ordering::Acquire) };
            if committed == 0 {
                continue;
            }
            out.push(CleanEvent::from_slot(unsafe { &*slot }));
        }

        let meta = buf.meta.lock();
        if !meta.name.is_empty() {
            let mut event = CleanEvent::synthetic(Phase::ThreadName, meta.name.as_str(), "", 0, pid);
            event.tid = buf.tid;
            out.push(event);
        }
        if meta.sort_index != 0 {
            let mut event = CleanEvent::synthetic(Phase::ThreadSortIndex, "", "", 0, pid);
            event.tid = buf.tid;
            event.push_number("sort_index", meta.sort_index as f64);
            out.push(event);
        }
        drop(meta);

        cursor = buf.next as *mut _;
    }

    let process_name = reg.process_name.lock();
    if !process_name.is_empty() {
        out.push(CleanEvent::synthetic(
            Phase::ProcessName,
            process_name.as_str(),
            "",
            0,
            pid,
        ));
    }

    out
}

/// Stable total order: ascending timestamp, then thread id, then per-thread
/// sequence. Metadata carries ts 0 and so lands before all real events.
pub(crate) fn sort_snapshot(events: &mut [CleanEvent]) {
    events.sort_by(|a, b| {
        a.ts_us
            .cmp(&b.ts_us)
            .then(a.tid.cmp(&b.tid))
            .then(a.seq.cmp(&b.seq))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(ts: u64, tid: u32, seq: u64) -> CleanEvent {
        let mut event = CleanEvent::synthetic(Phase::Instant, "probe", "", ts, 1);
        event.tid = tid;
        event.seq = seq;
        event
    }

    #[test]
    fn order_is_ts_then_tid_then_seq() {
        let mut events = vec![
            probe(20, 1, 3),
            probe(10, 2, 1),
            probe(10, 1, 2),
            probe(10, 1, 1),
        ];
        sort_snapshot(&mut events);
        let keys: Vec<_> = events.iter().map(|e| (e.ts_us, e.tid, e.seq)).collect();
        assert_eq!(keys, vec![(10, 1, 1), (10, 1, 2), (10, 2, 1), (20, 1, 3)]);
    }

    #[test]
    fn metadata_sorts_before_real_events() {
        let mut meta = CleanEvent::synthetic(Phase::ThreadName, "worker", "", 0, 1);
        meta.tid = 9;
        let mut events = vec![probe(5, 1, 1), meta];
        sort_snapshot(&mut events);
        assert_eq!(events[0].ph, Phase::ThreadName);
    }

    #[test]
    fn first_number_skips_string_args() {
        let mut event = CleanEvent::synthetic(Phase::Counter, "c", "", 0, 1);
        event.argc = 0;
        let mut arg = Arg::default();
        arg.key.set("label");
        arg.kind = ArgKind::Str;
        arg.text.set("x");
        event.args[0] = arg;
        event.argc = 1;
        event.push_number("v", 42.0);
        assert_eq!(event.first_number(), Some(42.0));
    }
}
