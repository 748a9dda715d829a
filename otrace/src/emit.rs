//! Typed emit functions: gate, reserve a slot, fill, commit.
//!
//! Every entry point takes the thread-local reentrancy guard first so that
//! tracer work (predicates, heap hooks firing on tracer allocations) cannot
//! recursively enter the tracer; a nested call drops its event silently.

use crate::event::{Event, Phase};
use crate::registry::{self, registry, ReentrancyGuard};
use crate::{clock, gate, ring, ArgValue};

fn write_event(ph: Phase, name: &str, cat: &str, fill: impl FnOnce(&mut Event)) {
    let reg = registry();
    let _ = registry::with_local(|local| {
        local.seq += 1;
        let seq = local.seq;
        let ts = clock::now_us();
        let pid = reg.refresh_pid();
        let buf = local.buf;
        // Sole producer for this buffer; the guard above keeps the slot
        // borrow from overlapping a nested append.
        let slot = unsafe { buf.append(seq, &mut local.pending_cname) };
        slot.ts_us = ts;
        slot.pid = pid;
        slot.tid = buf.tid;
        slot.ph = ph;
        slot.name.set(name);
        slot.cat.set(cat);
        fill(slot);
        ring::commit(slot);
    });
}

/// Admission gates 1-5, then the write. Assumes the reentrancy guard is
/// already held by the caller.
fn gated_emit(ph: Phase, name: &str, cat: &str, fill: impl FnOnce(&mut Event)) {
    let reg = registry();
    if !reg.enabled() {
        return;
    }
    if !gate::admit(&reg.gate.load(), name, cat) {
        return;
    }
    write_event(ph, name, cat, fill);
}

fn emit(ph: Phase, name: &str, cat: Option<&str>, fill: impl FnOnce(&mut Event)) {
    let Some(_guard) = ReentrancyGuard::enter() else {
        return;
    };
    gated_emit(ph, name, cat.unwrap_or(""), fill);
}

fn push_args(event: &mut Event, args: &[(&str, ArgValue<'_>)]) {
    for (key, value) in args {
        match value {
            ArgValue::Number(n) => event.push_number(key, *n),
            ArgValue::Str(s) => event.push_text(key, s),
        }
    }
}

/// Records the begin half of a duration pair.
pub fn begin(name: &str, cat: Option<&str>) {
    emit(Phase::Begin, name, cat, |_| {});
}

/// Records the end half of a duration pair.
pub fn end(name: &str, cat: Option<&str>) {
    emit(Phase::End, name, cat, |_| {});
}

/// Records a complete slice with a caller-measured duration. The slice is
/// backdated so its timestamp is the start of the measured interval, the
/// way viewers render `X` events.
pub fn complete(name: &str, dur_us: u64, cat: Option<&str>, args: &[(&str, ArgValue<'_>)]) {
    emit(Phase::Complete, name, cat, |e| {
        e.ts_us = e.ts_us.saturating_sub(dur_us);
        e.dur_us = dur_us;
        push_args(e, args);
    });
}

/// Records a point-in-time marker.
pub fn instant(name: &str, cat: Option<&str>) {
    emit(Phase::Instant, name, cat, |_| {});
}

/// Records an instant with key/value args; pairs beyond the per-event cap
/// are silently dropped.
pub fn instant_kvs(name: &str, cat: Option<&str>, args: &[(&str, ArgValue<'_>)]) {
    emit(Phase::Instant, name, cat, |e| push_args(e, args));
}

/// Records a counter sample with the given numeric series. An empty series
/// still produces one series, keyed by the event name with value 0.
pub fn counter(name: &str, cat: Option<&str>, series: &[(&str, f64)]) {
    emit(Phase::Counter, name, cat, |e| {
        if series.is_empty() {
            e.push_number(name, 0.0);
        } else {
            for (key, value) in series {
                e.push_number(key, *value);
            }
        }
    });
}

fn flow(ph: Phase, id: u64) {
    emit(ph, "flow", Some("flow"), |e| e.flow_id = id);
}

/// Starts a flow arrow with the given 64-bit id.
pub fn flow_begin(id: u64) {
    flow(Phase::FlowStart, id);
}

/// Marks an intermediate step of a flow.
pub fn flow_step(id: u64) {
    flow(Phase::FlowStep, id);
}

/// Ends a flow arrow.
pub fn flow_end(id: u64) {
    flow(Phase::FlowEnd, id);
}

/// Marks a frame boundary; the synthesizer derives the fps track from
/// these.
pub fn mark_frame(index: u64) {
    emit(Phase::Instant, "frame", Some("frame"), |e| {
        e.push_number("frame", index as f64);
    });
}

/// Marks a labeled frame boundary.
pub fn mark_frame_labeled(label: &str) {
    emit(Phase::Instant, "frame", Some("frame"), |e| {
        e.push_text("label", label);
    });
}

/// Names the calling thread and records the metadata event. The name is
/// also mirrored into the thread buffer so every flush re-emits it.
pub fn set_thread_name(name: &str) {
    let Some(_guard) = ReentrancyGuard::enter() else {
        return;
    };
    let _ = registry::with_local(|local| local.buf.meta.lock().name.set(name));
    gated_emit(Phase::ThreadName, name, "", |_| {});
}

/// Orders the calling thread's lane in the viewer.
pub fn set_thread_sort_index(index: i32) {
    let Some(_guard) = ReentrancyGuard::enter() else {
        return;
    };
    let _ = registry::with_local(|local| local.buf.meta.lock().sort_index = index);
    gated_emit(Phase::ThreadSortIndex, "", "", |e| {
        e.push_number("sort_index", index as f64);
    });
}

/// Names the process.
pub fn set_process_name(name: &str) {
    let Some(_guard) = ReentrancyGuard::enter() else {
        return;
    };
    registry().process_name.lock().set(name);
    gated_emit(Phase::ProcessName, name, "", |_| {});
}

/// Stashes a color hint consumed by this thread's next emitted event.
pub fn set_next_color(cname: &str) {
    let Some(_guard) = ReentrancyGuard::enter() else {
        return;
    };
    let _ = registry::with_local(|local| local.pending_cname.set(cname));
}

/// Emission for a scope guard release: the admission decision was taken at
/// entry and is not revisited, only `enabled` is re-checked so a flush in
/// progress is respected. The slice timestamp is the guard's entry time.
pub(crate) fn complete_pregated(
    name: &str,
    cat: &str,
    t0_us: u64,
    dur_us: u64,
    arg: Option<(&str, f64)>,
) {
    let Some(_guard) = ReentrancyGuard::enter() else {
        return;
    };
    if !registry().enabled() {
        return;
    }
    write_event(Phase::Complete, name, cat, |e| {
        e.ts_us = t0_us;
        e.dur_us = dur_us;
        if let Some((key, value)) = arg {
            e.push_number(key, value);
        }
    });
}
