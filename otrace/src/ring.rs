//! Per-thread bounded event rings.
//!
//! A ring is written only by its owning thread and read by the flush path.
//! Publication follows the commit-flag protocol: `append` clears the flag
//! relaxed, the producer fills the slot, and `commit` stores 1 with release;
//! a reader that observes 1 with acquire sees every prior write to the slot.
//! Overflow silently overwrites the oldest slot; producers never block.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crossbeam::utils::CachePadded;
use parking_lot::Mutex;

use crate::event::{BoundedStr, Event, MAX_CNAME, MAX_NAME};

/// Thread name and lane ordering, mirrored here so every flush can
/// re-synthesize metadata. Written on the rare metadata calls only.
#[derive(Default)]
pub(crate) struct ThreadMeta {
    pub(crate) name: BoundedStr<MAX_NAME>,
    pub(crate) sort_index: i32,
}

pub(crate) struct ThreadBuffer {
    /// Next buffer in the registry list; written once before publication.
    pub(crate) next: *const ThreadBuffer,
    pub(crate) tid: u32,
    cap: u32,
    head: CachePadded<AtomicU32>,
    wrapped: AtomicBool,
    appended: AtomicU64,
    pub(crate) meta: Mutex<ThreadMeta>,
    slots: Box<[UnsafeCell<Event>]>,
}

// Slots are mutated only by the owning thread; other threads read them
// through `slot()` after observing the commit flag with acquire.
unsafe impl Sync for ThreadBuffer {}
unsafe impl Send for ThreadBuffer {}

impl ThreadBuffer {
    pub(crate) fn new(tid: u32, cap: usize) -> Self {
        let slots = (0..cap)
            .map(|_| UnsafeCell::new(Event::empty()))
            .collect();
        ThreadBuffer {
            next: std::ptr::null(),
            tid,
            cap: cap as u32,
            head: CachePadded::new(AtomicU32::new(0)),
            wrapped: AtomicBool::new(false),
            appended: AtomicU64::new(0),
            meta: Mutex::new(ThreadMeta::default()),
            slots,
        }
    }

    /// Reserves the slot at `head` and advances the ring.
    ///
    /// The slot comes back with the commit flag cleared, dynamic fields
    /// reset, the sequence number installed, and the pending color hint
    /// consumed.
    ///
    /// # Safety
    ///
    /// Must be called only by the thread owning this buffer, and the
    /// returned reference must be dropped before the next `append`.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn append(
        &self,
        seq: u64,
        pending_cname: &mut BoundedStr<MAX_CNAME>,
    ) -> &mut Event {
        let idx = self.head.load(Ordering::Relaxed);
        let slot = &mut *self.slots[idx as usize].get();
        slot.committed.store(0, Ordering::Relaxed);
        slot.argc = 0;
        slot.dur_us = 0;
        slot.flow_id = 0;
        slot.seq = seq;
        slot.name.clear();
        slot.cat.clear();
        if pending_cname.is_empty() {
            slot.cname.clear();
        } else {
            slot.cname = *pending_cname;
            pending_cname.clear();
        }

        let mut next = idx + 1;
        if next >= self.cap {
            next = 0;
            self.wrapped.store(true, Ordering::Relaxed);
        }
        self.head.store(next, Ordering::Release);
        self.appended.fetch_add(1, Ordering::Relaxed);
        slot
    }

    /// `(start, count)` of the committed region in circular order.
    pub(crate) fn snapshot_bounds(&self) -> (u32, u32) {
        let head = self.head.load(Ordering::Acquire);
        if self.wrapped.load(Ordering::Acquire) {
            (head, self.cap)
        } else {
            (0, head)
        }
    }

    pub(crate) fn capacity(&self) -> u32 {
        self.cap
    }

    pub(crate) fn slot(&self, idx: u32) -> *const Event {
        self.slots[idx as usize].get()
    }
}

/// Publishes a filled slot to readers.
pub(crate) fn commit(event: &Event) {
    event.committed.store(1, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Phase;

    fn append_one(buf: &ThreadBuffer, seq: u64, ts: u64) {
        let mut pending = BoundedStr::empty();
        let slot = unsafe { buf.append(seq, &mut pending) };
        slot.ts_us = ts;
        slot.ph = Phase::Instant;
        slot.name.set("e");
        commit(slot);
    }

    fn committed_seqs(buf: &ThreadBuffer) -> Vec<u64> {
        let (start, count) = buf.snapshot_bounds();
        let mut seqs = Vec::new();
        for i in 0..count {
            let idx = (start + i) % buf.capacity();
            let slot = unsafe { &*buf.slot(idx) };
            if slot.committed.load(Ordering::Acquire) != 0 {
                seqs.push(slot.seq);
            }
        }
        seqs
    }

    #[test]
    fn fills_in_order_before_wrap() {
        let buf = ThreadBuffer::new(1, 8);
        for seq in 1..=5 {
            append_one(&buf, seq, seq * 10);
        }
        assert_eq!(committed_seqs(&buf), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn overflow_keeps_last_capacity_events() {
        let buf = ThreadBuffer::new(1, 8);
        for seq in 1..=11 {
            append_one(&buf, seq, seq * 10);
        }
        // 11 appends into 8 slots: the snapshot is the last 8, oldest first.
        assert_eq!(committed_seqs(&buf), vec![4, 5, 6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn uncommitted_slot_is_skipped() {
        let buf = ThreadBuffer::new(1, 8);
        append_one(&buf, 1, 10);
        let mut pending = BoundedStr::empty();
        let slot = unsafe { buf.append(2, &mut pending) };
        slot.ts_us = 20;
        // no commit
        append_one(&buf, 3, 30);
        assert_eq!(committed_seqs(&buf), vec![1, 3]);
    }

    #[test]
    fn pending_color_is_consumed_once() {
        let buf = ThreadBuffer::new(1, 8);
        let mut pending = BoundedStr::empty();
        pending.set("good");
        let slot = unsafe { buf.append(1, &mut pending) };
        assert_eq!(slot.cname.as_str(), "good");
        commit(slot);
        let slot = unsafe { buf.append(2, &mut pending) };
        assert!(slot.cname.is_empty());
        commit(slot);
    }
}
