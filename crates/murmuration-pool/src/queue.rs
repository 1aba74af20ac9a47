//! The lock-free MPMC ring buffer.
//!
//! Producers claim a slot with one `fetch_add` on `head`; consumers claim
//! with a `fetch_add` on `tail`, verified against a fresh read of `head`
//! and rolled back with `fetch_sub` when the claim raced past the
//! producers. Slot payloads are published with a per-slot readiness flag:
//! the producer release-stores it after writing the item, the consumer
//! acquire-loads it before reading, which is what makes the item's bytes
//! visible across threads.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::pool::RawTask;

/// One ring slot: readiness flag plus the item payload.
struct Slot {
    ready: AtomicBool,
    item: UnsafeCell<MaybeUninit<RawTask>>,
}

/// Lock-free multi-producer multi-consumer work queue.
///
/// Capacity is a power of two; slot indices are cursor values masked by
/// `capacity - 1`. Cursors only move forward between [`reset`]s, so a
/// slot is reused exactly once per `capacity` enqueues.
///
/// [`reset`]: WorkQueue::reset
pub(crate) struct WorkQueue {
    head: AtomicU64,
    tail: AtomicU64,
    mask: u64,
    slots: Box<[Slot]>,
    items_added: AtomicU64,
    items_processed: AtomicU64,
}

// SAFETY: slots are accessed under the claim protocol — a slot's payload
// is written by exactly one producer (unique `head` claim) and read by
// exactly one consumer (unique `tail` claim), sequenced by the
// release/acquire readiness flag.
unsafe impl Send for WorkQueue {}
unsafe impl Sync for WorkQueue {}

impl WorkQueue {
    /// Create a queue with capacity rounded up to the next power of two
    /// of `2 * requested`.
    pub fn with_capacity(requested: usize) -> Self {
        let capacity = (2 * requested.max(1)).next_power_of_two();
        let slots = (0..capacity)
            .map(|_| Slot {
                ready: AtomicBool::new(false),
                item: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();
        Self {
            head: AtomicU64::new(0),
            tail: AtomicU64::new(0),
            mask: capacity as u64 - 1,
            slots,
            items_added: AtomicU64::new(0),
            items_processed: AtomicU64::new(0),
        }
    }

    /// Number of slots in the ring.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Enqueue a work item.
    ///
    /// # Panics
    ///
    /// Panics when the ring is full. Callers size the queue for the
    /// worst-case submission burst of a frame; overflow is a mis-sizing
    /// bug, not a backpressure condition.
    pub fn push(&self, task: RawTask) {
        let index = self.head.fetch_add(1, Ordering::AcqRel);
        let slot = &self.slots[(index & self.mask) as usize];
        assert!(
            !slot.ready.load(Ordering::Acquire),
            "work queue overflow: capacity {} exceeded",
            self.slots.len()
        );
        // SAFETY: the `head` claim is unique, and the readiness flag was
        // observed clear, so no other thread touches this payload until
        // the release store below.
        unsafe {
            (*slot.item.get()).write(task);
        }
        slot.ready.store(true, Ordering::Release);
        self.items_added.fetch_add(1, Ordering::Relaxed);
    }

    /// Try to dequeue a work item.
    ///
    /// Returns `None` when the queue is observed empty. A consumer whose
    /// claim raced past the producers rolls its claim back and reports
    /// empty, exactly once per race.
    pub fn pop(&self) -> Option<RawTask> {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        if tail >= head {
            return None;
        }
        let claim = self.tail.fetch_add(1, Ordering::AcqRel);
        if claim >= self.head.load(Ordering::Acquire) {
            // Raced past the producers; undo the claim.
            self.tail.fetch_sub(1, Ordering::AcqRel);
            return None;
        }
        let slot = &self.slots[(claim & self.mask) as usize];
        // The producer that claimed this index may still be writing the
        // payload; its release store on `ready` is the publication point.
        while !slot.ready.load(Ordering::Acquire) {
            std::hint::spin_loop();
        }
        // SAFETY: the `tail` claim is unique and `ready` was observed
        // set, so the payload is fully written and no other consumer
        // will read it.
        let task = unsafe { (*slot.item.get()).assume_init_read() };
        slot.ready.store(false, Ordering::Release);
        self.items_processed.fetch_add(1, Ordering::Relaxed);
        Some(task)
    }

    /// Whether the queue is observed empty.
    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Acquire) >= self.head.load(Ordering::Acquire)
    }

    /// Return cursors and stats to the initial state.
    ///
    /// Caller must ensure no producer or consumer is mid-operation
    /// (the pool takes its reset spinlock and `&mut self` upstream).
    pub fn reset(&self) {
        self.head.store(0, Ordering::Release);
        self.tail.store(0, Ordering::Release);
        for slot in self.slots.iter() {
            slot.ready.store(false, Ordering::Release);
        }
    }

    /// Total items enqueued since construction.
    pub fn items_added(&self) -> u64 {
        self.items_added.load(Ordering::Relaxed)
    }

    /// Total items dequeued since construction.
    pub fn items_processed(&self) -> u64 {
        self.items_processed.load(Ordering::Relaxed)
    }
}
