//! Bounded ring buffer with per-consumer release
//!
//! The only cross-stage channel in the pipeline. A fixed-capacity circular
//! array of slots; each slot holds a shared item and a count of consumers
//! that have not released it yet. A slot is reused only once every
//! configured consumer released it, which is what lets N storage plugin
//! threads read the same Message without copies and still bound memory.
//!
//! `read` hands out items in write order per consumer; `release` is the
//! consumer's terminal action for one item - forwarded downstream or
//! dropped, exactly one of the two, exactly once. A full buffer blocks the
//! producer (`block = true`), which is the backpressure path from slow
//! storage up to the input stage.
//!
//! Closing the buffer wakes all readers; they drain what is buffered and
//! then see `None`, the shutdown signal a stage propagates by closing its
//! own output queue.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{PipelineError, Result};

struct Slot<T> {
    item: Arc<T>,
    /// Consumers that have not released this slot yet
    remaining: usize,
}

struct State<T> {
    slots: Vec<Option<Slot<T>>>,
    /// Next sequence number to write
    head: u64,
    /// Oldest sequence number not yet fully released
    tail: u64,
    /// Per-consumer next sequence to read
    cursors: Vec<u64>,
    /// Per-consumer next sequence to release
    released: Vec<u64>,
    closed: bool,
    forwarded: u64,
    dropped: u64,
}

/// Fixed-capacity queue between two pipeline stages
pub struct RingBuffer<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    consumers: usize,
}

impl<T> RingBuffer<T> {
    /// A buffer of `capacity` slots read by `consumers` independent readers
    ///
    /// Every item written is seen by every consumer; consumer indices are
    /// `0..consumers`.
    pub fn new(capacity: usize, consumers: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        assert!(consumers > 0, "ring buffer needs at least one consumer");
        Self {
            state: Mutex::new(State {
                slots: (0..capacity).map(|_| None).collect(),
                head: 0,
                tail: 0,
                cursors: vec![0; consumers],
                released: vec![0; consumers],
                closed: false,
                forwarded: 0,
                dropped: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            consumers,
        }
    }

    /// Append one item
    ///
    /// With `block = true` a full buffer parks the producer until a slot is
    /// fully released; with `block = false` it returns `QueueFull`. Writing
    /// to a closed buffer is `QueueClosed`.
    pub fn write(&self, item: Arc<T>, block: bool) -> Result<()> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(PipelineError::QueueClosed);
            }
            if (state.head - state.tail) < self.capacity as u64 {
                let idx = (state.head % self.capacity as u64) as usize;
                debug_assert!(state.slots[idx].is_none(), "slot reused before release");
                state.slots[idx] = Some(Slot {
                    item,
                    remaining: self.consumers,
                });
                state.head += 1;
                self.not_empty.notify_all();
                return Ok(());
            }
            if !block {
                return Err(PipelineError::QueueFull);
            }
            self.not_full.wait(&mut state);
        }
    }

    /// Next item for one consumer, in write order
    ///
    /// Blocks until an item is available or the buffer is closed and
    /// drained; `None` is the shutdown signal.
    pub fn read(&self, consumer: usize) -> Option<Arc<T>> {
        let mut state = self.state.lock();
        loop {
            let cursor = state.cursors[consumer];
            if cursor < state.head {
                let idx = (cursor % self.capacity as u64) as usize;
                let item = Arc::clone(
                    &state.slots[idx].as_ref().expect("read within live window").item,
                );
                state.cursors[consumer] = cursor + 1;
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Release this consumer's claim on its oldest unreleased item
    ///
    /// `forwarded` records whether the item went downstream or was dropped;
    /// the two are the mutually exclusive terminal actions per consumer per
    /// item. Releasing the last claim frees the slot and wakes a blocked
    /// producer.
    pub fn release(&self, consumer: usize, forwarded: bool) {
        let mut state = self.state.lock();
        let seq = state.released[consumer];
        debug_assert!(seq < state.cursors[consumer], "release without a prior read");
        state.released[consumer] = seq + 1;
        if forwarded {
            state.forwarded += 1;
        } else {
            state.dropped += 1;
        }

        let idx = (seq % self.capacity as u64) as usize;
        let slot = state.slots[idx].as_mut().expect("release of a live slot");
        slot.remaining -= 1;
        if slot.remaining > 0 {
            return;
        }
        state.slots[idx] = None;

        // Advance the tail over every fully released slot.
        while state.tail < state.head {
            let idx = (state.tail % self.capacity as u64) as usize;
            if state.slots[idx].is_some() {
                break;
            }
            state.tail += 1;
        }
        self.not_full.notify_all();
    }

    /// Close the buffer; readers drain what is buffered, then see `None`
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Items written but not yet fully released
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        (state.head - state.tail) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total release calls marked as forwarded
    pub fn forwarded(&self) -> u64 {
        self.state.lock().forwarded
    }

    /// Total release calls marked as dropped
    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }
}
