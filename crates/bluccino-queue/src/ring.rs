//! Multi-producer ring queue
//!
//! Bounded array queue with a sequence number per slot. A slot whose
//! sequence equals the write position is free for that position; a slot
//! whose sequence equals position + 1 holds an item ready for the reader.
//! Producers race on the write index with compare-and-swap, so the queue is
//! safe to push from any number of contexts at once, including contexts
//! that preempt each other.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bluccino_core::{Message, MessageSink};

use crate::{Capacity, QueueFull};

struct Slot<T> {
    seq: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Bounded MPSC queue with compile-time capacity `N`
pub struct RingQueue<T, const N: usize> {
    slots: [Slot<T>; N],
    /// Read index; advanced by the consumer only
    head: AtomicUsize,
    /// Write index; claimed by producers
    tail: AtomicUsize,
    drops: AtomicU64,
}

// Items move between threads through the slots; the sequence protocol
// guarantees a slot is accessed by at most one side at a time.
unsafe impl<T: Send, const N: usize> Send for RingQueue<T, N> {}
unsafe impl<T: Send, const N: usize> Sync for RingQueue<T, N> {}

impl<T, const N: usize> RingQueue<T, N> {
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Capacity::<N>::VALID;
        RingQueue {
            slots: std::array::from_fn(|i| Slot {
                seq: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            }),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            drops: AtomicU64::new(0),
        }
    }

    /// Push without blocking. Safe from any context.
    pub fn try_push(&self, item: T) -> Result<(), QueueFull<T>> {
        let mut pos = self.tail.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & (N - 1)];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(pos) as isize;

            if diff == 0 {
                match self.tail.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS gave this producer exclusive
                        // ownership of the slot for position `pos`
                        unsafe { (*slot.value.get()).write(item) };
                        slot.seq.store(pos.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                // Slot still holds the item from one lap ago
                self.drops.fetch_add(1, Ordering::Relaxed);
                return Err(QueueFull(item));
            } else {
                // Another producer claimed this position meanwhile
                pos = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Pop the oldest item. Called from the consumer context only; the
    /// read index still advances with a CAS so a stray second caller
    /// cannot corrupt the queue.
    pub fn try_pop(&self) -> Option<T> {
        let mut pos = self.head.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & (N - 1)];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(pos.wrapping_add(1)) as isize;

            if diff == 0 {
                match self.head.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: seq == pos + 1 means the producer
                        // finished writing and the CAS made us its reader
                        let item = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.seq.store(pos.wrapping_add(N), Ordering::Release);
                        return Some(item);
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                return None;
            } else {
                pos = self.head.load(Ordering::Relaxed);
            }
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Items currently queued (approximate while producers are active)
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head).min(N)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    /// Pushes rejected because the queue was full
    pub fn drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }
}

impl<T, const N: usize> Default for RingQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Drop for RingQueue<T, N> {
    fn drop(&mut self) {
        while self.try_pop().is_some() {}
    }
}

impl<T, const N: usize> fmt::Debug for RingQueue<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingQueue")
            .field("capacity", &N)
            .field("len", &self.len())
            .field("drops", &self.drops())
            .finish()
    }
}

impl<const N: usize> MessageSink for RingQueue<Message, N> {
    fn try_push(&self, message: Message) -> Result<(), Message> {
        RingQueue::try_push(self, message).map_err(QueueFull::into_inner)
    }

    fn capacity(&self) -> usize {
        N
    }

    fn len(&self) -> usize {
        RingQueue::len(self)
    }
}
