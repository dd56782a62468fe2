//! Single-producer ring
//!
//! For a lane fed by exactly one interrupt source. With a single writer
//! there is nothing to race on: the producer publishes by storing the
//! advanced write index, the consumer frees a slot by storing the advanced
//! read index. Exclusivity is carried by the handles, which cannot be
//! cloned and require `&mut self`.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bluccino_core::{Injector, Message};

use crate::{Capacity, QueueFull};

struct Shared<T, const N: usize> {
    buf: [UnsafeCell<MaybeUninit<T>>; N],
    head: AtomicUsize,
    tail: AtomicUsize,
    drops: AtomicU64,
}

// One producer handle and one consumer handle exist; they never touch the
// same slot concurrently thanks to the head/tail protocol.
unsafe impl<T: Send, const N: usize> Send for Shared<T, N> {}
unsafe impl<T: Send, const N: usize> Sync for Shared<T, N> {}

impl<T, const N: usize> Shared<T, N> {
    fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }
}

impl<T, const N: usize> Drop for Shared<T, N> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        let mut pos = head;
        while pos != tail {
            // SAFETY: slots in [head, tail) hold initialised items and no
            // handle is alive any more
            unsafe { self.buf[pos & (N - 1)].get_mut().assume_init_drop() };
            pos = pos.wrapping_add(1);
        }
    }
}

/// Constructor namespace for the single-producer ring
pub struct SpscRing<T, const N: usize>(std::marker::PhantomData<T>);

impl<T: Send, const N: usize> SpscRing<T, N> {
    /// Create a ring and return its two ends
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Producer<T, N>, Consumer<T, N>) {
        #[allow(clippy::let_unit_value)]
        let () = Capacity::<N>::VALID;
        let shared = Arc::new(Shared {
            buf: std::array::from_fn(|_| UnsafeCell::new(MaybeUninit::uninit())),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            drops: AtomicU64::new(0),
        });
        (
            Producer {
                shared: Arc::clone(&shared),
            },
            Consumer { shared },
        )
    }
}

/// Writing end; exactly one exists per ring
pub struct Producer<T, const N: usize> {
    shared: Arc<Shared<T, N>>,
}

impl<T, const N: usize> Producer<T, N> {
    pub fn try_push(&mut self, item: T) -> Result<(), QueueFull<T>> {
        let s = &*self.shared;
        let tail = s.tail.load(Ordering::Relaxed);
        let head = s.head.load(Ordering::Acquire);
        if tail.wrapping_sub(head) >= N {
            s.drops.fetch_add(1, Ordering::Relaxed);
            return Err(QueueFull(item));
        }
        // SAFETY: the slot at `tail` is outside [head, tail) so the
        // consumer does not read it until the store below publishes it
        unsafe { (*s.buf[tail & (N - 1)].get()).write(item) };
        s.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn drops(&self) -> u64 {
        self.shared.drops.load(Ordering::Relaxed)
    }
}

/// Reading end; exactly one exists per ring
pub struct Consumer<T, const N: usize> {
    shared: Arc<Shared<T, N>>,
}

impl<T, const N: usize> Consumer<T, N> {
    pub fn try_pop(&mut self) -> Option<T> {
        let s = &*self.shared;
        let head = s.head.load(Ordering::Relaxed);
        let tail = s.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        // SAFETY: [head, tail) was published by the producer's release
        // store and only this consumer advances head
        let item = unsafe { (*s.buf[head & (N - 1)].get()).assume_init_read() };
        s.head.store(head.wrapping_add(1), Ordering::Release);
        Some(item)
    }

    /// Pop everything currently queued into `f`; returns the count
    pub fn drain(&mut self, mut f: impl FnMut(T)) -> usize {
        let mut n = 0;
        while let Some(item) = self.try_pop() {
            f(item);
            n += 1;
        }
        n
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<const N: usize> Consumer<Message, N> {
    /// Move lane messages into the core queue while it has room. Returns
    /// how many were forwarded; the rest stay in the lane. A push that
    /// still loses a race with another producer is dropped and logged by
    /// the injector.
    pub fn forward(&mut self, injector: &Injector) -> usize {
        let mut n = 0;
        while injector.queued() < injector.capacity() {
            let Some(message) = self.try_pop() else {
                break;
            };
            if injector.try_push(message).is_err() {
                break;
            }
            n += 1;
        }
        n
    }
}

impl<T, const N: usize> fmt::Debug for Producer<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &N)
            .field("len", &self.len())
            .finish()
    }
}

impl<T, const N: usize> fmt::Debug for Consumer<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &N)
            .field("len", &self.len())
            .finish()
    }
}
