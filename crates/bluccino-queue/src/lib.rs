//! Bluccino Queue - Bounded cross-context FIFOs
//!
//! Two variants with the same push/pop contract:
//! - `RingQueue`: any number of producers (interrupts, timer expiries,
//!   driver callbacks), one consumer. Producers claim slots with a
//!   compare-and-swap on the write index.
//! - `SpscRing`: exactly one producer and one consumer, enforced by
//!   non-clonable handles. The write index is a plain atomic store.
//!
//! Neither variant blocks, allocates after construction, or overwrites an
//! unread slot. A push into a full queue fails and hands the item back.

use thiserror::Error;

pub mod ring;
pub mod spsc;

pub use ring::*;
pub use spsc::*;

/// Default capacity of the core's message queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Push rejected because every slot holds an unread item
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("queue full")]
pub struct QueueFull<T>(pub T);

impl<T> QueueFull<T> {
    /// Recover the rejected item
    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Capacity rules shared by both variants
pub(crate) struct Capacity<const N: usize>;

impl<const N: usize> Capacity<N> {
    /// Evaluated at compile time when a queue type is instantiated
    pub(crate) const VALID: () = assert!(
        N >= 2 && N.is_power_of_two(),
        "queue capacity must be a power of two >= 2"
    );
}
