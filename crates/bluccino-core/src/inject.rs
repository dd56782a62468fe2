//! Producer-side handle for pushing messages into the core
//!
//! Interrupt handlers, driver callbacks and timer expiries never see the
//! dispatcher. They hold an `Injector`, which can only push. A push never
//! blocks and never allocates in the queue; when the queue is full the
//! message is dropped, counted and logged.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::{BlError, BlResult, DiagnosticsLog, Message, Phase};

/// Bounded, non-blocking message sink (the ring queue's producer side)
pub trait MessageSink: Send + Sync {
    /// Push without blocking; hands the message back when full
    fn try_push(&self, message: Message) -> Result<(), Message>;

    fn capacity(&self) -> usize;

    /// Messages currently queued
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Write-only handle to the core's ring queue
#[derive(Clone)]
pub struct Injector {
    sink: Arc<dyn MessageSink>,
    log: Arc<DiagnosticsLog>,
    drops: Arc<AtomicU64>,
}

impl Injector {
    pub fn new(sink: Arc<dyn MessageSink>, log: Arc<DiagnosticsLog>) -> Self {
        Injector {
            sink,
            log,
            drops: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Push a message; `QueueFull` means it was dropped.
    /// Both outcomes are recorded in the diagnostics log.
    /// The sequence number is reserved before the message becomes visible,
    /// so its `Enqueued` record always precedes its `Dispatched` record.
    pub fn try_push(&self, message: Message) -> BlResult<()> {
        let seq = self.log.reserve();
        let copy = message.clone();
        match self.sink.try_push(message) {
            Ok(()) => {
                self.log.record_at(seq, &copy, Phase::Enqueued);
                Ok(())
            }
            Err(rejected) => {
                self.drops.fetch_add(1, Ordering::Relaxed);
                self.log.record_at(seq, &rejected, Phase::Dropped);
                Err(BlError::QueueFull)
            }
        }
    }

    /// Messages dropped through this injector and its clones
    pub fn drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    pub fn queued(&self) -> usize {
        self.sink.len()
    }

    pub fn capacity(&self) -> usize {
        self.sink.capacity()
    }

    pub fn log(&self) -> &Arc<DiagnosticsLog> {
        &self.log
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("queued", &self.queued())
            .field("capacity", &self.capacity())
            .field("drops", &self.drops())
            .finish()
    }
}
