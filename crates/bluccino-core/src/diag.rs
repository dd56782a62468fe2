//! Diagnostics log - serialized record of message traffic
//!
//! `record` may be called from producer contexts (interrupts, timer
//! expiries) and from the dispatcher. The lock guards the record buffer
//! only; it is taken after the tracing event is emitted and released
//! before `record` returns, so it is never held while a gear or decorator
//! runs.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::Level;

use crate::{BlError, BlResult, Message};

/// Default number of records kept before the oldest is evicted
pub const DEFAULT_LOG_CAPACITY: usize = 256;

/// Level a `Dropped` record is logged at: `warn` for messages whose loss
/// matters, `debug` for periodic ticks and UP status reports that are sent
/// again anyway
pub fn drop_level(message: &Message) -> Level {
    if message.is_droppable() {
        Level::DEBUG
    } else {
        Level::WARN
    }
}

/// Point in a message's life a record was taken
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Enqueued,
    Dispatched,
    Dropped,
}

impl Phase {
    fn index(self) -> usize {
        match self {
            Phase::Enqueued => 0,
            Phase::Dispatched => 1,
            Phase::Dropped => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Enqueued => "enqueued",
            Phase::Dispatched => "dispatched",
            Phase::Dropped => "dropped",
        }
    }
}

/// One log entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    pub seq: u64,
    pub phase: Phase,
    pub message: Message,
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} {}", self.seq, self.phase.name(), self.message)
    }
}

/// Flat view used for JSON export
#[derive(Serialize)]
struct RecordView {
    seq: u64,
    phase: Phase,
    class: String,
    class_code: u8,
    opcode: String,
    opcode_code: u8,
    port: u16,
    value: String,
    direction: &'static str,
    status: String,
}

impl From<&LogRecord> for RecordView {
    fn from(record: &LogRecord) -> Self {
        let msg = &record.message;
        RecordView {
            seq: record.seq,
            phase: record.phase,
            class: msg.class().to_string(),
            class_code: msg.class().to_byte(),
            opcode: msg.opcode().to_string(),
            opcode_code: msg.opcode().to_byte(),
            port: msg.port(),
            value: msg.value().to_string(),
            direction: msg.direction().name(),
            status: msg.status().to_string(),
        }
    }
}

/// Bounded, context-safe traffic log
pub struct DiagnosticsLog {
    records: Mutex<VecDeque<LogRecord>>,
    capacity: usize,
    seq: AtomicU64,
    counts: [AtomicU64; 3],
    evicted: AtomicU64,
}

impl DiagnosticsLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    /// A capacity of zero keeps counters and tracing output only
    pub fn with_capacity(capacity: usize) -> Self {
        DiagnosticsLog {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            seq: AtomicU64::new(0),
            counts: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
            evicted: AtomicU64::new(0),
        }
    }

    /// Take the next sequence number without recording anything yet
    pub fn reserve(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a message at a phase of its life
    pub fn record(&self, message: &Message, phase: Phase) {
        let seq = self.reserve();
        self.record_at(seq, message, phase);
    }

    /// Record under a sequence number taken earlier with `reserve`.
    /// The buffer stays ordered by sequence number.
    pub fn record_at(&self, seq: u64, message: &Message, phase: Phase) {
        self.counts[phase.index()].fetch_add(1, Ordering::Relaxed);

        match phase {
            Phase::Dropped if drop_level(message) == Level::WARN => {
                tracing::warn!(seq, message = %message, "message dropped");
            }
            Phase::Dropped => {
                tracing::debug!(seq, message = %message, "message dropped");
            }
            _ => {
                tracing::trace!(seq, phase = phase.name(), message = %message);
            }
        }

        if self.capacity == 0 {
            return;
        }

        let record = LogRecord {
            seq,
            phase,
            message: message.clone(),
        };
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            if records.front().is_some_and(|oldest| oldest.seq > seq) {
                self.evicted.fetch_add(1, Ordering::Relaxed);
                return;
            }
            records.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        let at = records
            .iter()
            .rposition(|r| r.seq < seq)
            .map_or(0, |i| i + 1);
        records.insert(at, record);
    }

    /// Copy of the records currently buffered, oldest first
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Remove and return all buffered records
    pub fn drain(&self) -> Vec<LogRecord> {
        self.records.lock().drain(..).collect()
    }

    /// Total records taken at a phase, including evicted ones
    pub fn count(&self, phase: Phase) -> u64 {
        self.counts[phase.index()].load(Ordering::Relaxed)
    }

    /// Records lost to buffer eviction
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Export buffered records as a JSON array
    pub fn to_json(&self) -> BlResult<String> {
        let records = self.snapshot();
        let views: Vec<RecordView> = records.iter().map(RecordView::from).collect();
        serde_json::to_string(&views).map_err(|e| BlError::Logging(e.to_string()))
    }
}

impl Default for DiagnosticsLog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DiagnosticsLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticsLog")
            .field("capacity", &self.capacity)
            .field("enqueued", &self.count(Phase::Enqueued))
            .field("dispatched", &self.count(Phase::Dispatched))
            .field("dropped", &self.count(Phase::Dropped))
            .finish()
    }
}
