//! Timer/work bridge
//!
//! Keeps the table of live timers and hands expiries to the driver.
//! - One-shot entries are removed once they have fired (`reap`).
//! - Periodic entries stay armed until cancelled, whether or not their
//!   last firing made it into the queue.
//! - Cancelling removes the entry immediately; an expiry already on its
//!   way sees the cancel flag and does nothing.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bluccino_core::{BlError, BlResult, Injector, Message, TimerId};

use crate::driver::TimerState;
use crate::{Expiry, TimerDriver};

struct TimerEntry {
    state: Arc<TimerState>,
    period: Option<Duration>,
    template: Message,
}

/// Bridge between handlers asking for deferred messages and the driver
pub struct TimerBridge {
    driver: Box<dyn TimerDriver>,
    injector: Injector,
    entries: HashMap<TimerId, TimerEntry>,
    last_id: TimerId,
    failures: Arc<AtomicU64>,
}

impl TimerBridge {
    pub fn new(driver: Box<dyn TimerDriver>, injector: Injector) -> Self {
        TimerBridge {
            driver,
            injector,
            entries: HashMap::new(),
            last_id: TimerId::default(),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Inject `template` once after `delay`
    pub fn schedule_once(&mut self, delay: Duration, template: Message) -> BlResult<TimerId> {
        self.arm(delay, None, template)
    }

    /// Inject `template` every `period` until cancelled
    pub fn schedule_periodic(&mut self, period: Duration, template: Message) -> BlResult<TimerId> {
        if period.is_zero() {
            return Err(BlError::TimerDriver("periodic timer needs a non-zero period".into()));
        }
        self.arm(period, Some(period), template)
    }

    fn arm(&mut self, delay: Duration, period: Option<Duration>, template: Message) -> BlResult<TimerId> {
        self.last_id = self.last_id.next();
        let id = self.last_id;
        let state = Arc::new(TimerState::default());
        let expiry = Expiry::new(
            id,
            template.clone(),
            self.injector.clone(),
            Arc::clone(&state),
            Arc::clone(&self.failures),
        );
        self.driver.arm(delay, period, expiry)?;
        tracing::trace!(timer = %id, ?delay, ?period, message = %template, "timer armed");
        self.entries.insert(
            id,
            TimerEntry {
                state,
                period,
                template,
            },
        );
        Ok(id)
    }

    /// Cancel a timer before it expires. A one-shot timer that already
    /// fired counts as gone: its message is in the queue and stays there.
    pub fn cancel(&mut self, id: TimerId) -> BlResult<()> {
        let entry = self.entries.remove(&id).ok_or(BlError::UnknownTimer(id))?;
        entry.state.cancelled.store(true, Ordering::Release);
        self.driver.disarm(id);
        if entry.period.is_none() && entry.state.fired.load(Ordering::Acquire) > 0 {
            tracing::trace!(timer = %id, "cancel after expiry");
            return Err(BlError::UnknownTimer(id));
        }
        tracing::trace!(timer = %id, "timer cancelled");
        Ok(())
    }

    /// Drop one-shot entries that have fired. Returns how many were removed.
    pub fn reap(&mut self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| e.period.is_some() || e.state.fired.load(Ordering::Acquire) == 0);
        before - self.entries.len()
    }

    /// Cancel every timer
    pub fn cancel_all(&mut self) {
        for (id, entry) in self.entries.drain() {
            entry.state.cancelled.store(true, Ordering::Release);
            self.driver.disarm(id);
        }
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Timers not yet reaped or cancelled
    pub fn active(&self) -> usize {
        self.entries.len()
    }

    /// Template a live timer injects
    pub fn template(&self, id: TimerId) -> Option<&Message> {
        self.entries.get(&id).map(|e| &e.template)
    }

    /// Firings dropped because the queue was full
    pub fn drops(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn now(&self) -> Duration {
        self.driver.now()
    }
}

impl Drop for TimerBridge {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

impl fmt::Debug for TimerBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerBridge")
            .field("active", &self.entries.len())
            .field("drops", &self.drops())
            .finish()
    }
}
