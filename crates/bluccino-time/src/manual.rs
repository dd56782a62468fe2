//! Manual timer driver
//!
//! Virtual clock that only moves when told to. Advancing the clock fires
//! every timer that falls due, in deadline order (arming order for equal
//! deadlines), each at its own deadline. The driver is a cheap cloneable
//! handle: the bridge owns one clone, the test or simulation keeps another
//! to drive time.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use bluccino_core::{BlResult, TimerId};

use crate::{Expiry, TimerDriver};

struct Armed {
    period: Option<Duration>,
    expiry: Expiry,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    /// Keyed by (deadline, arming sequence)
    timers: BTreeMap<(Duration, u64), Armed>,
    seq: u64,
}

impl ManualState {
    fn insert(&mut self, deadline: Duration, armed: Armed) {
        self.seq += 1;
        self.timers.insert((deadline, self.seq), armed);
    }

    /// Remove the earliest timer due at or before `until`
    fn pop_due(&mut self, until: Duration) -> Option<(Duration, Armed)> {
        let key = *self.timers.keys().next()?;
        if key.0 > until {
            return None;
        }
        self.timers.remove(&key).map(|armed| (key.0, armed))
    }
}

/// Deterministic driver on a virtual clock
#[derive(Clone, Default)]
pub struct ManualDriver {
    state: Arc<Mutex<ManualState>>,
}

impl ManualDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward, firing everything that falls due.
    /// Returns the number of expiries run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.lock().now + by;
        let mut fired = 0;
        loop {
            // Lock is released before firing
            let due = {
                let mut state = self.state.lock();
                let due = state.pop_due(target);
                if let Some((deadline, armed)) = &due {
                    state.now = *deadline;
                    if let Some(period) = armed.period {
                        state.insert(
                            *deadline + period,
                            Armed {
                                period: Some(period),
                                expiry: armed.expiry.clone(),
                            },
                        );
                    }
                }
                due
            };
            match due {
                Some((_, armed)) => {
                    armed.expiry.fire();
                    fired += 1;
                }
                None => break,
            }
        }
        self.state.lock().now = target;
        fired
    }

    /// Advance to the next deadline, if any, and fire what is due there
    pub fn advance_to_next(&self) -> usize {
        let next = {
            let state = self.state.lock();
            state.timers.keys().next().map(|k| k.0.saturating_sub(state.now))
        };
        match next {
            Some(delta) => self.advance(delta),
            None => 0,
        }
    }

    /// Timers currently armed
    pub fn armed(&self) -> usize {
        self.state.lock().timers.len()
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Duration> {
        self.state.lock().timers.keys().next().map(|k| k.0)
    }

    /// Expiry a timer will run, for exercising late firings
    pub fn pending_expiry(&self, id: TimerId) -> Option<Expiry> {
        self.state
            .lock()
            .timers
            .values()
            .find(|a| a.expiry.id() == id)
            .map(|a| a.expiry.clone())
    }
}

impl TimerDriver for ManualDriver {
    fn arm(&mut self, delay: Duration, period: Option<Duration>, expiry: Expiry) -> BlResult<()> {
        let mut state = self.state.lock();
        let deadline = state.now + delay;
        state.insert(deadline, Armed { period, expiry });
        Ok(())
    }

    fn disarm(&mut self, id: TimerId) -> bool {
        let mut state = self.state.lock();
        let before = state.timers.len();
        state.timers.retain(|_, a| a.expiry.id() != id);
        state.timers.len() != before
    }

    fn now(&self) -> Duration {
        self.state.lock().now
    }
}

impl std::fmt::Debug for ManualDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualDriver")
            .field("now", &state.now)
            .field("armed", &state.timers.len())
            .finish()
    }
}
