//! Host timer driver on `tokio::time`
//!
//! Each armed timer is a task sleeping until its deadline. Expiries run on
//! the runtime's worker threads, concurrently with the dispatcher, which is
//! exactly the situation the ring queue is built for.

use std::collections::HashMap;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use bluccino_core::{BlError, BlResult, TimerId};

use crate::{Expiry, TimerDriver};

/// Driver backed by tokio timers
pub struct TokioDriver {
    handle: Handle,
    start: Instant,
    tasks: HashMap<TimerId, JoinHandle<()>>,
}

impl TokioDriver {
    pub fn new(handle: Handle) -> Self {
        TokioDriver {
            handle,
            start: Instant::now(),
            tasks: HashMap::new(),
        }
    }

    /// Driver on the runtime the caller is running in
    pub fn current() -> BlResult<Self> {
        let handle = Handle::try_current().map_err(|e| BlError::TimerDriver(e.to_string()))?;
        Ok(Self::new(handle))
    }

    /// Timer tasks still running
    pub fn running(&self) -> usize {
        self.tasks.values().filter(|t| !t.is_finished()).count()
    }
}

impl TimerDriver for TokioDriver {
    fn arm(&mut self, delay: Duration, period: Option<Duration>, expiry: Expiry) -> BlResult<()> {
        self.tasks.retain(|_, task| !task.is_finished());

        let id = expiry.id();
        let task = match period {
            None => self.handle.spawn(async move {
                time::sleep(delay).await;
                expiry.fire();
            }),
            Some(period) => self.handle.spawn(async move {
                let mut ticks = time::interval_at(Instant::now() + delay, period);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticks.tick().await;
                    if expiry.is_cancelled() {
                        break;
                    }
                    expiry.fire();
                }
            }),
        };
        self.tasks.insert(id, task);
        Ok(())
    }

    fn disarm(&mut self, id: TimerId) -> bool {
        match self.tasks.remove(&id) {
            Some(task) => {
                let live = !task.is_finished();
                task.abort();
                live
            }
            None => false,
        }
    }

    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for TokioDriver {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for TokioDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioDriver")
            .field("tasks", &self.tasks.len())
            .finish()
    }
}
