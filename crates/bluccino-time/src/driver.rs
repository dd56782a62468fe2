//! Timer driver contract
//!
//! A driver owns the actual timers. When one expires, the driver calls
//! `Expiry::fire` from whatever context its timers run in; firing only
//! pushes into the ring queue, so that context may be an interrupt.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bluccino_core::{BlResult, Injector, Message, TimerId};

/// Host timer facility
pub trait TimerDriver: Send {
    /// Arm a timer firing after `delay`, then every `period` if given
    fn arm(&mut self, delay: Duration, period: Option<Duration>, expiry: Expiry) -> BlResult<()>;

    /// Stop a timer; false if the driver no longer holds it
    fn disarm(&mut self, id: TimerId) -> bool;

    /// Monotonic time since the driver was created
    fn now(&self) -> Duration;
}

impl TimerDriver for Box<dyn TimerDriver> {
    fn arm(&mut self, delay: Duration, period: Option<Duration>, expiry: Expiry) -> BlResult<()> {
        (**self).arm(delay, period, expiry)
    }

    fn disarm(&mut self, id: TimerId) -> bool {
        (**self).disarm(id)
    }

    fn now(&self) -> Duration {
        (**self).now()
    }
}

/// State shared between a timer entry and its in-flight expiries
#[derive(Debug, Default)]
pub(crate) struct TimerState {
    pub(crate) cancelled: AtomicBool,
    pub(crate) fired: AtomicU64,
}

/// What a driver runs when a timer expires
#[derive(Clone)]
pub struct Expiry {
    id: TimerId,
    template: Message,
    injector: Injector,
    state: Arc<TimerState>,
    failures: Arc<AtomicU64>,
}

impl Expiry {
    pub(crate) fn new(
        id: TimerId,
        template: Message,
        injector: Injector,
        state: Arc<TimerState>,
        failures: Arc<AtomicU64>,
    ) -> Self {
        Expiry {
            id,
            template,
            injector,
            state,
            failures,
        }
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn template(&self) -> &Message {
        &self.template
    }

    /// Timer was cancelled; any further firing is ignored
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Push a copy of the template into the queue.
    ///
    /// Returns true if the message was enqueued. A full queue drops the
    /// firing; it is counted and not retried.
    pub fn fire(&self) -> bool {
        if self.is_cancelled() {
            tracing::trace!(timer = %self.id, "expiry after cancel ignored");
            return false;
        }
        self.state.fired.fetch_add(1, Ordering::AcqRel);
        match self.injector.try_push(self.template.clone()) {
            Ok(()) => true,
            Err(_) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(timer = %self.id, message = %self.template, "timer firing dropped");
                false
            }
        }
    }
}

impl std::fmt::Debug for Expiry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Expiry")
            .field("id", &self.id)
            .field("template", &self.template)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
