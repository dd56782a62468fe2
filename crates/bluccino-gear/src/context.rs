//! Dispatch context
//!
//! Everything a gear or decorator may do besides returning a status goes
//! through the context: post follow-up messages, arm or cancel timers, read
//! the clock, or halt the remaining fan-out of the current message.

use std::time::Duration;

use bluccino_core::{BlResult, GearId, Message, TimerId};

/// Side-effect surface a dispatcher offers to its handlers
///
/// Implemented by the runtime core; `LocalBus` is a standalone version for
/// driving gears outside a core.
pub trait Bus {
    /// Enqueue a message for a later dispatch cycle
    fn post(&mut self, message: Message) -> BlResult<()>;

    /// Inject `message` once after `delay`
    fn schedule_once(&mut self, delay: Duration, message: Message) -> BlResult<TimerId>;

    /// Inject `message` every `period` until cancelled
    fn schedule_periodic(&mut self, period: Duration, message: Message) -> BlResult<TimerId>;

    /// Cancel a timer; false if it was unknown or already gone
    fn cancel(&mut self, timer: TimerId) -> bool;

    /// Monotonic time since the core started
    fn now(&self) -> Duration;
}

/// Per-message handle passed through a decorator chain into a gear
pub struct Context<'a> {
    bus: &'a mut dyn Bus,
    gear: GearId,
    halted: bool,
}

impl<'a> Context<'a> {
    pub fn new(bus: &'a mut dyn Bus) -> Self {
        Context {
            bus,
            gear: GearId::default(),
            halted: false,
        }
    }

    /// Gear whose chain is currently running
    #[inline]
    pub fn gear(&self) -> GearId {
        self.gear
    }

    pub(crate) fn enter(&mut self, gear: GearId) {
        self.gear = gear;
    }

    pub fn post(&mut self, message: Message) -> BlResult<()> {
        self.bus.post(message)
    }

    pub fn schedule_once(&mut self, delay: Duration, message: Message) -> BlResult<TimerId> {
        self.bus.schedule_once(delay, message)
    }

    pub fn schedule_periodic(&mut self, period: Duration, message: Message) -> BlResult<TimerId> {
        self.bus.schedule_periodic(period, message)
    }

    pub fn cancel(&mut self, timer: TimerId) -> bool {
        self.bus.cancel(timer)
    }

    pub fn now(&self) -> Duration {
        self.bus.now()
    }

    /// Skip every gear after the current one for this message.
    /// Gears are otherwise all invoked regardless of earlier statuses.
    pub fn halt(&mut self) {
        if !self.halted {
            tracing::debug!(gear = %self.gear, "fan-out halted");
        }
        self.halted = true;
    }

    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halted
    }
}
