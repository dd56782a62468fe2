//! Standalone bus
//!
//! Collects what handlers post and schedule instead of feeding a queue.
//! Lets a gear or decorator be exercised without a running core.

use std::time::Duration;

use bluccino_core::{BlError, BlResult, Message, TimerId};

use crate::Bus;

/// Timer request recorded by `LocalBus`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduledTimer {
    pub id: TimerId,
    pub delay: Duration,
    /// `Some` for periodic timers
    pub period: Option<Duration>,
    pub message: Message,
}

#[derive(Debug, Default)]
pub struct LocalBus {
    posted: Vec<Message>,
    timers: Vec<ScheduledTimer>,
    now: Duration,
    next_timer: TimerId,
    post_limit: Option<usize>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject posts with `QueueFull` once `limit` messages are held
    pub fn with_post_limit(limit: usize) -> Self {
        LocalBus {
            post_limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn set_now(&mut self, now: Duration) {
        self.now = now;
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    pub fn posted(&self) -> &[Message] {
        &self.posted
    }

    pub fn take_posted(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.posted)
    }

    /// Timers armed and not cancelled
    pub fn timers(&self) -> &[ScheduledTimer] {
        &self.timers
    }

    fn arm(&mut self, delay: Duration, period: Option<Duration>, message: Message) -> TimerId {
        self.next_timer = self.next_timer.next();
        let id = self.next_timer;
        self.timers.push(ScheduledTimer {
            id,
            delay,
            period,
            message,
        });
        id
    }
}

impl Bus for LocalBus {
    fn post(&mut self, message: Message) -> BlResult<()> {
        if self.post_limit.is_some_and(|limit| self.posted.len() >= limit) {
            return Err(BlError::QueueFull);
        }
        self.posted.push(message);
        Ok(())
    }

    fn schedule_once(&mut self, delay: Duration, message: Message) -> BlResult<TimerId> {
        Ok(self.arm(delay, None, message))
    }

    fn schedule_periodic(&mut self, period: Duration, message: Message) -> BlResult<TimerId> {
        Ok(self.arm(period, Some(period), message))
    }

    fn cancel(&mut self, timer: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != timer);
        self.timers.len() != before
    }

    fn now(&self) -> Duration {
        self.now
    }
}
