//! Stock decorators
//!
//! Ready-made interceptors for the usual cross-cutting concerns. Time based
//! decorators read the clock from the context, so they behave the same on
//! the virtual clock used in tests.

use std::collections::HashMap;
use std::time::Duration;

use bluccino_core::{Message, RouteKey, Status, TimerId};

use crate::{Context, Decorator, Next};

/// Log every message entering the chain and the status coming back
#[derive(Debug, Clone)]
pub struct Trace {
    label: &'static str,
}

impl Trace {
    pub fn new(label: &'static str) -> Self {
        Trace { label }
    }
}

impl Decorator for Trace {
    fn intercept(&mut self, message: &Message, next: Next<'_>, ctx: &mut Context<'_>) -> Status {
        let gear = ctx.gear();
        tracing::debug!(label = self.label, gear = %gear, message = %message, "enter");
        let status = next.run(message, ctx);
        tracing::debug!(label = self.label, gear = %gear, status = %status, "leave");
        status
    }

    fn name(&self) -> &str {
        self.label
    }
}

/// Suppress repeats of the same message kind on the same port that arrive
/// within `window` of the last one let through
#[derive(Debug)]
pub struct Debounce {
    window: Duration,
    last: HashMap<(RouteKey, u16), Duration>,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Debounce {
            window,
            last: HashMap::new(),
        }
    }
}

impl Decorator for Debounce {
    fn intercept(&mut self, message: &Message, next: Next<'_>, ctx: &mut Context<'_>) -> Status {
        let now = ctx.now();
        let key = (message.route_key(), message.port());
        if let Some(&at) = self.last.get(&key) {
            if now.saturating_sub(at) < self.window {
                tracing::trace!(message = %message, "debounced");
                return Status::Pending;
            }
        }
        self.last.insert(key, now);
        next.run(message, ctx)
    }

    fn name(&self) -> &str {
        "debounce"
    }
}

/// Let at most `max` messages through per fixed `window`
#[derive(Debug)]
pub struct RateLimit {
    max: u32,
    window: Duration,
    window_start: Option<Duration>,
    passed: u32,
    rejected: u64,
}

impl RateLimit {
    pub fn new(max: u32, window: Duration) -> Self {
        RateLimit {
            max,
            window,
            window_start: None,
            passed: 0,
            rejected: 0,
        }
    }

    /// Messages held back so far
    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

impl Decorator for RateLimit {
    fn intercept(&mut self, message: &Message, next: Next<'_>, ctx: &mut Context<'_>) -> Status {
        let now = ctx.now();
        let expired = self
            .window_start
            .map_or(true, |start| now.saturating_sub(start) >= self.window);
        if expired {
            self.window_start = Some(now);
            self.passed = 0;
        }
        if self.passed >= self.max {
            self.rejected += 1;
            tracing::trace!(message = %message, max = self.max, "rate limited");
            return Status::Pending;
        }
        self.passed += 1;
        next.run(message, ctx)
    }

    fn name(&self) -> &str {
        "rate-limit"
    }
}

/// Re-inject a message through the timer bridge when the chain behind this
/// decorator fails, up to `attempts` times
///
/// The retry is a fresh injection, so it fans out to every subscriber again.
/// A failure counts as the scheduled retry only when it arrives between the
/// retry's deadline and `grace` after it. Anything else starts a new budget:
/// an earlier failure supersedes the pending retry, and a retry whose firing
/// never came back (dropped on a full queue, or cancelled by `stop`) is
/// forgotten once its grace has passed.
#[derive(Debug)]
pub struct Retry {
    attempts: u32,
    delay: Duration,
    grace: Duration,
    pending: HashMap<(RouteKey, u16), PendingRetry>,
}

#[derive(Debug, Clone, Copy)]
struct PendingRetry {
    tries: u32,
    timer: TimerId,
    due: Duration,
}

impl Retry {
    /// Grace defaults to `delay`
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Retry {
            attempts,
            delay,
            grace: delay,
            pending: HashMap::new(),
        }
    }

    /// How late after its deadline a failure still counts as the retry
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Messages currently waiting for another attempt
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

impl Decorator for Retry {
    fn intercept(&mut self, message: &Message, next: Next<'_>, ctx: &mut Context<'_>) -> Status {
        let now = ctx.now();
        let grace = self.grace;
        self.pending.retain(|_, p| now <= p.due + grace);

        let status = next.run(message, ctx);
        let key = (message.route_key(), message.port());
        let retrying = self.pending.get(&key).filter(|p| now >= p.due).copied();

        if !status.is_failure() {
            if retrying.is_some() {
                self.pending.remove(&key);
            }
            return status;
        }

        let tries = retrying.map_or(0, |p| p.tries);
        if let Some(superseded) = self.pending.remove(&key) {
            if retrying.is_none() {
                ctx.cancel(superseded.timer);
            }
        }
        if tries >= self.attempts {
            tracing::warn!(message = %message, attempts = tries, "giving up after retries");
            return status;
        }

        match ctx.schedule_once(self.delay, message.reply(Status::Pending)) {
            Ok(timer) => {
                self.pending.insert(
                    key,
                    PendingRetry {
                        tries: tries + 1,
                        timer,
                        due: now + self.delay,
                    },
                );
                tracing::debug!(message = %message, attempt = tries + 1, timer = %timer, "retry scheduled");
            }
            Err(e) => {
                tracing::warn!(message = %message, error = %e, "retry not scheduled");
            }
        }
        status
    }

    fn name(&self) -> &str {
        "retry"
    }
}

/// Forward messages addressed to port `from` as if they were for port `to`
#[derive(Debug, Clone, Copy)]
pub struct MapPort {
    from: u16,
    to: u16,
}

impl MapPort {
    pub fn new(from: u16, to: u16) -> Self {
        MapPort { from, to }
    }
}

impl Decorator for MapPort {
    fn intercept(&mut self, message: &Message, next: Next<'_>, ctx: &mut Context<'_>) -> Status {
        if message.port() == self.from {
            next.run(&message.with_port(self.to), ctx)
        } else {
            next.run(message, ctx)
        }
    }

    fn name(&self) -> &str {
        "map-port"
    }
}
