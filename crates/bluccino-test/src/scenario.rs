//! Scenario runners
//!
//! Each runner builds a core on the manual clock, drives it the way a
//! target's main loop would, and reports the counts needed to check the
//! delivery guarantees.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use bluccino_core::{BlResult, Class, Message, Opcode, Status, TimerId};
use bluccino_gear::{gear_fn, Context, Filter};
use bluccino_runtime::{Core, CoreConfig, RuntimeStats};

use crate::{IsrSource, SimulatedBoard};

/// Interrupt storm setup
#[derive(Clone, Debug)]
pub struct StormConfig {
    pub sources: Vec<IsrSource>,
    pub seed: u64,
    pub core: CoreConfig,
}

impl StormConfig {
    /// `sources` buttons with `events` presses each
    pub fn buttons(sources: u16, events: u32, seed: u64) -> Self {
        StormConfig {
            sources: (0..sources).map(|p| IsrSource::button(p, events)).collect(),
            seed,
            core: CoreConfig::default(),
        }
    }
}

/// Outcome of an interrupt storm
#[derive(Clone, Debug, Default)]
pub struct StormResult {
    pub produced: u64,
    pub pushed: u64,
    pub dropped: u64,
    /// Events the dispatcher handed to gears
    pub delivered: u64,
    /// Events seen out of their source's push order
    pub order_violations: u64,
    pub stats: RuntimeStats,
}

impl StormResult {
    /// Every pushed event arrived once, in order; every other was counted
    pub fn is_consistent(&self) -> bool {
        self.order_violations == 0
            && self.delivered == self.pushed
            && self.produced == self.pushed + self.dropped
            && self.stats.dropped == self.dropped
    }
}

#[derive(Default)]
struct OrderTracker {
    last: HashMap<(Class, u16), i32>,
    delivered: u64,
    violations: u64,
}

impl OrderTracker {
    fn observe(&mut self, msg: &Message) {
        self.delivered += 1;
        let seq = msg.value().as_int().unwrap_or(-1);
        let last = self.last.entry((msg.class(), msg.port())).or_insert(-1);
        if seq <= *last {
            self.violations += 1;
        }
        *last = seq;
    }
}

/// Run interrupt sources against a live dispatcher with queue capacity `N`
pub fn run_isr_storm<const N: usize>(config: StormConfig) -> BlResult<StormResult> {
    let (mut core, _clock) = Core::<N>::manual(config.core.clone())?;
    let tracker = Arc::new(Mutex::new(OrderTracker::default()));

    let classes: BTreeSet<Class> = config.sources.iter().map(|s| s.class).collect();
    for class in classes {
        let tracker = Arc::clone(&tracker);
        core.register(
            Filter::up(class),
            gear_fn(move |msg: &Message, _ctx: &mut Context<'_>| {
                tracker.lock().observe(msg);
                Status::Success
            }),
        )?;
    }

    let board = SimulatedBoard::spawn(&core.injector(), &config.sources, config.seed);
    while !board.is_finished() {
        if core.tick() == 0 {
            thread::yield_now();
        }
    }
    let reports = board.join();
    while core.tick() > 0 {}

    let tracker = tracker.lock();
    let result = StormResult {
        produced: reports.iter().map(|r| u64::from(r.produced())).sum(),
        pushed: reports.iter().map(|r| u64::from(r.pushed)).sum(),
        dropped: reports.iter().map(|r| u64::from(r.dropped)).sum(),
        delivered: tracker.delivered,
        order_violations: tracker.violations,
        stats: core.stats(),
    };
    tracing::info!(
        produced = result.produced,
        dropped = result.dropped,
        violations = result.order_violations,
        "isr storm finished"
    );
    Ok(result)
}

/// Outcome of a timer storm
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimerStormResult {
    pub scheduled: usize,
    pub cancelled: usize,
    /// Timers that should have delivered
    pub expected: BTreeSet<u16>,
    /// Timers whose message reached a gear
    pub delivered: BTreeSet<u16>,
}

impl TimerStormResult {
    pub fn is_consistent(&self) -> bool {
        self.expected == self.delivered
    }
}

/// Arm `timers` one-shots with random delays within `horizon`, cancel a
/// random subset at random moments, and step the clock in random strides
pub fn run_timer_storm(timers: u16, horizon: Duration, seed: u64) -> BlResult<TimerStormResult> {
    let mut rng = StdRng::seed_from_u64(seed);
    let (mut core, clock) = Core::<256>::manual(CoreConfig::default())?;

    let delivered = Arc::new(Mutex::new(BTreeSet::new()));
    let sink = Arc::clone(&delivered);
    core.register(
        Filter::up(Class::Timer),
        gear_fn(move |msg: &Message, _ctx: &mut Context<'_>| {
            sink.lock().insert(msg.port());
            Status::Success
        }),
    )?;

    let horizon_ms = horizon.as_millis().max(2) as u64;
    let mut armed: Vec<(TimerId, u16, u64, Option<u64>)> = Vec::with_capacity(timers as usize);
    for port in 0..timers {
        let delay = rng.gen_range(1..horizon_ms);
        let cancel_at = rng.gen_bool(0.4).then(|| rng.gen_range(0..horizon_ms));
        let id = core.schedule_once(
            Duration::from_millis(delay),
            Message::up(Class::Timer, Opcode::Tick, port, 0),
        )?;
        armed.push((id, port, delay, cancel_at));
    }

    let mut result = TimerStormResult {
        scheduled: armed.len(),
        ..TimerStormResult::default()
    };
    // A timer cancelled at t has already fired iff its deadline is <= t
    for &(_, port, delay, cancel_at) in &armed {
        match cancel_at {
            Some(t) if delay > t => result.cancelled += 1,
            _ => {
                result.expected.insert(port);
            }
        }
    }

    let mut now = 0u64;
    while now <= horizon_ms {
        for &(id, _, _, cancel_at) in &armed {
            if cancel_at == Some(now) {
                core.cancel(id).ok();
            }
        }
        core.run_until_idle(usize::MAX);
        let stride = rng.gen_range(1..=5);
        clock.advance(Duration::from_millis(1));
        now += 1;
        // Extra strides skip cancel points only when none fall inside them
        for _ in 1..stride {
            if armed.iter().any(|a| a.3 == Some(now)) || now > horizon_ms {
                break;
            }
            clock.advance(Duration::from_millis(1));
            now += 1;
        }
    }
    core.run_until_idle(usize::MAX);

    result.delivered = delivered.lock().clone();
    Ok(result)
}
