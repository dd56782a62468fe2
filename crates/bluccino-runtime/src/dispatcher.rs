//! Core dispatcher

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;

use bluccino_core::{
    BlResult, Class, DecoratorId, DiagnosticsLog, Direction, GearId, Injector, Message, Opcode,
    Phase, TimerId,
};
use bluccino_gear::{Bus, Decorator, DispatchOutcome, Filter, Gear, GearRegistry};
use bluccino_queue::{RingQueue, DEFAULT_QUEUE_CAPACITY};
use bluccino_time::{ManualDriver, TimerBridge, TimerDriver, TokioDriver};

use crate::CoreConfig;

/// Dispatcher counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    pub ticks: u64,
    pub dispatched: u64,
    /// Dispatched messages no gear subscribed to
    pub absorbed: u64,
    /// Dispatches whose aggregate status was a failure
    pub handler_failures: u64,
    /// Dispatches cut short by `Context::halt`
    pub halted: u64,
    /// Pushes rejected by the full queue, from any producer
    pub dropped: u64,
    /// Timer firings among `dropped`
    pub timer_drops: u64,
    #[serde(skip)]
    pub last_tick_duration: Duration,
}

/// Side effects available to handlers during a dispatch
struct CoreBus<'c> {
    injector: &'c Injector,
    timers: &'c mut TimerBridge,
}

impl Bus for CoreBus<'_> {
    fn post(&mut self, message: Message) -> BlResult<()> {
        self.injector.try_push(message)
    }

    fn schedule_once(&mut self, delay: Duration, message: Message) -> BlResult<TimerId> {
        self.timers.schedule_once(delay, message)
    }

    fn schedule_periodic(&mut self, period: Duration, message: Message) -> BlResult<TimerId> {
        self.timers.schedule_periodic(period, message)
    }

    fn cancel(&mut self, timer: TimerId) -> bool {
        self.timers.cancel(timer).is_ok()
    }

    fn now(&self) -> Duration {
        self.timers.now()
    }
}

/// The Bluccino core: queue, registry, timers and log behind one owner
///
/// `N` is the ring queue capacity and must be a power of two.
pub struct Core<const N: usize = DEFAULT_QUEUE_CAPACITY> {
    queue: Arc<RingQueue<Message, N>>,
    injector: Injector,
    registry: GearRegistry,
    timers: TimerBridge,
    log: Arc<DiagnosticsLog>,
    config: CoreConfig,
    stats: RuntimeStats,
    heartbeat: Vec<TimerId>,
    started: bool,
}

impl<const N: usize> Core<N> {
    /// Build a core on the given timer driver
    pub fn new(config: CoreConfig, driver: Box<dyn TimerDriver>) -> BlResult<Self> {
        config.validate()?;
        let queue = Arc::new(RingQueue::<Message, N>::new());
        let log = Arc::new(DiagnosticsLog::with_capacity(config.log_capacity));
        let injector = Injector::new(queue.clone(), Arc::clone(&log));
        let timers = TimerBridge::new(driver, injector.clone());

        tracing::info!(
            queue = N,
            max_gears = config.max_gears,
            batch = config.dispatch_batch,
            "core created"
        );

        Ok(Core {
            queue,
            injector,
            registry: GearRegistry::with_limits(config.registry_limits()),
            timers,
            log,
            config,
            stats: RuntimeStats::default(),
            heartbeat: Vec::new(),
            started: false,
        })
    }

    /// Core on a virtual clock; the returned driver advances time
    pub fn manual(config: CoreConfig) -> BlResult<(Self, ManualDriver)> {
        let driver = ManualDriver::new();
        let core = Self::new(config, Box::new(driver.clone()))?;
        Ok((core, driver))
    }

    /// Core on host timers; must be called inside a tokio runtime
    pub fn tokio(config: CoreConfig) -> BlResult<Self> {
        Self::new(config, Box::new(TokioDriver::current()?))
    }

    /// Write-only handle for interrupt handlers, drivers and other threads
    pub fn injector(&self) -> Injector {
        self.injector.clone()
    }

    pub fn register(&mut self, filter: Filter, gear: impl Gear + 'static) -> BlResult<GearId> {
        self.registry.register(filter, gear)
    }

    pub fn unregister(&mut self, id: GearId) -> BlResult<()> {
        self.registry.unregister(id)
    }

    pub fn wrap(&mut self, id: GearId, decorator: impl Decorator + 'static) -> BlResult<DecoratorId> {
        self.registry.wrap(id, decorator)
    }

    pub fn unwrap(&mut self, id: DecoratorId) -> BlResult<()> {
        self.registry.unwrap(id)
    }

    pub fn registry(&self) -> &GearRegistry {
        &self.registry
    }

    /// Queue a message for a later cycle
    pub fn post(&mut self, message: Message) -> BlResult<()> {
        self.injector.try_push(message)
    }

    /// Dispatch immediately and return the reply carrying the aggregate status
    pub fn call(&mut self, message: &Message) -> Message {
        let outcome = self.dispatch(message);
        message.reply(outcome.status)
    }

    /// Deliver one message to its subscribers now
    pub fn dispatch(&mut self, message: &Message) -> DispatchOutcome {
        self.log.record(message, Phase::Dispatched);

        let Core {
            registry,
            injector,
            timers,
            ..
        } = &mut *self;
        let mut bus = CoreBus { injector, timers };
        let outcome = registry.dispatch(message, &mut bus);

        self.stats.dispatched += 1;
        if outcome.absorbed() {
            self.stats.absorbed += 1;
        }
        if outcome.status.is_failure() {
            self.stats.handler_failures += 1;
        }
        if outcome.halted {
            self.stats.halted += 1;
        }
        outcome
    }

    /// One dispatch cycle. Returns the number of messages dispatched.
    pub fn tick(&mut self) -> usize {
        let start = Instant::now();
        self.stats.ticks += 1;
        self.timers.reap();

        let mut dispatched = 0;
        while dispatched < self.config.dispatch_batch {
            let Some(message) = self.queue.try_pop() else {
                break;
            };
            self.dispatch(&message);
            dispatched += 1;
        }

        self.stats.last_tick_duration = start.elapsed();
        dispatched
    }

    /// Tick until the queue is empty or `max_ticks` cycles ran.
    /// Returns the number of messages dispatched.
    pub fn run_until_idle(&mut self, max_ticks: usize) -> usize {
        let mut total = 0;
        for _ in 0..max_ticks {
            let n = self.tick();
            total += n;
            if n == 0 || self.queue.is_empty() {
                break;
            }
        }
        total
    }

    /// Announce SYS:INIT to hardware-facing and then application-facing
    /// gears, and arm the heartbeat timers
    pub fn start(&mut self) -> BlResult<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;

        self.dispatch(&Message::signal(Class::Sys, Opcode::Init, Direction::Down));
        self.dispatch(&Message::signal(Class::Sys, Opcode::Init, Direction::Up));

        if let Some(period) = self.config.tick_period {
            let id = self
                .timers
                .schedule_periodic(period, Message::signal(Class::Sys, Opcode::Tick, Direction::Up))?;
            self.heartbeat.push(id);
        }
        if let Some(period) = self.config.tock_period {
            let id = self
                .timers
                .schedule_periodic(period, Message::signal(Class::Sys, Opcode::Tock, Direction::Up))?;
            self.heartbeat.push(id);
        }
        tracing::info!(gears = self.registry.len(), heartbeat = self.heartbeat.len(), "core started");
        Ok(())
    }

    /// Cancel every timer, heartbeat included. Queued messages stay queued.
    pub fn stop(&mut self) {
        self.timers.cancel_all();
        self.heartbeat.clear();
        self.started = false;
        tracing::info!(queued = self.queue.len(), "core stopped");
    }

    /// Host main loop: tick, sleep `idle_poll` whenever the queue runs dry,
    /// return once `shutdown` turns true or its sender is dropped
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> BlResult<RuntimeStats> {
        self.start()?;
        let idle = self.config.idle_poll;
        while !*shutdown.borrow() {
            if self.tick() > 0 && !self.queue.is_empty() {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(idle) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        self.stop();
        Ok(self.stats())
    }

    pub fn schedule_once(&mut self, delay: Duration, message: Message) -> BlResult<TimerId> {
        self.timers.schedule_once(delay, message)
    }

    pub fn schedule_periodic(&mut self, period: Duration, message: Message) -> BlResult<TimerId> {
        self.timers.schedule_periodic(period, message)
    }

    /// Cancel a pending timer; `UnknownTimer` once it has fired or been cancelled
    pub fn cancel(&mut self, id: TimerId) -> BlResult<()> {
        self.timers.cancel(id)
    }

    /// Live timers
    pub fn timers(&self) -> usize {
        self.timers.active()
    }

    pub fn now(&self) -> Duration {
        self.timers.now()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn log(&self) -> &Arc<DiagnosticsLog> {
        &self.log
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            dropped: self.injector.drops(),
            timer_drops: self.timers.drops(),
            ..self.stats.clone()
        }
    }
}

impl<const N: usize> std::fmt::Debug for Core<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("capacity", &N)
            .field("queued", &self.queue.len())
            .field("gears", &self.registry.len())
            .field("timers", &self.timers.active())
            .field("started", &self.started)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluccino_core::{BlError, Status};
    use bluccino_gear::{decorator_fn, gear_fn, Context, Next};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn manual<const N: usize>(config: CoreConfig) -> (Core<N>, ManualDriver) {
        Core::<N>::manual(config).unwrap()
    }

    fn counter(core: &mut Core<8>, filter: Filter) -> Arc<AtomicUsize> {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        core.register(
            filter,
            gear_fn(move |_msg: &Message, _ctx: &mut Context<'_>| {
                h.fetch_add(1, Ordering::SeqCst);
                Status::Success
            }),
        )
        .unwrap();
        hits
    }

    #[test]
    fn test_led_gear_invoked_once_button_gear_never() {
        let (mut core, _clock) = manual::<8>(CoreConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        core.register(
            Filter::down(Class::Led),
            gear_fn(move |msg: &Message, _ctx: &mut Context<'_>| {
                sink.lock().push(msg.clone());
                Status::Success
            }),
        )
        .unwrap();
        let button = counter(&mut core, Filter::up(Class::Button));

        let set = Message::down(Class::Led, Opcode::Set, 1, 1);
        core.post(set.clone()).unwrap();
        assert_eq!(core.tick(), 1);

        assert_eq!(*seen.lock(), vec![set]);
        assert_eq!(button.load(Ordering::SeqCst), 0);
        assert_eq!(core.log().count(Phase::Dispatched), 1);
    }

    #[test]
    fn test_unsubscribed_message_is_absorbed() {
        let (mut core, _clock) = manual::<8>(CoreConfig::default());
        let leds = counter(&mut core, Filter::down(Class::Led));

        let outcome = core.dispatch(&Message::up(Class::Switch, Opcode::Toggle, 0, 1));
        assert!(outcome.absorbed());
        assert_eq!(leds.load(Ordering::SeqCst), 0);
        assert_eq!(core.queued(), 0);
        assert_eq!(core.timers(), 0);
        assert_eq!(core.stats().absorbed, 1);
        assert_eq!(core.stats().handler_failures, 0);
    }

    #[test]
    fn test_decorator_order_through_core() {
        let (mut core, _clock) = manual::<8>(CoreConfig::default());
        let trail = Arc::new(Mutex::new(Vec::new()));
        let g = Arc::clone(&trail);
        let gear = core
            .register(
                Filter::down(Class::Led),
                gear_fn(move |_msg: &Message, _ctx: &mut Context<'_>| {
                    g.lock().push("G");
                    Status::Success
                }),
            )
            .unwrap();
        for label in ["D1", "D2"] {
            let t = Arc::clone(&trail);
            core.wrap(
                gear,
                decorator_fn(move |msg: &Message, next: Next<'_>, ctx: &mut Context<'_>| {
                    t.lock().push(label);
                    next.run(msg, ctx)
                }),
            )
            .unwrap();
        }

        core.dispatch(&Message::down(Class::Led, Opcode::Set, 0, 1));
        assert_eq!(*trail.lock(), vec!["D2", "D1", "G"]);
    }

    #[test]
    fn test_follow_up_is_dispatched_next_tick() {
        let (mut core, _clock) = manual::<8>(CoreConfig::default());
        core.register(
            Filter::up(Class::Button).opcode(Opcode::Press),
            gear_fn(|msg: &Message, ctx: &mut Context<'_>| {
                match ctx.post(Message::down(Class::Led, Opcode::Toggle, msg.port(), 0)) {
                    Ok(()) => Status::Success,
                    Err(_) => Status::Failure(-1),
                }
            }),
        )
        .unwrap();
        let leds = counter(&mut core, Filter::down(Class::Led).opcode(Opcode::Toggle));

        core.injector()
            .try_push(Message::up(Class::Button, Opcode::Press, 0, 1))
            .unwrap();
        core.run_until_idle(4);
        assert_eq!(leds.load(Ordering::SeqCst), 1);
        assert_eq!(core.stats().dispatched, 2);
    }

    #[test]
    fn test_one_shot_timer_scenario() {
        let (mut core, clock) = manual::<8>(CoreConfig::default());
        let tick = Message::signal(Class::Sys, Opcode::Tick, Direction::Up);

        core.schedule_once(Duration::from_millis(100), tick.clone()).unwrap();
        clock.advance(Duration::from_millis(100));
        assert_eq!(core.queued(), 1);
        assert_eq!(core.queue.try_pop(), Some(tick.clone()));

        let id = core.schedule_once(Duration::from_millis(100), tick).unwrap();
        clock.advance(Duration::from_millis(40));
        core.cancel(id).unwrap();
        clock.advance(Duration::from_millis(100));
        assert_eq!(core.queued(), 0);

        let late = core
            .schedule_once(Duration::from_millis(100), Message::signal(Class::Sys, Opcode::Tick, Direction::Up))
            .unwrap();
        clock.advance(Duration::from_millis(100));
        assert_eq!(core.cancel(late), Err(BlError::UnknownTimer(late)));
        assert_eq!(core.queued(), 1);
    }

    #[test]
    fn test_full_queue_second_producer() {
        let (mut core, _clock) = manual::<4>(CoreConfig::default());
        let batch: Vec<Message> = (0..4)
            .map(|port| Message::up(Class::Button, Opcode::Status, port, 1))
            .collect();
        for msg in &batch {
            core.post(msg.clone()).unwrap();
        }

        let injector = core.injector();
        let rejected = thread::spawn(move || {
            injector.try_push(Message::up(Class::Button, Opcode::Press, 9, 1))
        })
        .join()
        .unwrap();
        assert_eq!(rejected, Err(bluccino_core::BlError::QueueFull));
        assert_eq!(core.stats().dropped, 1);
        assert_eq!(core.log().count(Phase::Dropped), 1);

        let mut drained = Vec::new();
        while let Some(msg) = core.queue.try_pop() {
            drained.push(msg);
        }
        assert_eq!(drained, batch);
    }

    #[test]
    fn test_dispatch_batch_limits_tick() {
        let config = CoreConfig {
            dispatch_batch: 2,
            ..CoreConfig::default()
        };
        let (mut core, _clock) = manual::<8>(config);
        let hits = counter(&mut core, Filter::up(Class::Button));
        for port in 0..5 {
            core.post(Message::up(Class::Button, Opcode::Press, port, 1)).unwrap();
        }
        assert_eq!(core.tick(), 2);
        assert_eq!(core.queued(), 3);
        assert_eq!(core.run_until_idle(10), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_call_returns_failure_status() {
        let (mut core, _clock) = manual::<8>(CoreConfig::default());
        core.register(
            Filter::down(Class::Led).opcode(Opcode::Set),
            gear_fn(|msg: &Message, _ctx: &mut Context<'_>| {
                if msg.port() > 3 {
                    Status::Failure(-22)
                } else {
                    Status::Success
                }
            }),
        )
        .unwrap();

        let reply = core.call(&Message::down(Class::Led, Opcode::Set, 7, 1));
        assert_eq!(reply.status(), Status::Failure(-22));
        assert_eq!(reply.port(), 7);
        assert_eq!(core.call(&Message::down(Class::Led, Opcode::Set, 1, 1)).status(), Status::Success);
        assert_eq!(core.stats().handler_failures, 1);
    }

    #[test]
    fn test_start_sends_init_and_heartbeat() {
        let config = CoreConfig {
            tick_period: Some(Duration::from_millis(100)),
            tock_period: Some(Duration::from_millis(300)),
            ..CoreConfig::default()
        };
        let (mut core, clock) = manual::<8>(config);
        let init_down = counter(&mut core, Filter::down(Class::Sys).opcode(Opcode::Init));
        let init_up = counter(&mut core, Filter::up(Class::Sys).opcode(Opcode::Init));
        let ticks = counter(&mut core, Filter::up(Class::Sys).opcode(Opcode::Tick));
        let tocks = counter(&mut core, Filter::up(Class::Sys).opcode(Opcode::Tock));

        core.start().unwrap();
        core.start().unwrap();
        assert_eq!(init_down.load(Ordering::SeqCst), 1);
        assert_eq!(init_up.load(Ordering::SeqCst), 1);
        assert_eq!(core.timers(), 2);

        clock.advance(Duration::from_millis(300));
        core.run_until_idle(4);
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert_eq!(tocks.load(Ordering::SeqCst), 1);

        core.stop();
        clock.advance(Duration::from_secs(1));
        assert_eq!(core.queued(), 0);
    }

    #[test]
    fn test_registry_overflow_is_fatal() {
        let (mut core, _clock) = manual::<8>(CoreConfig::minimal());
        for _ in 0..8 {
            counter(&mut core, Filter::up(Class::Button));
        }
        let err = core
            .register(
                Filter::up(Class::Button),
                gear_fn(|_msg: &Message, _ctx: &mut Context<'_>| Status::Success),
            )
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_handler_schedules_retry_through_bridge() {
        let (mut core, clock) = manual::<8>(CoreConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let gear = core
            .register(
                Filter::down(Class::Mesh),
                gear_fn(move |_msg: &Message, _ctx: &mut Context<'_>| {
                    if h.fetch_add(1, Ordering::SeqCst) == 0 {
                        Status::Failure(-11)
                    } else {
                        Status::Success
                    }
                }),
            )
            .unwrap();
        core.wrap(gear, bluccino_gear::stock::Retry::new(3, Duration::from_millis(50)))
            .unwrap();

        core.post(Message::down(Class::Mesh, Opcode::Set, 0, 1)).unwrap();
        core.run_until_idle(4);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_millis(50));
        core.run_until_idle(4);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(core.timers(), 0);
    }

    #[test]
    fn test_retry_lost_on_full_queue_keeps_budget() {
        let (mut core, clock) = manual::<2>(CoreConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let gear = core
            .register(
                Filter::up(Class::Button),
                gear_fn(move |_msg: &Message, _ctx: &mut Context<'_>| {
                    h.fetch_add(1, Ordering::SeqCst);
                    Status::Failure(-5)
                }),
            )
            .unwrap();
        core.wrap(gear, bluccino_gear::stock::Retry::new(1, Duration::from_millis(10)))
            .unwrap();

        core.post(Message::up(Class::Button, Opcode::Press, 0, 1)).unwrap();
        core.run_until_idle(4);
        assert_eq!(core.timers(), 1);

        // Queue full when the retry fires: the firing is dropped
        core.post(Message::down(Class::Led, Opcode::Set, 0, 1)).unwrap();
        core.post(Message::down(Class::Led, Opcode::Set, 1, 1)).unwrap();
        clock.advance(Duration::from_millis(10));
        assert_eq!(core.timers.drops(), 1);
        core.run_until_idle(4);
        assert_eq!(core.timers(), 0);

        clock.advance(Duration::from_millis(100));
        core.post(Message::up(Class::Button, Opcode::Press, 0, 1)).unwrap();
        core.run_until_idle(4);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(core.timers(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_loop_runs_heartbeat_until_shutdown() {
        let config = CoreConfig {
            tick_period: Some(Duration::from_millis(10)),
            ..CoreConfig::default()
        };
        let mut core = Core::<32>::tokio(config).unwrap();
        let ticks = Arc::new(AtomicUsize::new(0));
        let t = Arc::clone(&ticks);
        core.register(
            Filter::up(Class::Sys).opcode(Opcode::Tick),
            gear_fn(move |_msg: &Message, _ctx: &mut Context<'_>| {
                t.fetch_add(1, Ordering::SeqCst);
                Status::Success
            }),
        )
        .unwrap();

        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(55)).await;
            let _ = tx.send(true);
        });

        let stats = core.run(rx).await.unwrap();
        let seen = ticks.load(Ordering::SeqCst);
        assert!((4..=5).contains(&seen), "saw {} ticks", seen);
        // Plus the two SYS:INIT announcements
        assert_eq!(stats.dispatched as usize, seen + 2);
        assert!(!core.is_started());
        assert_eq!(core.timers(), 0);
    }
}
