//! Simulated board
//!
//! Each interrupt source runs on its own thread and, like a real ISR, only
//! holds an injector. Sources push numbered events (the value is the
//! sequence number) with random gaps between them, so producers interleave
//! differently from run to run but each seed is reproducible per source.

use std::hint;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use bluccino_core::{Class, Injector, Message, Opcode};

/// One interrupt line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IsrSource {
    pub class: Class,
    pub opcode: Opcode,
    pub port: u16,
    /// Events raised before the source goes quiet
    pub events: u32,
    /// Upper bound of the spin gap between two events
    pub max_gap: u32,
}

impl IsrSource {
    /// Button presses on `port`
    pub fn button(port: u16, events: u32) -> Self {
        IsrSource {
            class: Class::Button,
            opcode: Opcode::Press,
            port,
            events,
            max_gap: 64,
        }
    }

    /// Sensor style status updates on `port`
    pub fn sensor(port: u16, events: u32) -> Self {
        IsrSource {
            class: Class::Switch,
            opcode: Opcode::Status,
            port,
            events,
            max_gap: 16,
        }
    }

    pub fn with_gap(mut self, max_gap: u32) -> Self {
        self.max_gap = max_gap;
        self
    }

    /// The `seq`-th event of this source
    pub fn event(&self, seq: u32) -> Message {
        Message::up(self.class, self.opcode, self.port, seq as i32)
    }
}

/// What one source managed to deliver
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceReport {
    pub class: Option<Class>,
    pub port: u16,
    pub pushed: u32,
    pub dropped: u32,
}

impl SourceReport {
    pub fn produced(&self) -> u32 {
        self.pushed + self.dropped
    }
}

/// A set of running interrupt sources
pub struct SimulatedBoard {
    handles: Vec<JoinHandle<SourceReport>>,
    running: Arc<AtomicUsize>,
}

impl SimulatedBoard {
    /// Start one producer thread per source
    pub fn spawn(injector: &Injector, sources: &[IsrSource], seed: u64) -> Self {
        let running = Arc::new(AtomicUsize::new(sources.len()));
        let handles = sources
            .iter()
            .enumerate()
            .map(|(i, source)| {
                let source = source.clone();
                let injector = injector.clone();
                let running = Arc::clone(&running);
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                thread::spawn(move || {
                    let mut report = SourceReport {
                        class: Some(source.class),
                        port: source.port,
                        ..SourceReport::default()
                    };
                    for seq in 0..source.events {
                        match injector.try_push(source.event(seq)) {
                            Ok(()) => report.pushed += 1,
                            Err(_) => report.dropped += 1,
                        }
                        let gap = rng.gen_range(0..=source.max_gap);
                        for _ in 0..gap {
                            hint::spin_loop();
                        }
                        if gap == source.max_gap {
                            thread::yield_now();
                        }
                    }
                    running.fetch_sub(1, Ordering::Release);
                    report
                })
            })
            .collect();

        tracing::debug!(sources = sources.len(), seed, "board started");
        SimulatedBoard { handles, running }
    }

    /// All sources have raised their last event
    pub fn is_finished(&self) -> bool {
        self.running.load(Ordering::Acquire) == 0
    }

    /// Wait for every source and collect the reports, in source order
    pub fn join(self) -> Vec<SourceReport> {
        self.handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(report) => report,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    }
}
