//! Bluccino Test Harness - Simulation and scenario validation
//!
//! This crate provides:
//! - A simulated board whose interrupt sources push from their own threads
//! - An interrupt storm scenario checking per-source FIFO order and drop
//!   accounting against a live dispatcher
//! - A timer storm scenario checking that cancelled timers never deliver
//!
//! All randomness comes from seeded generators, so a failing seed replays.

pub mod board;
pub mod scenario;

pub use board::*;
pub use scenario::*;
