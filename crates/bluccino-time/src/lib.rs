//! Bluccino Time - Timer/work bridge
//!
//! Waiting inside the core is never done by sleeping. A handler that wants
//! something to happen later schedules a message; when the timer expires
//! the message is pushed into the ring queue like any interrupt-produced
//! event and dispatched in a later cycle.
//!
//! The host timer facility is reached through the `TimerDriver` contract:
//! - `ManualDriver`: virtual clock advanced explicitly (tests, simulation)
//! - `TokioDriver`: host timers on `tokio::time`

pub mod driver;
pub mod bridge;
pub mod manual;
pub mod tokio_driver;

pub use driver::*;
pub use bridge::*;
pub use manual::*;
pub use tokio_driver::*;
