//! Bluccino Runtime - The core dispatcher
//!
//! `Core` owns every piece of process-wide state: the ring queue, the gear
//! registry with its decorator chains, the timer bridge and the diagnostics
//! log. Producers only ever see an `Injector`. One dispatch cycle:
//! 1. Reap fired one-shot timers
//! 2. Pop up to `dispatch_batch` messages from the ring queue
//! 3. Record each as dispatched
//! 4. Drive every matching gear through its decorator chain
//!
//! Follow-up messages posted by handlers are queued and handled in a later
//! cycle, never recursively.

pub mod config;
pub mod logging;
pub mod dispatcher;
pub mod gears;

pub use config::*;
pub use logging::init_logging;
pub use dispatcher::*;
