//! Bluccino Gear - Subscribers, interceptors and dispatch
//!
//! A gear is a message handler registered under a filter. The registry
//! delivers each dispatched message to every gear whose filter matches, in
//! registration order, passing it through that gear's decorator chain
//! first. Handlers talk back to the system through a `Context`, which can
//! post messages and arm timers but can never call another gear directly.

pub mod context;
pub mod gear;
pub mod decorator;
pub mod filter;
pub mod registry;
pub mod stock;
pub mod local;

pub use context::*;
pub use gear::*;
pub use decorator::*;
pub use filter::*;
pub use registry::*;
pub use local::LocalBus;
