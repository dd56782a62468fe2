//! Gear trait
//!
//! A gear is the terminal handler of a subscription. It sees each matching
//! message once, after every decorator in front of it has let it through,
//! and answers with a completion status.

use bluccino_core::{Message, Status};

use crate::Context;

/// Message handler registered with the core
pub trait Gear: Send {
    fn handle(&mut self, message: &Message, ctx: &mut Context<'_>) -> Status;

    /// Short label used in logs
    fn name(&self) -> &str {
        "gear"
    }
}

impl Gear for Box<dyn Gear> {
    fn handle(&mut self, message: &Message, ctx: &mut Context<'_>) -> Status {
        (**self).handle(message, ctx)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Gear backed by a closure; see [`gear_fn`]
pub struct FnGear<F> {
    name: &'static str,
    f: F,
}

impl<F> FnGear<F> {
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl<F> Gear for FnGear<F>
where
    F: FnMut(&Message, &mut Context<'_>) -> Status + Send,
{
    fn handle(&mut self, message: &Message, ctx: &mut Context<'_>) -> Status {
        (self.f)(message, ctx)
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Turn a closure into a gear
pub fn gear_fn<F>(f: F) -> FnGear<F>
where
    F: FnMut(&Message, &mut Context<'_>) -> Status + Send,
{
    FnGear { name: "fn", f }
}
