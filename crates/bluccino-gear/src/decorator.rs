//! Decorator chain
//!
//! Decorators sit in front of a gear's handler. Each receives the message
//! and a `Next` handle for the rest of the chain, and may
//! - forward the message unchanged (`next.run(message, ctx)`),
//! - forward a transformed copy (`next.run(&copy, ctx)`),
//! - stop, by returning without calling `next`.
//!
//! The decorator wrapped last runs first: wrapping D1 then D2 around G
//! yields D2 -> D1 -> G.

use bluccino_core::{DecoratorId, Message, Status};

use crate::{Context, Gear};

/// Interceptor wrapped around a gear
pub trait Decorator: Send {
    fn intercept(&mut self, message: &Message, next: Next<'_>, ctx: &mut Context<'_>) -> Status;

    fn name(&self) -> &str {
        "decorator"
    }
}

pub(crate) struct DecoratorEntry {
    pub(crate) id: DecoratorId,
    pub(crate) decorator: Box<dyn Decorator>,
}

/// Remainder of a chain: the decorators not yet run, then the gear
pub struct Next<'n> {
    chain: &'n mut [DecoratorEntry],
    gear: &'n mut dyn Gear,
}

impl<'n> Next<'n> {
    pub(crate) fn new(chain: &'n mut [DecoratorEntry], gear: &'n mut dyn Gear) -> Self {
        Next { chain, gear }
    }

    /// Hand the message to the next decorator, or to the gear at the end
    pub fn run(self, message: &Message, ctx: &mut Context<'_>) -> Status {
        match self.chain.split_last_mut() {
            Some((outer, rest)) => {
                let next = Next {
                    chain: rest,
                    gear: self.gear,
                };
                outer.decorator.intercept(message, next, ctx)
            }
            None => self.gear.handle(message, ctx),
        }
    }

    /// Decorators still ahead of the gear
    pub fn remaining(&self) -> usize {
        self.chain.len()
    }
}

/// Decorator backed by a closure; see [`decorator_fn`]
pub struct FnDecorator<F> {
    name: &'static str,
    f: F,
}

impl<F> FnDecorator<F> {
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl<F> Decorator for FnDecorator<F>
where
    F: FnMut(&Message, Next<'_>, &mut Context<'_>) -> Status + Send,
{
    fn intercept(&mut self, message: &Message, next: Next<'_>, ctx: &mut Context<'_>) -> Status {
        (self.f)(message, next, ctx)
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Turn a closure into a decorator
pub fn decorator_fn<F>(f: F) -> FnDecorator<F>
where
    F: FnMut(&Message, Next<'_>, &mut Context<'_>) -> Status + Send,
{
    FnDecorator { name: "fn", f }
}
