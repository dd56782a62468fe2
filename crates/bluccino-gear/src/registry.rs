//! Gear registry and dispatch
//!
//! Gears are kept in registration order. Dispatching a message walks the
//! whole list: every gear whose filter matches is driven through its
//! decorator chain, whatever status earlier gears returned. Only an explicit
//! `Context::halt()` cuts the fan-out short. A message nobody subscribes to
//! is absorbed silently.
//!
//! The registry is mutated only through `&mut self`, i.e. from the
//! dispatcher context, and never while a dispatch is in progress.

use bluccino_core::{BlError, BlResult, DecoratorId, GearId, Message, RouteKey, Status};

use crate::decorator::DecoratorEntry;
use crate::{Bus, Context, Decorator, Filter, Gear, Next};

/// Default number of gears a registry accepts
pub const DEFAULT_MAX_GEARS: usize = 32;

/// Default length of one gear's decorator chain
pub const DEFAULT_MAX_DECORATORS: usize = 8;

/// Capacity limits of a registry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistryLimits {
    pub max_gears: usize,
    pub max_decorators_per_gear: usize,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        RegistryLimits {
            max_gears: DEFAULT_MAX_GEARS,
            max_decorators_per_gear: DEFAULT_MAX_DECORATORS,
        }
    }
}

/// Result of dispatching one message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct DispatchOutcome {
    /// Gears whose filter matched
    pub matched: usize,
    /// Matched gears whose chain was entered (fewer than `matched` after a halt)
    pub invoked: usize,
    /// Aggregate of the chain statuses
    pub status: Status,
    pub halted: bool,
}

impl DispatchOutcome {
    /// No gear subscribed to the message
    pub fn absorbed(&self) -> bool {
        self.matched == 0
    }
}

struct GearEntry {
    id: GearId,
    filter: Filter,
    gear: Box<dyn Gear>,
    /// Innermost first; the chain runs from the back
    decorators: Vec<DecoratorEntry>,
}

/// Registry of gears and their decorator chains
pub struct GearRegistry {
    entries: Vec<GearEntry>,
    limits: RegistryLimits,
    last_gear: GearId,
    last_decorator: DecoratorId,
}

impl GearRegistry {
    pub fn new() -> Self {
        Self::with_limits(RegistryLimits::default())
    }

    pub fn with_limits(limits: RegistryLimits) -> Self {
        GearRegistry {
            entries: Vec::with_capacity(limits.max_gears),
            limits,
            last_gear: GearId::default(),
            last_decorator: DecoratorId::default(),
        }
    }

    /// Subscribe `gear` to messages matching `filter`
    pub fn register(&mut self, filter: Filter, gear: impl Gear + 'static) -> BlResult<GearId> {
        if self.entries.len() >= self.limits.max_gears {
            tracing::error!(
                filter = %filter,
                capacity = self.limits.max_gears,
                "gear registry full"
            );
            return Err(BlError::RegistryOverflow {
                what: "gears",
                capacity: self.limits.max_gears,
            });
        }
        self.last_gear = self.last_gear.next();
        let id = self.last_gear;
        tracing::debug!(gear = %id, name = gear.name(), filter = %filter, "gear registered");
        self.entries.push(GearEntry {
            id,
            filter,
            gear: Box::new(gear),
            decorators: Vec::new(),
        });
        Ok(id)
    }

    /// Remove a gear together with its decorators
    pub fn unregister(&mut self, id: GearId) -> BlResult<()> {
        let index = self.index_of(id)?;
        let entry = self.entries.remove(index);
        tracing::debug!(gear = %id, decorators = entry.decorators.len(), "gear unregistered");
        Ok(())
    }

    /// Put `decorator` in front of the gear's existing chain
    pub fn wrap(&mut self, id: GearId, decorator: impl Decorator + 'static) -> BlResult<DecoratorId> {
        let max = self.limits.max_decorators_per_gear;
        let index = self.index_of(id)?;
        if self.entries[index].decorators.len() >= max {
            tracing::error!(gear = %id, capacity = max, "decorator chain full");
            return Err(BlError::RegistryOverflow {
                what: "decorators per gear",
                capacity: max,
            });
        }
        self.last_decorator = self.last_decorator.next();
        let did = self.last_decorator;
        tracing::debug!(gear = %id, decorator = %did, name = decorator.name(), "decorator wrapped");
        self.entries[index].decorators.push(DecoratorEntry {
            id: did,
            decorator: Box::new(decorator),
        });
        Ok(did)
    }

    /// Remove one decorator from whichever chain holds it
    pub fn unwrap(&mut self, id: DecoratorId) -> BlResult<()> {
        for entry in &mut self.entries {
            if let Some(pos) = entry.decorators.iter().position(|d| d.id == id) {
                entry.decorators.remove(pos);
                tracing::debug!(gear = %entry.id, decorator = %id, "decorator unwrapped");
                return Ok(());
            }
        }
        Err(BlError::UnknownDecorator(id))
    }

    /// Deliver a message to every matching gear in registration order
    pub fn dispatch(&mut self, message: &Message, bus: &mut dyn Bus) -> DispatchOutcome {
        let key = message.route_key();
        let mut outcome = DispatchOutcome::default();
        let mut ctx = Context::new(bus);

        for entry in self.entries.iter_mut() {
            if !entry.filter.matches(&key) {
                continue;
            }
            outcome.matched += 1;
            if ctx.is_halted() {
                continue;
            }

            ctx.enter(entry.id);
            let status = Next::new(&mut entry.decorators, entry.gear.as_mut()).run(message, &mut ctx);
            outcome.invoked += 1;
            if let Status::Failure(code) = status {
                tracing::debug!(gear = %entry.id, code, message = %message, "handler failed");
            }
            outcome.status = outcome.status.merge(status);
        }

        outcome.halted = ctx.is_halted();
        if outcome.absorbed() {
            tracing::trace!(message = %message, "no subscriber, absorbed");
        }
        outcome
    }

    /// Gears a message with this key would reach, in dispatch order
    pub fn subscribers(&self, key: &RouteKey) -> Vec<GearId> {
        self.entries
            .iter()
            .filter(|e| e.filter.matches(key))
            .map(|e| e.id)
            .collect()
    }

    /// Decorators of a gear, outermost (first to run) first
    pub fn chain(&self, id: GearId) -> BlResult<Vec<DecoratorId>> {
        let index = self.index_of(id)?;
        Ok(self.entries[index].decorators.iter().rev().map(|d| d.id).collect())
    }

    pub fn filter(&self, id: GearId) -> Option<Filter> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.filter)
    }

    pub fn contains(&self, id: GearId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limits(&self) -> RegistryLimits {
        self.limits
    }

    fn index_of(&self, id: GearId) -> BlResult<usize> {
        self.entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(BlError::UnknownGear(id))
    }
}

impl Default for GearRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GearRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GearRegistry")
            .field("gears", &self.entries.len())
            .field("limits", &self.limits)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decorator_fn, gear_fn, LocalBus};
    use bluccino_core::{Class, Opcode};
    use std::sync::{Arc, Mutex};

    type Trail = Arc<Mutex<Vec<&'static str>>>;

    fn trail() -> Trail {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn recording_gear(trail: &Trail, label: &'static str, status: Status) -> impl Gear {
        let trail = Arc::clone(trail);
        gear_fn(move |_msg: &Message, _ctx: &mut Context<'_>| {
            trail.lock().unwrap().push(label);
            status
        })
    }

    fn recording_decorator(trail: &Trail, label: &'static str) -> impl Decorator {
        let trail = Arc::clone(trail);
        decorator_fn(move |msg: &Message, next: Next<'_>, ctx: &mut Context<'_>| {
            trail.lock().unwrap().push(label);
            next.run(msg, ctx)
        })
    }

    #[test]
    fn test_led_set_reaches_only_led_gear() {
        let calls = trail();
        let mut registry = GearRegistry::new();
        registry
            .register(Filter::down(Class::Led), recording_gear(&calls, "led", Status::Success))
            .unwrap();
        registry
            .register(Filter::up(Class::Button), recording_gear(&calls, "button", Status::Success))
            .unwrap();

        let mut bus = LocalBus::new();
        let outcome = registry.dispatch(&Message::down(Class::Led, Opcode::Set, 1, 1), &mut bus);

        assert_eq!(*calls.lock().unwrap(), vec!["led"]);
        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.status, Status::Success);
    }

    #[test]
    fn test_zero_match_is_absorbed() {
        let mut registry = GearRegistry::new();
        let mut bus = LocalBus::new();
        let outcome = registry.dispatch(&Message::up(Class::Switch, Opcode::Press, 0, 1), &mut bus);
        assert!(outcome.absorbed());
        assert_eq!(outcome.invoked, 0);
        assert_eq!(outcome.status, Status::Pending);
        assert!(bus.posted().is_empty());
    }

    #[test]
    fn test_fan_out_in_registration_order_despite_failure() {
        let calls = trail();
        let mut registry = GearRegistry::new();
        for (label, status) in [
            ("a", Status::Success),
            ("b", Status::Failure(3)),
            ("c", Status::Success),
        ] {
            registry
                .register(Filter::up(Class::Button), recording_gear(&calls, label, status))
                .unwrap();
        }

        let mut bus = LocalBus::new();
        let outcome = registry.dispatch(&Message::up(Class::Button, Opcode::Press, 0, 1), &mut bus);
        assert_eq!(*calls.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(outcome.invoked, 3);
        assert_eq!(outcome.status, Status::Failure(3));
        assert!(!outcome.halted);
    }

    #[test]
    fn test_halt_skips_remaining_gears() {
        let calls = trail();
        let mut registry = GearRegistry::new();
        let first = Arc::clone(&calls);
        registry
            .register(
                Filter::up(Class::Button),
                gear_fn(move |_msg: &Message, ctx: &mut Context<'_>| {
                    first.lock().unwrap().push("first");
                    ctx.halt();
                    Status::Success
                }),
            )
            .unwrap();
        registry
            .register(Filter::up(Class::Button), recording_gear(&calls, "second", Status::Success))
            .unwrap();

        let mut bus = LocalBus::new();
        let outcome = registry.dispatch(&Message::up(Class::Button, Opcode::Press, 0, 1), &mut bus);
        assert_eq!(*calls.lock().unwrap(), vec!["first"]);
        assert_eq!(outcome.matched, 2);
        assert_eq!(outcome.invoked, 1);
        assert!(outcome.halted);
    }

    #[test]
    fn test_last_wrapped_decorator_runs_first() {
        let calls = trail();
        let mut registry = GearRegistry::new();
        let gear = registry
            .register(Filter::down(Class::Led), recording_gear(&calls, "G", Status::Success))
            .unwrap();
        let d1 = registry.wrap(gear, recording_decorator(&calls, "D1")).unwrap();
        let d2 = registry.wrap(gear, recording_decorator(&calls, "D2")).unwrap();
        assert_eq!(registry.chain(gear).unwrap(), vec![d2, d1]);

        let mut bus = LocalBus::new();
        registry.dispatch(&Message::down(Class::Led, Opcode::Set, 0, 1), &mut bus);
        assert_eq!(*calls.lock().unwrap(), vec!["D2", "D1", "G"]);
    }

    #[test]
    fn test_stopping_decorator_prevents_gear() {
        let calls = trail();
        let mut registry = GearRegistry::new();
        let gear = registry
            .register(Filter::down(Class::Led), recording_gear(&calls, "G", Status::Success))
            .unwrap();
        registry.wrap(gear, recording_decorator(&calls, "D1")).unwrap();
        let stop = Arc::clone(&calls);
        registry
            .wrap(
                gear,
                decorator_fn(move |_msg: &Message, _next: Next<'_>, _ctx: &mut Context<'_>| {
                    stop.lock().unwrap().push("D2");
                    Status::Failure(-1)
                }),
            )
            .unwrap();

        let mut bus = LocalBus::new();
        let outcome = registry.dispatch(&Message::down(Class::Led, Opcode::Set, 0, 1), &mut bus);
        assert_eq!(*calls.lock().unwrap(), vec!["D2"]);
        assert_eq!(outcome.status, Status::Failure(-1));
    }

    #[test]
    fn test_decorator_forwards_transformed_copy() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = GearRegistry::new();
        let sink = Arc::clone(&seen);
        let gear = registry
            .register(
                Filter::down(Class::Led),
                gear_fn(move |msg: &Message, _ctx: &mut Context<'_>| {
                    sink.lock().unwrap().push(msg.value().as_int());
                    Status::Success
                }),
            )
            .unwrap();
        registry
            .wrap(
                gear,
                decorator_fn(|msg: &Message, next: Next<'_>, ctx: &mut Context<'_>| {
                    let inverted = msg.with_value(1 - msg.value().as_int().unwrap_or(0));
                    next.run(&inverted, ctx)
                }),
            )
            .unwrap();

        let mut bus = LocalBus::new();
        let original = Message::down(Class::Led, Opcode::Set, 0, 1);
        registry.dispatch(&original, &mut bus);
        assert_eq!(*seen.lock().unwrap(), vec![Some(0)]);
        assert_eq!(original.value().as_int(), Some(1));
    }

    #[test]
    fn test_unwrap_and_unregister() {
        let calls = trail();
        let mut registry = GearRegistry::new();
        let gear = registry
            .register(Filter::down(Class::Led), recording_gear(&calls, "G", Status::Success))
            .unwrap();
        let d1 = registry.wrap(gear, recording_decorator(&calls, "D1")).unwrap();
        registry.unwrap(d1).unwrap();
        assert_eq!(registry.unwrap(d1), Err(BlError::UnknownDecorator(d1)));

        let mut bus = LocalBus::new();
        registry.dispatch(&Message::down(Class::Led, Opcode::Set, 0, 1), &mut bus);
        assert_eq!(*calls.lock().unwrap(), vec!["G"]);

        registry.unregister(gear).unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.unregister(gear), Err(BlError::UnknownGear(gear)));
        assert!(registry
            .dispatch(&Message::down(Class::Led, Opcode::Set, 0, 1), &mut bus)
            .absorbed());
    }

    #[test]
    fn test_capacity_overflow() {
        let mut registry = GearRegistry::with_limits(RegistryLimits {
            max_gears: 1,
            max_decorators_per_gear: 1,
        });
        let calls = trail();
        let gear = registry
            .register(Filter::down(Class::Led), recording_gear(&calls, "G", Status::Success))
            .unwrap();
        let err = registry
            .register(Filter::down(Class::Led), recording_gear(&calls, "H", Status::Success))
            .unwrap_err();
        assert!(err.is_fatal());

        registry.wrap(gear, recording_decorator(&calls, "D1")).unwrap();
        assert_eq!(
            registry.wrap(gear, recording_decorator(&calls, "D2")),
            Err(BlError::RegistryOverflow {
                what: "decorators per gear",
                capacity: 1
            })
        );
    }

    #[test]
    fn test_gear_posts_follow_up() {
        let mut registry = GearRegistry::new();
        registry
            .register(
                Filter::up(Class::Button).opcode(Opcode::Press),
                gear_fn(|msg: &Message, ctx: &mut Context<'_>| {
                    let _ = ctx.post(Message::down(Class::Led, Opcode::Toggle, msg.port(), 0));
                    Status::Success
                }),
            )
            .unwrap();

        let mut bus = LocalBus::new();
        registry.dispatch(&Message::up(Class::Button, Opcode::Press, 2, 1), &mut bus);
        assert_eq!(bus.posted(), &[Message::down(Class::Led, Opcode::Toggle, 2, 0)]);
        assert_eq!(
            registry.subscribers(&Message::up(Class::Button, Opcode::Press, 0, 0).route_key()),
            vec![GearId::new(1)]
        );
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        const CLASSES: [Class; 3] = [Class::Led, Class::Button, Class::Switch];

        fn filter() -> impl Strategy<Value = Filter> {
            (0..3usize, any::<bool>(), proptest::option::of(0..2usize)).prop_map(|(c, up, op)| {
                let base = if up {
                    Filter::up(CLASSES[c])
                } else {
                    Filter::down(CLASSES[c])
                };
                match op {
                    Some(0) => base.opcode(Opcode::Set),
                    Some(_) => base.opcode(Opcode::Status),
                    None => base,
                }
            })
        }

        proptest! {
            #[test]
            fn prop_every_match_invoked_in_order(
                filters in proptest::collection::vec(filter(), 0..12),
                class in 0..3usize,
                up in any::<bool>(),
                set in any::<bool>(),
            ) {
                let order = Arc::new(Mutex::new(Vec::new()));
                let mut registry = GearRegistry::new();
                let mut ids = Vec::new();
                for f in &filters {
                    let order = Arc::clone(&order);
                    let slot = ids.len();
                    ids.push(registry.register(*f, gear_fn(move |_m: &Message, _c: &mut Context<'_>| {
                        order.lock().unwrap().push(slot);
                        Status::Failure(slot as i32)
                    })).unwrap());
                }

                let opcode = if set { Opcode::Set } else { Opcode::Status };
                let direction = if up { bluccino_core::Direction::Up } else { bluccino_core::Direction::Down };
                let msg = Message::new(CLASSES[class], opcode, 0, 0, direction);
                let expected: Vec<usize> = filters
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| f.matches(&msg.route_key()))
                    .map(|(i, _)| i)
                    .collect();

                let outcome = registry.dispatch(&msg, &mut LocalBus::new());
                prop_assert_eq!(&*order.lock().unwrap(), &expected);
                prop_assert_eq!(outcome.matched, expected.len());
                prop_assert_eq!(outcome.absorbed(), expected.is_empty());
                if let Some(first) = expected.first() {
                    prop_assert_eq!(outcome.status, Status::Failure(*first as i32));
                }
            }
        }
    }
}
