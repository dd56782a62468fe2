//! Bluccino Bench - Shared fixtures for the criterion benchmarks

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use bluccino_core::{BlResult, Class, Message, Opcode, Status};
use bluccino_gear::{gear_fn, stock::Trace, Context, Filter};
use bluccino_runtime::{Core, CoreConfig};

/// Reproducible mix of UP and DOWN traffic over the common classes
pub fn traffic(count: usize, seed: u64) -> Vec<Message> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let port = rng.gen_range(0..4u16);
            match rng.gen_range(0..4) {
                0 => Message::up(Class::Button, Opcode::Press, port, 1),
                1 => Message::down(Class::Led, Opcode::Set, port, rng.gen_bool(0.5)),
                2 => Message::up(Class::Switch, Opcode::Status, port, rng.gen_range(0..100)),
                _ => Message::down(Class::Level, Opcode::Set, port, rng.gen_range(-32768..32767)),
            }
        })
        .collect()
}

/// Core with `per_class` gears on each class of `traffic`, each wrapped in
/// `decorators` pass-through decorators
pub fn loaded_core(per_class: usize, decorators: usize) -> BlResult<Core<1024>> {
    let config = CoreConfig {
        max_gears: per_class * 4,
        max_decorators_per_gear: decorators.max(1),
        dispatch_batch: 1024,
        log_capacity: 0,
        ..CoreConfig::default()
    };
    let (mut core, _clock) = Core::<1024>::manual(config)?;

    let filters = [
        Filter::up(Class::Button),
        Filter::down(Class::Led),
        Filter::up(Class::Switch),
        Filter::down(Class::Level),
    ];
    for filter in filters {
        for _ in 0..per_class {
            let id = core.register(
                filter,
                gear_fn(|msg: &Message, _ctx: &mut Context<'_>| {
                    if msg.value().is_none() {
                        Status::Pending
                    } else {
                        Status::Success
                    }
                }),
            )?;
            for _ in 0..decorators {
                core.wrap(id, Trace::new("bench"))?;
            }
        }
    }
    Ok(core)
}
