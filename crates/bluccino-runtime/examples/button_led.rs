//! Button toggles an LED
//!
//! A simulated button interrupt runs on its own thread and only holds an
//! injector. The application gear turns each press into an LED toggle
//! intent; the LED driver gear keeps the LED state and reports it back up.

use std::thread;
use std::time::Duration;

use bluccino_core::{BlResult, Class, Message, Opcode, Status};
use bluccino_gear::stock::{Debounce, Trace};
use bluccino_gear::{gear_fn, Context, Filter};
use bluccino_runtime::{init_logging, Core, CoreConfig, LoggingConfig};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> BlResult<()> {
    init_logging(&LoggingConfig {
        level: "debug".into(),
        ..LoggingConfig::default()
    })?;

    let mut core = Core::<32>::tokio(CoreConfig::with_heartbeat())?;

    // Application: press -> toggle
    let app = core.register(
        Filter::up(Class::Button).opcode(Opcode::Press),
        gear_fn(|msg: &Message, ctx: &mut Context<'_>| {
            match ctx.post(Message::down(Class::Led, Opcode::Toggle, msg.port(), 0)) {
                Ok(()) => Status::Success,
                Err(_) => Status::Failure(-1),
            }
        })
        .named("app"),
    )?;
    core.wrap(app, Debounce::new(Duration::from_millis(30)))?;

    // LED driver: keeps state, reports it up
    let mut lit = false;
    let led = core.register(
        Filter::down(Class::Led),
        gear_fn(move |msg: &Message, ctx: &mut Context<'_>| {
            lit = match msg.opcode() {
                Opcode::Toggle => !lit,
                Opcode::Set => msg.value().as_bool().unwrap_or(false),
                _ => return Status::Pending,
            };
            let _ = ctx.post(Message::up(Class::Led, Opcode::Status, msg.port(), lit));
            Status::Success
        })
        .named("led"),
    )?;
    core.wrap(led, Trace::new("led"))?;

    let injector = core.injector();
    let button = thread::spawn(move || {
        for _ in 0..5 {
            thread::sleep(Duration::from_millis(100));
            let _ = injector.try_push(Message::up(Class::Button, Opcode::Press, 0, 1));
        }
    });

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(700)).await;
        let _ = tx.send(true);
    });

    let stats = core.run(rx).await?;
    let _ = button.join();
    tracing::info!(?stats, "done");
    println!("{}", core.log().to_json()?);
    Ok(())
}
