//! Non-volatile storage gear
//!
//! Bridges the NVM class onto an `NvmStore`. The message port carries the
//! raw `NvmId`.
//! - SYS:INIT (down): bump the reset counter, then report every stored
//!   value as NVM:STATUS (up)
//! - NVM:SET (down): store the value
//! - NVM:GET (down): report the value as NVM:STATUS (up)
//! - ONOFF:STATUS / LEVEL:STATUS (down): cache the state the application
//!   publishes so it survives a reboot

use std::sync::Arc;

use parking_lot::Mutex;

use bluccino_core::{BlResult, Class, GearId, Message, NvmId, NvmStore, Opcode, Status};
use bluccino_gear::{Context, Filter, Gear};

use crate::Core;

/// Invalid id or value
pub const NVM_EINVAL: i32 = -22;
/// Nothing stored under the id
pub const NVM_ENOENT: i32 = -2;
/// Store rejected the operation
pub const NVM_EIO: i32 = -5;

type SharedStore = Arc<Mutex<Box<dyn NvmStore>>>;

/// One registration of the NVM gear; all share the same store
pub struct NvmGear {
    store: SharedStore,
}

impl NvmGear {
    /// Register the gear under each filter it serves
    pub fn install<const N: usize>(
        core: &mut Core<N>,
        store: impl NvmStore + 'static,
    ) -> BlResult<Vec<GearId>> {
        let store: SharedStore = Arc::new(Mutex::new(Box::new(store)));
        let mut ids = Vec::with_capacity(4);
        for filter in Self::filters() {
            let gear = NvmGear {
                store: Arc::clone(&store),
            };
            ids.push(core.register(filter, gear)?);
        }
        Ok(ids)
    }

    pub fn filters() -> [Filter; 4] {
        [
            Filter::down(Class::Sys).opcode(Opcode::Init),
            Filter::down(Class::Nvm),
            Filter::down(Class::OnOff).opcode(Opcode::Status),
            Filter::down(Class::Level).opcode(Opcode::Status),
        ]
    }

    fn status(id: NvmId, value: i32) -> Message {
        Message::up(Class::Nvm, Opcode::Status, id.to_raw(), value)
    }

    fn boot(&mut self, ctx: &mut Context<'_>) -> Status {
        let mut store = self.store.lock();
        let resets = match store.load(NvmId::ResetCounter) {
            Ok(v) => v.unwrap_or(0).wrapping_add(1),
            Err(e) => {
                tracing::warn!(error = %e, "reset counter unreadable");
                return Status::Failure(NVM_EIO);
            }
        };
        if let Err(e) = store.store(NvmId::ResetCounter, resets) {
            tracing::warn!(error = %e, "reset counter not stored");
            return Status::Failure(NVM_EIO);
        }
        tracing::info!(resets, "boot");

        for id in store.ids() {
            if let Ok(Some(value)) = store.load(id) {
                if ctx.post(Self::status(id, value)).is_err() {
                    tracing::debug!(id = %id, "nvm status dropped");
                }
            }
        }
        Status::Success
    }

    fn write(&mut self, id: NvmId, message: &Message) -> Status {
        let Some(value) = message.value().as_int() else {
            return Status::Failure(NVM_EINVAL);
        };
        match self.store.lock().store(id, value) {
            Ok(()) => Status::Success,
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "nvm write failed");
                Status::Failure(NVM_EIO)
            }
        }
    }

    fn read(&mut self, id: NvmId, ctx: &mut Context<'_>) -> Status {
        let loaded = self.store.lock().load(id);
        match loaded {
            Ok(Some(value)) => match ctx.post(Self::status(id, value)) {
                Ok(()) => Status::Success,
                Err(_) => Status::Failure(NVM_EIO),
            },
            Ok(None) => Status::Failure(NVM_ENOENT),
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "nvm read failed");
                Status::Failure(NVM_EIO)
            }
        }
    }
}

impl Gear for NvmGear {
    fn handle(&mut self, message: &Message, ctx: &mut Context<'_>) -> Status {
        match (message.class(), message.opcode()) {
            (Class::Sys, Opcode::Init) => self.boot(ctx),
            (Class::Nvm, op) => {
                let Some(id) = NvmId::from_raw(message.port()) else {
                    return Status::Failure(NVM_EINVAL);
                };
                match op {
                    Opcode::Set | Opcode::SetUnack | Opcode::Store => self.write(id, message),
                    Opcode::Get | Opcode::Recall => self.read(id, ctx),
                    _ => Status::Pending,
                }
            }
            (Class::OnOff, _) => self.write(NvmId::OnOff, message),
            (Class::Level, _) => self.write(NvmId::Level, message),
            _ => Status::Pending,
        }
    }

    fn name(&self) -> &str {
        "nvm"
    }
}
