//! Non-volatile storage contract
//!
//! Persisted variables are addressed by a small integer namespace. The core
//! only needs load/store of 32-bit values; flash layout and wear levelling
//! belong to the storage driver behind `NvmStore`.

use std::collections::BTreeMap;
use std::fmt;

use crate::{BlError, BlResult};

/// Persisted variable identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NvmId {
    /// Number of boots since the store was erased
    ResetCounter,
    /// Last known on/off state
    OnOff,
    /// Last known level
    Level,
    /// Lower bound of the brightness range
    BrightnessMin,
    /// Upper bound of the brightness range
    BrightnessMax,
    /// Application cache slot
    Cached(u8),
}

impl NvmId {
    /// Cache slots start at this raw id
    pub const CACHE_BASE: u16 = 0x10;

    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(NvmId::ResetCounter),
            1 => Some(NvmId::OnOff),
            2 => Some(NvmId::Level),
            3 => Some(NvmId::BrightnessMin),
            4 => Some(NvmId::BrightnessMax),
            r if (Self::CACHE_BASE..Self::CACHE_BASE + 0x100).contains(&r) => {
                Some(NvmId::Cached((r - Self::CACHE_BASE) as u8))
            }
            _ => None,
        }
    }

    /// Raw id; used as the message port of NVM messages
    pub fn to_raw(self) -> u16 {
        match self {
            NvmId::ResetCounter => 0,
            NvmId::OnOff => 1,
            NvmId::Level => 2,
            NvmId::BrightnessMin => 3,
            NvmId::BrightnessMax => 4,
            NvmId::Cached(n) => Self::CACHE_BASE + n as u16,
        }
    }
}

impl fmt::Display for NvmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nvm:{}", self.to_raw())
    }
}

/// Storage collaborator
pub trait NvmStore: Send {
    fn load(&self, id: NvmId) -> BlResult<Option<i32>>;

    fn store(&mut self, id: NvmId, value: i32) -> BlResult<()>;

    /// All stored ids in ascending order
    fn ids(&self) -> Vec<NvmId>;
}

/// In-memory store for hosts and tests
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: BTreeMap<NvmId, i32>,
    read_only: bool,
    writes: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes, emulating a worn out or locked flash
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Number of successful writes
    pub fn writes(&self) -> u64 {
        self.writes
    }
}

impl NvmStore for MemoryStore {
    fn load(&self, id: NvmId) -> BlResult<Option<i32>> {
        Ok(self.values.get(&id).copied())
    }

    fn store(&mut self, id: NvmId, value: i32) -> BlResult<()> {
        if self.read_only {
            return Err(BlError::Storage(format!("{} is read-only", id)));
        }
        self.values.insert(id, value);
        self.writes += 1;
        Ok(())
    }

    fn ids(&self) -> Vec<NvmId> {
        self.values.keys().copied().collect()
    }
}
