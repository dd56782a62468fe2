//! Stock hardware-facing gears

pub mod nvm;

pub use nvm::NvmGear;
