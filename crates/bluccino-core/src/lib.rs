//! Bluccino Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every Bluccino component:
//! - Messages and their routing key (class, opcode, direction)
//! - Gear, decorator and timer handles
//! - Error types
//! - Mesh model opcode table and the non-volatile storage contract
//! - The producer-side injector and the diagnostics log

pub mod id;
pub mod class;
pub mod message;
pub mod error;
pub mod mesh;
pub mod nvm;
pub mod diag;
pub mod inject;

pub use id::*;
pub use class::*;
pub use message::*;
pub use error::*;
pub use nvm::*;
pub use diag::*;
pub use inject::*;
