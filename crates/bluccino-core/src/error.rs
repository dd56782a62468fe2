//! Error types for Bluccino
//!
//! Transient delivery problems (full queue, dropped timer firing) are
//! counted where they happen and surface as `QueueFull`. Handler rejections
//! are not errors at all: they travel back as `Status::Failure` on the reply.
//! Capacity violations are reported as `RegistryOverflow` and are meant to
//! abort start-up.

use thiserror::Error;

use crate::{DecoratorId, GearId, TimerId};

/// Core Bluccino errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlError {
    // Delivery errors
    #[error("Queue full: message dropped")]
    QueueFull,

    // Capacity errors
    #[error("Registry overflow: more than {capacity} {what}")]
    RegistryOverflow { what: &'static str, capacity: usize },

    // Handle errors
    #[error("Unknown gear {0:?}")]
    UnknownGear(GearId),

    #[error("Unknown decorator {0:?}")]
    UnknownDecorator(DecoratorId),

    #[error("Unknown timer {0:?}")]
    UnknownTimer(TimerId),

    // Collaborator errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Timer driver error: {0}")]
    TimerDriver(String),

    // Setup errors
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl BlError {
    /// Capacity violations indicate a build-time misconfiguration
    pub fn is_fatal(&self) -> bool {
        matches!(self, BlError::RegistryOverflow { .. } | BlError::Config(_))
    }
}

/// Result type for Bluccino operations
pub type BlResult<T> = Result<T, BlError>;
