//! Handle types for Bluccino
//!
//! Gears, decorators and timers are referred to by small copyable handles.
//! Handles are allocated monotonically by their owner and never reused
//! within the lifetime of a core.

use std::fmt;

/// Handle of a registered gear
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GearId(pub u32);

impl GearId {
    #[inline]
    pub fn new(id: u32) -> Self {
        GearId(id)
    }

    #[inline]
    pub fn next(self) -> Self {
        GearId(self.0.wrapping_add(1))
    }
}

impl fmt::Debug for GearId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gear(#{})", self.0)
    }
}

impl fmt::Display for GearId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle of a decorator wrapped around a gear
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DecoratorId(pub u32);

impl DecoratorId {
    #[inline]
    pub fn new(id: u32) -> Self {
        DecoratorId(id)
    }

    #[inline]
    pub fn next(self) -> Self {
        DecoratorId(self.0.wrapping_add(1))
    }
}

impl fmt::Debug for DecoratorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decorator(#{})", self.0)
    }
}

impl fmt::Display for DecoratorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle of a scheduled timer
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimerId(pub u32);

impl TimerId {
    #[inline]
    pub fn new(id: u32) -> Self {
        TimerId(id)
    }

    #[inline]
    pub fn next(self) -> Self {
        TimerId(self.0.wrapping_add(1))
    }
}

impl fmt::Debug for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timer(#{})", self.0)
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_advance() {
        assert_eq!(GearId::new(1).next(), GearId::new(2));
        assert_eq!(DecoratorId::new(7).next(), DecoratorId::new(8));
        assert_eq!(TimerId::new(u32::MAX).next(), TimerId::new(0));
    }

    #[test]
    fn test_id_formatting() {
        assert_eq!(format!("{:?}", GearId::new(3)), "Gear(#3)");
        assert_eq!(format!("{}", TimerId::new(12)), "#12");
    }
}
