//! Subscription filters
//!
//! A filter selects messages by class and direction, optionally narrowed to
//! one opcode. Port and value never take part in routing.

use std::fmt;

use bluccino_core::{Class, Direction, Opcode, RouteKey};

/// Routing filter of a gear
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Filter {
    class: Class,
    /// `None` matches every opcode
    opcode: Option<Opcode>,
    direction: Direction,
}

impl Filter {
    pub fn new(class: Class, direction: Direction) -> Self {
        Filter {
            class,
            opcode: None,
            direction,
        }
    }

    /// Hardware-facing subscription: intents travelling down
    pub fn down(class: Class) -> Self {
        Self::new(class, Direction::Down)
    }

    /// Application-facing subscription: events travelling up
    pub fn up(class: Class) -> Self {
        Self::new(class, Direction::Up)
    }

    /// Narrow the filter to a single opcode
    pub fn opcode(mut self, opcode: Opcode) -> Self {
        self.opcode = Some(opcode);
        self
    }

    pub fn class(&self) -> Class {
        self.class
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn opcode_filter(&self) -> Option<Opcode> {
        self.opcode
    }

    #[inline]
    pub fn matches(&self, key: &RouteKey) -> bool {
        self.class == key.class
            && self.direction == key.direction
            && self.opcode.map_or(true, |op| op == key.opcode)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode {
            Some(op) => write!(f, "{}:{} {}", self.class, op, self.direction),
            None => write!(f, "{}:* {}", self.class, self.direction),
        }
    }
}
