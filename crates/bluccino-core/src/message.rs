//! Message definitions
//!
//! A message is the only unit of communication between drivers, the
//! wireless stack and the application. Messages are plain values: they are
//! produced in one context (possibly an interrupt) and consumed later in the
//! dispatcher context without any call back into the producer.

use std::fmt;

use bytes::Bytes;

use crate::{Class, Direction, Opcode};

/// Message payload
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Value {
    #[default]
    None,
    Int(i32),
    Bool(bool),
    /// Opaque payload. Immutable and reference counted, so copies of a
    /// message never alias mutable data.
    Blob(Bytes),
}

impl Value {
    /// Integer view; booleans map to 0/1
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(b) => Some(i32::from(*b)),
            _ => None,
        }
    }

    /// Boolean view; integers are true when non-zero
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Bytes> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Blob(b)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("-"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Bool(b) => write!(f, "{}", u8::from(*b)),
            Value::Blob(b) => write!(f, "<{}B>", b.len()),
        }
    }
}

/// Completion status of a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Status {
    /// Not completed by any handler (yet)
    #[default]
    Pending,
    /// Completed successfully
    Success,
    /// Rejected by a handler with an application defined code
    Failure(i32),
}

impl Status {
    #[inline]
    pub fn is_pending(self) -> bool {
        matches!(self, Status::Pending)
    }

    #[inline]
    pub fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }

    #[inline]
    pub fn is_failure(self) -> bool {
        matches!(self, Status::Failure(_))
    }

    /// Fold another handler's status into an aggregate.
    /// The first failure wins; success beats pending.
    pub fn merge(self, other: Status) -> Status {
        match (self, other) {
            (Status::Failure(_), _) => self,
            (_, Status::Failure(_)) => other,
            (Status::Success, _) | (_, Status::Success) => Status::Success,
            _ => Status::Pending,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pending => f.write_str("pending"),
            Status::Success => f.write_str("ok"),
            Status::Failure(code) => write!(f, "err({})", code),
        }
    }
}

/// Routing key of a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub class: Class,
    pub opcode: Opcode,
    pub direction: Direction,
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {}", self.class, self.opcode, self.direction)
    }
}

/// Message - immutable value routed through the core
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    class: Class,
    opcode: Opcode,
    port: u16,
    value: Value,
    direction: Direction,
    status: Status,
}

impl Message {
    /// Create a new message; status starts as `Pending`
    pub fn new(
        class: Class,
        opcode: Opcode,
        port: u16,
        value: impl Into<Value>,
        direction: Direction,
    ) -> Self {
        Message {
            class,
            opcode,
            port,
            value: value.into(),
            direction,
            status: Status::Pending,
        }
    }

    /// Intent toward hardware/wireless
    pub fn down(class: Class, opcode: Opcode, port: u16, value: impl Into<Value>) -> Self {
        Self::new(class, opcode, port, value, Direction::Down)
    }

    /// Event reported to the application
    pub fn up(class: Class, opcode: Opcode, port: u16, value: impl Into<Value>) -> Self {
        Self::new(class, opcode, port, value, Direction::Up)
    }

    /// Message without port or value
    pub fn signal(class: Class, opcode: Opcode, direction: Direction) -> Self {
        Self::new(class, opcode, 0, Value::None, direction)
    }

    #[inline]
    pub fn class(&self) -> Class {
        self.class
    }

    #[inline]
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[inline]
    pub fn status(&self) -> Status {
        self.status
    }

    #[inline]
    pub fn route_key(&self) -> RouteKey {
        RouteKey {
            class: self.class,
            opcode: self.opcode,
            direction: self.direction,
        }
    }

    /// Copy with the status set, as produced by a completing handler
    pub fn reply(&self, status: Status) -> Self {
        Message {
            status,
            ..self.clone()
        }
    }

    pub fn with_value(&self, value: impl Into<Value>) -> Self {
        Message {
            value: value.into(),
            ..self.clone()
        }
    }

    pub fn with_port(&self, port: u16) -> Self {
        Message {
            port,
            ..self.clone()
        }
    }

    pub fn with_opcode(&self, opcode: Opcode) -> Self {
        Message {
            opcode,
            ..self.clone()
        }
    }

    /// Same message travelling the other way (e.g. a driver echoing a SET
    /// as a STATUS event)
    pub fn reversed(&self) -> Self {
        Message {
            direction: self.direction.flip(),
            status: Status::Pending,
            ..self.clone()
        }
    }

    /// Whether losing this message under backpressure is acceptable
    /// (periodic ticks and UP status polls are re-sent anyway)
    pub fn is_droppable(&self) -> bool {
        self.opcode.is_periodic()
            || (self.direction == Direction::Up && self.opcode == Opcode::Status)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}:{} @{},{} {}]",
            self.class, self.opcode, self.port, self.value, self.direction
        )?;
        if !self.status.is_pending() {
            write!(f, " {}", self.status)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_is_pending() {
        let msg = Message::down(Class::Led, Opcode::Set, 1, 1);
        assert_eq!(msg.status(), Status::Pending);
        assert_eq!(msg.direction(), Direction::Down);
        assert_eq!(msg.value(), &Value::Int(1));
    }

    #[test]
    fn test_reply_keeps_route() {
        let msg = Message::down(Class::Led, Opcode::Set, 1, true);
        let reply = msg.reply(Status::Failure(-5));
        assert_eq!(reply.route_key(), msg.route_key());
        assert_eq!(reply.status(), Status::Failure(-5));
        // Original untouched
        assert!(msg.status().is_pending());
    }

    #[test]
    fn test_status_merge() {
        assert_eq!(Status::Pending.merge(Status::Success), Status::Success);
        assert_eq!(Status::Success.merge(Status::Pending), Status::Success);
        assert_eq!(
            Status::Success.merge(Status::Failure(2)),
            Status::Failure(2)
        );
        assert_eq!(
            Status::Failure(1).merge(Status::Failure(2)),
            Status::Failure(1)
        );
        assert_eq!(Status::Pending.merge(Status::Pending), Status::Pending);
    }

    #[test]
    fn test_value_views() {
        assert_eq!(Value::Bool(true).as_int(), Some(1));
        assert_eq!(Value::Int(0).as_bool(), Some(false));
        assert_eq!(Value::None.as_int(), None);
        let blob = Value::Blob(Bytes::from_static(b"abc"));
        assert_eq!(blob.as_blob().map(|b| b.len()), Some(3));
    }

    #[test]
    fn test_blob_copies_share_immutable_payload() {
        let msg = Message::up(Class::Mesh, Opcode::Status, 0, Bytes::from(vec![1, 2, 3]));
        let copy = msg.clone();
        assert_eq!(msg, copy);
        assert_eq!(copy.value().as_blob().map(|b| b.as_ref()), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_display() {
        let msg = Message::up(Class::Button, Opcode::Status, 0, 1);
        assert_eq!(msg.to_string(), "[BUTTON:STS @0,1 UP]");
        let reply = Message::down(Class::Led, Opcode::Set, 2, true).reply(Status::Success);
        assert_eq!(reply.to_string(), "[LED:SET @2,1 DOWN] ok");
    }

    #[test]
    fn test_droppable() {
        assert!(Message::signal(Class::Sys, Opcode::Tick, Direction::Up).is_droppable());
        assert!(Message::up(Class::Button, Opcode::Status, 0, 1).is_droppable());
        assert!(!Message::down(Class::Led, Opcode::Set, 0, 1).is_droppable());
        assert!(!Message::up(Class::Button, Opcode::Press, 0, 1).is_droppable());
    }

    fn status() -> impl proptest::strategy::Strategy<Value = Status> {
        use proptest::prelude::*;
        prop_oneof![
            Just(Status::Pending),
            Just(Status::Success),
            any::<i32>().prop_map(Status::Failure),
        ]
    }

    proptest::proptest! {
        #[test]
        fn prop_merge_keeps_first_failure(statuses in proptest::collection::vec(status(), 0..12)) {
            let merged = statuses.iter().fold(Status::Pending, |acc, s| acc.merge(*s));
            let expected = statuses
                .iter()
                .copied()
                .find(|s| s.is_failure())
                .or_else(|| statuses.iter().copied().find(|s| s.is_success()))
                .unwrap_or(Status::Pending);
            proptest::prop_assert_eq!(merged, expected);
        }
    }
}
