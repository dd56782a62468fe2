//! Message class, opcode and direction definitions
//!
//! Bluccino routes messages by a `(class, opcode, direction)` key:
//! - Class: which kind of device or subsystem a message concerns
//! - Opcode: the action within that class (mirrors mesh GET/SET/STATUS)
//! - Direction: DOWN toward hardware/wireless, UP toward the application

use std::fmt;

/// Application defined class or opcode number, 0..=0x7F.
/// The high bit of the byte code marks the user range, so larger numbers
/// cannot be represented.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserCode(u8);

impl UserCode {
    pub const MAX: u8 = 0x7F;

    pub const fn new(n: u8) -> Option<Self> {
        if n <= Self::MAX {
            Some(UserCode(n))
        } else {
            None
        }
    }

    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    const fn from_byte(b: u8) -> Self {
        UserCode(b & Self::MAX)
    }

    const fn to_byte(self) -> u8 {
        0x80 | self.0
    }
}

impl fmt::Display for UserCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "USER#{}", self.0)
    }
}

/// Message class - the category a message belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Class {
    /// System lifecycle: init, heartbeat ticks
    Sys,
    /// Timer/work bridge traffic
    Timer,
    /// LED driver
    Led,
    /// Push button driver
    Button,
    /// Switch (latched button state)
    Switch,
    /// BLE advertising/scanning
    Ble,
    /// Raw mesh stack traffic
    Mesh,
    /// Mesh Generic OnOff model
    OnOff,
    /// Mesh Generic Level model
    Level,
    /// Mesh Light Lightness model
    Lightness,
    /// Non-volatile storage
    Nvm,
    /// Application defined class
    User(UserCode),
}

impl Class {
    /// Application defined class; `None` above `UserCode::MAX`
    pub const fn user(n: u8) -> Option<Self> {
        match UserCode::new(n) {
            Some(code) => Some(Class::User(code)),
            None => None,
        }
    }

    /// Parse from wire byte
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Class::Sys),
            0x01 => Some(Class::Timer),
            0x10 => Some(Class::Led),
            0x11 => Some(Class::Button),
            0x12 => Some(Class::Switch),
            0x20 => Some(Class::Ble),
            0x21 => Some(Class::Mesh),
            0x22 => Some(Class::OnOff),
            0x23 => Some(Class::Level),
            0x24 => Some(Class::Lightness),
            0x30 => Some(Class::Nvm),
            0x80..=0xFF => Some(Class::User(UserCode::from_byte(b))),
            _ => None,
        }
    }

    /// Convert to wire byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        match self {
            Class::Sys => 0x00,
            Class::Timer => 0x01,
            Class::Led => 0x10,
            Class::Button => 0x11,
            Class::Switch => 0x12,
            Class::Ble => 0x20,
            Class::Mesh => 0x21,
            Class::OnOff => 0x22,
            Class::Level => 0x23,
            Class::Lightness => 0x24,
            Class::Nvm => 0x30,
            Class::User(code) => code.to_byte(),
        }
    }

    /// Short mnemonic used in logs
    pub fn name(self) -> &'static str {
        match self {
            Class::Sys => "SYS",
            Class::Timer => "TIMER",
            Class::Led => "LED",
            Class::Button => "BUTTON",
            Class::Switch => "SWITCH",
            Class::Ble => "BLE",
            Class::Mesh => "MESH",
            Class::OnOff => "ONOFF",
            Class::Level => "LEVEL",
            Class::Lightness => "LIGHTNESS",
            Class::Nvm => "NVM",
            Class::User(_) => "USER",
        }
    }

    /// Is this one of the classes reserved for SIG mesh models?
    pub fn is_mesh_model(self) -> bool {
        matches!(self, Class::OnOff | Class::Level | Class::Lightness)
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Class::User(code) => fmt::Display::fmt(code, f),
            other => f.write_str(other.name()),
        }
    }
}

/// Opcode - the action within a class
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Opcode {
    // Lifecycle
    Init,
    Tick,
    Tock,

    // Mesh-style request/response
    Set,
    Get,
    SetUnack,
    Status,

    // Input events
    Press,
    Release,
    Click,
    Hold,
    Toggle,

    // Storage
    Store,
    Recall,

    /// Application defined opcode
    User(UserCode),
}

impl Opcode {
    /// Application defined opcode; `None` above `UserCode::MAX`
    pub const fn user(n: u8) -> Option<Self> {
        match UserCode::new(n) {
            Some(code) => Some(Opcode::User(code)),
            None => None,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Opcode::Init),
            0x02 => Some(Opcode::Tick),
            0x03 => Some(Opcode::Tock),
            0x10 => Some(Opcode::Set),
            0x11 => Some(Opcode::Get),
            0x12 => Some(Opcode::SetUnack),
            0x13 => Some(Opcode::Status),
            0x20 => Some(Opcode::Press),
            0x21 => Some(Opcode::Release),
            0x22 => Some(Opcode::Click),
            0x23 => Some(Opcode::Hold),
            0x24 => Some(Opcode::Toggle),
            0x30 => Some(Opcode::Store),
            0x31 => Some(Opcode::Recall),
            0x80..=0xFF => Some(Opcode::User(UserCode::from_byte(b))),
            _ => None,
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        match self {
            Opcode::Init => 0x01,
            Opcode::Tick => 0x02,
            Opcode::Tock => 0x03,
            Opcode::Set => 0x10,
            Opcode::Get => 0x11,
            Opcode::SetUnack => 0x12,
            Opcode::Status => 0x13,
            Opcode::Press => 0x20,
            Opcode::Release => 0x21,
            Opcode::Click => 0x22,
            Opcode::Hold => 0x23,
            Opcode::Toggle => 0x24,
            Opcode::Store => 0x30,
            Opcode::Recall => 0x31,
            Opcode::User(code) => code.to_byte(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Init => "INIT",
            Opcode::Tick => "TICK",
            Opcode::Tock => "TOCK",
            Opcode::Set => "SET",
            Opcode::Get => "GET",
            Opcode::SetUnack => "SETU",
            Opcode::Status => "STS",
            Opcode::Press => "PRESS",
            Opcode::Release => "RELEASE",
            Opcode::Click => "CLICK",
            Opcode::Hold => "HOLD",
            Opcode::Toggle => "TOGGLE",
            Opcode::Store => "STORE",
            Opcode::Recall => "RECALL",
            Opcode::User(_) => "USER",
        }
    }

    /// Does the sender of this opcode expect a reply?
    pub fn expects_reply(self) -> bool {
        matches!(self, Opcode::Get | Opcode::Set)
    }

    /// Periodic opcodes whose loss under backpressure is tolerable
    pub fn is_periodic(self) -> bool {
        matches!(self, Opcode::Tick | Opcode::Tock)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::User(code) => fmt::Display::fmt(code, f),
            other => f.write_str(other.name()),
        }
    }
}

/// Direction of message flow
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    /// Intent issued toward hardware/wireless
    Down,
    /// Event reported from hardware/wireless
    Up,
}

impl Direction {
    #[inline]
    pub fn flip(self) -> Self {
        match self {
            Direction::Down => Direction::Up,
            Direction::Up => Direction::Down,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::Down => "DOWN",
            Direction::Up => "UP",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
