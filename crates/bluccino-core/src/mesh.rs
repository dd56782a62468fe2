//! SIG mesh model opcode table
//!
//! The mesh stack raises and consumes messages of the reserved model
//! classes (`OnOff`, `Level`, `Lightness`). Framing on the air is the
//! stack's business; the core only fixes the mapping between
//! `(class, opcode)` and the two-octet model opcodes.

use crate::{Class, Opcode};

// Generic OnOff
pub const GEN_ONOFF_GET: u32 = 0x8201;
pub const GEN_ONOFF_SET: u32 = 0x8202;
pub const GEN_ONOFF_SET_UNACK: u32 = 0x8203;
pub const GEN_ONOFF_STATUS: u32 = 0x8204;

// Generic Level
pub const GEN_LEVEL_GET: u32 = 0x8205;
pub const GEN_LEVEL_SET: u32 = 0x8206;
pub const GEN_LEVEL_SET_UNACK: u32 = 0x8207;
pub const GEN_LEVEL_STATUS: u32 = 0x8208;

// Light Lightness
pub const LIGHT_LIGHTNESS_GET: u32 = 0x824B;
pub const LIGHT_LIGHTNESS_SET: u32 = 0x824C;
pub const LIGHT_LIGHTNESS_SET_UNACK: u32 = 0x824D;
pub const LIGHT_LIGHTNESS_STATUS: u32 = 0x824E;

const TABLE: [(Class, Opcode, u32); 12] = [
    (Class::OnOff, Opcode::Get, GEN_ONOFF_GET),
    (Class::OnOff, Opcode::Set, GEN_ONOFF_SET),
    (Class::OnOff, Opcode::SetUnack, GEN_ONOFF_SET_UNACK),
    (Class::OnOff, Opcode::Status, GEN_ONOFF_STATUS),
    (Class::Level, Opcode::Get, GEN_LEVEL_GET),
    (Class::Level, Opcode::Set, GEN_LEVEL_SET),
    (Class::Level, Opcode::SetUnack, GEN_LEVEL_SET_UNACK),
    (Class::Level, Opcode::Status, GEN_LEVEL_STATUS),
    (Class::Lightness, Opcode::Get, LIGHT_LIGHTNESS_GET),
    (Class::Lightness, Opcode::Set, LIGHT_LIGHTNESS_SET),
    (Class::Lightness, Opcode::SetUnack, LIGHT_LIGHTNESS_SET_UNACK),
    (Class::Lightness, Opcode::Status, LIGHT_LIGHTNESS_STATUS),
];

/// Model opcode for a mesh model message, if the pair is a model message
pub fn model_opcode(class: Class, opcode: Opcode) -> Option<u32> {
    TABLE
        .iter()
        .find(|(c, o, _)| *c == class && *o == opcode)
        .map(|(_, _, op)| *op)
}

/// Reverse lookup for a received model opcode
pub fn from_model_opcode(op: u32) -> Option<(Class, Opcode)> {
    TABLE
        .iter()
        .find(|(_, _, code)| *code == op)
        .map(|(c, o, _)| (*c, *o))
}

/// Acknowledged messages require the server to answer with a STATUS
pub fn is_acknowledged(op: u32) -> bool {
    matches!(
        from_model_opcode(op),
        Some((_, Opcode::Get)) | Some((_, Opcode::Set))
    )
}
