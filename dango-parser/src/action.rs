//! Typed events emitted by the escape-sequence state machine

use crate::params::Params;

/// A CSI (Control Sequence Introducer) dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsiAction {
    /// Sequence started with the `?` private marker
    pub private: bool,
    /// Parsed numeric parameters
    pub params: Params,
    /// The final byte selecting the operation
    pub final_byte: u8,
}

/// One decoded input event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// A printable character
    Print(char),
    /// A C0 control byte
    Control(u8),
    /// A single-byte ESC command (D, E, H, M, c, 7, 8, = , >, ...)
    Esc(u8),
    /// `ESC [` sequence
    Csi(CsiAction),
    /// `ESC ]` string, split on `;`
    Osc(Vec<String>),
    /// `ESC P` passthrough payload
    Dcs(Vec<u8>),
    /// Intermediate-byte sequence such as `ESC # 8` or `ESC ( 0`
    Special { intermediate: u8, final_byte: u8 },
}
