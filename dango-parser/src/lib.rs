//! dango-parser: byte stream to terminal events
//!
//! Combines a streaming UTF-8 decoder with a VT500-style escape-sequence
//! state machine. Feed raw pty bytes in, get typed [`Action`] events out.
//! The parser is a pure function of its state and the input byte: it never
//! allocates unboundedly, never panics on malformed input, and carries
//! partial sequences across chunk boundaries.

mod action;
mod machine;
mod params;
mod utf8;

pub use action::{Action, CsiAction};
pub use machine::{State, VtMachine};
pub use params::Params;
pub use utf8::{Utf8Decoder, Utf8Result};
