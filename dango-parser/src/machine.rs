//! VT escape-sequence state machine
//!
//! Follows the VT500-series parser model (https://vt100.net/emu/dec_ansi_parser):
//! a state per sequence family, with CAN and SUB aborting any sequence and
//! ESC restarting one. Malformed input never panics; it is logged and the
//! machine returns to ground.

use crate::action::{Action, CsiAction};
use crate::params::Params;
use crate::utf8::{Utf8Decoder, Utf8Result};

/// Maximum OSC/DCS payload retained, to bound memory under hostile input
const MAX_STRING_LEN: usize = 65536;

/// Parser state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Normal text processing
    Ground,
    /// After ESC
    Escape,
    /// After ESC plus an intermediate byte (`ESC #`, `ESC (`, ...)
    SpecialEntry,
    /// After ESC [
    CsiEntry,
    /// Collecting CSI parameters
    CsiParam,
    /// CSI sequence with intermediate bytes; consumed but not dispatched
    CsiIntermediate,
    /// Invalid CSI sequence, consume until the final byte
    CsiIgnore,
    /// After ESC ]
    OscString,
    /// After ESC P
    DcsPassthrough,
}

/// The escape-sequence state machine
#[derive(Debug, Clone)]
pub struct VtMachine {
    state: State,
    utf8: Utf8Decoder,
    /// Raw CSI parameter bytes
    params_buf: Vec<u8>,
    /// CSI private (`?`) marker seen
    private: bool,
    /// First intermediate of an ESC sequence
    intermediate: u8,
    /// OSC/DCS payload
    string_buf: Vec<u8>,
}

impl VtMachine {
    pub fn new() -> Self {
        Self {
            state: State::Ground,
            utf8: Utf8Decoder::new(),
            params_buf: Vec::with_capacity(32),
            private: false,
            intermediate: 0,
            string_buf: Vec::with_capacity(128),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Return to ground, discarding any partial sequence
    pub fn reset(&mut self) {
        self.state = State::Ground;
        self.utf8.reset();
        self.params_buf.clear();
        self.private = false;
        self.intermediate = 0;
        self.string_buf.clear();
    }

    /// Feed a chunk of bytes, invoking the callback for each event
    pub fn parse<F>(&mut self, data: &[u8], mut callback: F)
    where
        F: FnMut(Action),
    {
        for &byte in data {
            self.advance(byte, &mut callback);
        }
    }

    /// Feed a chunk and collect the events
    pub fn parse_collect(&mut self, data: &[u8]) -> Vec<Action> {
        let mut actions = Vec::new();
        self.parse(data, |action| actions.push(action));
        actions
    }

    /// Advance the machine by one byte
    pub fn advance<F>(&mut self, byte: u8, callback: &mut F)
    where
        F: FnMut(Action),
    {
        // String states collect nearly everything; terminators are BEL
        // (OSC only) and ST via ESC \.
        match self.state {
            State::OscString | State::DcsPassthrough => {
                match byte {
                    0x1B => {
                        // Likely ST; finish now and let Escape eat the `\`
                        self.finish_string(callback);
                        self.state = State::Escape;
                    }
                    0x07 if self.state == State::OscString => {
                        self.finish_string(callback);
                        self.state = State::Ground;
                    }
                    0x18 | 0x1A => {
                        self.string_buf.clear();
                        self.state = State::Ground;
                    }
                    _ => {
                        if self.string_buf.len() < MAX_STRING_LEN {
                            self.string_buf.push(byte);
                        }
                    }
                }
                return;
            }
            _ => {}
        }

        // An ASCII byte while a UTF-8 sequence is pending means the
        // sequence was truncated; drop it and process the byte normally.
        if self.utf8.is_pending() && byte < 0x80 {
            log::debug!("dropping truncated UTF-8 sequence");
            self.utf8.reset();
        }

        // C0 controls execute from within any non-string sequence
        if byte < 0x20 {
            match byte {
                0x1B => self.enter_escape(),
                0x18 | 0x1A => self.state = State::Ground,
                _ => callback(Action::Control(byte)),
            }
            return;
        }

        // High bytes are UTF-8 and only make sense in ground state
        if byte >= 0x80 {
            match self.state {
                State::Ground => match self.utf8.feed(byte) {
                    Utf8Result::Accept(c) => callback(Action::Print(c)),
                    Utf8Result::Reject => log::debug!("dropping ill-formed UTF-8 byte {byte:#04x}"),
                    Utf8Result::Continue => {}
                },
                _ => {
                    log::debug!("unexpected byte {byte:#04x} inside escape, abandoning sequence");
                    self.state = State::Ground;
                }
            }
            return;
        }

        match self.state {
            State::Ground => {
                // DEL is ignored
                if byte != 0x7F {
                    callback(Action::Print(byte as char));
                }
            }
            State::Escape => self.handle_escape(byte, callback),
            State::SpecialEntry => self.handle_special(byte, callback),
            State::CsiEntry => self.handle_csi_entry(byte, callback),
            State::CsiParam => self.handle_csi_param(byte, callback),
            State::CsiIntermediate => self.handle_csi_intermediate(byte),
            State::CsiIgnore => {
                if (0x40..=0x7E).contains(&byte) {
                    self.state = State::Ground;
                }
            }
            State::OscString | State::DcsPassthrough => unreachable!(),
        }
    }

    fn enter_escape(&mut self) {
        self.state = State::Escape;
        self.intermediate = 0;
    }

    fn handle_escape<F>(&mut self, byte: u8, callback: &mut F)
    where
        F: FnMut(Action),
    {
        match byte {
            b'[' => {
                self.state = State::CsiEntry;
                self.params_buf.clear();
                self.private = false;
            }
            b']' => {
                self.state = State::OscString;
                self.string_buf.clear();
            }
            b'P' => {
                self.state = State::DcsPassthrough;
                self.string_buf.clear();
            }
            b'\\' => {
                // Stray ST
                self.state = State::Ground;
            }
            b'D' | b'E' | b'H' | b'M' | b'N' | b'O' | b'Z' | b'c' | b'=' | b'>' | b'7' | b'8' => {
                callback(Action::Esc(byte));
                self.state = State::Ground;
            }
            0x20..=0x2F => {
                self.intermediate = byte;
                self.state = State::SpecialEntry;
            }
            _ => {
                log::debug!("unknown ESC final byte {:?}", byte as char);
                self.state = State::Ground;
            }
        }
    }

    fn handle_special<F>(&mut self, byte: u8, callback: &mut F)
    where
        F: FnMut(Action),
    {
        match byte {
            0x20..=0x2F => {
                // Only a single intermediate is meaningful to us
                log::debug!("extra ESC intermediate {:?} ignored", byte as char);
            }
            0x30..=0x7E => {
                callback(Action::Special { intermediate: self.intermediate, final_byte: byte });
                self.state = State::Ground;
            }
            _ => self.state = State::Ground,
        }
    }

    fn handle_csi_entry<F>(&mut self, byte: u8, callback: &mut F)
    where
        F: FnMut(Action),
    {
        match byte {
            b'?' => {
                self.private = true;
                self.state = State::CsiParam;
            }
            b'>' | b'<' | b'=' => {
                // Markers we do not interpret; consume the sequence
                self.state = State::CsiIgnore;
            }
            b'0'..=b'9' | b';' | b':' => {
                self.params_buf.push(byte);
                self.state = State::CsiParam;
            }
            0x20..=0x2F => self.state = State::CsiIntermediate,
            0x40..=0x7E => {
                self.dispatch_csi(byte, callback);
                self.state = State::Ground;
            }
            _ => self.state = State::CsiIgnore,
        }
    }

    fn handle_csi_param<F>(&mut self, byte: u8, callback: &mut F)
    where
        F: FnMut(Action),
    {
        match byte {
            b'0'..=b'9' | b';' | b':' => self.params_buf.push(byte),
            0x20..=0x2F => self.state = State::CsiIntermediate,
            0x40..=0x7E => {
                self.dispatch_csi(byte, callback);
                self.state = State::Ground;
            }
            _ => self.state = State::CsiIgnore,
        }
    }

    fn handle_csi_intermediate(&mut self, byte: u8) {
        match byte {
            0x20..=0x2F => {}
            0x40..=0x7E => {
                // Sequences with intermediates (DECSTR and friends) are
                // outside the repertoire; consume without dispatch.
                log::debug!("ignoring CSI sequence with intermediates, final {:?}", byte as char);
                self.state = State::Ground;
            }
            _ => self.state = State::CsiIgnore,
        }
    }

    fn dispatch_csi<F>(&mut self, final_byte: u8, callback: &mut F)
    where
        F: FnMut(Action),
    {
        let params = Params::parse(&self.params_buf);
        callback(Action::Csi(CsiAction { private: self.private, params, final_byte }));
    }

    fn finish_string<F>(&mut self, callback: &mut F)
    where
        F: FnMut(Action),
    {
        match self.state {
            State::OscString => {
                let args = String::from_utf8_lossy(&self.string_buf)
                    .split(';')
                    .map(str::to_owned)
                    .collect();
                callback(Action::Osc(args));
            }
            State::DcsPassthrough => {
                callback(Action::Dcs(std::mem::take(&mut self.string_buf)));
            }
            _ => {}
        }
        self.string_buf.clear();
    }
}

impl Default for VtMachine {
    fn default() -> Self {
        Self::new()
    }
}
