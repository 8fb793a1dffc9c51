//! A single grid element
//!
//! Each cell holds one user-perceived character (a `char`, which is exactly
//! a 1-4 byte UTF-8 sequence) and its style. Combining marks and wide
//! characters are out of scope; width is checked at write time instead.

use serde::{Deserialize, Serialize};

use crate::style::Style;

/// One cell in the terminal grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub ch: char,
    pub style: Style,
}

impl Cell {
    /// A space with the given style
    pub fn blank(style: Style) -> Self {
        Self { ch: ' ', style }
    }

    /// A cell with the given character and style
    pub fn new(ch: char, style: Style) -> Self {
        Self { ch, style }
    }

    /// A plain cell for tests and patterns
    pub fn ascii(ch: char) -> Self {
        Self { ch, style: Style::default() }
    }

    pub fn is_blank(&self) -> bool {
        self.ch == ' '
    }

    /// The cell's UTF-8 bytes, appended to `out`
    pub fn encode_utf8(&self, out: &mut Vec<u8>) {
        let mut buf = [0u8; 4];
        out.extend_from_slice(self.ch.encode_utf8(&mut buf).as_bytes());
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::blank(Style::default())
    }
}
