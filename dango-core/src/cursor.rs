//! Cursor state

use serde::{Deserialize, Serialize};

use crate::charset::CharsetState;
use crate::style::Style;
use crate::Pos;

/// The VT cursor: position, pen style, deferred wrap flag and the charset
/// designation state that travels with DECSC/DECRC
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub pos: Pos,
    pub style: Style,
    /// The next printable character should line-wrap before being written
    pub wrap_next: bool,
    pub charset: CharsetState,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Cursor state captured by DECSC, restored by DECRC
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedCursor {
    pub cursor: Cursor,
    pub origin_mode: bool,
}

impl SavedCursor {
    pub fn capture(cursor: &Cursor, origin_mode: bool) -> Self {
        Self { cursor: *cursor, origin_mode }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;

    #[test]
    fn test_cursor_default() {
        let cursor = Cursor::new();
        assert_eq!(cursor.pos, Pos::new(0, 0));
        assert!(!cursor.wrap_next);
    }

    #[test]
    fn test_save_restore_round_trip() {
        let mut cursor = Cursor::new();
        cursor.pos = Pos::new(5, 10);
        cursor.style.fg = Color::Indexed(3);
        cursor.wrap_next = true;

        let saved = SavedCursor::capture(&cursor, true);

        cursor.reset();
        assert_eq!(cursor.pos, Pos::new(0, 0));

        let restored = saved.cursor;
        assert_eq!(restored.pos, Pos::new(5, 10));
        assert_eq!(restored.style.fg, Color::Indexed(3));
        assert!(saved.origin_mode);
    }
}
