//! dango-core: the terminal grid model
//!
//! Provides the cell buffer at the heart of the emulator: a mutable active
//! region, a deduplicated paragraph history, damage tracking, selection and
//! in-buffer search. The buffer is deterministic: the same sequence of
//! operations always produces the same grid.

mod buffer;
mod cell;
mod charset;
mod color;
mod cursor;
mod damage;
mod deduper;
mod line;
mod modes;
mod search;
mod style;

pub use buffer::{Buffer, RowView};
pub use cell::Cell;
pub use charset::{parse_designation, Charset, CharsetState, Slot};
pub use color::Color;
pub use cursor::{Cursor, SavedCursor};
pub use damage::Damage;
pub use deduper::{Deduper, SharedDeduper, Tag};
pub use line::{ALine, HLine};
pub use modes::Modes;
pub use search::{Search, SearchError};
pub use style::{Attrs, Style};

use serde::{Deserialize, Serialize};

/// A position in viewport coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pos {
    pub row: usize,
    pub col: usize,
}

impl Pos {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// An absolute position able to refer to historical and active rows alike.
///
/// `row >= 0` indexes the active region; `row < 0` indexes history, with
/// `-1` being the most recent historical row. Ordering is lexicographic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct APos {
    pub row: isize,
    pub col: usize,
}

impl APos {
    pub fn new(row: isize, col: usize) -> Self {
        Self { row, col }
    }

    /// Convert a viewport position given the current scroll offset
    pub fn from_viewport(pos: Pos, scroll_offset: usize) -> Self {
        Self { row: pos.row as isize - scroll_offset as isize, col: pos.col }
    }
}
