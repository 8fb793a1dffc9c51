//! Grid rows: active lines and historical line descriptors
//!
//! An `ALine` owns its cells and is mutable. An `HLine` is a derived index
//! into a stored paragraph and can always be rebuilt from the paragraph
//! store.

use serde::{Deserialize, Serialize};

use crate::cell::Cell;
use crate::style::Style;

/// A line of the active region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ALine {
    /// Exactly `cols` cells
    pub cells: Vec<Cell>,
    /// Does this line continue on the next line (soft wrap)?
    pub cont: bool,
    /// One past the last column relevant for reflow, <= cells.len()
    pub wrap: usize,
}

impl ALine {
    pub fn new(cols: usize, style: Style) -> Self {
        Self { cells: vec![Cell::blank(style); cols], cont: false, wrap: 0 }
    }

    /// Build a line from a paragraph segment, padding to `cols`
    pub fn from_segment(segment: &[Cell], cont: bool, cols: usize) -> Self {
        debug_assert!(segment.len() <= cols);
        let wrap = segment.len();
        let mut cells = segment.to_vec();
        cells.resize(cols, Cell::blank(Style::default()));
        Self { cells, cont, wrap }
    }

    pub fn cols(&self) -> usize {
        self.cells.len()
    }

    /// Truncate or pad to a new width; wrap metadata is clipped
    pub fn resize(&mut self, cols: usize) {
        self.cont = false;
        self.wrap = self.wrap.min(cols);
        self.cells.resize(cols, Cell::blank(Style::default()));
    }

    /// Blank the whole line with the given style
    pub fn clear(&mut self, style: Style) {
        self.cont = false;
        self.wrap = 0;
        self.cells.fill(Cell::blank(style));
    }

    /// Blank columns `[begin, end)` with the given style
    pub fn clear_range(&mut self, begin: usize, end: usize, style: Style) {
        let end = end.min(self.cells.len());
        for cell in &mut self.cells[begin.min(end)..end] {
            *cell = Cell::blank(style);
        }
    }

    /// Record that content now extends through `col`
    pub fn touch(&mut self, col: usize) {
        self.wrap = self.wrap.max(col + 1);
    }

    /// Insert `n` blank cells at `col`, shifting the tail right; cells
    /// pushed past the end are lost
    pub fn insert_cells(&mut self, col: usize, n: usize, style: Style) {
        let cols = self.cells.len();
        if col >= cols {
            return;
        }
        let n = n.min(cols - col);
        self.cells[col..].rotate_right(n);
        for cell in &mut self.cells[col..col + n] {
            *cell = Cell::blank(style);
        }
        if col < self.wrap {
            self.wrap = (self.wrap + n).min(cols);
        }
    }

    /// Delete `n` cells at `col`, shifting the tail left and filling the
    /// vacated end with blanks
    pub fn delete_cells(&mut self, col: usize, n: usize, style: Style) {
        let cols = self.cells.len();
        if col >= cols {
            return;
        }
        let n = n.min(cols - col);
        self.cells[col..].rotate_left(n);
        for cell in &mut self.cells[cols - n..] {
            *cell = Cell::blank(style);
        }
        self.wrap = self.wrap.saturating_sub(n).max(col.min(self.wrap));
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(Cell::is_blank)
    }

    /// Text content with trailing blanks trimmed, for selection and search
    pub fn text(&self) -> String {
        let mut result: String = self.cells.iter().map(|c| c.ch).collect();
        let trimmed = result.trim_end_matches(' ').len();
        result.truncate(trimmed);
        result
    }
}

/// A line of the historical region: one wrapped segment of a paragraph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HLine {
    /// Absolute, never-reused ordinal of the paragraph
    pub index: usize,
    /// Which wrapped segment; 0 is the first row of the paragraph
    pub seqnum: usize,
}

impl HLine {
    pub fn new(index: usize, seqnum: usize) -> Self {
        Self { index, seqnum }
    }
}
