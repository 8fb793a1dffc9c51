//! The cell buffer: active region, deduplicated history, damage, selection
//! and search
//!
//! The buffer is a grid of cells in two structurally different regions.
//! The active region is a mutable array of rows. The historical region is
//! stored as whole pre-wrap paragraphs in the deduper, with a derived row
//! index (`HLine`) mapping viewport rows onto paragraph segments. The
//! derived index is invalidated by resizes and rebuilt from the paragraph
//! tags; the paragraphs themselves survive every resize.
//!
//! Positions that must span both regions use `APos`: non-negative rows are
//! active, negative rows count back into history.

use std::collections::VecDeque;
use std::mem;

use crate::cell::Cell;
use crate::cursor::{Cursor, SavedCursor};
use crate::damage::Damage;
use crate::deduper::{SharedDeduper, Tag};
use crate::line::{ALine, HLine};
use crate::search::{Search, SearchError};
use crate::style::Style;
use crate::{APos, Pos};

/// A materialised row, uniform across the active/history boundary
#[derive(Debug, Clone)]
pub struct RowView {
    pub cells: Vec<Cell>,
    /// The next row is a logical continuation of this one
    pub cont: bool,
    /// One past the last content column
    pub wrap: usize,
}

#[derive(Debug, Clone, Copy)]
struct Selection {
    mark: APos,
    delim: APos,
}

/// The in-memory representation of the on-screen terminal data
pub struct Buffer {
    deduper: SharedDeduper,
    /// The paragraph history, oldest first
    tags: VecDeque<Tag>,
    /// Incremented for each front paragraph dropped; `tags[i]` has the
    /// absolute ordinal `lost_tags + i`
    lost_tags: usize,
    /// Cells of the paragraph in flight from active to history
    pending: Vec<Cell>,
    /// Derived historical row index, oldest first
    history: VecDeque<HLine>,
    /// The active region; always exactly `rows` lines of `cols` cells
    active: VecDeque<ALine>,
    /// Viewport-relative damage, one interval per row
    damage: Vec<Damage>,
    tabs: Vec<bool>,
    /// Rows the viewport is offset back from the live bottom
    scroll_offset: usize,
    /// None means unbounded
    history_limit: Option<usize>,
    cols: usize,
    /// First row inside the scrolling margin
    margin_begin: usize,
    /// One past the last row inside the scrolling margin
    margin_end: usize,
    /// The scrollbar needs redrawing
    bar_damage: bool,
    selection: Option<Selection>,
    cursor: Cursor,
    saved_cursor: SavedCursor,
    search: Option<Search>,
}

impl Buffer {
    pub fn new(deduper: SharedDeduper, rows: usize, cols: usize, history_limit: Option<usize>) -> Self {
        assert!(rows > 0 && cols > 0);
        let active = (0..rows).map(|_| ALine::new(cols, Style::default())).collect();
        let mut tabs = vec![false; cols];
        for (i, tab) in tabs.iter_mut().enumerate() {
            *tab = i % 8 == 0;
        }
        Self {
            deduper,
            tags: VecDeque::new(),
            lost_tags: 0,
            pending: Vec::new(),
            history: VecDeque::new(),
            active,
            damage: vec![Damage::new(); rows],
            tabs,
            scroll_offset: 0,
            history_limit,
            cols,
            margin_begin: 0,
            margin_end: rows,
            bar_damage: true,
            selection: None,
            cursor: Cursor::new(),
            saved_cursor: SavedCursor::default(),
            search: None,
        }
    }

    // Geometry

    pub fn rows(&self) -> usize {
        self.active.len()
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Wrapped lines in the scroll-back history
    pub fn historical_rows(&self) -> usize {
        self.history.len()
    }

    pub fn total_rows(&self) -> usize {
        self.history.len() + self.active.len()
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn bar_damage(&self) -> bool {
        self.bar_damage
    }

    pub fn margins(&self) -> (usize, usize) {
        (self.margin_begin, self.margin_end)
    }

    fn margins_set(&self) -> bool {
        self.margin_begin != 0 || self.margin_end != self.active.len()
    }

    // Cursor

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn cursor_mut(&mut self) -> &mut Cursor {
        &mut self.cursor
    }

    pub fn cursor_pos(&self) -> Pos {
        self.cursor.pos
    }

    pub fn reset_cursor(&mut self) {
        self.cursor.pos = Pos::default();
        self.cursor.wrap_next = false;
        self.cursor.style = Style::default();
    }

    pub fn save_cursor(&mut self, origin_mode: bool) {
        self.saved_cursor = SavedCursor::capture(&self.cursor, origin_mode);
    }

    /// Restore the saved cursor, returning the saved origin-mode flag
    pub fn restore_cursor(&mut self) -> bool {
        self.damage_cursor();
        self.cursor = self.saved_cursor.cursor;
        let rows = self.active.len();
        self.cursor.pos.row = self.cursor.pos.row.min(rows - 1);
        self.cursor.pos.col = self.cursor.pos.col.min(self.cols - 1);
        self.damage_cursor();
        self.saved_cursor.origin_mode
    }

    // Damage

    fn viewport_row_of_active(&self, active_row: usize) -> Option<usize> {
        let r = active_row + self.scroll_offset;
        (r < self.active.len()).then_some(r)
    }

    fn damage_in_row(&mut self, active_row: usize, begin: usize, end: usize) {
        if let Some(r) = self.viewport_row_of_active(active_row) {
            self.damage[r].add(begin, end.min(self.cols));
        }
    }

    /// Mark active rows `[begin, end)` fully damaged
    fn damage_rows(&mut self, begin: usize, end: usize) {
        for row in begin..end.min(self.active.len()) {
            self.damage_in_row(row, 0, self.cols);
        }
    }

    /// Mark the whole viewport damaged
    pub fn damage_viewport(&mut self, scrollbar: bool) {
        for damage in &mut self.damage {
            damage.add(0, self.cols);
        }
        if scrollbar {
            self.bar_damage = true;
        }
    }

    pub fn damage_cursor(&mut self) {
        let Pos { row, col } = self.cursor.pos;
        self.damage_in_row(row, col, col + 1);
    }

    pub fn row_damage(&self, viewport_row: usize) -> Damage {
        self.damage[viewport_row]
    }

    /// Overall damaged rectangle, if any row is damaged
    pub fn accumulate_damage(&self) -> Option<(Pos, Pos)> {
        let mut rect: Option<(Pos, Pos)> = None;
        for (row, damage) in self.damage.iter().enumerate() {
            if damage.is_empty() {
                continue;
            }
            rect = Some(match rect {
                None => (Pos::new(row, damage.begin), Pos::new(row + 1, damage.end)),
                Some((begin, end)) => (
                    Pos::new(begin.row, begin.col.min(damage.begin)),
                    Pos::new(row + 1, end.col.max(damage.end)),
                ),
            });
        }
        rect
    }

    /// Called after the renderer has consumed damage
    pub fn reset_damage(&mut self) {
        for damage in &mut self.damage {
            damage.reset();
        }
        self.bar_damage = false;
    }

    // History scrolling

    pub fn scroll_up_history(&mut self, rows: usize) -> bool {
        let target = (self.scroll_offset + rows).min(self.history.len());
        self.set_scroll_offset(target)
    }

    pub fn scroll_down_history(&mut self, rows: usize) -> bool {
        let target = self.scroll_offset.saturating_sub(rows);
        self.set_scroll_offset(target)
    }

    pub fn scroll_top_history(&mut self) -> bool {
        self.set_scroll_offset(self.history.len())
    }

    pub fn scroll_bottom_history(&mut self) -> bool {
        self.set_scroll_offset(0)
    }

    fn set_scroll_offset(&mut self, offset: usize) -> bool {
        if offset == self.scroll_offset {
            return false;
        }
        self.scroll_offset = offset;
        self.damage_viewport(true);
        true
    }

    /// Drop the entire scroll-back
    pub fn clear_history(&mut self) {
        log::debug!("clearing {} historical paragraphs", self.tags.len());
        {
            let mut deduper = self.deduper.borrow_mut();
            for &tag in &self.tags {
                deduper.release(tag);
            }
        }
        self.lost_tags += self.tags.len();
        self.tags.clear();
        self.history.clear();
        self.pending.clear();
        if self.scroll_offset != 0 {
            self.scroll_offset = 0;
            self.damage_viewport(true);
        }
        self.bar_damage = true;
    }

    // Uniform row access

    /// Materialise a row by absolute index: `row >= 0` is active,
    /// `row < 0` is history with `-1` the most recent historical row.
    pub fn get_row(&self, row: isize) -> RowView {
        if row >= 0 {
            let line = &self.active[row as usize];
            return RowView { cells: line.cells.clone(), cont: line.cont, wrap: line.wrap };
        }
        let hist_index = self.history.len() as isize + row;
        debug_assert!(hist_index >= 0, "history row out of range");
        let hline = self.history[hist_index as usize];
        let tag = self.tags[hline.index - self.lost_tags];
        let deduper = self.deduper.borrow();
        let para = deduper.lookup(tag);
        let begin = (hline.seqnum * self.cols).min(para.len());
        let end = (begin + self.cols).min(para.len());
        let cont = end < para.len();
        let mut cells = para[begin..end].to_vec();
        let wrap = cells.len();
        cells.resize(self.cols, Cell::blank(Style::default()));
        RowView { cells, cont, wrap }
    }

    /// Materialise the row shown at viewport row `r`
    pub fn viewport_row(&self, r: usize) -> RowView {
        self.get_row(r as isize - self.scroll_offset as isize)
    }

    /// Lowest addressable absolute row
    fn min_row(&self) -> isize {
        -(self.history.len() as isize)
    }

    // Scrolling a line off the top

    fn segments(len: usize, cols: usize) -> usize {
        if len == 0 {
            1
        } else {
            (len + cols - 1) / cols
        }
    }

    /// Scroll the top active row out, pushing a blank row in at the bottom.
    /// A completed paragraph is stored in the deduper and indexed into
    /// history; an unfinished one accumulates in `pending`.
    fn bump(&mut self) {
        let cols = self.cols;
        let top = self.active.pop_front().expect("active region is never empty");
        self.pending.extend_from_slice(&top.cells[..top.wrap]);

        let mut history_added = 0;
        if !top.cont {
            let para = mem::take(&mut self.pending);
            let len = para.len();
            let tag = self.deduper.borrow_mut().store(para);
            self.tags.push_back(tag);
            let ordinal = self.lost_tags + self.tags.len() - 1;
            let segs = Self::segments(len, cols);
            for seqnum in 0..segs {
                self.history.push_back(HLine::new(ordinal, seqnum));
            }
            history_added = segs;
            self.enforce_history_limit();
        }

        self.active.push_back(ALine::new(cols, Style::default()));
        self.shift_selection_on_bump(history_added);

        // A viewport that is scrolled up stays anchored on its content
        if self.scroll_offset > 0 {
            self.scroll_offset = (self.scroll_offset + 1).min(self.history.len());
        }
        self.damage_viewport(true);
    }

    fn shift_selection_on_bump(&mut self, history_added: usize) {
        let min_row = self.min_row();
        let Some(mut sel) = self.selection else { return };
        let mut lost = false;
        for pos in [&mut sel.mark, &mut sel.delim] {
            if pos.row >= 1 {
                pos.row -= 1;
            } else if pos.row == 0 {
                if history_added > 0 {
                    // The bumped row is the paragraph's last segment
                    pos.row = -1;
                } else {
                    // The row is in flight inside `pending` and no longer
                    // addressable
                    lost = true;
                }
            } else {
                pos.row -= history_added as isize;
            }
        }
        if lost || sel.mark.row < min_row || sel.delim.row < min_row {
            self.selection = None;
        } else {
            self.selection = Some(sel);
        }
    }

    fn enforce_history_limit(&mut self) {
        let Some(limit) = self.history_limit else { return };
        while self.history.len() > limit {
            let hline = self.history.pop_front().expect("history non-empty");
            let front_gone =
                self.history.front().map_or(true, |next| next.index != hline.index);
            if front_gone {
                let tag = self.tags.pop_front().expect("tags parallel history");
                self.deduper.borrow_mut().release(tag);
                self.lost_tags += 1;
            }
        }
        if self.scroll_offset > self.history.len() {
            self.scroll_offset = self.history.len();
            self.bar_damage = true;
        }
    }

    // Writing

    /// Write one printable character at the cursor, honouring the deferred
    /// wrap flag, auto-wrap and insert mode.
    pub fn write(&mut self, ch: char, auto_wrap: bool, insert: bool) {
        if self.cursor.wrap_next {
            self.cursor.wrap_next = false;
            if auto_wrap {
                let row = self.cursor.pos.row;
                self.active[row].cont = true;
                if row + 1 == self.margin_end {
                    self.scroll_up_one_at_bottom();
                } else if row + 1 < self.active.len() {
                    self.cursor.pos.row += 1;
                }
                self.cursor.pos.col = 0;
            }
        }

        let Pos { row, col } = self.cursor.pos;
        self.test_clear_selection(row as isize, row as isize + 1);

        let style = self.cursor.style;
        if insert && col + 1 < self.cols {
            self.active[row].insert_cells(col, 1, style);
            self.damage_in_row(row, col, self.cols);
        } else {
            self.damage_in_row(row, col, col + 1);
        }

        let line = &mut self.active[row];
        line.cells[col] = Cell::new(ch, style);
        line.touch(col);

        if col + 1 == self.cols {
            self.cursor.wrap_next = true;
        } else {
            self.cursor.pos.col += 1;
        }
    }

    fn scroll_up_one_at_bottom(&mut self) {
        if self.margins_set() {
            self.erase_lines_at(self.margin_begin, 1);
        } else {
            self.bump();
        }
    }

    /// BS, with reverse wrap across rows when auto-wrap is on
    pub fn backspace(&mut self, auto_wrap: bool) {
        if self.cursor.wrap_next {
            self.cursor.wrap_next = false;
        } else if self.cursor.pos.col > 0 {
            self.cursor.pos.col -= 1;
        } else if auto_wrap && self.cursor.pos.row > 0 {
            self.cursor.pos.row -= 1;
            self.cursor.pos.col = self.cols - 1;
        }
    }

    /// LF/IND; also CR when `reset_col`
    pub fn forward_index(&mut self, reset_col: bool) {
        let row = self.cursor.pos.row;
        if row + 1 == self.margin_end {
            self.scroll_up_one_at_bottom();
        } else if row + 1 < self.active.len() {
            self.cursor.pos.row += 1;
        }
        if reset_col {
            self.cursor.pos.col = 0;
        }
        self.cursor.wrap_next = false;
    }

    /// RI
    pub fn reverse_index(&mut self) {
        let row = self.cursor.pos.row;
        if row == self.margin_begin {
            self.scroll_down_margins(1);
        } else if row > 0 {
            self.cursor.pos.row -= 1;
        }
        self.cursor.wrap_next = false;
    }

    pub fn carriage_return(&mut self) {
        self.cursor.pos.col = 0;
        self.cursor.wrap_next = false;
    }

    // Tabs

    pub fn set_tab(&mut self) {
        let col = self.cursor.pos.col;
        self.tabs[col] = true;
    }

    pub fn unset_tab(&mut self) {
        let col = self.cursor.pos.col;
        self.tabs[col] = false;
    }

    pub fn clear_tabs(&mut self) {
        self.tabs.fill(false);
    }

    pub fn reset_tabs(&mut self) {
        for (i, tab) in self.tabs.iter_mut().enumerate() {
            *tab = i % 8 == 0;
        }
    }

    pub fn tab_forward(&mut self, count: usize) {
        let mut col = self.cursor.pos.col;
        for _ in 0..count {
            loop {
                if col + 1 >= self.cols {
                    col = self.cols - 1;
                    break;
                }
                col += 1;
                if self.tabs[col] {
                    break;
                }
            }
        }
        self.cursor.pos.col = col;
        self.cursor.wrap_next = false;
    }

    pub fn tab_backward(&mut self, count: usize) {
        let mut col = self.cursor.pos.col;
        for _ in 0..count {
            loop {
                if col == 0 {
                    break;
                }
                col -= 1;
                if self.tabs[col] {
                    break;
                }
            }
        }
        self.cursor.pos.col = col;
        self.cursor.wrap_next = false;
    }

    // Cursor motion

    /// Absolute cursor motion; with `margin_relative` the row addresses and
    /// clamps within the margins (origin mode).
    pub fn move_cursor(&mut self, pos: Pos, margin_relative: bool) {
        self.damage_cursor();
        let row = if margin_relative {
            (self.margin_begin + pos.row).min(self.margin_end - 1)
        } else {
            pos.row.min(self.active.len() - 1)
        };
        self.cursor.pos = Pos::new(row, pos.col.min(self.cols - 1));
        self.cursor.wrap_next = false;
        self.damage_cursor();
    }

    /// Component-wise cursor motion. Relative vertical moves stop at the
    /// margins when the cursor starts inside them.
    pub fn move_cursor2(&mut self, row_relative: bool, row: isize, col_relative: bool, col: isize) {
        self.damage_cursor();
        let base_row = if row_relative { self.cursor.pos.row as isize } else { 0 };
        let base_col = if col_relative { self.cursor.pos.col as isize } else { 0 };

        let mut new_row = base_row + row;
        if row_relative {
            if self.cursor.pos.row >= self.margin_begin {
                new_row = new_row.max(self.margin_begin as isize);
            }
            if self.cursor.pos.row < self.margin_end {
                new_row = new_row.min(self.margin_end as isize - 1);
            }
        }
        let new_row = new_row.clamp(0, self.active.len() as isize - 1) as usize;
        let new_col = (base_col + col).clamp(0, self.cols as isize - 1) as usize;

        self.cursor.pos = Pos::new(new_row, new_col);
        self.cursor.wrap_next = false;
        self.damage_cursor();
    }

    // Margins

    pub fn set_margins(&mut self, begin: usize, end: usize) {
        let rows = self.active.len();
        let begin = begin.min(rows);
        let end = end.min(rows);
        if end > begin {
            self.margin_begin = begin;
            self.margin_end = end;
        } else {
            self.reset_margins();
        }
    }

    pub fn reset_margins(&mut self) {
        self.margin_begin = 0;
        self.margin_end = self.active.len();
    }

    // Cell mutations on the cursor row

    /// ICH: shift cells right at the cursor, dropping cells off the end
    pub fn insert_cells(&mut self, n: usize) {
        let Pos { row, col } = self.cursor.pos;
        self.test_clear_selection(row as isize, row as isize + 1);
        let style = self.cursor.style;
        self.active[row].insert_cells(col, n, style);
        self.damage_in_row(row, col, self.cols);
    }

    /// DCH: shift cells left into the cursor, blanking the vacated tail
    pub fn erase_cells(&mut self, n: usize) {
        let Pos { row, col } = self.cursor.pos;
        self.test_clear_selection(row as isize, row as isize + 1);
        let style = self.cursor.style;
        self.active[row].delete_cells(col, n, style);
        self.damage_in_row(row, col, self.cols);
    }

    /// ECH: blank cells in place
    pub fn blank_cells(&mut self, n: usize) {
        let Pos { row, col } = self.cursor.pos;
        self.test_clear_selection(row as isize, row as isize + 1);
        let style = self.cursor.style;
        let end = (col + n).min(self.cols);
        let line = &mut self.active[row];
        line.clear_range(col, end, style);
        if end >= line.wrap {
            line.wrap = line.wrap.min(col);
        }
        self.damage_in_row(row, col, end);
    }

    // Clearing

    pub fn clear_line(&mut self) {
        let row = self.cursor.pos.row;
        self.test_clear_selection(row as isize, row as isize + 1);
        let style = self.cursor.style;
        self.active[row].clear(style);
        self.damage_in_row(row, 0, self.cols);
    }

    pub fn clear_line_left(&mut self) {
        let Pos { row, col } = self.cursor.pos;
        self.test_clear_selection(row as isize, row as isize + 1);
        let style = self.cursor.style;
        self.active[row].clear_range(0, col + 1, style);
        self.damage_in_row(row, 0, col + 1);
    }

    pub fn clear_line_right(&mut self) {
        let Pos { row, col } = self.cursor.pos;
        self.test_clear_selection(row as isize, row as isize + 1);
        let style = self.cursor.style;
        let line = &mut self.active[row];
        line.clear_range(col, self.cols, style);
        line.wrap = line.wrap.min(col);
        line.cont = false;
        self.damage_in_row(row, col, self.cols);
    }

    /// ED 2. Clears in place; nothing is pushed to history.
    pub fn clear(&mut self) {
        let rows = self.active.len();
        self.test_clear_selection(0, rows as isize);
        let style = self.cursor.style;
        for line in &mut self.active {
            line.clear(style);
        }
        self.damage_rows(0, rows);
    }

    pub fn clear_above(&mut self) {
        let row = self.cursor.pos.row;
        self.test_clear_selection(0, row as isize + 1);
        let style = self.cursor.style;
        for line in self.active.iter_mut().take(row) {
            line.clear(style);
        }
        self.damage_rows(0, row);
        self.clear_line_left();
    }

    pub fn clear_below(&mut self) {
        let row = self.cursor.pos.row;
        let rows = self.active.len();
        self.test_clear_selection(row as isize, rows as isize);
        self.clear_line_right();
        let style = self.cursor.style;
        for line in self.active.iter_mut().skip(row + 1) {
            line.clear(style);
        }
        self.damage_rows(row + 1, rows);
    }

    // Line insertion and deletion within the margins

    /// IL at the cursor row
    pub fn insert_lines(&mut self, n: usize) {
        let row = self.cursor.pos.row;
        if row < self.margin_begin || row >= self.margin_end {
            return;
        }
        self.insert_lines_at(row, n);
        self.cursor.pos.col = 0;
        self.cursor.wrap_next = false;
    }

    /// DL at the cursor row
    pub fn erase_lines(&mut self, n: usize) {
        let row = self.cursor.pos.row;
        if row < self.margin_begin || row >= self.margin_end {
            return;
        }
        self.erase_lines_at(row, n);
        self.cursor.pos.col = 0;
        self.cursor.wrap_next = false;
    }

    /// SU: rows leaving a full-screen margin scroll into history; rows
    /// leaving a partial margin are discarded.
    pub fn scroll_up_margins(&mut self, n: usize) {
        if self.margins_set() {
            self.erase_lines_at(self.margin_begin, n);
        } else {
            let n = n.min(self.active.len());
            for _ in 0..n {
                self.bump();
            }
        }
    }

    /// SD
    pub fn scroll_down_margins(&mut self, n: usize) {
        self.insert_lines_at(self.margin_begin, n);
    }

    fn insert_lines_at(&mut self, row: usize, n: usize) {
        let end = self.margin_end;
        debug_assert!(row >= self.margin_begin && row < end);
        let n = n.min(end - row);
        if n == 0 {
            return;
        }
        self.test_clear_selection(row as isize, end as isize);
        for _ in 0..n {
            self.active.remove(end - 1);
            self.active.insert(row, ALine::new(self.cols, Style::default()));
        }
        if row > 0 {
            self.active[row - 1].cont = false;
        }
        self.active[end - 1].cont = false;
        self.damage_rows(row, end);
    }

    fn erase_lines_at(&mut self, row: usize, n: usize) {
        let end = self.margin_end;
        debug_assert!(row >= self.margin_begin && row < end);
        let n = n.min(end - row);
        if n == 0 {
            return;
        }
        self.test_clear_selection(row as isize, end as isize);
        for _ in 0..n {
            self.active.remove(row);
            self.active.insert(end - 1, ALine::new(self.cols, Style::default()));
        }
        if row > 0 {
            self.active[row - 1].cont = false;
        }
        self.damage_rows(row, end);
    }

    /// DECALN: fill the screen with 'E', reset margins, home the cursor
    pub fn test_pattern(&mut self) {
        self.clear_selection();
        for line in &mut self.active {
            for cell in &mut line.cells {
                *cell = Cell::ascii('E');
            }
            line.wrap = self.cols;
            line.cont = false;
        }
        self.reset_margins();
        self.cursor.pos = Pos::default();
        self.cursor.wrap_next = false;
        let rows = self.active.len();
        self.damage_rows(0, rows);
    }

    /// Full reset of the active region and cursor; history is preserved
    pub fn reset(&mut self) {
        let style = Style::default();
        for line in &mut self.active {
            line.clear(style);
        }
        self.reset_cursor();
        self.reset_margins();
        self.reset_tabs();
        self.clear_selection();
        self.end_search();
        self.scroll_offset = 0;
        self.damage_viewport(true);
    }

    // Resizing

    /// Non-reflowing resize: active rows are truncated or padded; history
    /// paragraphs are untouched (their derived row index is rebuilt at the
    /// new width).
    pub fn resize_clip(&mut self, rows: usize, cols: usize) {
        assert!(rows > 0 && cols > 0);
        for line in &mut self.active {
            line.resize(cols);
        }
        while self.active.len() > rows {
            self.active.pop_back();
        }
        while self.active.len() < rows {
            self.active.push_back(ALine::new(cols, Style::default()));
        }
        self.cols = cols;
        self.rebuild_history();
        self.finish_resize(rows, cols);
    }

    /// Reflowing resize: preserves content, merging paragraphs across the
    /// active/history boundary and re-wrapping everything at the new width.
    pub fn resize_reflow(&mut self, rows: usize, cols: usize) {
        assert!(rows > 0 && cols > 0);

        // Finalise the active region as if it were scrolling out wholesale
        let used = self.used_rows();
        let mut pending = mem::take(&mut self.pending);
        for i in 0..used {
            let line = &self.active[i];
            pending.extend_from_slice(&line.cells[..line.wrap]);
            if !line.cont {
                let para = mem::take(&mut pending);
                let tag = self.deduper.borrow_mut().store(para);
                self.tags.push_back(tag);
            }
        }
        if !pending.is_empty() {
            let tag = self.deduper.borrow_mut().store(pending);
            self.tags.push_back(tag);
        }
        self.active.clear();
        self.cols = cols;

        // Re-wrap every paragraph at the new width
        self.rebuild_history();

        // Pull paragraphs back off the end of history to refill the screen
        let mut rows_needed = rows;
        let mut pulled: VecDeque<ALine> = VecDeque::new();
        while rows_needed > 0 {
            let Some(&tag) = self.tags.back() else { break };
            let para: Vec<Cell> = self.deduper.borrow().lookup(tag).to_vec();
            let segs = Self::segments(para.len(), cols);
            if segs <= rows_needed {
                for seqnum in (0..segs).rev() {
                    pulled.push_front(Self::segment_line(&para, seqnum, segs, cols));
                }
                rows_needed -= segs;
            } else {
                // Boundary paragraph: the tail becomes active, the head
                // waits in `pending` until the paragraph scrolls out again
                let first = segs - rows_needed;
                for seqnum in (first..segs).rev() {
                    pulled.push_front(Self::segment_line(&para, seqnum, segs, cols));
                }
                self.pending = para[..first * cols].to_vec();
                rows_needed = 0;
            }
            for _ in 0..segs {
                self.history.pop_back();
            }
            self.tags.pop_back();
            self.deduper.borrow_mut().release(tag);
        }
        self.active = pulled;
        while self.active.len() < rows {
            self.active.push_back(ALine::new(cols, Style::default()));
        }

        self.enforce_history_limit();
        self.finish_resize(rows, cols);
    }

    /// Rows of the active region holding content (or continuation state)
    fn used_rows(&self) -> usize {
        self.active
            .iter()
            .rposition(|line| line.wrap > 0 || line.cont)
            .map_or(0, |i| i + 1)
    }

    fn segment_line(para: &[Cell], seqnum: usize, segs: usize, cols: usize) -> ALine {
        let begin = (seqnum * cols).min(para.len());
        let end = (begin + cols).min(para.len());
        ALine::from_segment(&para[begin..end], seqnum + 1 < segs, cols)
    }

    /// Rebuild the derived history row index from the paragraph tags
    fn rebuild_history(&mut self) {
        let seg_counts: Vec<usize> = {
            let deduper = self.deduper.borrow();
            self.tags
                .iter()
                .map(|&tag| Self::segments(deduper.lookup(tag).len(), self.cols))
                .collect()
        };
        self.history.clear();
        for (i, &segs) in seg_counts.iter().enumerate() {
            let ordinal = self.lost_tags + i;
            for seqnum in 0..segs {
                self.history.push_back(HLine::new(ordinal, seqnum));
            }
        }
    }

    fn finish_resize(&mut self, rows: usize, cols: usize) {
        self.margin_begin = 0;
        self.margin_end = rows;

        let old_tabs = mem::take(&mut self.tabs);
        self.tabs = (0..cols)
            .map(|i| old_tabs.get(i).copied().unwrap_or(i % 8 == 0))
            .collect();

        self.cursor.pos.row = self.cursor.pos.row.min(rows - 1);
        self.cursor.pos.col = self.cursor.pos.col.min(cols - 1);
        self.cursor.wrap_next = false;
        self.saved_cursor.cursor.pos.row = self.saved_cursor.cursor.pos.row.min(rows - 1);
        self.saved_cursor.cursor.pos.col = self.saved_cursor.cursor.pos.col.min(cols - 1);

        self.scroll_offset = self.scroll_offset.min(self.history.len());
        self.selection = None;
        self.damage = vec![Damage::new(); rows];
        self.damage_viewport(true);
    }

    // Selection

    pub fn mark_selection(&mut self, pos: Pos) {
        self.damage_viewport(false);
        let apos = APos::from_viewport(pos, self.scroll_offset);
        self.selection = Some(Selection { mark: apos, delim: apos });
    }

    pub fn delimit_selection(&mut self, pos: Pos) {
        let apos = APos::from_viewport(pos, self.scroll_offset);
        if let Some(sel) = &mut self.selection {
            sel.delim = apos;
            self.damage_viewport(false);
        }
    }

    /// Grow the selection to word (level 2) or whole-paragraph (level 3)
    /// granularity around `pos`. Level 1 restarts a character selection.
    pub fn expand_selection(&mut self, pos: Pos, level: usize) {
        let apos = APos::from_viewport(pos, self.scroll_offset);
        match level {
            2 => {
                let (begin, end) = self.word_bounds(apos);
                self.selection = Some(Selection { mark: begin, delim: end });
            }
            3 => {
                let (first, last) = self.para_bounds(apos.row);
                let last_view = self.get_row(last);
                self.selection = Some(Selection {
                    mark: APos::new(first, 0),
                    delim: APos::new(last, last_view.wrap.max(1) - 1),
                });
            }
            _ => {
                self.selection = Some(Selection { mark: apos, delim: apos });
            }
        }
        self.damage_viewport(false);
    }

    pub fn clear_selection(&mut self) {
        if self.selection.take().is_some() {
            self.damage_viewport(false);
        }
    }

    /// Normalised selection as a half-open `[begin, end)` pair
    fn normalised_selection(&self) -> Option<(APos, APos)> {
        let sel = self.selection?;
        let (first, second) = if sel.mark <= sel.delim { (sel.mark, sel.delim) } else { (sel.delim, sel.mark) };
        // Marks are inclusive cells; the end becomes exclusive
        Some((first, APos::new(second.row, second.col + 1)))
    }

    /// Is the cell at `apos` inside the selection, given its row's wrap?
    pub fn is_selected(&self, apos: APos) -> bool {
        let Some((begin, end)) = self.normalised_selection() else { return false };
        if apos < begin || apos >= end {
            return false;
        }
        let view = self.get_row(apos.row);
        // Padding past the wrap point of a continuing line is not content
        !(view.cont && apos.col >= view.wrap)
    }

    /// Clear the selection if it intersects active rows `[begin, end)`
    fn test_clear_selection(&mut self, begin_row: isize, end_row: isize) {
        let Some((begin, end)) = self.normalised_selection() else { return };
        if begin.row < end_row && end.row >= begin_row {
            self.clear_selection();
        }
    }

    /// The selected text, with `\n` at paragraph boundaries
    pub fn get_selected_text(&self) -> Option<String> {
        let (begin, end) = self.normalised_selection()?;
        let mut text = String::new();
        for row in begin.row..=end.row {
            if row < self.min_row() || row >= self.active.len() as isize {
                continue;
            }
            let view = self.get_row(row);
            let from = if row == begin.row { begin.col } else { 0 };
            let limit = if view.cont { view.wrap } else { self.cols };
            let to = if row == end.row { end.col.min(limit) } else { limit };
            if from < to {
                let mut segment: String = view.cells[from..to].iter().map(|c| c.ch).collect();
                if !view.cont {
                    let trimmed = segment.trim_end_matches(' ').len();
                    segment.truncate(trimmed);
                }
                text.push_str(&segment);
            }
            if row != end.row && !view.cont {
                text.push('\n');
            }
        }
        Some(text)
    }

    /// The selection clipped to the viewport, with flags marking whether it
    /// extends above or below, for the renderer's overlay
    pub fn selection_region(&self) -> Option<(Pos, Pos, bool, bool)> {
        let (begin, end) = self.normalised_selection()?;
        let offset = self.scroll_offset as isize;
        let rows = self.active.len() as isize;
        let vbegin = begin.row + offset;
        let vend = end.row + offset;
        if vend < 0 || vbegin >= rows {
            return None;
        }
        let topless = vbegin < 0;
        let bottomless = vend >= rows;
        let begin_pos = if topless { Pos::new(0, 0) } else { Pos::new(vbegin as usize, begin.col) };
        let end_pos = if bottomless {
            Pos::new(rows as usize - 1, self.cols)
        } else {
            Pos::new(vend as usize, end.col)
        };
        Some((begin_pos, end_pos, topless, bottomless))
    }

    /// First and last absolute rows of the paragraph containing `row`
    fn para_bounds(&self, row: isize) -> (isize, isize) {
        let min_row = self.min_row();
        let max_row = self.active.len() as isize - 1;
        let mut first = row;
        while first > min_row && self.get_row(first - 1).cont {
            first -= 1;
        }
        let mut last = row;
        while last < max_row && self.get_row(last).cont {
            last += 1;
        }
        (first, last)
    }

    /// Expand over the non-space run at `apos`
    fn word_bounds(&self, apos: APos) -> (APos, APos) {
        let is_space = |pos: APos| -> bool {
            let view = self.get_row(pos.row);
            pos.col >= view.wrap && view.cont || view.cells[pos.col.min(self.cols - 1)].is_blank()
        };

        if is_space(apos) {
            return (apos, apos);
        }

        let mut begin = apos;
        loop {
            let prev = if begin.col > 0 {
                APos::new(begin.row, begin.col - 1)
            } else if begin.row > self.min_row() && self.get_row(begin.row - 1).cont {
                APos::new(begin.row - 1, self.cols - 1)
            } else {
                break;
            };
            if is_space(prev) {
                break;
            }
            begin = prev;
        }

        let mut end = apos;
        loop {
            let view = self.get_row(end.row);
            let next = if end.col + 1 < self.cols {
                APos::new(end.row, end.col + 1)
            } else if view.cont && end.row < self.active.len() as isize - 1 {
                APos::new(end.row + 1, 0)
            } else {
                break;
            };
            if is_space(next) {
                break;
            }
            end = next;
        }

        (begin, end)
    }

    // Search

    pub fn is_searching(&self) -> bool {
        self.search.is_some()
    }

    pub fn search_pattern(&self) -> Option<&str> {
        self.search.as_ref().map(Search::pattern)
    }

    /// Matches of the paragraph most recently landed on
    pub fn search_matches(&self) -> &[(APos, APos)] {
        self.search.as_ref().map_or(&[], Search::matches)
    }

    /// Compile `pattern` and seat the search at the last active row
    pub fn begin_search(&mut self, pattern: &str) -> Result<(), SearchError> {
        let start = self.active.len() as isize;
        self.search = Some(Search::new(pattern, start)?);
        Ok(())
    }

    pub fn end_search(&mut self) {
        if self.search.take().is_some() {
            self.damage_viewport(false);
        }
    }

    /// Walk to the previous (older) matching paragraph
    pub fn next_search(&mut self) -> bool {
        let Some(mut search) = self.search.take() else { return false };
        let min_row = self.min_row();
        let mut row = search.row.clamp(min_row, self.active.len() as isize);
        let mut found = false;
        while row > min_row {
            let (first, _last) = self.para_bounds(row - 1);
            let matches = self.match_paragraph(&search, first);
            row = first;
            if !matches.is_empty() {
                search.row = first;
                search.set_matches(matches);
                found = true;
                break;
            }
        }
        self.search = Some(search);
        if found {
            self.scroll_to_row(row);
        }
        found
    }

    /// Walk to the next (newer) matching paragraph
    pub fn prev_search(&mut self) -> bool {
        let Some(mut search) = self.search.take() else { return false };
        let max_row = self.active.len() as isize;
        let mut found = false;
        let mut row = search.row;
        loop {
            // Step past the current paragraph
            let (_first, last) = self.para_bounds(row.clamp(self.min_row(), max_row - 1));
            row = last + 1;
            if row >= max_row {
                break;
            }
            let (first, _last) = self.para_bounds(row);
            let matches = self.match_paragraph(&search, first);
            if !matches.is_empty() {
                search.row = first;
                search.set_matches(matches);
                found = true;
                break;
            }
        }
        let target = row;
        self.search = Some(search);
        if found {
            self.scroll_to_row(target);
        }
        found
    }

    /// Run the pattern over a paragraph's pre-wrap text, mapping byte
    /// offsets back to absolute positions
    fn match_paragraph(&self, search: &Search, first_row: isize) -> Vec<(APos, APos)> {
        let (_, last) = self.para_bounds(first_row);
        let mut text = String::new();
        // Byte offset of each cell, plus a sentinel for end-of-paragraph
        let mut offsets: Vec<(usize, APos)> = Vec::new();
        for row in first_row..=last {
            let view = self.get_row(row);
            for (col, cell) in view.cells[..view.wrap].iter().enumerate() {
                offsets.push((text.len(), APos::new(row, col)));
                text.push(cell.ch);
            }
        }
        offsets.push((text.len(), APos::new(last, self.get_row(last).wrap)));

        let pos_of = |byte: usize| -> APos {
            match offsets.binary_search_by_key(&byte, |&(off, _)| off) {
                Ok(i) => offsets[i].1,
                Err(i) => offsets[i.saturating_sub(1)].1,
            }
        };

        search
            .regex
            .find_iter(&text)
            .map(|m| (pos_of(m.start()), pos_of(m.end())))
            .collect()
    }

    /// Adjust the scroll offset so the absolute row is in the viewport
    fn scroll_to_row(&mut self, row: isize) {
        let offset = if row < 0 { (-row) as usize } else { 0 };
        self.set_scroll_offset(offset.min(self.history.len()));
        self.damage_viewport(true);
    }

    // Diagnostics

    /// Check the structural invariants; meant for tests and debug builds
    pub fn validate(&self) {
        for line in &self.active {
            assert_eq!(line.cells.len(), self.cols);
            assert!(line.wrap <= self.cols);
        }
        assert!(self.cursor.pos.row < self.active.len());
        assert!(self.cursor.pos.col < self.cols);
        assert!(self.margin_begin < self.margin_end);
        assert!(self.margin_end <= self.active.len());
        if let Some(limit) = self.history_limit {
            assert!(self.history.len() <= limit);
        }
        assert!(self.scroll_offset <= self.history.len());
        // Every history row must resolve to a live paragraph segment
        for hline in &self.history {
            assert!(hline.index >= self.lost_tags);
            assert!(hline.index - self.lost_tags < self.tags.len());
        }
    }

    /// Number of paragraph references this buffer holds
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deduper::Deduper;

    fn buffer(rows: usize, cols: usize, limit: Option<usize>) -> Buffer {
        Buffer::new(Deduper::new_shared(), rows, cols, limit)
    }

    fn write_str(buf: &mut Buffer, text: &str) {
        for ch in text.chars() {
            match ch {
                '\n' => buf.forward_index(true),
                '\r' => buf.carriage_return(),
                _ => buf.write(ch, true, false),
            }
        }
    }

    fn row_text(buf: &Buffer, row: isize) -> String {
        let view = buf.get_row(row);
        let text: String = view.cells.iter().map(|c| c.ch).collect();
        text.trim_end().to_string()
    }

    #[test]
    fn test_plain_write() {
        let mut buf = buffer(24, 80, None);
        write_str(&mut buf, "hello");
        assert_eq!(row_text(&buf, 0), "hello");
        assert_eq!(buf.cursor_pos(), Pos::new(0, 5));
        assert_eq!(buf.row_damage(0), Damage { begin: 0, end: 5 });
        buf.validate();
    }

    #[test]
    fn test_auto_wrap() {
        let mut buf = buffer(24, 80, None);
        for _ in 0..80 {
            buf.write('A', true, false);
        }
        assert!(buf.cursor().wrap_next);
        assert_eq!(buf.cursor_pos(), Pos::new(0, 79));
        buf.write('B', true, false);
        assert_eq!(buf.cursor_pos(), Pos::new(1, 1));
        assert!(buf.get_row(0).cont);
        assert_eq!(buf.get_row(1).cells[0].ch, 'B');
        buf.validate();
    }

    #[test]
    fn test_no_auto_wrap_overwrites_last_column() {
        let mut buf = buffer(24, 80, None);
        for _ in 0..80 {
            buf.write('A', false, false);
        }
        buf.write('B', false, false);
        assert_eq!(buf.cursor_pos(), Pos::new(0, 79));
        assert_eq!(buf.get_row(0).cells[79].ch, 'B');
        assert!(!buf.get_row(0).cont);
    }

    #[test]
    fn test_scroll_into_history() {
        let mut buf = buffer(4, 10, None);
        for i in 0..6 {
            write_str(&mut buf, &format!("line{i}"));
            if i < 5 {
                write_str(&mut buf, "\n");
            }
        }
        // Two lines scrolled out
        assert_eq!(buf.historical_rows(), 2);
        assert_eq!(row_text(&buf, -2), "line0");
        assert_eq!(row_text(&buf, -1), "line1");
        assert_eq!(row_text(&buf, 0), "line2");
        buf.validate();
    }

    #[test]
    fn test_wrapped_paragraph_single_tag() {
        let mut buf = buffer(3, 5, None);
        // 12 chars wrap over three rows: one paragraph
        write_str(&mut buf, "abcdefghijkl");
        // Push the whole paragraph plus one short line out of the active
        // region
        write_str(&mut buf, "\nx\ny\nz\n");
        assert_eq!(buf.tag_count(), 2);
        assert_eq!(buf.historical_rows(), 4);
        // The wrapped paragraph occupies three history rows sharing a tag
        assert_eq!(row_text(&buf, -4), "abcde");
        assert_eq!(row_text(&buf, -3), "fghij");
        assert_eq!(row_text(&buf, -2), "kl");
        assert_eq!(row_text(&buf, -1), "x");
        assert!(buf.get_row(-4).cont);
        assert!(buf.get_row(-3).cont);
        assert!(!buf.get_row(-2).cont);
        buf.validate();
    }

    #[test]
    fn test_history_limit() {
        let mut buf = buffer(2, 10, Some(3));
        for i in 0..8 {
            write_str(&mut buf, &format!("l{i}\n"));
        }
        assert!(buf.historical_rows() <= 3);
        buf.validate();
    }

    #[test]
    fn test_history_limit_releases_tags() {
        let deduper = Deduper::new_shared();
        let mut buf = Buffer::new(deduper.clone(), 2, 10, Some(2));
        for i in 0..6 {
            write_str(&mut buf, &format!("u{i}\n"));
        }
        assert_eq!(deduper.borrow().total_refs(), buf.tag_count());
        buf.validate();
    }

    #[test]
    fn test_dedup_shares_repeated_lines() {
        let deduper = Deduper::new_shared();
        let mut buf = Buffer::new(deduper.clone(), 2, 10, None);
        for _ in 0..5 {
            write_str(&mut buf, "same\n");
        }
        write_str(&mut buf, "\n\n");
        // Many history rows, few distinct paragraphs
        assert!(buf.historical_rows() >= 5);
        assert!(deduper.borrow().entries() <= 2);
        buf.validate();
    }

    #[test]
    fn test_scroll_offset_anchors_view() {
        let mut buf = buffer(4, 10, None);
        for i in 0..8 {
            write_str(&mut buf, &format!("s{i}\n"));
        }
        let top_before = row_text(&buf, -(buf.scroll_offset() as isize));
        buf.scroll_up_history(2);
        assert_eq!(buf.scroll_offset(), 2);
        // More output keeps the viewport anchored
        write_str(&mut buf, "new\n");
        assert_eq!(buf.scroll_offset(), 3);
        let _ = top_before;
        buf.validate();
    }

    #[test]
    fn test_viewport_row_mapping() {
        let mut buf = buffer(4, 10, None);
        for i in 0..8 {
            write_str(&mut buf, &format!("v{i}\n"));
        }
        buf.scroll_up_history(4);
        let top = buf.viewport_row(0);
        let text: String = top.cells.iter().map(|c| c.ch).collect();
        assert_eq!(text.trim_end(), "v1");
    }

    #[test]
    fn test_margins_scroll_discard() {
        let mut buf = buffer(6, 10, None);
        for i in 0..6 {
            write_str(&mut buf, &format!("m{i}"));
            if i < 5 {
                write_str(&mut buf, "\n");
            }
        }
        buf.set_margins(1, 4);
        buf.move_cursor(Pos::new(3, 0), false);
        buf.forward_index(false);
        // m1 was discarded, not pushed to history
        assert_eq!(buf.historical_rows(), 0);
        assert_eq!(row_text(&buf, 0), "m0");
        assert_eq!(row_text(&buf, 1), "m2");
        assert_eq!(row_text(&buf, 2), "m3");
        assert_eq!(row_text(&buf, 3), "");
        assert_eq!(row_text(&buf, 4), "m4");
        buf.validate();
    }

    #[test]
    fn test_insert_delete_lines() {
        let mut buf = buffer(5, 10, None);
        for i in 0..5 {
            write_str(&mut buf, &format!("r{i}"));
            if i < 4 {
                write_str(&mut buf, "\n");
            }
        }
        buf.move_cursor(Pos::new(1, 0), false);
        buf.insert_lines(2);
        assert_eq!(row_text(&buf, 0), "r0");
        assert_eq!(row_text(&buf, 1), "");
        assert_eq!(row_text(&buf, 2), "");
        assert_eq!(row_text(&buf, 3), "r1");
        assert_eq!(row_text(&buf, 4), "r2");

        buf.erase_lines(2);
        assert_eq!(row_text(&buf, 1), "r1");
        assert_eq!(row_text(&buf, 2), "r2");
        assert_eq!(row_text(&buf, 3), "");
        buf.validate();
    }

    #[test]
    fn test_reverse_index_scrolls_down() {
        let mut buf = buffer(3, 10, None);
        write_str(&mut buf, "top\nmid\nbot");
        buf.move_cursor(Pos::new(0, 0), false);
        buf.reverse_index();
        assert_eq!(row_text(&buf, 0), "");
        assert_eq!(row_text(&buf, 1), "top");
        assert_eq!(row_text(&buf, 2), "mid");
        buf.validate();
    }

    #[test]
    fn test_tabs() {
        let mut buf = buffer(24, 80, None);
        buf.tab_forward(1);
        assert_eq!(buf.cursor_pos().col, 8);
        buf.tab_forward(2);
        assert_eq!(buf.cursor_pos().col, 24);
        buf.tab_backward(1);
        assert_eq!(buf.cursor_pos().col, 16);
        buf.move_cursor(Pos::new(0, 20), false);
        buf.set_tab();
        buf.move_cursor(Pos::new(0, 0), false);
        buf.tab_forward(3);
        assert_eq!(buf.cursor_pos().col, 20);
        buf.clear_tabs();
        buf.tab_forward(1);
        assert_eq!(buf.cursor_pos().col, 79);
        buf.validate();
    }

    #[test]
    fn test_blank_cells() {
        let mut buf = buffer(24, 80, None);
        write_str(&mut buf, "ABCDE");
        buf.move_cursor(Pos::new(0, 1), false);
        buf.blank_cells(2);
        assert_eq!(row_text(&buf, 0), "A  DE");
        assert_eq!(buf.cursor_pos(), Pos::new(0, 1));
        buf.validate();
    }

    #[test]
    fn test_insert_erase_cells() {
        let mut buf = buffer(24, 10, None);
        write_str(&mut buf, "ABCDE");
        buf.move_cursor(Pos::new(0, 1), false);
        buf.insert_cells(2);
        assert_eq!(row_text(&buf, 0), "A  BCDE");
        buf.erase_cells(2);
        assert_eq!(row_text(&buf, 0), "ABCDE");
        buf.validate();
    }

    #[test]
    fn test_clear_operations() {
        let mut buf = buffer(3, 10, None);
        write_str(&mut buf, "aaaa\nbbbb\ncccc");
        buf.move_cursor(Pos::new(1, 2), false);
        buf.clear_above();
        assert_eq!(row_text(&buf, 0), "");
        assert_eq!(row_text(&buf, 1), "   b");
        assert_eq!(row_text(&buf, 2), "cccc");

        write_str(&mut buf, "\rdddd");
        buf.move_cursor(Pos::new(1, 2), false);
        buf.clear_below();
        assert_eq!(row_text(&buf, 1), "dd");
        assert_eq!(row_text(&buf, 2), "");
        buf.validate();
    }

    #[test]
    fn test_clear_keeps_style() {
        let mut buf = buffer(3, 10, None);
        buf.cursor_mut().style.bg = crate::color::Color::Indexed(4);
        buf.clear();
        let view = buf.get_row(0);
        assert_eq!(view.cells[0].style.bg, crate::color::Color::Indexed(4));
    }

    #[test]
    fn test_resize_clip() {
        let mut buf = buffer(4, 10, None);
        write_str(&mut buf, "0000\n1111\n2222\n3333");
        buf.resize_clip(2, 6);
        assert_eq!(buf.rows(), 2);
        assert_eq!(buf.cols(), 6);
        assert_eq!(row_text(&buf, 0), "0000");
        assert_eq!(row_text(&buf, 1), "1111");
        buf.validate();
    }

    #[test]
    fn test_reflow_narrower() {
        let mut buf = buffer(4, 10, None);
        write_str(&mut buf, "abcdefgh\nij");
        buf.resize_reflow(4, 4);
        // "abcdefgh" re-wraps over two rows
        assert_eq!(row_text(&buf, 0), "abcd");
        assert!(buf.get_row(0).cont);
        assert_eq!(row_text(&buf, 1), "efgh");
        assert!(!buf.get_row(1).cont);
        assert_eq!(row_text(&buf, 2), "ij");
        buf.validate();
    }

    #[test]
    fn test_reflow_wider_rejoins() {
        let mut buf = buffer(4, 4, None);
        write_str(&mut buf, "abcdefgh\nij");
        assert!(buf.get_row(0).cont);
        buf.resize_reflow(4, 10);
        assert_eq!(row_text(&buf, 0), "abcdefgh");
        assert!(!buf.get_row(0).cont);
        assert_eq!(row_text(&buf, 1), "ij");
        buf.validate();
    }

    #[test]
    fn test_reflow_idempotent() {
        let mut buf = buffer(4, 10, None);
        write_str(&mut buf, "hello\nworld\nwrapwrapwrapwrap");
        buf.resize_reflow(4, 10);
        let snapshot: Vec<String> = (0..4).map(|r| row_text(&buf, r)).collect();
        buf.resize_reflow(4, 10);
        let again: Vec<String> = (0..4).map(|r| row_text(&buf, r)).collect();
        assert_eq!(snapshot, again);
        buf.validate();
    }

    #[test]
    fn test_reflow_round_trip() {
        let mut buf = buffer(6, 10, None);
        write_str(&mut buf, "one\ntwotwotwo\nthree");
        let before: Vec<String> = (0..6).map(|r| row_text(&buf, r)).collect();
        buf.resize_reflow(6, 5);
        buf.resize_reflow(6, 10);
        let after: Vec<String> = (0..6).map(|r| row_text(&buf, r)).collect();
        assert_eq!(before, after);
        buf.validate();
    }

    #[test]
    fn test_reflow_pulls_history_back() {
        let mut buf = buffer(2, 10, None);
        write_str(&mut buf, "aa\nbb\ncc\ndd");
        assert_eq!(buf.historical_rows(), 2);
        buf.resize_reflow(4, 10);
        assert_eq!(buf.historical_rows(), 0);
        assert_eq!(row_text(&buf, 0), "aa");
        assert_eq!(row_text(&buf, 1), "bb");
        assert_eq!(row_text(&buf, 2), "cc");
        assert_eq!(row_text(&buf, 3), "dd");
        buf.validate();
    }

    #[test]
    fn test_reflow_boundary_paragraph_goes_pending() {
        let deduper = Deduper::new_shared();
        let mut buf = Buffer::new(deduper.clone(), 2, 4, None);
        // A paragraph wrapping over three rows scrolls fully into history,
        // then a short line follows it
        write_str(&mut buf, "abcdefghijk\nzz\n");
        assert!(buf.historical_rows() > 0);
        buf.resize_reflow(2, 4);
        // The boundary paragraph's head is in flight; scrolling resumes it
        write_str(&mut buf, "\nqq");
        buf.validate();
        assert_eq!(deduper.borrow().total_refs(), buf.tag_count());
    }

    #[test]
    fn test_selection_text_simple() {
        let mut buf = buffer(4, 10, None);
        write_str(&mut buf, "hello\nworld");
        buf.mark_selection(Pos::new(0, 0));
        buf.delimit_selection(Pos::new(1, 4));
        assert_eq!(buf.get_selected_text().unwrap(), "hello\nworld");
    }

    #[test]
    fn test_selection_joins_wrapped_rows() {
        let mut buf = buffer(4, 4, None);
        write_str(&mut buf, "abcdef");
        buf.mark_selection(Pos::new(0, 0));
        buf.delimit_selection(Pos::new(1, 3));
        // Wrapped rows join without a newline
        assert_eq!(buf.get_selected_text().unwrap(), "abcdef");
    }

    #[test]
    fn test_selection_reversed_marks() {
        let mut buf = buffer(4, 10, None);
        write_str(&mut buf, "backwards");
        buf.mark_selection(Pos::new(0, 8));
        buf.delimit_selection(Pos::new(0, 0));
        assert_eq!(buf.get_selected_text().unwrap(), "backwards");
    }

    #[test]
    fn test_selection_cleared_by_overlapping_write() {
        let mut buf = buffer(4, 10, None);
        write_str(&mut buf, "stale");
        buf.mark_selection(Pos::new(0, 0));
        buf.delimit_selection(Pos::new(0, 4));
        assert!(buf.get_selected_text().is_some());
        buf.move_cursor(Pos::new(0, 0), false);
        buf.write('X', true, false);
        assert!(buf.get_selected_text().is_none());
    }

    #[test]
    fn test_selection_word_expand() {
        let mut buf = buffer(4, 20, None);
        write_str(&mut buf, "alpha beta gamma");
        buf.expand_selection(Pos::new(0, 7), 2);
        assert_eq!(buf.get_selected_text().unwrap(), "beta");
    }

    #[test]
    fn test_selection_line_expand() {
        let mut buf = buffer(4, 5, None);
        write_str(&mut buf, "abcdefg\nxx");
        buf.expand_selection(Pos::new(0, 2), 3);
        assert_eq!(buf.get_selected_text().unwrap(), "abcdefg");
    }

    #[test]
    fn test_selection_spans_history() {
        let mut buf = buffer(2, 10, None);
        write_str(&mut buf, "first\nsecond\nthird");
        assert_eq!(buf.historical_rows(), 1);
        buf.scroll_up_history(1);
        buf.mark_selection(Pos::new(0, 0));
        buf.delimit_selection(Pos::new(1, 5));
        assert_eq!(buf.get_selected_text().unwrap(), "first\nsecond");
    }

    #[test]
    fn test_search_finds_in_history() {
        let mut buf = buffer(3, 10, None);
        for i in 0..8 {
            write_str(&mut buf, &format!("needle{i}\n"));
        }
        write_str(&mut buf, "haystack");
        buf.begin_search("needle3").unwrap();
        assert!(buf.next_search());
        let matches = buf.search_matches();
        assert_eq!(matches.len(), 1);
        // The viewport was scrolled so the match is visible
        let (begin, _end) = matches[0];
        assert!(begin.row < 0);
        assert!(buf.scroll_offset() > 0);
        buf.validate();
    }

    #[test]
    fn test_search_walks_backward_then_forward() {
        let mut buf = buffer(3, 10, None);
        write_str(&mut buf, "aaa\nbbb\naaa\nccc");
        buf.begin_search("aaa").unwrap();
        assert!(buf.next_search());
        let first_hit = buf.search_matches()[0].0;
        assert!(buf.next_search());
        let second_hit = buf.search_matches()[0].0;
        assert!(second_hit.row < first_hit.row);
        // And back down
        assert!(buf.prev_search());
        assert_eq!(buf.search_matches()[0].0, first_hit);
        buf.validate();
    }

    #[test]
    fn test_search_bad_pattern() {
        let mut buf = buffer(3, 10, None);
        assert!(buf.begin_search("(oops").is_err());
        assert!(!buf.is_searching());
    }

    #[test]
    fn test_search_no_match() {
        let mut buf = buffer(3, 10, None);
        write_str(&mut buf, "nothing\nhere");
        buf.begin_search("absent").unwrap();
        assert!(!buf.next_search());
    }

    #[test]
    fn test_damage_covers_mutations() {
        let mut buf = buffer(24, 80, None);
        write_str(&mut buf, "hello");
        assert_eq!(buf.row_damage(0), Damage { begin: 0, end: 5 });
        buf.reset_damage();
        buf.move_cursor(Pos::new(0, 2), false);
        buf.blank_cells(1);
        let damage = buf.row_damage(0);
        assert!(damage.begin <= 2 && damage.end >= 3);
    }

    #[test]
    fn test_scroll_offset_damages_bar() {
        let mut buf = buffer(2, 10, None);
        write_str(&mut buf, "a\nb\nc\nd");
        buf.reset_damage();
        assert!(buf.scroll_up_history(1));
        assert!(buf.bar_damage());
        assert!(!buf.row_damage(0).is_empty());
    }

    #[test]
    fn test_test_pattern() {
        let mut buf = buffer(5, 8, None);
        buf.test_pattern();
        for row in 0..5 {
            let view = buf.get_row(row);
            assert!(view.cells.iter().all(|c| c.ch == 'E'));
        }
        buf.validate();
    }

    #[test]
    fn test_clear_history() {
        let deduper = Deduper::new_shared();
        let mut buf = Buffer::new(deduper.clone(), 2, 10, None);
        write_str(&mut buf, "one\ntwo\nthree\n");
        assert!(buf.historical_rows() > 0);
        buf.clear_history();
        assert_eq!(buf.historical_rows(), 0);
        assert_eq!(deduper.borrow().total_refs(), 0);
        buf.validate();
    }

    #[test]
    fn test_save_restore_cursor() {
        let mut buf = buffer(24, 80, None);
        buf.move_cursor(Pos::new(5, 10), false);
        buf.save_cursor(true);
        buf.move_cursor(Pos::new(0, 0), false);
        let origin = buf.restore_cursor();
        assert!(origin);
        assert_eq!(buf.cursor_pos(), Pos::new(5, 10));
    }

    #[test]
    fn test_origin_relative_move() {
        let mut buf = buffer(24, 80, None);
        buf.set_margins(5, 20);
        buf.move_cursor(Pos::new(0, 0), true);
        assert_eq!(buf.cursor_pos().row, 5);
        buf.move_cursor(Pos::new(100, 0), true);
        assert_eq!(buf.cursor_pos().row, 19);
    }

    #[test]
    fn test_relative_move_stops_at_margins() {
        let mut buf = buffer(24, 80, None);
        buf.set_margins(5, 20);
        buf.move_cursor(Pos::new(10, 0), false);
        buf.move_cursor2(true, -100, false, 0);
        assert_eq!(buf.cursor_pos().row, 5);
        buf.move_cursor2(true, 100, false, 0);
        assert_eq!(buf.cursor_pos().row, 19);
    }
}
