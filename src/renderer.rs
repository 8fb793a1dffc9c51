//! The observer boundary towards the host rendering layer
//!
//! The controller hands the renderer viewport positions, cell byte
//! strings and styles; colours, fonts and actual drawing belong to the
//! host. Calls arrive between read pumps, bracketed by `begin_frame` and
//! `end_frame`.

use dango_core::{Pos, Style};

/// Sink for draw calls and out-of-band terminal events
pub trait Renderer {
    /// Start a frame; returning false skips drawing (e.g. window hidden).
    /// `internal` marks frames triggered by the core itself rather than an
    /// exposure event.
    fn begin_frame(&mut self, internal: bool) -> bool;

    /// A run of `count` consecutive same-style cells starting at `pos`;
    /// `text` is their concatenated UTF-8 bytes
    fn draw_run(&mut self, pos: Pos, count: usize, style: Style, text: &[u8]);

    /// The cell under the cursor
    fn draw_cursor(&mut self, pos: Pos, style: Style, text: &[u8], wrap_next: bool, focused: bool);

    /// Selection overlay, clipped to the viewport. `topless`/`bottomless`
    /// mark a selection continuing beyond the visible edge.
    fn draw_selection(&mut self, begin: Pos, end: Pos, topless: bool, bottomless: bool);

    /// `offset` is the viewport's distance from the start of history
    fn draw_scrollbar(&mut self, total_rows: usize, offset: usize, visible_rows: usize);

    /// Finish a frame. `damage` is the overall dirtied rectangle, if any.
    fn end_frame(&mut self, damage: Option<(Pos, Pos)>, scrollbar: bool);

    // Out-of-band events

    fn bell(&mut self) {}

    fn set_title(&mut self, _title: &str) {}

    fn reset_title(&mut self) {}

    /// DECCOLM asked for a different geometry; the host decides whether to
    /// honour it by calling back into `Terminal::resize`
    fn resize_buffer(&mut self, _rows: usize, _cols: usize) {}

    /// A completed selection is ready for the clipboard
    fn copy(&mut self, _text: &str) {}

    fn child_exited(&mut self, _status: i32) {}
}
