//! The terminal controller
//!
//! Owns the primary and alternate buffers, interprets the event stream
//! coming out of the VT state machine, pumps bytes from the pty, and
//! drives the renderer from the accumulated damage. All of it runs on one
//! execution context; `read` refuses re-entry, with `resize` being the
//! single operation allowed to interrupt a dispatch.

use std::io;
use std::mem;
use std::time::{Duration, Instant};

use dango_core::{
    parse_designation, APos, Buffer, Cell, Color, Deduper, Modes, Pos, SearchError, SharedDeduper,
    Slot, Style,
};
use dango_parser::{Action, CsiAction, VtMachine};

use crate::config::Config;
use crate::renderer::Renderer;
use crate::tty::Tty;

/// Largest coordinate a legacy mouse report can carry
const MOUSE_LEGACY_MAX: usize = 223;

/// The VT interpreter and its screen state
pub struct Terminal<T: Tty> {
    config: Config,
    deduper: SharedDeduper,
    primary: Buffer,
    alternate: Buffer,
    alt_active: bool,
    modes: Modes,
    machine: VtMachine,
    tty: T,
    /// Spill-over for writes the pty would have blocked on
    write_buffer: Vec<u8>,
    /// Latched after a pty write error; further writes are discarded
    dump_writes: bool,
    /// Re-entrancy guard around the read pump
    dispatching: bool,
    focused: bool,
    child_gone: bool,
}

impl<T: Tty> Terminal<T> {
    pub fn new(config: Config, tty: T) -> Self {
        let deduper = Deduper::new_shared();
        let history = config.history_bound();
        let primary = Buffer::new(deduper.clone(), config.rows, config.cols, history);
        // The alternate buffer never scrolls into history
        let alternate = Buffer::new(deduper.clone(), config.rows, config.cols, Some(0));
        Self {
            config,
            deduper,
            primary,
            alternate,
            alt_active: false,
            modes: Modes::new(),
            machine: VtMachine::new(),
            tty,
            write_buffer: Vec::new(),
            dump_writes: false,
            dispatching: false,
            focused: true,
            child_gone: false,
        }
    }

    pub fn rows(&self) -> usize {
        self.buffer().rows()
    }

    pub fn cols(&self) -> usize {
        self.buffer().cols()
    }

    pub fn modes(&self) -> &Modes {
        &self.modes
    }

    pub fn buffer(&self) -> &Buffer {
        if self.alt_active {
            &self.alternate
        } else {
            &self.primary
        }
    }

    fn buffer_mut(&mut self) -> &mut Buffer {
        if self.alt_active {
            &mut self.alternate
        } else {
            &mut self.primary
        }
    }

    pub fn using_alternate(&self) -> bool {
        self.alt_active
    }

    pub fn child_gone(&self) -> bool {
        self.child_gone
    }

    pub fn tty(&self) -> &T {
        &self.tty
    }

    pub fn tty_mut(&mut self) -> &mut T {
        &mut self.tty
    }

    /// Distinct paragraphs currently held for both buffers
    pub fn stored_paragraphs(&self) -> usize {
        self.deduper.borrow().entries()
    }

    pub fn set_focused(&mut self, focused: bool) {
        if self.focused != focused {
            self.focused = focused;
            self.buffer_mut().damage_cursor();
        }
    }

    // I/O

    /// Pump bytes from the pty through the decoders, then flush damage to
    /// the renderer. Exits early once the frame-time budget is spent so a
    /// busy child cannot starve drawing.
    pub fn read(&mut self, renderer: &mut dyn Renderer) {
        if self.dispatching {
            log::warn!("re-entrant read rejected");
            return;
        }
        if self.child_gone {
            return;
        }
        self.dispatching = true;

        let budget = Duration::from_millis(self.config.read_budget_ms);
        let started = Instant::now();
        let mut chunk = vec![0u8; self.config.read_chunk_size.max(1)];
        let mut got_output = false;

        loop {
            match self.tty.read(&mut chunk) {
                Ok(0) => {
                    self.child_gone = true;
                    renderer.child_exited(0);
                    break;
                }
                Ok(n) => {
                    got_output = true;
                    let mut machine = mem::take(&mut self.machine);
                    machine.parse(&chunk[..n], |action| self.dispatch(action, renderer));
                    self.machine = machine;
                    if started.elapsed() >= budget {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("pty read failed: {e}");
                    self.child_gone = true;
                    renderer.child_exited(-1);
                    break;
                }
            }
        }

        self.dispatching = false;
        if got_output && self.config.scroll_on_tty_output {
            self.buffer_mut().scroll_bottom_history();
        }
        self.flush_frame(renderer, true);
    }

    /// Feed raw bytes through the state machine, applying every event
    pub fn process(&mut self, data: &[u8], renderer: &mut dyn Renderer) {
        let mut machine = mem::take(&mut self.machine);
        machine.parse(data, |action| self.dispatch(action, renderer));
        self.machine = machine;
    }

    pub fn needs_flush(&self) -> bool {
        !self.write_buffer.is_empty()
    }

    /// Push queued pty writes out, FIFO
    pub fn flush(&mut self) {
        while !self.write_buffer.is_empty() {
            match self.tty.write(&self.write_buffer) {
                Ok(0) => break,
                Ok(n) => {
                    self.write_buffer.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("pty write failed, dropping further writes: {e}");
                    self.dump_writes = true;
                    self.write_buffer.clear();
                    break;
                }
            }
        }
    }

    fn write_to_tty(&mut self, data: &[u8]) {
        if self.dump_writes {
            return;
        }
        self.write_buffer.extend_from_slice(data);
        self.flush();
    }

    /// Forward key/user input bytes to the child
    pub fn send(&mut self, data: &[u8]) {
        if self.modes.kbd_lock {
            return;
        }
        if self.config.scroll_on_key_press {
            self.buffer_mut().scroll_bottom_history();
        }
        self.write_to_tty(data);
    }

    /// Paste, honouring bracketed-paste mode
    pub fn paste(&mut self, data: &[u8]) {
        if self.config.scroll_on_key_press {
            self.buffer_mut().scroll_bottom_history();
        }
        if self.modes.bracketed_paste {
            self.write_to_tty(b"\x1b[200~");
            self.write_to_tty(data);
            self.write_to_tty(b"\x1b[201~");
        } else {
            self.write_to_tty(data);
        }
    }

    /// Emit a mouse report for a press/release at `pos`. `button` is the
    /// xterm button code (0/1/2, 64/65 for the wheel).
    pub fn report_mouse(&mut self, button: u8, pressed: bool, pos: Pos) {
        if !self.modes.mouse_reporting() {
            return;
        }
        let col = pos.col + 1;
        let row = pos.row + 1;
        if self.modes.mouse_sgr {
            let kind = if pressed { 'M' } else { 'm' };
            let report = format!("\x1b[<{};{};{}{}", button, col, row, kind);
            self.write_to_tty(report.as_bytes());
        } else {
            if col > MOUSE_LEGACY_MAX || row > MOUSE_LEGACY_MAX {
                return;
            }
            let button = if pressed { button } else { 3 };
            let report = [0x1b, b'[', b'M', 32 + button, 32 + col as u8, 32 + row as u8];
            self.write_to_tty(&report);
        }
    }

    /// Resize both buffers. Deliberately legal during a dispatch; the
    /// buffers re-clamp their cursors.
    pub fn resize(&mut self, rows: usize, cols: usize) {
        if rows == 0 || cols == 0 {
            return;
        }
        self.primary.resize_reflow(rows, cols);
        self.alternate.resize_clip(rows, cols);
    }

    // Event dispatch

    fn dispatch(&mut self, action: Action, renderer: &mut dyn Renderer) {
        match action {
            Action::Print(ch) => self.print(ch),
            Action::Control(byte) => self.control(byte, renderer),
            Action::Esc(byte) => self.escape(byte, renderer),
            Action::Csi(csi) => {
                if csi.private {
                    self.csi_private(&csi, renderer);
                } else {
                    self.csi(&csi);
                }
            }
            Action::Osc(args) => self.osc(&args, renderer),
            Action::Dcs(data) => {
                log::debug!("ignoring DCS payload of {} bytes", data.len());
            }
            Action::Special { intermediate, final_byte } => self.special(intermediate, final_byte),
        }
    }

    fn print(&mut self, ch: char) {
        use unicode_width::UnicodeWidthChar;
        // Combining marks are out of scope; drop them
        if ch.width() == Some(0) {
            log::debug!("zero-width character {:?} dropped", ch);
            return;
        }
        let ch = self.buffer().cursor().charset.translate(ch);
        let auto_wrap = self.modes.auto_wrap;
        let insert = self.modes.insert;
        self.buffer_mut().write(ch, auto_wrap, insert);
    }

    fn control(&mut self, byte: u8, renderer: &mut dyn Renderer) {
        match byte {
            0x00 => {}
            0x05 => {
                // ENQ answer-back is not supported
                log::debug!("ENQ ignored");
            }
            0x07 => renderer.bell(),
            0x08 => {
                let auto_wrap = self.modes.auto_wrap;
                self.buffer_mut().backspace(auto_wrap);
            }
            0x09 => self.buffer_mut().tab_forward(1),
            0x0A | 0x0B | 0x0C => {
                let reset_col = self.modes.cr_on_lf;
                self.buffer_mut().forward_index(reset_col);
            }
            0x0D => self.buffer_mut().carriage_return(),
            0x0E => self.buffer_mut().cursor_mut().charset.shift_out(),
            0x0F => self.buffer_mut().cursor_mut().charset.shift_in(),
            0x11 | 0x13 => {
                // XON/XOFF; flow control is the tty driver's business
            }
            _ => log::debug!("unhandled control byte {byte:#04x}"),
        }
    }

    fn escape(&mut self, byte: u8, renderer: &mut dyn Renderer) {
        match byte {
            b'D' => self.buffer_mut().forward_index(false),
            b'E' => self.buffer_mut().forward_index(true),
            b'M' => self.buffer_mut().reverse_index(),
            b'H' => self.buffer_mut().set_tab(),
            b'c' => self.reset_all(renderer),
            b'7' => {
                let origin = self.modes.origin;
                self.buffer_mut().save_cursor(origin);
            }
            b'8' => {
                let origin = self.buffer_mut().restore_cursor();
                self.modes.origin = origin;
            }
            b'=' => self.modes.app_keypad = true,
            b'>' => self.modes.app_keypad = false,
            b'Z' => self.write_to_tty(b"\x1b[?6c"),
            b'N' | b'O' => {
                // SS2/SS3 single shifts are outside the repertoire
                log::debug!("single shift {:?} ignored", byte as char);
            }
            _ => log::debug!("unhandled ESC {:?}", byte as char),
        }
    }

    fn csi(&mut self, csi: &CsiAction) {
        let params = &csi.params;
        match csi.final_byte {
            b'A' => {
                let n = params.get_or(0, 1) as isize;
                self.buffer_mut().move_cursor2(true, -n, true, 0);
            }
            b'B' | b'e' => {
                let n = params.get_or(0, 1) as isize;
                self.buffer_mut().move_cursor2(true, n, true, 0);
            }
            b'C' | b'a' => {
                let n = params.get_or(0, 1) as isize;
                self.buffer_mut().move_cursor2(true, 0, true, n);
            }
            b'D' => {
                let n = params.get_or(0, 1) as isize;
                self.buffer_mut().move_cursor2(true, 0, true, -n);
            }
            b'E' => {
                let n = params.get_or(0, 1) as isize;
                self.buffer_mut().move_cursor2(true, n, false, 0);
            }
            b'F' => {
                let n = params.get_or(0, 1) as isize;
                self.buffer_mut().move_cursor2(true, -n, false, 0);
            }
            b'G' | b'`' => {
                let col = params.get_or(0, 1) as isize - 1;
                self.buffer_mut().move_cursor2(true, 0, false, col);
            }
            b'd' => {
                let row = (params.get_or(0, 1) - 1) as usize;
                let col = self.buffer().cursor_pos().col;
                let origin = self.modes.origin;
                self.buffer_mut().move_cursor(Pos::new(row, col), origin);
            }
            b'H' | b'f' => {
                let row = (params.get_or(0, 1) - 1) as usize;
                let col = (params.get_or(1, 1) - 1) as usize;
                let origin = self.modes.origin;
                self.buffer_mut().move_cursor(Pos::new(row, col), origin);
            }
            b'J' => match params.get(0) {
                0 => self.buffer_mut().clear_below(),
                1 => self.buffer_mut().clear_above(),
                2 => self.buffer_mut().clear(),
                3 => self.buffer_mut().clear_history(),
                other => log::debug!("unhandled ED mode {other}"),
            },
            b'K' => match params.get(0) {
                0 => self.buffer_mut().clear_line_right(),
                1 => self.buffer_mut().clear_line_left(),
                2 => self.buffer_mut().clear_line(),
                other => log::debug!("unhandled EL mode {other}"),
            },
            b'L' => {
                let n = params.get_or(0, 1) as usize;
                self.buffer_mut().insert_lines(n);
            }
            b'M' => {
                let n = params.get_or(0, 1) as usize;
                self.buffer_mut().erase_lines(n);
            }
            b'@' => {
                let n = params.get_or(0, 1) as usize;
                self.buffer_mut().insert_cells(n);
            }
            b'P' => {
                let n = params.get_or(0, 1) as usize;
                self.buffer_mut().erase_cells(n);
            }
            b'X' => {
                let n = params.get_or(0, 1) as usize;
                self.buffer_mut().blank_cells(n);
            }
            b'S' => {
                let n = params.get_or(0, 1) as usize;
                self.buffer_mut().scroll_up_margins(n);
            }
            b'T' => {
                let n = params.get_or(0, 1) as usize;
                self.buffer_mut().scroll_down_margins(n);
            }
            b'I' => {
                let n = params.get_or(0, 1) as usize;
                self.buffer_mut().tab_forward(n);
            }
            b'Z' => {
                let n = params.get_or(0, 1) as usize;
                self.buffer_mut().tab_backward(n);
            }
            b'g' => match params.get(0) {
                0 => self.buffer_mut().unset_tab(),
                3 => self.buffer_mut().clear_tabs(),
                other => log::debug!("unhandled TBC mode {other}"),
            },
            b'r' => {
                let begin = params.get_or(0, 1) as usize - 1;
                let end = params.get_or(1, self.rows() as u32) as usize;
                let origin = self.modes.origin;
                let buffer = self.buffer_mut();
                buffer.set_margins(begin, end);
                buffer.move_cursor(Pos::new(0, 0), origin);
            }
            b'm' => self.sgr(csi),
            b'h' => self.ansi_modes(csi, true),
            b'l' => self.ansi_modes(csi, false),
            b's' => {
                if params.get(0) == 0 {
                    let origin = self.modes.origin;
                    self.buffer_mut().save_cursor(origin);
                }
            }
            b'u' => {
                let origin = self.buffer_mut().restore_cursor();
                self.modes.origin = origin;
            }
            b'n' => match params.get(0) {
                5 => self.write_to_tty(b"\x1b[0n"),
                6 => {
                    let pos = self.buffer().cursor_pos();
                    let report = format!("\x1b[{};{}R", pos.row + 1, pos.col + 1);
                    self.write_to_tty(report.as_bytes());
                }
                other => log::debug!("unhandled DSR {other}"),
            },
            b'c' => {
                if params.get(0) == 0 {
                    self.write_to_tty(b"\x1b[?6c");
                }
            }
            b't' => log::debug!("window manipulation ignored"),
            other => log::debug!(
                "unhandled CSI final {:?} params {:?}",
                other as char,
                params.as_slice()
            ),
        }
    }

    fn ansi_modes(&mut self, csi: &CsiAction, set: bool) {
        for param in csi.params.iter() {
            match param {
                2 => self.modes.kbd_lock = set,
                4 => self.modes.insert = set,
                12 => self.modes.echo = !set,
                20 => self.modes.cr_on_lf = set,
                other => log::debug!("unhandled ANSI mode {other}"),
            }
        }
    }

    fn csi_private(&mut self, csi: &CsiAction, renderer: &mut dyn Renderer) {
        match csi.final_byte {
            b'h' => {
                for param in csi.params.iter() {
                    self.dec_mode(param, true, renderer);
                }
            }
            b'l' => {
                for param in csi.params.iter() {
                    self.dec_mode(param, false, renderer);
                }
            }
            other => log::debug!("unhandled private CSI final {:?}", other as char),
        }
    }

    fn dec_mode(&mut self, mode: u32, set: bool, renderer: &mut dyn Renderer) {
        match mode {
            1 => self.modes.app_cursor = set,
            3 => {
                // DECCOLM clears, homes, and asks the host for 80/132 cols
                let buffer = self.buffer_mut();
                buffer.clear();
                buffer.reset_margins();
                buffer.move_cursor(Pos::new(0, 0), false);
                let rows = self.rows();
                renderer.resize_buffer(rows, if set { 132 } else { 80 });
            }
            5 => {
                if self.modes.reverse != set {
                    self.modes.reverse = set;
                    self.buffer_mut().damage_viewport(false);
                }
            }
            6 => {
                self.modes.origin = set;
                let origin = self.modes.origin;
                self.buffer_mut().move_cursor(Pos::new(0, 0), origin);
            }
            7 => self.modes.auto_wrap = set,
            8 => self.modes.auto_repeat = set,
            9 | 1000 => self.modes.mouse_button = set,
            25 => {
                self.modes.show_cursor = set;
                self.buffer_mut().damage_cursor();
            }
            47 => self.select_buffer(set, false, false),
            1002 | 1003 => self.modes.mouse_motion = set,
            1006 => self.modes.mouse_sgr = set,
            1037 => self.modes.delete_sends_del = set,
            1039 => self.modes.alt_sends_esc = set,
            1047 => self.select_buffer(set, true, false),
            1048 => {
                if set {
                    let origin = self.modes.origin;
                    self.buffer_mut().save_cursor(origin);
                } else {
                    let origin = self.buffer_mut().restore_cursor();
                    self.modes.origin = origin;
                }
            }
            1049 => self.select_buffer(set, true, true),
            2004 => self.modes.bracketed_paste = set,
            other => log::debug!("unhandled DEC mode {other} = {set}"),
        }
    }

    /// Switch between the primary and alternate buffers
    fn select_buffer(&mut self, alt: bool, clear_alt: bool, save_cursor: bool) {
        if self.alt_active == alt {
            return;
        }
        if alt {
            if save_cursor {
                let origin = self.modes.origin;
                self.primary.save_cursor(origin);
            }
            if clear_alt {
                self.alternate.reset();
            }
            self.alt_active = true;
        } else {
            self.alt_active = false;
            if save_cursor {
                let origin = self.primary.restore_cursor();
                self.modes.origin = origin;
            }
        }
        self.buffer_mut().damage_viewport(true);
    }

    fn sgr(&mut self, csi: &CsiAction) {
        let params = csi.params.as_slice().to_vec();
        let style = &mut self.buffer_mut().cursor_mut().style;
        let mut i = 0;
        while i < params.len() {
            i += apply_sgr(style, &params, i);
        }
    }

    fn osc(&mut self, args: &[String], renderer: &mut dyn Renderer) {
        let Some(code) = args.first().and_then(|s| s.parse::<u32>().ok()) else {
            log::debug!("malformed OSC {args:?}");
            return;
        };
        match code {
            0 | 1 | 2 => {
                let title = args.get(1).map(String::as_str).unwrap_or("");
                renderer.set_title(title);
            }
            other => log::debug!("unhandled OSC {other}"),
        }
    }

    fn special(&mut self, intermediate: u8, final_byte: u8) {
        match (intermediate, final_byte) {
            (b'#', b'8') => self.buffer_mut().test_pattern(),
            (b'(', code) => self.designate(Slot::G0, code),
            (b')', code) => self.designate(Slot::G1, code),
            _ => log::debug!(
                "unhandled sequence ESC {:?} {:?}",
                intermediate as char,
                final_byte as char
            ),
        }
    }

    fn designate(&mut self, slot: Slot, code: u8) {
        match parse_designation(code) {
            Some(charset) => self.buffer_mut().cursor_mut().charset.designate(slot, charset),
            None => log::debug!("unknown charset designation {:?}", code as char),
        }
    }

    /// RIS
    fn reset_all(&mut self, renderer: &mut dyn Renderer) {
        self.primary.reset();
        self.alternate.reset();
        self.alt_active = false;
        self.modes.reset();
        self.machine.reset();
        self.write_buffer.clear();
        self.dump_writes = false;
        renderer.reset_title();
        self.buffer_mut().damage_viewport(true);
    }

    // Selection plumbing

    pub fn mark_selection(&mut self, pos: Pos) {
        self.buffer_mut().mark_selection(pos);
    }

    pub fn delimit_selection(&mut self, pos: Pos) {
        self.buffer_mut().delimit_selection(pos);
    }

    pub fn expand_selection(&mut self, pos: Pos, level: usize) {
        self.buffer_mut().expand_selection(pos, level);
    }

    pub fn clear_selection(&mut self) {
        self.buffer_mut().clear_selection();
    }

    /// Hand the finished selection to the host clipboard
    pub fn finish_selection(&mut self, renderer: &mut dyn Renderer) {
        if let Some(text) = self.buffer().get_selected_text() {
            if !text.is_empty() {
                renderer.copy(&text);
            }
        }
    }

    // Search plumbing

    pub fn begin_search(&mut self, pattern: &str) -> Result<(), SearchError> {
        self.buffer_mut().begin_search(pattern)
    }

    pub fn next_search(&mut self) -> bool {
        self.buffer_mut().next_search()
    }

    pub fn prev_search(&mut self) -> bool {
        self.buffer_mut().prev_search()
    }

    pub fn end_search(&mut self) {
        self.buffer_mut().end_search()
    }

    // History scrolling entry points for the host (wheel, keyboard)

    pub fn scroll_up(&mut self, rows: usize) -> bool {
        self.buffer_mut().scroll_up_history(rows)
    }

    pub fn scroll_down(&mut self, rows: usize) -> bool {
        self.buffer_mut().scroll_down_history(rows)
    }

    pub fn scroll_top(&mut self) -> bool {
        self.buffer_mut().scroll_top_history()
    }

    pub fn scroll_bottom(&mut self) -> bool {
        self.buffer_mut().scroll_bottom_history()
    }

    // Rendering

    /// Repaint everything unconditionally (host exposure event)
    pub fn redraw(&mut self, renderer: &mut dyn Renderer) {
        self.buffer_mut().damage_viewport(true);
        self.flush_frame(renderer, false);
    }

    /// Walk damaged rows, batching runs of equal style, and hand them to
    /// the renderer
    pub fn flush_frame(&mut self, renderer: &mut dyn Renderer, internal: bool) {
        let damage_rect = self.buffer().accumulate_damage();
        let bar = self.buffer().bar_damage();
        if damage_rect.is_none() && !bar {
            return;
        }
        if !renderer.begin_frame(internal) {
            return;
        }

        let buffer = self.buffer();
        let rows = buffer.rows();
        let cols = buffer.cols();
        let offset = buffer.scroll_offset();

        for r in 0..rows {
            let damage = buffer.row_damage(r);
            if damage.is_empty() {
                continue;
            }
            let view = buffer.viewport_row(r);
            let begin = damage.begin.min(cols);
            let end = damage.end.min(cols);

            let mut run_start = begin;
            let mut run_count = 0usize;
            let mut run_bytes: Vec<u8> = Vec::new();
            let mut run_style: Option<Style> = None;

            for col in begin..end {
                let cell = &view.cells[col];
                let style = self.effective_style(cell, Pos::new(r, col), offset);
                if run_style != Some(style) {
                    if let Some(style) = run_style.take() {
                        renderer.draw_run(Pos::new(r, run_start), run_count, style, &run_bytes);
                    }
                    run_start = col;
                    run_count = 0;
                    run_bytes.clear();
                    run_style = Some(style);
                }
                cell.encode_utf8(&mut run_bytes);
                run_count += 1;
            }
            if let Some(style) = run_style {
                renderer.draw_run(Pos::new(r, run_start), run_count, style, &run_bytes);
            }
        }

        if let Some((begin, end, topless, bottomless)) = buffer.selection_region() {
            renderer.draw_selection(begin, end, topless, bottomless);
        }

        // Cursor, when enabled and inside the viewport
        if self.modes.show_cursor {
            let pos = buffer.cursor_pos();
            let r = pos.row + offset;
            if r < rows {
                let view = buffer.viewport_row(r);
                let cell = view.cells[pos.col];
                let mut bytes = Vec::with_capacity(4);
                cell.encode_utf8(&mut bytes);
                let style = self.effective_style(&cell, Pos::new(r, pos.col), offset);
                renderer.draw_cursor(
                    Pos::new(r, pos.col),
                    style,
                    &bytes,
                    buffer.cursor().wrap_next,
                    self.focused,
                );
            }
        }

        if bar {
            let total = buffer.total_rows();
            let history_offset = buffer.historical_rows() - offset;
            renderer.draw_scrollbar(total, history_offset, rows);
        }

        renderer.end_frame(damage_rect, bar);
        self.buffer_mut().reset_damage();
    }

    /// A cell's style as drawn: screen-wide reverse video and selection
    /// highlighting fold into the inverse attribute
    fn effective_style(&self, cell: &Cell, viewport_pos: Pos, offset: usize) -> Style {
        let mut style = cell.style;
        if self.modes.reverse {
            style.attrs.inverse = !style.attrs.inverse;
        }
        let apos = APos::from_viewport(viewport_pos, offset);
        if self.buffer().is_selected(apos) {
            style.attrs.inverse = !style.attrs.inverse;
        }
        style
    }
}

/// Apply one SGR parameter (consuming extended-colour arguments as
/// needed), returning how many parameters were used
fn apply_sgr(style: &mut Style, params: &[u32], i: usize) -> usize {
    match params[i] {
        0 => *style = Style::default(),
        1 => style.attrs.bold = true,
        2 => style.attrs.faint = true,
        3 => style.attrs.italic = true,
        4 => style.attrs.underline = true,
        5 | 6 => style.attrs.blink = true,
        7 => style.attrs.inverse = true,
        8 => style.attrs.conceal = true,
        21 | 22 => {
            style.attrs.bold = false;
            style.attrs.faint = false;
        }
        23 => style.attrs.italic = false,
        24 => style.attrs.underline = false,
        25 => style.attrs.blink = false,
        27 => style.attrs.inverse = false,
        28 => style.attrs.conceal = false,
        30..=37 => style.fg = Color::Indexed((params[i] - 30) as u8),
        39 => style.fg = Color::Default,
        40..=47 => style.bg = Color::Indexed((params[i] - 40) as u8),
        49 => style.bg = Color::Default,
        90..=97 => style.fg = Color::Indexed((params[i] - 90 + 8) as u8),
        100..=107 => style.bg = Color::Indexed((params[i] - 100 + 8) as u8),
        38 | 48 => {
            let fg = params[i] == 38;
            match params.get(i + 1) {
                Some(5) => {
                    let color = Color::Indexed(params.get(i + 2).copied().unwrap_or(0) as u8);
                    if fg {
                        style.fg = color;
                    } else {
                        style.bg = color;
                    }
                    return 3;
                }
                Some(2) => {
                    let c = |k: usize| params.get(i + k).copied().unwrap_or(0).min(255) as u8;
                    let color = Color::Rgb { r: c(2), g: c(3), b: c(4) };
                    if fg {
                        style.fg = color;
                    } else {
                        style.bg = color;
                    }
                    return 5;
                }
                _ => {
                    log::debug!("malformed extended colour SGR");
                    return params.len() - i;
                }
            }
        }
        other => log::debug!("unhandled SGR {other}"),
    }
    1
}
