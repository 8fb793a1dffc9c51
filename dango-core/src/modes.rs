//! Terminal mode flags

use serde::{Deserialize, Serialize};

/// The mode set shared by the controller and its buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modes {
    /// DECAWM: wrap at the right margin
    pub auto_wrap: bool,
    /// DECTCEM: draw the cursor
    pub show_cursor: bool,
    /// DECARM
    pub auto_repeat: bool,
    /// IRM: shift cells right instead of overwriting
    pub insert: bool,
    /// DECSCNM: reverse video for the whole screen
    pub reverse: bool,
    /// DECOM: cursor addressing relative to the margins
    pub origin: bool,
    /// LNM: LF implies CR
    pub cr_on_lf: bool,
    /// DECNKM / keypad application mode
    pub app_keypad: bool,
    /// DECCKM: cursor keys send application sequences
    pub app_cursor: bool,
    /// Mouse press/release reporting
    pub mouse_button: bool,
    /// Mouse motion reporting
    pub mouse_motion: bool,
    /// SGR extended mouse coordinates
    pub mouse_sgr: bool,
    /// Bracketed paste
    pub bracketed_paste: bool,
    /// Delete key sends DEL rather than an escape
    pub delete_sends_del: bool,
    /// Alt-modified keys send ESC prefix
    pub alt_sends_esc: bool,
    /// KAM: keyboard action mode (input locked)
    pub kbd_lock: bool,
    /// SRM is inverted: when set, keypresses are echoed locally
    pub echo: bool,
}

impl Modes {
    pub fn new() -> Self {
        Self {
            auto_wrap: true,
            show_cursor: true,
            auto_repeat: true,
            insert: false,
            reverse: false,
            origin: false,
            cr_on_lf: false,
            app_keypad: false,
            app_cursor: false,
            mouse_button: false,
            mouse_motion: false,
            mouse_sgr: false,
            bracketed_paste: false,
            delete_sends_del: false,
            alt_sends_esc: true,
            kbd_lock: false,
            echo: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn mouse_reporting(&self) -> bool {
        self.mouse_button || self.mouse_motion
    }
}

impl Default for Modes {
    fn default() -> Self {
        Self::new()
    }
}
