//! Colour representation for terminal cells
//!
//! A colour is either an index into the 256-entry palette (the first 16
//! being the configurable system palette) or a 24-bit direct RGB value.

use serde::{Deserialize, Serialize};

/// Cell colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    /// Default terminal foreground or background
    Default,
    /// Palette colour:
    /// 0-7 standard, 8-15 bright, 16-231 the 6x6x6 cube, 232-255 grayscale
    Indexed(u8),
    /// 24-bit direct colour
    Rgb { r: u8, g: u8, b: u8 },
}

/// The 16 system colours, xterm defaults. The host palette may override
/// these; this copy serves diagnostics and tests.
const SYSTEM: [(u8, u8, u8); 16] = [
    (0, 0, 0),
    (205, 0, 0),
    (0, 205, 0),
    (205, 205, 0),
    (0, 0, 238),
    (205, 0, 205),
    (0, 205, 205),
    (229, 229, 229),
    (127, 127, 127),
    (255, 0, 0),
    (0, 255, 0),
    (255, 255, 0),
    (92, 92, 255),
    (255, 0, 255),
    (0, 255, 255),
    (255, 255, 255),
];

/// Channel levels of the 6x6x6 colour cube
const CUBE: [u8; 6] = [0, 95, 135, 175, 215, 255];

impl Color {
    pub const BLACK: u8 = 0;
    pub const RED: u8 = 1;
    pub const GREEN: u8 = 2;
    pub const YELLOW: u8 = 3;
    pub const BLUE: u8 = 4;
    pub const MAGENTA: u8 = 5;
    pub const CYAN: u8 = 6;
    pub const WHITE: u8 = 7;

    pub fn indexed(index: u8) -> Self {
        Color::Indexed(index)
    }

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color::Rgb { r, g, b }
    }

    /// Resolve to RGB using the standard xterm palette
    pub fn to_rgb(&self) -> (u8, u8, u8) {
        match self {
            Color::Default => SYSTEM[7],
            Color::Indexed(index) => index_to_rgb(*index),
            Color::Rgb { r, g, b } => (*r, *g, *b),
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::Default
    }
}

/// Resolve a palette index against the three xterm regions: the system
/// colours, the colour cube, then the grayscale ramp
fn index_to_rgb(index: u8) -> (u8, u8, u8) {
    if let Some(&rgb) = SYSTEM.get(index as usize) {
        return rgb;
    }
    if index < 232 {
        let cell = index - 16;
        let r = CUBE[(cell / 36) as usize];
        let g = CUBE[(cell / 6 % 6) as usize];
        let b = CUBE[(cell % 6) as usize];
        (r, g, b)
    } else {
        let level = (index - 232) * 10 + 8;
        (level, level, level)
    }
}
