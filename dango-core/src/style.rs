//! Display attributes and the per-cell style

use serde::{Deserialize, Serialize};

use crate::color::Color;

/// Attribute flags affecting how a cell is rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attrs {
    /// Bold text (SGR 1)
    pub bold: bool,
    /// Faint text (SGR 2)
    pub faint: bool,
    /// Italic text (SGR 3)
    pub italic: bool,
    /// Underlined text (SGR 4)
    pub underline: bool,
    /// Blinking text (SGR 5)
    pub blink: bool,
    /// Inverse video (SGR 7)
    pub inverse: bool,
    /// Concealed text (SGR 8)
    pub conceal: bool,
}

impl Attrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// The style of one cell: attributes plus foreground and background colour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Style {
    pub attrs: Attrs,
    pub fg: Color,
    pub bg: Color,
}

impl Style {
    pub fn new() -> Self {
        Self::default()
    }

    /// Foreground as drawn, accounting for inverse
    pub fn effective_fg(&self) -> Color {
        if self.attrs.inverse {
            self.bg
        } else {
            self.fg
        }
    }

    /// Background as drawn, accounting for inverse
    pub fn effective_bg(&self) -> Color {
        if self.attrs.inverse {
            self.fg
        } else {
            self.bg
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_colors_inverse() {
        let mut style = Style::new();
        style.fg = Color::Indexed(1);
        style.bg = Color::Indexed(0);
        style.attrs.inverse = true;

        assert_eq!(style.effective_fg(), Color::Indexed(0));
        assert_eq!(style.effective_bg(), Color::Indexed(1));
    }

    #[test]
    fn test_attrs_reset() {
        let mut attrs = Attrs::new();
        attrs.bold = true;
        attrs.conceal = true;
        attrs.reset();
        assert_eq!(attrs, Attrs::default());
    }
}
