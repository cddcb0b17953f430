//! Styling primitives shared by layout, the drawlist renderer, and the
//! drawlist binary encoding.
//!
//! This module intentionally stops short of a full visual vocabulary
//! (borders, icons, charts) — per-widget geometry/styling primitives are
//! left to individual widget props; what survives here is exactly what
//! layout needs to place boxes and what the drawlist wire format needs to
//! encode a cell's paint.

use bitflags::bitflags;

//--------------------------------------------------------------------------------------------------
// Layout-facing types
//--------------------------------------------------------------------------------------------------

/// Dimension specification for an element's width or height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    /// Fixed size in terminal cells.
    Fixed(u16),
    /// Percentage of the parent's content box, stored as `0.0..=1.0`.
    Percentage(f32),
    /// Auto: shares remaining space equally among auto-sized siblings.
    Auto,
    /// Sized to fit content.
    Content,
}

/// Spacing applied to all four sides of an element (padding or margin).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Spacing {
    pub top: u16,
    pub right: u16,
    pub bottom: u16,
    pub left: u16,
}

impl Spacing {
    pub fn all(v: u16) -> Self {
        Self { top: v, right: v, bottom: v, left: v }
    }

    pub fn horizontal(&self) -> u16 {
        self.left.saturating_add(self.right)
    }

    pub fn vertical(&self) -> u16 {
        self.top.saturating_add(self.bottom)
    }
}

/// Layout direction for a structural container's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Vertical,
    Horizontal,
}

/// Overflow behavior when content exceeds a container's bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overflow {
    #[default]
    None,
    Hidden,
    Scroll,
    Auto,
}

//--------------------------------------------------------------------------------------------------
// Color & text style (drawlist-facing)
//--------------------------------------------------------------------------------------------------

/// Terminal color: the standard 16-color palette plus 24-bit RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    BrightBlack,
    BrightRed,
    BrightGreen,
    BrightYellow,
    BrightBlue,
    BrightMagenta,
    BrightCyan,
    BrightWhite,
    Rgb(u8, u8, u8),
}

/// Underline rendering style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnderlineStyle {
    #[default]
    None = 0,
    Straight = 1,
    Double = 2,
    Curly = 3,
    Dotted = 4,
    Dashed = 5,
}

impl UnderlineStyle {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::None,
            1 => Self::Straight,
            2 => Self::Double,
            3 => Self::Curly,
            4 => Self::Dotted,
            5 => Self::Dashed,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

bitflags! {
    /// Style `attrs` bitfield: bold 0, italic 1, underline 2,
    /// inverse 3, dim 4, strikethrough 5, overline 6, blink 7.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Attrs: u8 {
        const BOLD          = 0b0000_0001;
        const ITALIC        = 0b0000_0010;
        const UNDERLINE     = 0b0000_0100;
        const INVERSE       = 0b0000_1000;
        const DIM           = 0b0001_0000;
        const STRIKETHROUGH = 0b0010_0000;
        const OVERLINE      = 0b0100_0000;
        const BLINK         = 0b1000_0000;
    }
}

/// A fully-resolved cell paint: foreground, background, attrs, and
/// underline style/color. This is the unit of comparison the shadow
/// framebuffer uses to compute damage and the unit the drawlist
/// builder intern/encodes as a style key alongside `FILL_RECT`/`DRAW_TEXT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CellStyle {
    pub fg: Option<Color>,
    pub bg: Option<Color>,
    pub attrs: Attrs,
    pub underline_style: UnderlineStyle,
    pub underline_color: Option<Color>,
}

impl CellStyle {
    pub fn with_fg(mut self, fg: Color) -> Self {
        self.fg = Some(fg);
        self
    }

    pub fn with_bg(mut self, bg: Color) -> Self {
        self.bg = Some(bg);
        self
    }
}

/// Per-span/per-widget text style. Distinct from [`CellStyle`] in that it
/// models source-level intent (bool flags, optional wrap mode) rather than
/// the encoded bit layout; [`CellStyle`] is derived from it during render.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TextStyle {
    pub color: Option<Color>,
    pub background: Option<Color>,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub dim: bool,
    pub overline: bool,
    pub blink: bool,
    pub inverse: bool,
    pub underline_style: UnderlineStyle,
}

impl From<TextStyle> for CellStyle {
    fn from(ts: TextStyle) -> Self {
        let mut attrs = Attrs::empty();
        attrs.set(Attrs::BOLD, ts.bold);
        attrs.set(Attrs::ITALIC, ts.italic);
        attrs.set(Attrs::UNDERLINE, ts.underline);
        attrs.set(Attrs::STRIKETHROUGH, ts.strikethrough);
        attrs.set(Attrs::DIM, ts.dim);
        attrs.set(Attrs::OVERLINE, ts.overline);
        attrs.set(Attrs::BLINK, ts.blink);
        attrs.set(Attrs::INVERSE, ts.inverse);
        CellStyle {
            fg: ts.color,
            bg: ts.background,
            attrs,
            underline_style: ts.underline_style,
            underline_color: None,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Drawlist enumerations.
//--------------------------------------------------------------------------------------------------

/// Sub-cell glyph resolution used by `DRAW_CANVAS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Blitter {
    #[default]
    Auto = 0,
    Braille = 2,
    Sextant = 3,
    Quadrant = 4,
    Halfblock = 5,
    Ascii = 6,
}

impl Blitter {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Auto,
            2 => Self::Braille,
            3 => Self::Sextant,
            4 => Self::Quadrant,
            5 => Self::Halfblock,
            6 => Self::Ascii,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Subcell resolution `(subW, subH)` used to infer canvas pixel size
    /// from `(cols, rows)` when `pxWidth`/`pxHeight` are omitted.
    pub fn subcell_resolution(self) -> (u16, u16) {
        match self {
            Blitter::Braille => (2, 4),
            Blitter::Sextant => (2, 3),
            Blitter::Quadrant => (2, 2),
            Blitter::Halfblock => (1, 2),
            Blitter::Ascii | Blitter::Auto => (1, 1),
        }
    }
}

/// Image pixel encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Rgba = 0,
    Png = 1,
}

impl ImageFormat {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Rgba,
            1 => Self::Png,
            _ => return None,
        })
    }
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Terminal image protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageProtocol {
    #[default]
    Auto = 0,
    Kitty = 1,
    Sixel = 2,
    Iterm2 = 3,
}

impl ImageProtocol {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Auto,
            1 => Self::Kitty,
            2 => Self::Sixel,
            3 => Self::Iterm2,
            _ => return None,
        })
    }
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Image fit mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFit {
    #[default]
    Fill = 0,
    Contain = 1,
    Cover = 2,
}

impl ImageFit {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Fill,
            1 => Self::Contain,
            2 => Self::Cover,
            _ => return None,
        })
    }
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Image z-layer, constrained to `{-1, 0, 1}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZLayer(i8);

impl ZLayer {
    pub fn new(v: i32) -> Option<Self> {
        if (-1..=1).contains(&v) {
            Some(Self(v as i8))
        } else {
            None
        }
    }

    pub fn get(self) -> i8 {
        self.0
    }
}
