//! Font profiles, glyph decomposition and synthesized accents.
//!
//! The bitmap faces only carry ASCII, so an accented letter is drawn as its plain
//! base letter followed by a single diagonal stroke above it. Every size-dependent
//! number (advance, spacing, line height, first baseline, accent stroke) lives in
//! the [`PROFILES`] table, indexed by [`FontSize`].

use crate::canvas::Canvas;
use embedded_graphics::prelude::Point;
use tracing::debug;
use u8g2_fonts::{fonts, FontRenderer};

/// Courier Bold bitmap faces, one per font size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FontFace {
    CourierBold10,
    CourierBold12,
    CourierBold18,
    CourierBold24,
}

const COURIER_BOLD_10: FontRenderer =
    FontRenderer::new::<fonts::u8g2_font_courB10_tf>().with_ignore_unknown_chars(true);
const COURIER_BOLD_12: FontRenderer =
    FontRenderer::new::<fonts::u8g2_font_courB12_tf>().with_ignore_unknown_chars(true);
const COURIER_BOLD_18: FontRenderer =
    FontRenderer::new::<fonts::u8g2_font_courB18_tf>().with_ignore_unknown_chars(true);
const COURIER_BOLD_24: FontRenderer =
    FontRenderer::new::<fonts::u8g2_font_courB24_tf>().with_ignore_unknown_chars(true);

impl FontFace {
    /// Run `draw` with the renderer for this face.
    pub fn with_renderer<R>(self, draw: impl FnOnce(&FontRenderer) -> R) -> R {
        match self {
            FontFace::CourierBold10 => draw(&COURIER_BOLD_10),
            FontFace::CourierBold12 => draw(&COURIER_BOLD_12),
            FontFace::CourierBold18 => draw(&COURIER_BOLD_18),
            FontFace::CourierBold24 => draw(&COURIER_BOLD_24),
        }
    }
}

/// User-selectable text size, persisted as the integers 1 through 4.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FontSize {
    Small = 1,
    #[default]
    Medium = 2,
    Large = 3,
    XLarge = 4,
}

impl FontSize {
    pub const ALL: [FontSize; 4] = [
        FontSize::Small,
        FontSize::Medium,
        FontSize::Large,
        FontSize::XLarge,
    ];

    /// Parse the persisted/form integer; anything outside 1..=4 is rejected.
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            1 => Some(FontSize::Small),
            2 => Some(FontSize::Medium),
            3 => Some(FontSize::Large),
            4 => Some(FontSize::XLarge),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn profile(self) -> &'static FontProfile {
        &PROFILES[self as usize - 1]
    }

    /// Human-readable name used by the web form.
    pub fn label(self) -> &'static str {
        match self {
            FontSize::Small => "Small (9pt)",
            FontSize::Medium => "Medium (12pt)",
            FontSize::Large => "Large (18pt)",
            FontSize::XLarge => "X-Large (24pt)",
        }
    }
}

/// Acute accent stroke, relative to the glyph's baseline origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccentStroke {
    pub start: Point,
    pub end: Point,
}

/// Hand-tuned metrics for one fixed-pitch size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FontProfile {
    pub size: FontSize,
    pub face: FontFace,
    /// Horizontal advance of every glyph
    pub advance: i32,
    /// Extra gap after each glyph
    pub spacing: i32,
    pub line_height: i32,
    /// Baseline of the first line
    pub start_y: i32,
    pub accent: AccentStroke,
}

impl FontProfile {
    /// Distance between consecutive glyph origins on a line.
    pub fn pitch(&self) -> i32 {
        self.advance + self.spacing
    }
}

pub static PROFILES: [FontProfile; 4] = [
    FontProfile {
        size: FontSize::Small,
        face: FontFace::CourierBold10,
        advance: 9,
        spacing: 0,
        line_height: 20,
        start_y: 20,
        accent: AccentStroke {
            start: Point::new(2, -11),
            end: Point::new(6, -13),
        },
    },
    FontProfile {
        size: FontSize::Medium,
        face: FontFace::CourierBold12,
        advance: 11,
        spacing: 1,
        line_height: 25,
        start_y: 25,
        accent: AccentStroke {
            start: Point::new(2, -13),
            end: Point::new(7, -16),
        },
    },
    FontProfile {
        size: FontSize::Large,
        face: FontFace::CourierBold18,
        advance: 16,
        spacing: 2,
        line_height: 35,
        start_y: 30,
        accent: AccentStroke {
            start: Point::new(3, -18),
            end: Point::new(10, -22),
        },
    },
    FontProfile {
        size: FontSize::XLarge,
        face: FontFace::CourierBold24,
        advance: 21,
        spacing: 3,
        line_height: 45,
        start_y: 35,
        accent: AccentStroke {
            start: Point::new(4, -24),
            end: Point::new(13, -29),
        },
    },
];

/// Mark drawn on top of a base glyph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Accent {
    None,
    Acute,
    /// Letter with no ASCII look-alike (thorn, eth), drawn as a plain base letter
    Stripped,
}

/// What actually gets painted for one code point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Glyph {
    pub base: char,
    pub accent: Accent,
}

/// Replacement for anything the pipeline cannot draw.
pub const PLACEHOLDER: u8 = b'?';

/// Latin-1 letters the board can draw: code point, base letter, accent.
pub(crate) const EXTENDED: [(u8, char, Accent); 16] = [
    (0xE1, 'a', Accent::Acute),
    (0xE9, 'e', Accent::Acute),
    (0xED, 'i', Accent::Acute),
    (0xF3, 'o', Accent::Acute),
    (0xFA, 'u', Accent::Acute),
    (0xFD, 'y', Accent::Acute),
    (0xC1, 'A', Accent::Acute),
    (0xC9, 'E', Accent::Acute),
    (0xCD, 'I', Accent::Acute),
    (0xD3, 'O', Accent::Acute),
    (0xDA, 'U', Accent::Acute),
    (0xDD, 'Y', Accent::Acute),
    (0xFE, 'p', Accent::Stripped),
    (0xF0, 'd', Accent::Stripped),
    (0xDE, 'P', Accent::Stripped),
    (0xD0, 'D', Accent::Stripped),
];

/// Whether a code point ≥ 0x80 is one of the drawable extended letters.
pub fn is_extended(code: u8) -> bool {
    EXTENDED.iter().any(|&(known, _, _)| known == code)
}

/// Split a code point into base letter and accent.
///
/// Total over `u8`: ASCII passes through unchanged, the sixteen extended letters use
/// the fixed table, and every other code point becomes a plain `?`.
pub fn decompose(code: u8) -> Glyph {
    if code.is_ascii() {
        return Glyph {
            base: char::from(code),
            accent: Accent::None,
        };
    }
    match EXTENDED.iter().find(|&&(known, _, _)| known == code) {
        Some(&(_, base, accent)) => Glyph { base, accent },
        None => {
            debug!("no glyph for code point {code:#04x}");
            Glyph {
                base: char::from(PLACEHOLDER),
                accent: Accent::None,
            }
        }
    }
}

/// Paint one glyph (and its accent stroke) with its baseline origin at `origin`.
///
/// Returns the profile's fixed advance; the accent never widens a glyph.
pub fn render_glyph<C: Canvas + ?Sized>(
    canvas: &mut C,
    glyph: Glyph,
    origin: Point,
    profile: &FontProfile,
) -> i32 {
    canvas.draw_glyph(glyph.base, origin, profile.face);
    if glyph.accent == Accent::Acute {
        canvas.draw_line(origin + profile.accent.start, origin + profile.accent.end);
    }
    profile.advance
}
