//! # Line Layout
//!
//! Greedy word wrap for fixed-pitch text. A line is filled glyph by glyph; when the
//! next glyph would cross the right boundary the engine looks back a bounded
//! distance for a space on the same line. If it finds one, the partial word after
//! the space moves to the next line. Otherwise the line is broken mid-word.
//!
//! Layout is planned before anything is painted, because the panel cannot erase a
//! glyph once it has been drawn. The plan is dropped as soon as it is painted, so
//! the draw calls stay a pure function of the message, the profile and the width.

use crate::canvas::Canvas;
use crate::glyph::{decompose, render_glyph, FontProfile};
use crate::normalize::NormalizedMessage;
use embedded_graphics::prelude::Point;
use tracing::debug;

/// X of the first glyph on every line.
pub const LEFT_MARGIN: i32 = 10;
/// Blank strip kept free on the right edge.
pub const RIGHT_MARGIN: i32 = 10;
/// How many characters the wrap search looks back for a space.
pub const WRAP_LOOKBACK: usize = 30;

/// Pen position plus the horizontal limits of a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutCursor {
    pub x: i32,
    pub y: i32,
    left: i32,
    right: i32,
    spacing: i32,
    pitch: i32,
    line_height: i32,
}

impl LayoutCursor {
    pub fn new(profile: &FontProfile, canvas_width: u32) -> Self {
        Self {
            x: LEFT_MARGIN,
            y: profile.start_y,
            left: LEFT_MARGIN,
            right: canvas_width as i32 - RIGHT_MARGIN,
            spacing: profile.spacing,
            pitch: profile.pitch(),
            line_height: profile.line_height,
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn right_boundary(&self) -> i32 {
        self.right
    }

    pub fn at_line_start(&self) -> bool {
        self.x == self.left
    }

    /// Whether one more glyph (with its spacing) stays inside the right boundary.
    pub fn fits_next(&self) -> bool {
        self.x + self.pitch <= self.right
    }

    /// Move past a glyph that reported `advance` pixels.
    pub fn advance(&mut self, advance: i32) {
        self.x += advance + self.spacing;
    }

    pub fn new_line(&mut self) {
        self.x = self.left;
        self.y += self.line_height;
    }
}

/// One code point at its final baseline origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlacedGlyph {
    pub code: u8,
    pub origin: Point,
}

/// Compute where every glyph of `message` goes on a canvas `canvas_width` pixels wide.
///
/// Newlines and carriage returns start a new line and draw nothing. Lines that run
/// past the bottom of the canvas are still planned; they are simply not visible.
pub fn plan(message: &NormalizedMessage, profile: &FontProfile, canvas_width: u32) -> Vec<PlacedGlyph> {
    let codes = message.as_bytes();
    let mut cursor = LayoutCursor::new(profile, canvas_width);
    let mut placed: Vec<PlacedGlyph> = Vec::with_capacity(codes.len());
    // Index into `codes` of the first character on the current line
    let mut line_start = 0;
    let mut i = 0;

    while let Some(&code) = codes.get(i) {
        if code == b'\n' || code == b'\r' {
            cursor.new_line();
            i += 1;
            line_start = i;
            continue;
        }

        if !cursor.fits_next() && !cursor.at_line_start() {
            let window_start = i.saturating_sub(WRAP_LOOKBACK).max(line_start);
            let last_space = codes[window_start..i]
                .iter()
                .rposition(|&c| c == b' ')
                .map(|offset| window_start + offset);

            cursor.new_line();
            if let Some(space) = last_space {
                // Withdraw the partial word and lay it out again on the new line.
                let withdrawn = i - (space + 1);
                placed.truncate(placed.len() - withdrawn);
                debug!(space, withdrawn, "wrapping at word boundary");
                i = space + 1;
                line_start = i;
                continue;
            }
            debug!(at = i, "no space to wrap at, breaking word");
            line_start = i;
        }

        placed.push(PlacedGlyph {
            code,
            origin: cursor.position(),
        });
        cursor.advance(profile.advance);
        i += 1;
    }

    placed
}

/// Lay out `message` and paint it onto `canvas`. Returns the number of glyphs drawn.
pub fn layout<C: Canvas + ?Sized>(
    canvas: &mut C,
    message: &NormalizedMessage,
    profile: &FontProfile,
) -> usize {
    let placed = plan(message, profile, canvas.size().width);
    for glyph in &placed {
        render_glyph(canvas, decompose(glyph.code), glyph.origin, profile);
    }
    placed.len()
}
