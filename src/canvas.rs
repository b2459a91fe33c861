//! Paint-only drawing surface shared by the text and QR renderers.
//!
//! The renderers never touch pixels directly. They issue a handful of primitives
//! (filled rectangle, one-pixel line, glyph at a baseline) against a [`Canvas`], and
//! nothing becomes visible until [`Canvas::commit`] pushes the whole frame to the
//! panel.

use crate::epd::{DisplayError, FrameBuffer, Panel};
use crate::glyph::FontFace;
use embedded_graphics::{
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{Line, PrimitiveStyle, Rectangle},
};
use u8g2_fonts::types::{FontColor, VerticalPosition};

/// Monochrome raster with fixed logical dimensions.
///
/// All drawing is black ink on a white background; there is no way to erase a
/// primitive other than clearing the whole frame.
pub trait Canvas {
    /// Logical size after the panel rotation has been applied.
    fn size(&self) -> Size;

    /// Reset the off-screen frame to the background colour.
    fn clear(&mut self);

    /// Paint a solid black rectangle.
    fn fill_rect(&mut self, top_left: Point, size: Size);

    /// Paint a one-pixel black line between two points (both inclusive).
    fn draw_line(&mut self, start: Point, end: Point);

    /// Paint a single glyph with its baseline origin at `baseline`.
    fn draw_glyph(&mut self, glyph: char, baseline: Point, face: FontFace);

    /// Paint a run of text starting at `baseline`, using the face's own advances.
    fn draw_text(&mut self, text: &str, baseline: Point, face: FontFace);

    /// Make the off-screen frame visible.
    fn commit(&mut self) -> Result<(), DisplayError>;
}

/// A frame buffer paired with the panel that shows it.
pub struct Screen<P> {
    frame: FrameBuffer,
    panel: P,
}

impl<P: Panel> Screen<P> {
    pub fn new(frame: FrameBuffer, panel: P) -> Self {
        Self { frame, panel }
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    pub fn panel(&self) -> &P {
        &self.panel
    }
}

impl<P: Panel> Canvas for Screen<P> {
    fn size(&self) -> Size {
        self.frame.size()
    }

    fn clear(&mut self) {
        self.frame.blank();
    }

    fn fill_rect(&mut self, top_left: Point, size: Size) {
        Rectangle::new(top_left, size)
            .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
            .draw(&mut self.frame)
            .ok();
    }

    fn draw_line(&mut self, start: Point, end: Point) {
        Line::new(start, end)
            .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
            .draw(&mut self.frame)
            .ok();
    }

    fn draw_glyph(&mut self, glyph: char, baseline: Point, face: FontFace) {
        let frame = &mut self.frame;
        face.with_renderer(|font| {
            font.render(
                glyph,
                baseline,
                VerticalPosition::Baseline,
                FontColor::Transparent(BinaryColor::On),
                frame,
            )
            .ok();
        });
    }

    fn draw_text(&mut self, text: &str, baseline: Point, face: FontFace) {
        let frame = &mut self.frame;
        face.with_renderer(|font| {
            font.render(
                text,
                baseline,
                VerticalPosition::Baseline,
                FontColor::Transparent(BinaryColor::On),
                frame,
            )
            .ok();
        });
    }

    fn commit(&mut self) -> Result<(), DisplayError> {
        self.panel.refresh(&self.frame)
    }
}

#[cfg(test)]
pub(crate) use recording::{DrawOp, RecordingCanvas};
