//! # Screen Rendering
//!
//! The two full-frame screens the board can show, and a terminal preview panel for
//! development without hardware.
//!
//! Every render is a complete frame: clear, paint, commit. There is no partial
//! refresh, so a screen is always drawn from scratch.

use crate::canvas::Canvas;
use crate::epd::{DisplayError, FrameBuffer, Panel};
use crate::glyph::FontSize;
use crate::layout::layout;
use crate::normalize::normalize;
use crate::qr::{self, QrError, QrPairLayout, WEB_VERSIONS, WIFI_VERSIONS};
use embedded_graphics::prelude::{OriginDimensions, Size};
use std::io::{self, Write};
use std::net::Ipv4Addr;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("QR generation failed: {0}")]
    Qr(#[from] QrError),

    #[error(transparent)]
    Display(#[from] DisplayError),
}

/// Payloads and target size for the boot screen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QrScreen {
    pub wifi_payload: String,
    pub web_payload: String,
    pub target_size: u32,
}

impl QrScreen {
    pub fn new(ssid: &str, password: &str, address: Ipv4Addr, target_size: u32) -> Self {
        Self {
            wifi_payload: qr::wifi_payload(ssid, password),
            web_payload: qr::web_payload(address),
            target_size,
        }
    }
}

/// Draw `message` at `size` as a fresh frame. Returns the number of glyphs painted.
///
/// `message` is raw submitted bytes; anything the font cannot show becomes `?`.
pub fn render_message<C: Canvas + ?Sized>(
    canvas: &mut C,
    message: &[u8],
    size: FontSize,
) -> Result<usize, DisplayError> {
    info!(
        font_size = size.index(),
        "updating display with message: {}",
        String::from_utf8_lossy(message)
    );
    let normalized = normalize(message);

    canvas.clear();
    let drawn = layout(canvas, &normalized, size.profile());
    canvas.commit()?;

    info!(glyphs = drawn, "display updated");
    Ok(drawn)
}

/// Draw the Wi-Fi and web QR codes side by side.
///
/// Both codes are generated before the frame is touched; if either fails the
/// canvas is left exactly as it was.
pub fn render_qr_codes<C: Canvas + ?Sized>(
    canvas: &mut C,
    screen: &QrScreen,
) -> Result<QrPairLayout, RenderError> {
    info!(wifi = %screen.wifi_payload, web = %screen.web_payload, "generating QR codes");

    let wifi = qr::generate(&screen.wifi_payload, &WIFI_VERSIONS).map_err(|err| {
        error!(%err, "WiFi QR code generation failed");
        err
    })?;
    let web = qr::generate(&screen.web_payload, &WEB_VERSIONS).map_err(|err| {
        error!(%err, "web QR code generation failed");
        err
    })?;
    info!(wifi_modules = wifi.side(), web_modules = web.side(), "both QR codes generated");

    canvas.clear();
    let pair = qr::draw_pair(canvas, &wifi, &web, "WiFi", "Web", screen.target_size);
    canvas.commit()?;

    info!("QR codes displayed (left: WiFi join, right: web address)");
    Ok(pair)
}

/// Render a frame as text, one character per `cell` block of pixels.
///
/// A cell shows `#` if any pixel in it is inked.
pub fn ascii_art(frame: &FrameBuffer, cell: Size) -> String {
    let size = frame.size();
    let (cell_w, cell_h) = (cell.width.max(1), cell.height.max(1));
    let columns = size.width.div_ceil(cell_w);
    let rows = size.height.div_ceil(cell_h);

    let mut art = String::with_capacity(((columns + 1) * rows) as usize);
    for row in 0..rows {
        for column in 0..columns {
            let inked = (0..cell_h).any(|dy| {
                (0..cell_w).any(|dx| {
                    frame.is_inked((column * cell_w + dx) as i32, (row * cell_h + dy) as i32)
                })
            });
            art.push(if inked { '#' } else { '.' });
        }
        art.push('\n');
    }
    art
}

/// Development panel that prints each committed frame to a writer.
pub struct AsciiPanel<W> {
    out: W,
    cell: Size,
}

impl<W: Write> AsciiPanel<W> {
    /// Terminal cells are about twice as tall as wide.
    pub fn new(out: W) -> Self {
        Self::with_cell(out, Size::new(4, 8))
    }

    pub fn with_cell(out: W, cell: Size) -> Self {
        Self { out, cell }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl AsciiPanel<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Panel for AsciiPanel<W> {
    fn refresh(&mut self, frame: &FrameBuffer) -> Result<(), DisplayError> {
        let art = ascii_art(frame, self.cell);
        let width = art.lines().next().map_or(0, str::len);
        writeln!(self.out, "+{}+", "-".repeat(width))?;
        for line in art.lines() {
            writeln!(self.out, "|{line}|")?;
        }
        writeln!(self.out, "+{}+", "-".repeat(width))?;
        self.out.flush()?;
        Ok(())
    }
}
