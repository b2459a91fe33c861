//! # E-Paper Message Board Core Library
//!
//! This library holds everything the message board draws and remembers. A user joins
//! the board's access point, submits a short message and a font size through a web
//! form, and the message is laid out on a bistable e-paper panel. For the first minute
//! after boot the panel shows two QR codes instead: one to join the WiFi network and
//! one that opens the web form.
//!
//! ## Rendering Model
//!
//! The panel is paint-only: every frame starts white, primitives add black ink, and the
//! whole frame is pushed to the glass with a single full refresh. There is no alpha,
//! no erasing and no partial refresh, so every screen is planned before it is painted.
//!
//! ## Text Pipeline
//! 1. **Normalize**: raw bytes → single-byte Latin-1 code points ([`normalize`])
//! 2. **Decompose**: code point → base ASCII glyph + optional accent ([`glyph`])
//! 3. **Lay out**: greedy word wrap with fixed-pitch metrics ([`layout`])
//! 4. **Paint**: base glyph from a Courier Bold face, accent as a synthesized stroke
//!
//! ## QR Pipeline
//! Payload strings → QR matrices with version fallback → two equal slots centered on
//! the canvas with a fixed gap ([`qr`]).
//!
//! The fonts are fixed-pitch and every per-size constant lives in one
//! [`glyph::PROFILES`] table, so layout is a pure function of the message, the profile
//! and the canvas width.

// Module declarations
pub mod app;
pub mod canvas;
pub mod config;
pub mod epd;
pub mod glyph;
pub mod layout;
pub mod normalize;
pub mod page;
pub mod qr;
pub mod renderer;
pub mod settings;
pub mod web;

#[cfg(test)]
mod tests;

pub use canvas::Canvas;
pub use glyph::FontSize;
pub use normalize::{normalize, NormalizedMessage};
