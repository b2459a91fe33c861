//! QR payloads, matrix generation and the side-by-side QR screen layout.
//!
//! The boot screen shows two codes next to each other: one that joins the access
//! point and one that opens the message form. The two payloads differ in length, so
//! the codes usually come out with different module counts. Each code gets its own
//! integer scale so both land as close as possible to the same pixel size.

use crate::canvas::Canvas;
use crate::glyph::FontFace;
use embedded_graphics::prelude::{Point, Size};
use qrcodegen::{QrCode, QrCodeEcc, QrSegment, Version};
use std::net::Ipv4Addr;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Horizontal gap between the two slots.
pub const GAP: i32 = 60;
/// Baseline of the labels above the codes.
pub const LABEL_Y: i32 = 10;
/// Top edge of both codes.
pub const QR_TOP: i32 = LABEL_Y + 20;

/// Versions tried for the access-point code, largest first.
pub const WIFI_VERSIONS: [u8; 2] = [3, 2];
/// Versions tried for the web address code.
pub const WEB_VERSIONS: [u8; 1] = [2];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QrError {
    #[error("payload of {len} bytes does not fit QR version(s) {versions:?}")]
    DataTooLong { len: usize, versions: Vec<u8> },

    #[error("QR version {0} is outside 1..=40")]
    BadVersion(u8),
}

/// Square grid of QR modules, `true` = dark.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QrMatrix {
    side: u32,
    modules: Vec<bool>,
}

impl QrMatrix {
    /// Build a matrix from a module predicate, row-major.
    pub fn from_fn(side: u32, mut dark: impl FnMut(u32, u32) -> bool) -> Self {
        let mut modules = Vec::with_capacity((side * side) as usize);
        for y in 0..side {
            for x in 0..side {
                modules.push(dark(x, y));
            }
        }
        Self { side, modules }
    }

    pub fn side(&self) -> u32 {
        self.side
    }

    pub fn module(&self, x: u32, y: u32) -> bool {
        x < self.side && y < self.side && self.modules[(y * self.side + x) as usize]
    }

    /// Coordinates of every dark module, row by row.
    pub fn dark_modules(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let side = self.side;
        self.modules
            .iter()
            .enumerate()
            .filter(|(_, dark)| **dark)
            .map(move |(i, _)| (i as u32 % side, i as u32 / side))
    }
}

/// Standard Wi-Fi join string understood by phone cameras.
pub fn wifi_payload(ssid: &str, password: &str) -> String {
    format!("WIFI:T:WPA;S:{ssid};P:{password};;")
}

/// URL of the message form on the access point.
pub fn web_payload(address: Ipv4Addr) -> String {
    format!("http://{address}")
}

/// Encode `payload` at the first version in `versions` that can hold it.
///
/// Each version is tried as a fixed size with low error correction; a fallback to
/// the next version is logged as a warning.
pub fn generate(payload: &str, versions: &[u8]) -> Result<QrMatrix, QrError> {
    let segments = [QrSegment::make_bytes(payload.as_bytes())];
    for (attempt, &version) in versions.iter().enumerate() {
        if !(1..=40).contains(&version) {
            return Err(QrError::BadVersion(version));
        }
        if attempt > 0 {
            warn!(version, "QR generation failed, trying smaller version");
        }
        let fixed = Version::new(version);
        match QrCode::encode_segments_advanced(&segments, QrCodeEcc::Low, fixed, fixed, None, false) {
            Ok(code) => {
                let side = code.size() as u32;
                debug!(version, side, "QR matrix generated");
                return Ok(QrMatrix::from_fn(side, |x, y| {
                    code.get_module(x as i32, y as i32)
                }));
            }
            Err(err) => debug!(version, %err, "payload does not fit"),
        }
    }
    Err(QrError::DataTooLong {
        len: payload.len(),
        versions: versions.to_vec(),
    })
}

/// Where one code and its label go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QrPlacement {
    pub scale: u32,
    pub display_size: u32,
    /// Top-left corner of the code itself
    pub origin: Point,
    /// Baseline start of the label
    pub label: Point,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QrPairLayout {
    /// Width of each slot: the larger of the two display sizes
    pub slot: u32,
    pub start_x: i32,
    pub left: QrPlacement,
    pub right: QrPlacement,
}

fn scale_for(side: u32, target: u32) -> u32 {
    if side == 0 {
        0
    } else {
        target / side
    }
}

/// Compute scales and positions for two codes of `left_side` and `right_side` modules.
///
/// Label x positions come from slot geometry, not text metrics, so they are only
/// roughly centered.
pub fn plan_pair(left_side: u32, right_side: u32, canvas_width: u32, target: u32) -> QrPairLayout {
    let left_scale = scale_for(left_side, target);
    let right_scale = scale_for(right_side, target);
    let left_size = left_side * left_scale;
    let right_size = right_side * right_scale;
    let slot = left_size.max(right_size);
    let slot_i = slot as i32;

    let total_width = 2 * slot_i + GAP;
    let start_x = (canvas_width as i32 - total_width) / 2;
    let right_slot_x = start_x + slot_i + GAP;

    QrPairLayout {
        slot,
        start_x,
        left: QrPlacement {
            scale: left_scale,
            display_size: left_size,
            origin: Point::new(start_x + (slot_i - left_size as i32) / 2, QR_TOP),
            label: Point::new(start_x + slot_i / 2 - 15, LABEL_Y),
        },
        right: QrPlacement {
            scale: right_scale,
            display_size: right_size,
            origin: Point::new(right_slot_x + (slot_i - right_size as i32) / 2, QR_TOP),
            label: Point::new(right_slot_x + slot_i / 2 - 10, LABEL_Y),
        },
    }
}

/// Paint every dark module of `matrix` as a `scale`×`scale` square.
pub fn draw_matrix<C: Canvas + ?Sized>(canvas: &mut C, matrix: &QrMatrix, origin: Point, scale: u32) {
    let step = scale as i32;
    for (x, y) in matrix.dark_modules() {
        canvas.fill_rect(
            Point::new(origin.x + x as i32 * step, origin.y + y as i32 * step),
            Size::new(scale, scale),
        );
    }
}

/// Lay out and paint both codes with their labels. Does not clear or commit.
pub fn draw_pair<C: Canvas + ?Sized>(
    canvas: &mut C,
    left: &QrMatrix,
    right: &QrMatrix,
    left_label: &str,
    right_label: &str,
    target: u32,
) -> QrPairLayout {
    let pair = plan_pair(left.side(), right.side(), canvas.size().width, target);
    info!(
        left_modules = left.side(),
        right_modules = right.side(),
        left_scale = pair.left.scale,
        right_scale = pair.right.scale,
        "drawing QR pair"
    );

    canvas.draw_text(left_label, pair.left.label, FontFace::CourierBold10);
    draw_matrix(canvas, left, pair.left.origin, pair.left.scale);
    canvas.draw_text(right_label, pair.right.label, FontFace::CourierBold10);
    draw_matrix(canvas, right, pair.right.origin, pair.right.scale);
    pair
}
