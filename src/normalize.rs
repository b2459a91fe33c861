//! # Message Normalization
//!
//! Converts the raw bytes of a submitted message into single-byte Latin-1 code
//! points the glyph layer understands. Only the Icelandic letters reachable through
//! the `0xC3` two-byte UTF-8 lead are recognized; everything else degrades to `?`.
//!
//! ## Decoding Rules
//! - `0x00..=0x7F`: copied unchanged (this includes `\n` and `\r`)
//! - `0xC3` + a known continuation byte: one accented code point, both bytes consumed
//! - `0xC3` + any other byte: one `?`, both bytes consumed
//! - any other two-byte lead (`0xC0..=0xDF`): one `?`, only the lead consumed, so
//!   its continuation byte produces a second `?`
//! - continuation bytes and three/four-byte leads: one `?` per byte
//! - a two-byte lead as the very last byte: one `?`
//!
//! Normalization never fails; the worst case is a message made entirely of `?`.

use crate::glyph::{is_extended, PLACEHOLDER};
use std::fmt;
use tracing::debug;

/// Lead byte of the two-byte UTF-8 sequences for U+00C0..=U+00FF.
const LATIN1_LEAD: u8 = 0xC3;

/// A message as a sequence of internal single-byte code points.
///
/// Every element is ASCII, one of the sixteen drawable extended letters, or the
/// `?` placeholder. No multi-byte sequences survive normalization.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NormalizedMessage(Vec<u8>);

impl NormalizedMessage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Internal code points are Latin-1, so each maps straight onto a `char`.
impl fmt::Display for NormalizedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|&code| write!(f, "{}", char::from(code)))
    }
}

/// Space-separated hex dump for diagnostics.
pub struct HexBytes<'a>(pub &'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "0x{byte:02X}")?;
        }
        Ok(())
    }
}

/// Decode a raw message into internal code points.
pub fn normalize(raw: &[u8]) -> NormalizedMessage {
    debug!(bytes = %HexBytes(raw), "normalizing message");

    let mut codes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while let Some(&lead) = raw.get(i) {
        let (code, consumed) = match lead {
            0x00..=0x7F => (lead, 1),
            0xC0..=0xDF => decode_pair(lead, raw.get(i + 1).copied()),
            _ => (PLACEHOLDER, 1),
        };
        codes.push(code);
        i += consumed;
    }

    let message = NormalizedMessage(codes);
    debug!(converted = %message, "normalized message");
    message
}

/// Decode a two-byte lead and the byte after it; returns (code point, bytes consumed).
fn decode_pair(lead: u8, next: Option<u8>) -> (u8, usize) {
    match next {
        Some(continuation) if lead == LATIN1_LEAD => {
            let code = continuation.wrapping_add(0x40);
            if (0x80..=0xBF).contains(&continuation) && is_extended(code) {
                (code, 2)
            } else {
                debug!("unknown UTF-8 sequence 0xC3 0x{continuation:02X}");
                (PLACEHOLDER, 2)
            }
        }
        // Truncated at the end of input, or a lead outside the Latin-1 block
        _ => (PLACEHOLDER, 1),
    }
}
