//! Minimal JPEG inspection for the decode boundary.
//!
//! The engine hands off a slot-aligned buffer: the compressed stream
//! followed by zero padding up to the next 1000-byte boundary. Before
//! persisting or decoding, a host wants two things answered:
//!
//! - [`probe`] — is this a plausible JPEG, and what are its pixel
//!   dimensions? Fails with a typed error when packets were lost and
//!   the marker stream is broken.
//! - [`trim_padding`] — the stream up to and including the last EOI
//!   marker, with the slot padding cut off.
//!
//! This is a marker-segment walk, not a decoder; pixel decoding stays
//! an external concern.

use crate::error::PixError;

/// Start-of-image marker, the first two bytes of every JPEG stream.
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End-of-image marker.
pub const EOI: [u8; 2] = [0xFF, 0xD9];

// ── JpegInfo ─────────────────────────────────────────────────────

/// Dimensions read from the frame header (SOF) segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegInfo {
    pub width: u16,
    pub height: u16,
}

// ── Probe ────────────────────────────────────────────────────────

/// SOF markers carry dimensions; DHT (0xC4), JPG extension (0xC8) and
/// DAC (0xCC) share the 0xCn range but are not frame headers.
fn is_sof(marker: u8) -> bool {
    matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

/// Walk the marker segments and return the image dimensions.
///
/// Stops at the first frame header. A buffer whose marker stream
/// cannot be walked that far (truncation, lost leading packets)
/// yields a typed error rather than a panic.
pub fn probe(data: &[u8]) -> Result<JpegInfo, PixError> {
    if data.len() < SOI.len() || data[..2] != SOI {
        return Err(PixError::NotJpeg);
    }

    let mut pos = SOI.len();
    loop {
        if pos + 2 > data.len() {
            return Err(PixError::JpegParse("marker stream truncated"));
        }
        if data[pos] != 0xFF {
            return Err(PixError::JpegParse("expected marker byte"));
        }
        let marker = data[pos + 1];
        if marker == 0xFF {
            // Fill byte before the real marker.
            pos += 1;
            continue;
        }
        pos += 2;

        match marker {
            // Standalone markers carry no length field.
            0x01 | 0xD0..=0xD8 => continue,
            0xD9 => return Err(PixError::JpegParse("end of image before frame header")),
            0xDA => return Err(PixError::JpegParse("scan data before frame header")),
            _ => {
                if pos + 2 > data.len() {
                    return Err(PixError::JpegParse("segment length truncated"));
                }
                // Segment lengths are big-endian and include the two
                // length bytes themselves.
                let seg_len = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
                if seg_len < 2 || pos + seg_len > data.len() {
                    return Err(PixError::JpegParse("segment overruns buffer"));
                }
                if is_sof(marker) {
                    if seg_len < 7 {
                        return Err(PixError::JpegParse("frame header too short"));
                    }
                    let height = u16::from_be_bytes([data[pos + 3], data[pos + 4]]);
                    let width = u16::from_be_bytes([data[pos + 5], data[pos + 6]]);
                    return Ok(JpegInfo { width, height });
                }
                pos += seg_len;
            }
        }
    }
}

// ── Padding ──────────────────────────────────────────────────────

/// Return the stream up to and including the last EOI marker.
///
/// The reassembly buffer is a whole multiple of the slot size, so a
/// completed image usually trails zero bytes. If no EOI is present
/// (lost tail packets) the input is returned unchanged; the
/// downstream decoder reports the truncation.
pub fn trim_padding(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    while end >= EOI.len() {
        if data[end - 2..end] == EOI {
            return &data[..end];
        }
        end -= 1;
    }
    data
}

// ── Tests ────────────────────────────────────────────────────────
