//! Datagram wire format and frame classification.
//!
//! An image travels as a burst of UDP datagrams with no ordering or
//! delivery guarantee. Packets are positional: each data frame names
//! the buffer slot it fills, so arrival order is irrelevant.
//!
//! ## Wire format
//!
//! All integers little-endian, unsigned.
//!
//! **Start frame** (exactly 3 bytes):
//! ```text
//! marker:        u8   'M' = RGB, 'I' = one-band
//! packet_count:  u16  slots 0..N-1 expected, 1..=65535
//! ```
//!
//! **Data frame** (4..=1003 bytes):
//! ```text
//! index:         u24  destination slot, buffer offset = index * 1000
//! payload:       [u8] up to 1000 bytes, the final slot may be short
//! ```
//!
//! **End marker** (0 bytes): the image is fully sent.

use crate::error::PixError;

// ── Constants ────────────────────────────────────────────────────

/// Buffer slot stride and maximum data payload per frame.
pub const PACKET_SIZE: usize = 1000;

/// Largest datagram the protocol produces (index header + full slot).
pub const MAX_DATAGRAM_LEN: usize = DataFrame::INDEX_SIZE + PACKET_SIZE;

/// Start-frame marker byte for RGB images.
pub const MARKER_RGB: u8 = b'M';

/// Start-frame marker byte for one-band (single-channel) images.
pub const MARKER_ONE_BAND: u8 = b'I';

/// Largest slot index the 24-bit wire field can carry.
pub const MAX_PACKET_INDEX: u32 = (1 << 24) - 1;

// ── ImageKind ────────────────────────────────────────────────────

/// Image flavor declared by the start frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    /// Three-channel color image.
    Rgb,
    /// Single-channel image (e.g. grayscale or thermal).
    OneBand,
}

impl ImageKind {
    /// Wire marker byte for this kind.
    pub const fn marker(self) -> u8 {
        match self {
            ImageKind::Rgb => MARKER_RGB,
            ImageKind::OneBand => MARKER_ONE_BAND,
        }
    }

    /// Map a wire marker byte back to a kind.
    pub const fn from_marker(byte: u8) -> Option<Self> {
        match byte {
            MARKER_RGB => Some(ImageKind::Rgb),
            MARKER_ONE_BAND => Some(ImageKind::OneBand),
            _ => None,
        }
    }

    /// Short lowercase name for logs and filenames.
    pub const fn as_str(self) -> &'static str {
        match self {
            ImageKind::Rgb => "rgb",
            ImageKind::OneBand => "one-band",
        }
    }
}

// ── StartFrame ───────────────────────────────────────────────────

/// Decoded start frame: declares a new image's kind and slot count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartFrame {
    pub kind: ImageKind,
    /// Number of 1000-byte slots the image occupies (1..=65535).
    pub packet_count: u16,
}

impl StartFrame {
    /// Encoded size on the wire.
    pub const SIZE: usize = 3;

    /// Serialize to bytes.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let count = self.packet_count.to_le_bytes();
        [self.kind.marker(), count[0], count[1]]
    }

    /// Deserialize from bytes.
    ///
    /// Rejects unknown markers and a zero packet count; the caller
    /// treats both as a malformed start frame (no-op, counted).
    pub fn decode(data: &[u8]) -> Result<Self, PixError> {
        if data.len() != Self::SIZE {
            return Err(PixError::FrameTooShort { len: data.len() });
        }
        let kind = ImageKind::from_marker(data[0]).ok_or(PixError::UnknownMarker(data[0]))?;
        let packet_count = u16::from_le_bytes([data[1], data[2]]);
        if packet_count == 0 {
            return Err(PixError::ZeroPacketCount);
        }
        Ok(Self { kind, packet_count })
    }
}

// ── DataFrame ────────────────────────────────────────────────────

/// Decoded data frame: one slot index plus its payload slice.
///
/// Borrows from the received datagram; nothing is copied until the
/// buffer writer accepts the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFrame<'a> {
    /// 24-bit destination slot index.
    pub index: u32,
    /// Payload bytes destined for buffer offset `index * PACKET_SIZE`.
    pub payload: &'a [u8],
}

impl<'a> DataFrame<'a> {
    /// Size of the index header preceding the payload.
    pub const INDEX_SIZE: usize = 3;

    /// Deserialize from a datagram of at least 4 bytes.
    pub fn decode(data: &'a [u8]) -> Result<Self, PixError> {
        if data.len() <= Self::INDEX_SIZE {
            return Err(PixError::FrameTooShort { len: data.len() });
        }
        let index =
            u32::from(data[0]) | (u32::from(data[1]) << 8) | (u32::from(data[2]) << 16);
        Ok(Self {
            index,
            payload: &data[Self::INDEX_SIZE..],
        })
    }

    /// Build the on-wire bytes for one data frame.
    pub fn encode(index: u32, payload: &[u8]) -> Result<Vec<u8>, PixError> {
        if index > MAX_PACKET_INDEX {
            return Err(PixError::IndexTooLarge(index));
        }
        if payload.is_empty() || payload.len() > PACKET_SIZE {
            return Err(PixError::PayloadTooLarge {
                size: payload.len(),
                max: PACKET_SIZE,
            });
        }
        let mut pkt = Vec::with_capacity(Self::INDEX_SIZE + payload.len());
        pkt.extend_from_slice(&index.to_le_bytes()[..Self::INDEX_SIZE]);
        pkt.extend_from_slice(payload);
        Ok(pkt)
    }
}

// ── Classification ───────────────────────────────────────────────

/// One received datagram, classified.
#[derive(Debug)]
pub enum Frame<'a> {
    /// Valid 3-byte start frame.
    Start(StartFrame),
    /// 3-byte frame with a bad marker or zero count. No-op by
    /// protocol, but surfaced so the engine can count it.
    MalformedStart(PixError),
    /// Data frame carrying a slot payload.
    Data(DataFrame<'a>),
    /// 1..=2 byte datagram while receiving: cannot carry an index.
    MalformedData(PixError),
    /// Zero-length end-of-image marker.
    End,
    /// Stray traffic while idle; dropped silently.
    Ignored,
}

/// Classify a raw datagram against the current phase.
///
/// Evaluation order matters: a 3-byte datagram is always a start
/// frame, even mid-session (that is how a transfer is superseded);
/// everything else is meaningless unless a session is open.
pub fn classify(payload: &[u8], receiving: bool) -> Frame<'_> {
    if payload.len() == StartFrame::SIZE {
        return match StartFrame::decode(payload) {
            Ok(start) => Frame::Start(start),
            Err(e) => Frame::MalformedStart(e),
        };
    }
    if !receiving {
        return Frame::Ignored;
    }
    if payload.is_empty() {
        return Frame::End;
    }
    match DataFrame::decode(payload) {
        Ok(data) => Frame::Data(data),
        Err(e) => Frame::MalformedData(e),
    }
}

// ── Tests ────────────────────────────────────────────────────────
