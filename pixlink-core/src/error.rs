//! Domain-specific error types for the pixlink protocol.
//!
//! All fallible operations return `Result<T, PixError>`.
//! Per-frame anomalies are recoverable by design: the receive loop
//! drops the offending datagram, counts it, and keeps going.

use thiserror::Error;

/// The canonical error type for the pixlink image link.
#[derive(Debug, Error)]
pub enum PixError {
    // ── Wire Errors ──────────────────────────────────────────────
    /// A start frame carried a marker byte that is neither `'M'` (RGB)
    /// nor `'I'` (one-band).
    #[error("unknown start marker: {0:#04x}")]
    UnknownMarker(u8),

    /// A start frame declared zero packets; the degenerate empty
    /// session is rejected rather than allocated.
    #[error("start frame declared zero packets")]
    ZeroPacketCount,

    /// A datagram was too short to carry the frame it claims to be.
    #[error("frame too short: {len} bytes")]
    FrameTooShort { len: usize },

    /// A data frame payload exceeds one buffer slot.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A packet index points past the range implied by the declared
    /// packet count.
    #[error("packet index {index} out of range (declared {declared} packets)")]
    IndexOutOfRange { index: u32, declared: u16 },

    /// A packet index does not fit in the 24-bit wire field.
    #[error("packet index {0} exceeds 24-bit range")]
    IndexTooLarge(u32),

    // ── Decode Errors ────────────────────────────────────────────
    /// The assembled buffer does not start with a JPEG SOI marker.
    #[error("assembled buffer is not a JPEG stream")]
    NotJpeg,

    /// The JPEG marker stream could not be walked to a frame header,
    /// typically because data packets were lost in transit.
    #[error("jpeg parse error: {0}")]
    JpegParse(&'static str),

    // ── Host Errors ──────────────────────────────────────────────
    /// The UDP socket or filesystem layer reported an error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A handoff-policy name from configuration was not recognized.
    #[error("unknown handoff policy: {0:?}")]
    UnknownPolicy(String),
}
