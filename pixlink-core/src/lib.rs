//! # pixlink-core
//!
//! Engine library for the pixlink datagram image link.
//!
//! This crate contains:
//! - **Wire**: frame formats, `ImageKind`, datagram classification
//! - **Assembly**: the `Reassembler` state machine and buffer writer
//! - **Receiver**: `ImageReceiver` UDP loop with configurable decode
//!   handoff (`Overlapping` or `Gated`)
//! - **Jpeg**: marker-level inspection at the decode boundary
//! - **Error**: `PixError` — typed, `thiserror`-based error hierarchy

pub mod assembly;
pub mod error;
pub mod jpeg;
pub mod receiver;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use assembly::{AssembledImage, Reassembler, ReassemblyStats};
pub use error::PixError;
pub use receiver::{
    HandoffPolicy, ImageHandler, ImageReceiver, ReceiverConfig, ReceiverStats,
};
pub use wire::{classify, DataFrame, Frame, ImageKind, StartFrame, PACKET_SIZE};
