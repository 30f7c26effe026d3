//! Image reassembly state machine.
//!
//! The [`Reassembler`] consumes one raw datagram at a time and owns the
//! in-flight [`ReassemblySession`], if any. Each datagram is handled
//! synchronously and runs to completion; there is no internal
//! suspension, so a single logical thread of control needs no locking.
//!
//! Transition table (phase is Idle when no session exists):
//!
//! | Phase     | Frame            | Action                                  |
//! |-----------|------------------|-----------------------------------------|
//! | Idle      | valid start      | allocate session, begin receiving       |
//! | Idle      | malformed start  | no-op, counted                          |
//! | Idle      | anything else    | ignored                                 |
//! | Receiving | valid start      | discard session, allocate a new one     |
//! | Receiving | end marker       | emit the buffer, return to idle         |
//! | Receiving | data frame       | bounds-checked write into the buffer    |
//!
//! A session with no end marker persists until superseded, explicitly
//! reset, or evicted by the receiver's idle timeout.

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::error::PixError;
use crate::wire::{self, Frame, ImageKind, StartFrame, PACKET_SIZE};

// ── AssembledImage ───────────────────────────────────────────────

/// A completed image buffer handed off to the decode/display path.
///
/// The buffer is always `declared_packets * 1000` bytes; slots that
/// never received a data frame (and the tail of a short final slot)
/// remain zero. Length-delimited codecs such as JPEG tolerate the
/// trailing padding.
#[derive(Debug, Clone)]
pub struct AssembledImage {
    pub kind: ImageKind,
    pub data: Bytes,
    pub declared_packets: u16,
}

// ── ReassemblySession ────────────────────────────────────────────

/// Mutable state for one in-progress image transfer.
struct ReassemblySession {
    kind: ImageKind,
    /// Exactly `declared_packets * PACKET_SIZE` bytes, zero-filled at
    /// allocation and never resized.
    buffer: Vec<u8>,
    declared_packets: u16,
}

impl ReassemblySession {
    fn new(start: StartFrame) -> Self {
        Self {
            kind: start.kind,
            buffer: vec![0u8; PACKET_SIZE * start.packet_count as usize],
            declared_packets: start.packet_count,
        }
    }

    /// Copy `payload` into the slot at `index`.
    ///
    /// Rejects writes that would land outside the buffer or overfill a
    /// slot; the existing contents are untouched on rejection. A
    /// duplicate index simply overwrites the same range.
    fn write(&mut self, index: u32, payload: &[u8]) -> Result<(), PixError> {
        if payload.len() > PACKET_SIZE {
            return Err(PixError::PayloadTooLarge {
                size: payload.len(),
                max: PACKET_SIZE,
            });
        }
        // 64-bit math: a hostile 24-bit index times the slot stride
        // must not wrap before the range check.
        let offset = index as u64 * PACKET_SIZE as u64;
        if offset + payload.len() as u64 > self.buffer.len() as u64 {
            return Err(PixError::IndexOutOfRange {
                index,
                declared: self.declared_packets,
            });
        }
        let offset = offset as usize;
        self.buffer[offset..offset + payload.len()].copy_from_slice(payload);
        Ok(())
    }

    fn finish(self) -> AssembledImage {
        AssembledImage {
            kind: self.kind,
            data: Bytes::from(self.buffer),
            declared_packets: self.declared_packets,
        }
    }
}

// ── ReassemblyStats ──────────────────────────────────────────────

/// Anomaly and progress counters, monotonically increasing for the
/// life of the [`Reassembler`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    /// Images fully received and handed off.
    pub images_completed: u64,
    /// Sessions discarded because a new start frame arrived mid-transfer.
    pub sessions_superseded: u64,
    /// Sessions discarded by the idle-timeout eviction.
    pub sessions_evicted: u64,
    /// 3-byte frames with a bad marker or a zero packet count.
    pub malformed_starts: u64,
    /// Data frames dropped for an out-of-range index, oversized
    /// payload, or missing index header.
    pub data_frames_dropped: u64,
    /// Non-start datagrams that arrived while idle.
    pub strays_ignored: u64,
}

// ── Reassembler ──────────────────────────────────────────────────

/// Receive-side state machine: created once, re-armed per image,
/// never recreated.
///
/// A session exists if and only if the reassembler is in the
/// Receiving phase; at most one session is in flight at a time.
pub struct Reassembler {
    session: Option<ReassemblySession>,
    stats: ReassemblyStats,
}

impl Reassembler {
    pub fn new() -> Self {
        Self {
            session: None,
            stats: ReassemblyStats::default(),
        }
    }

    /// Whether an image transfer is currently in flight.
    pub fn is_receiving(&self) -> bool {
        self.session.is_some()
    }

    /// Anomaly and progress counters.
    pub fn stats(&self) -> &ReassemblyStats {
        &self.stats
    }

    /// Feed one received datagram through the state machine.
    ///
    /// Returns the completed image when the datagram was an end
    /// marker; every per-frame anomaly is recovered locally and never
    /// surfaces as an error.
    pub fn handle_datagram(&mut self, payload: &[u8]) -> Option<AssembledImage> {
        match wire::classify(payload, self.is_receiving()) {
            Frame::Start(start) => {
                if self.session.take().is_some() {
                    // Implies loss or reordering severe enough that the
                    // sender moved on; the partial buffer is never emitted.
                    self.stats.sessions_superseded += 1;
                    warn!(
                        kind = start.kind.as_str(),
                        packets = start.packet_count,
                        "start frame superseded an in-flight session"
                    );
                } else {
                    debug!(
                        kind = start.kind.as_str(),
                        packets = start.packet_count,
                        "session started"
                    );
                }
                self.session = Some(ReassemblySession::new(start));
                None
            }
            Frame::MalformedStart(e) => {
                self.stats.malformed_starts += 1;
                warn!("malformed start frame dropped: {e}");
                None
            }
            Frame::Data(data) => {
                // Classification only yields Data while a session is open.
                if let Some(session) = self.session.as_mut() {
                    if let Err(e) = session.write(data.index, data.payload) {
                        // Treated as packet loss: the session survives.
                        self.stats.data_frames_dropped += 1;
                        warn!("data frame dropped: {e}");
                    }
                }
                None
            }
            Frame::MalformedData(e) => {
                self.stats.data_frames_dropped += 1;
                warn!("runt data frame dropped: {e}");
                None
            }
            Frame::End => {
                let session = self.session.take()?;
                self.stats.images_completed += 1;
                debug!(
                    kind = session.kind.as_str(),
                    bytes = session.buffer.len(),
                    "image complete"
                );
                Some(session.finish())
            }
            Frame::Ignored => {
                self.stats.strays_ignored += 1;
                trace!(len = payload.len(), "stray datagram ignored while idle");
                None
            }
        }
    }

    /// Discard any in-flight session, returning to idle.
    ///
    /// Returns `true` if a session was dropped. Used on receiver stop.
    pub fn reset(&mut self) -> bool {
        self.session.take().is_some()
    }

    /// Discard a stalled in-flight session and count the eviction.
    pub fn evict_stalled(&mut self) {
        if self.session.take().is_some() {
            self.stats.sessions_evicted += 1;
            warn!("session timed out waiting for datagrams; buffer discarded");
        }
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn start(kind: u8, count: u16) -> Vec<u8> {
        let n = count.to_le_bytes();
        vec![kind, n[0], n[1]]
    }

    fn data(index: u32, payload: &[u8]) -> Vec<u8> {
        let mut pkt = index.to_le_bytes()[..3].to_vec();
        pkt.extend_from_slice(payload);
        pkt
    }

    #[test]
    fn two_packet_rgb_image() {
        let mut rx = Reassembler::new();
        assert!(rx.handle_datagram(&start(b'M', 2)).is_none());
        assert!(rx.is_receiving());
        assert!(rx.handle_datagram(&data(0, &[0xAA; 1000])).is_none());
        assert!(rx.handle_datagram(&data(1, &[0xBB; 1000])).is_none());

        let image = rx.handle_datagram(&[]).expect("end marker emits image");
        assert!(!rx.is_receiving());
        assert_eq!(image.kind, ImageKind::Rgb);
        assert_eq!(image.declared_packets, 2);
        assert_eq!(image.data.len(), 2000);
        assert!(image.data[..1000].iter().all(|&b| b == 0xAA));
        assert!(image.data[1000..].iter().all(|&b| b == 0xBB));
    }

    #[test]
    fn empty_one_band_image_is_all_zero() {
        let mut rx = Reassembler::new();
        rx.handle_datagram(&start(b'I', 1));
        let image = rx.handle_datagram(&[]).unwrap();
        assert_eq!(image.kind, ImageKind::OneBand);
        assert_eq!(image.data.len(), 1000);
        assert!(image.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn buffer_size_follows_declared_count_not_arrivals() {
        let mut rx = Reassembler::new();
        rx.handle_datagram(&start(b'M', 7));
        // Only one of the seven slots ever arrives.
        rx.handle_datagram(&data(3, &[1; 10]));
        let image = rx.handle_datagram(&[]).unwrap();
        assert_eq!(image.data.len(), 7000);
    }

    #[test]
    fn arrival_order_is_irrelevant() {
        let frames: Vec<Vec<u8>> = (0u32..4)
            .map(|i| data(i, &vec![i as u8 + 1; 1000]))
            .collect();

        let assemble = |order: &[usize]| {
            let mut rx = Reassembler::new();
            rx.handle_datagram(&start(b'M', 4));
            for &i in order {
                rx.handle_datagram(&frames[i]);
            }
            rx.handle_datagram(&[]).unwrap().data
        };

        let in_order = assemble(&[0, 1, 2, 3]);
        assert_eq!(assemble(&[3, 2, 1, 0]), in_order);
        assert_eq!(assemble(&[2, 0, 3, 1]), in_order);
        assert_eq!(assemble(&[1, 3, 0, 2]), in_order);
    }

    #[test]
    fn out_of_range_index_is_dropped_without_corruption() {
        let mut rx = Reassembler::new();
        rx.handle_datagram(&start(b'M', 2));
        rx.handle_datagram(&data(0, &[0x11; 1000]));

        // Index at the boundary and far beyond it: both rejected.
        rx.handle_datagram(&data(2, &[0xFF; 1000]));
        rx.handle_datagram(&data(0x00FF_FFFF, &[0xFF; 100]));
        // The last valid slot, full then partially overwritten.
        rx.handle_datagram(&data(1, &[0xFF; 1000]));
        rx.handle_datagram(&data(1, &[0x22; 500]));

        assert_eq!(rx.stats().data_frames_dropped, 2);
        let image = rx.handle_datagram(&[]).unwrap();
        assert!(image.data[..1000].iter().all(|&b| b == 0x11));
        assert!(image.data[1000..1500].iter().all(|&b| b == 0x22));
        assert!(image.data[1500..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn oversized_payload_is_dropped() {
        let mut rx = Reassembler::new();
        rx.handle_datagram(&start(b'M', 4));
        rx.handle_datagram(&data(0, &[0xEE; 1500]));
        assert_eq!(rx.stats().data_frames_dropped, 1);
        let image = rx.handle_datagram(&[]).unwrap();
        assert!(image.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn duplicate_index_last_write_wins() {
        let mut rx = Reassembler::new();
        rx.handle_datagram(&start(b'M', 1));
        rx.handle_datagram(&data(0, &[0xAA; 1000]));
        rx.handle_datagram(&data(0, &[0xBB; 1000]));
        let image = rx.handle_datagram(&[]).unwrap();
        assert!(image.data.iter().all(|&b| b == 0xBB));
    }

    #[test]
    fn superseding_start_discards_partial_session() {
        let mut rx = Reassembler::new();
        rx.handle_datagram(&start(b'M', 2));
        rx.handle_datagram(&data(0, &[0xAA; 1000]));

        // Second start mid-session: the RGB partial is never emitted.
        rx.handle_datagram(&start(b'I', 1));
        rx.handle_datagram(&data(0, &[0xCC; 997]));
        let image = rx.handle_datagram(&[]).unwrap();

        assert_eq!(rx.stats().sessions_superseded, 1);
        assert_eq!(image.kind, ImageKind::OneBand);
        assert_eq!(image.data.len(), 1000);
        assert!(image.data[..997].iter().all(|&b| b == 0xCC));
        assert!(image.data[997..].iter().all(|&b| b == 0));
    }

    #[test]
    fn malformed_start_is_a_counted_no_op() {
        let mut rx = Reassembler::new();
        rx.handle_datagram(&start(b'Q', 5));
        assert!(!rx.is_receiving());

        rx.handle_datagram(&start(b'M', 0));
        assert!(!rx.is_receiving());

        // Mid-session, a malformed start leaves the session untouched.
        rx.handle_datagram(&start(b'M', 1));
        rx.handle_datagram(&start(b'Z', 9));
        assert!(rx.is_receiving());
        assert_eq!(rx.stats().malformed_starts, 3);
    }

    #[test]
    fn strays_while_idle_are_ignored() {
        let mut rx = Reassembler::new();
        assert!(rx.handle_datagram(&[]).is_none());
        assert!(rx.handle_datagram(&data(0, &[1; 100])).is_none());
        assert!(rx.handle_datagram(&[1, 2]).is_none());
        assert!(!rx.is_receiving());
        assert_eq!(rx.stats().strays_ignored, 3);
    }

    #[test]
    fn runt_data_frame_is_dropped_mid_session() {
        let mut rx = Reassembler::new();
        rx.handle_datagram(&start(b'M', 1));
        rx.handle_datagram(&[0x01]);
        rx.handle_datagram(&[0x01, 0x02]);
        assert!(rx.is_receiving());
        assert_eq!(rx.stats().data_frames_dropped, 2);
    }

    #[test]
    fn reset_and_evict_release_the_session() {
        let mut rx = Reassembler::new();
        assert!(!rx.reset());

        rx.handle_datagram(&start(b'M', 1));
        assert!(rx.reset());
        assert!(!rx.is_receiving());

        rx.handle_datagram(&start(b'I', 1));
        rx.evict_stalled();
        assert!(!rx.is_receiving());
        assert_eq!(rx.stats().sessions_evicted, 1);

        // Evicting while idle counts nothing.
        rx.evict_stalled();
        assert_eq!(rx.stats().sessions_evicted, 1);
    }

    #[test]
    fn completion_counter_tracks_images() {
        let mut rx = Reassembler::new();
        for _ in 0..3 {
            rx.handle_datagram(&start(b'I', 1));
            rx.handle_datagram(&[]);
        }
        assert_eq!(rx.stats().images_completed, 3);
    }
}
