//! Integration tests — full image transfers, interrupted transfers,
//! and hardening behavior over real UDP sockets on localhost.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use pixlink_core::{
    AssembledImage, HandoffPolicy, ImageHandler, ImageKind, ImageReceiver, PixError,
    ReceiverConfig,
};

// ── Helpers ──────────────────────────────────────────────────────

/// Handler that forwards every completed image to an mpsc channel.
struct Collector(mpsc::UnboundedSender<AssembledImage>);

#[async_trait]
impl ImageHandler for Collector {
    async fn handle(&self, image: AssembledImage) -> Result<(), PixError> {
        let _ = self.0.send(image);
        Ok(())
    }
}

struct TestReceiver {
    addr: SocketAddr,
    images: mpsc::UnboundedReceiver<AssembledImage>,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Result<(), PixError>>,
}

/// Spin up a receiver on an OS-assigned port and run it in the
/// background, collecting completed images.
async fn spawn_receiver(config: ReceiverConfig) -> TestReceiver {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let (tx, images) = mpsc::unbounded_channel();
    let mut receiver = ImageReceiver::with_config(socket, Arc::new(Collector(tx)), config);
    let stop = receiver.stop_handle();
    let handle = tokio::spawn(async move { receiver.run().await });
    TestReceiver {
        addr,
        images,
        stop,
        handle,
    }
}

async fn sender() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

fn start_frame(marker: u8, count: u16) -> Vec<u8> {
    let n = count.to_le_bytes();
    vec![marker, n[0], n[1]]
}

fn data_frame(index: u32, payload: &[u8]) -> Vec<u8> {
    let mut pkt = index.to_le_bytes()[..3].to_vec();
    pkt.extend_from_slice(payload);
    pkt
}

async fn next_image(rx: &mut mpsc::UnboundedReceiver<AssembledImage>) -> AssembledImage {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timeout waiting for image")
        .expect("image channel closed")
}

// ── Complete transfers ───────────────────────────────────────────

#[tokio::test]
async fn rgb_two_packet_image_reassembles() {
    let mut rx = spawn_receiver(ReceiverConfig::default()).await;
    let tx = sender().await;

    tx.send_to(&start_frame(b'M', 2), rx.addr).await.unwrap();
    tx.send_to(&data_frame(0, &[0xAA; 1000]), rx.addr).await.unwrap();
    tx.send_to(&data_frame(1, &[0xBB; 1000]), rx.addr).await.unwrap();
    tx.send_to(&[], rx.addr).await.unwrap();

    let image = next_image(&mut rx.images).await;
    assert_eq!(image.kind, ImageKind::Rgb);
    assert_eq!(image.declared_packets, 2);
    assert_eq!(image.data.len(), 2000);
    assert!(image.data[..1000].iter().all(|&b| b == 0xAA));
    assert!(image.data[1000..].iter().all(|&b| b == 0xBB));
}

#[tokio::test]
async fn one_band_image_with_no_data_frames() {
    let mut rx = spawn_receiver(ReceiverConfig::default()).await;
    let tx = sender().await;

    tx.send_to(&start_frame(b'I', 1), rx.addr).await.unwrap();
    tx.send_to(&[], rx.addr).await.unwrap();

    let image = next_image(&mut rx.images).await;
    assert_eq!(image.kind, ImageKind::OneBand);
    assert_eq!(image.data.len(), 1000);
    assert!(image.data.iter().all(|&b| b == 0));
}

#[tokio::test]
async fn reversed_arrival_order_yields_same_buffer() {
    let mut rx = spawn_receiver(ReceiverConfig::default()).await;
    let tx = sender().await;

    tx.send_to(&start_frame(b'M', 3), rx.addr).await.unwrap();
    for index in (0u32..3).rev() {
        let payload = vec![index as u8 + 1; 1000];
        tx.send_to(&data_frame(index, &payload), rx.addr).await.unwrap();
    }
    tx.send_to(&[], rx.addr).await.unwrap();

    let image = next_image(&mut rx.images).await;
    for index in 0..3usize {
        let slot = &image.data[index * 1000..(index + 1) * 1000];
        assert!(slot.iter().all(|&b| b == index as u8 + 1), "slot {index}");
    }
}

// ── Interrupted transfers ────────────────────────────────────────

#[tokio::test]
async fn superseding_start_discards_partial_image() {
    let mut rx = spawn_receiver(ReceiverConfig::default()).await;
    let tx = sender().await;

    // RGB transfer begins…
    tx.send_to(&start_frame(b'M', 2), rx.addr).await.unwrap();
    tx.send_to(&data_frame(0, &[0xAA; 1000]), rx.addr).await.unwrap();
    // …and a one-band transfer supersedes it before the end marker.
    tx.send_to(&start_frame(b'I', 1), rx.addr).await.unwrap();
    tx.send_to(&data_frame(0, &[0xCC; 997]), rx.addr).await.unwrap();
    tx.send_to(&[], rx.addr).await.unwrap();

    let image = next_image(&mut rx.images).await;
    assert_eq!(image.kind, ImageKind::OneBand);
    assert_eq!(image.data.len(), 1000);
    assert!(image.data[..997].iter().all(|&b| b == 0xCC));
    assert!(image.data[997..].iter().all(|&b| b == 0));

    // The abandoned RGB session must never be emitted.
    assert!(rx.images.try_recv().is_err());
}

#[tokio::test]
async fn oversized_datagram_is_dropped_not_reassembled() {
    let mut rx = spawn_receiver(ReceiverConfig::default()).await;
    let tx = sender().await;

    tx.send_to(&start_frame(b'M', 1), rx.addr).await.unwrap();
    // 1200-byte datagram: larger than any legal frame.
    tx.send_to(&vec![0xEE; 1200], rx.addr).await.unwrap();
    tx.send_to(&data_frame(0, &[0x33; 1000]), rx.addr).await.unwrap();
    tx.send_to(&[], rx.addr).await.unwrap();

    let image = next_image(&mut rx.images).await;
    assert!(image.data.iter().all(|&b| b == 0x33));
}

// ── Handoff policies ─────────────────────────────────────────────

#[tokio::test]
async fn gated_policy_delivers_consecutive_images() {
    let config = ReceiverConfig {
        policy: HandoffPolicy::Gated,
        ..ReceiverConfig::default()
    };
    let mut rx = spawn_receiver(config).await;
    let tx = sender().await;

    for fill in [0x10u8, 0x20] {
        tx.send_to(&start_frame(b'M', 1), rx.addr).await.unwrap();
        tx.send_to(&data_frame(0, &[fill; 1000]), rx.addr).await.unwrap();
        tx.send_to(&[], rx.addr).await.unwrap();
    }

    let first = next_image(&mut rx.images).await;
    let second = next_image(&mut rx.images).await;
    assert!(first.data.iter().all(|&b| b == 0x10));
    assert!(second.data.iter().all(|&b| b == 0x20));
}

// ── Hardening ────────────────────────────────────────────────────

#[tokio::test]
async fn stalled_session_is_evicted_after_idle_timeout() {
    let config = ReceiverConfig {
        session_idle_timeout: Some(Duration::from_millis(100)),
        ..ReceiverConfig::default()
    };
    let mut rx = spawn_receiver(config).await;
    let tx = sender().await;

    // A transfer that never finishes.
    tx.send_to(&start_frame(b'M', 4), rx.addr).await.unwrap();
    tx.send_to(&data_frame(0, &[0xAB; 1000]), rx.addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    // The next transfer completes normally after the eviction.
    tx.send_to(&start_frame(b'I', 1), rx.addr).await.unwrap();
    tx.send_to(&[], rx.addr).await.unwrap();

    let image = next_image(&mut rx.images).await;
    assert_eq!(image.kind, ImageKind::OneBand);
    assert!(rx.images.try_recv().is_err());
}

#[tokio::test]
async fn stop_releases_in_flight_session() {
    let mut rx = spawn_receiver(ReceiverConfig::default()).await;
    let tx = sender().await;

    tx.send_to(&start_frame(b'M', 2), rx.addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    rx.stop.store(false, Ordering::SeqCst);
    // One more datagram to unblock the recv call.
    tx.send_to(&data_frame(0, &[0x01; 100]), rx.addr).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), rx.handle)
        .await
        .expect("receiver did not stop")
        .expect("receiver task panicked");
    assert!(result.is_ok());
    // The partial session is released, never emitted.
    assert!(rx.images.try_recv().is_err());
}
