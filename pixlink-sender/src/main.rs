//! pixlink sender — entry point.
//!
//! Chops a compressed image file into 1000-byte slots and transmits
//! it as start/data/end datagrams. Meant for exercising a viewer;
//! `--reverse` sends the data frames backwards to demonstrate that
//! arrival order does not matter.
//!
//! ```text
//! pixlink-sender photo.jpg
//! pixlink-sender photo.jpg --target 192.168.1.50:5000 --kind one-band
//! pixlink-sender photo.jpg --repeat 10 --gap-ms 500 --reverse
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::UdpSocket;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pixlink_core::wire::{DataFrame, ImageKind, StartFrame, PACKET_SIZE};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "pixlink-sender", about = "pixlink datagram image sender")]
struct Cli {
    /// Image file to transmit (a JPEG stream).
    file: PathBuf,

    /// Receiver address.
    #[arg(short, long, default_value = "127.0.0.1:5000")]
    target: String,

    /// Image kind declared in the start frame: "rgb" or "one-band".
    #[arg(short, long, default_value = "rgb")]
    kind: String,

    /// Microseconds to pause between data frames.
    #[arg(long, default_value_t = 200)]
    delay_us: u64,

    /// Send the data frames in reverse slot order.
    #[arg(long)]
    reverse: bool,

    /// How many times to transmit the image.
    #[arg(long, default_value_t = 1)]
    repeat: u32,

    /// Milliseconds between repeated transmissions.
    #[arg(long, default_value_t = 1000)]
    gap_ms: u64,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let kind = match cli.kind.as_str() {
        "rgb" => ImageKind::Rgb,
        "one-band" => ImageKind::OneBand,
        other => return Err(format!("unknown image kind: {other:?}").into()),
    };

    let data = std::fs::read(&cli.file)?;
    if data.is_empty() {
        return Err("refusing to send an empty file".into());
    }
    let chunks: Vec<&[u8]> = data.chunks(PACKET_SIZE).collect();
    if chunks.len() > usize::from(u16::MAX) {
        return Err(format!(
            "file needs {} packets; the start frame can declare at most {}",
            chunks.len(),
            u16::MAX
        )
        .into());
    }

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    info!(
        file = %cli.file.display(),
        bytes = data.len(),
        packets = chunks.len(),
        kind = kind.as_str(),
        "sending to {}",
        cli.target
    );

    for round in 0..cli.repeat {
        send_image(&socket, &cli, kind, &chunks).await?;
        info!("transmission {} of {} complete", round + 1, cli.repeat);
        if round + 1 < cli.repeat {
            tokio::time::sleep(Duration::from_millis(cli.gap_ms)).await;
        }
    }

    Ok(())
}

/// One full transfer: start frame, every slot, end marker.
async fn send_image(
    socket: &UdpSocket,
    cli: &Cli,
    kind: ImageKind,
    chunks: &[&[u8]],
) -> Result<(), Box<dyn std::error::Error>> {
    let start = StartFrame {
        kind,
        packet_count: chunks.len() as u16,
    };
    socket.send_to(&start.encode(), cli.target.as_str()).await?;

    let indices: Vec<usize> = if cli.reverse {
        (0..chunks.len()).rev().collect()
    } else {
        (0..chunks.len()).collect()
    };

    for i in indices {
        let pkt = DataFrame::encode(i as u32, chunks[i])?;
        socket.send_to(&pkt, cli.target.as_str()).await?;
        if cli.delay_us > 0 {
            tokio::time::sleep(Duration::from_micros(cli.delay_us)).await;
        }
    }

    // Zero-length datagram: end of image.
    socket.send_to(&[], cli.target.as_str()).await?;
    Ok(())
}
