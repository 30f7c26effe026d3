//! pixlink viewer — entry point.
//!
//! ```text
//! pixlink-viewer                     Listen with defaults (0.0.0.0:5000)
//! pixlink-viewer --config <path>     Use custom config TOML
//! pixlink-viewer --listen <addr>     Override the listen address
//! pixlink-viewer --gen-config        Dump default config and exit
//! ```

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::UdpSocket;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pixlink_core::ImageReceiver;

use pixlink_viewer::config::ViewerConfig;
use pixlink_viewer::sink::FrameWriter;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "pixlink-viewer", about = "pixlink datagram image viewer")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "pixlink-viewer.toml")]
    config: PathBuf,

    /// Listen address (overrides config). Example: 0.0.0.0:5000
    #[arg(short, long)]
    listen: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ViewerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ViewerConfig::load(&cli.config);
    if let Some(addr) = cli.listen {
        config.network.listen_addr = addr;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("pixlink-viewer v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Bind the socket and build the receiver ───────────────

    let receiver_config = config.receiver.to_receiver_config()?;
    let socket = UdpSocket::bind(&config.network.listen_addr).await?;
    info!(
        "listening on {} (handoff: {})",
        socket.local_addr()?,
        receiver_config.policy.as_str()
    );

    let writer = FrameWriter::new(&config.output.frame_dir, config.output.save_frames)?;
    let mut receiver = ImageReceiver::with_config(socket, Arc::new(writer), receiver_config);
    let stats_rx = receiver.stats_receiver();
    let stop = receiver.stop_handle();

    // ── 2. Run the receive loop ─────────────────────────────────

    let receiver_handle = tokio::spawn(async move {
        if let Err(e) = receiver.run().await {
            error!("receiver error: {e}");
        }
    });

    // Periodic traffic summary.
    let stats_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let stats = stats_rx.borrow().clone();
            info!(
                datagrams = stats.datagrams,
                bytes = stats.bytes,
                images = stats.reassembly.images_completed,
                superseded = stats.reassembly.sessions_superseded,
                dropped = stats.reassembly.data_frames_dropped,
                "receive stats"
            );
        }
    });

    // ── 3. Shutdown on ctrl-c ───────────────────────────────────

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    stop.store(false, Ordering::SeqCst);
    stats_handle.abort();
    receiver_handle.abort();
    let _ = receiver_handle.await;

    Ok(())
}
