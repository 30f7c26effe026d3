//! Frame sink: the viewer's decode/display stage.
//!
//! Probes each completed buffer as JPEG, trims the slot padding, and
//! writes the stream to disk. Stands where a renderer would in a GUI
//! host; a decode failure only skips the broken frame.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};

use pixlink_core::jpeg;
use pixlink_core::{AssembledImage, ImageHandler, PixError};

/// Writes completed frames to a directory as numbered JPEG files.
pub struct FrameWriter {
    dir: PathBuf,
    save_frames: bool,
    counter: AtomicU64,
}

impl FrameWriter {
    /// Create the writer, ensuring the output directory exists.
    pub fn new(dir: impl Into<PathBuf>, save_frames: bool) -> Result<Self, PixError> {
        let dir = dir.into();
        if save_frames {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(Self {
            dir,
            save_frames,
            counter: AtomicU64::new(0),
        })
    }

    /// Frames handled so far (decode failures included).
    pub fn frames_seen(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ImageHandler for FrameWriter {
    async fn handle(&self, image: AssembledImage) -> Result<(), PixError> {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);

        // Surfaces lost-packet truncation as a decode error here,
        // after the engine has already returned to idle.
        let info = jpeg::probe(&image.data)?;
        info!(
            seq,
            kind = image.kind.as_str(),
            width = info.width,
            height = info.height,
            bytes = image.data.len(),
            "frame decoded"
        );

        if self.save_frames {
            let trimmed = jpeg::trim_padding(&image.data);
            let path = self
                .dir
                .join(format!("frame_{seq:05}_{}.jpg", image.kind.as_str()));
            tokio::fs::write(&path, trimmed).await?;
            debug!("wrote {}", path.display());
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
