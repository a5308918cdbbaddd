//! Frame ingestion sources.
//!
//! This module provides sources of decoded frames for analysis:
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` sources (testing, demos)
//!
//! Every source reports the video's frame rate up front and then yields
//! frames sequentially until end of stream. No seeking is required.
//!
//! The ingestion layer MUST NOT:
//! - Store decoded frames to disk
//! - Fetch remote URLs
//! - Retain frames beyond handoff to the session

use anyhow::Result;

use crate::frame::RawFrame;

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;

pub use file::{FileConfig, FileSource, FileStats};

/// Sequential source of decoded frames.
pub trait FrameSource {
    /// Frame rate reported by the container, if any.
    fn fps(&self) -> Option<f64>;

    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;

    /// Human-readable origin for logs.
    fn describe(&self) -> String {
        "frame source".to_string()
    }
}
