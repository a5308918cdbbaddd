//! Video file input.
//!
//! `FileSource` opens a recorded video and hands out its frames in order.
//! Two kinds of input are accepted:
//!
//! - a local path, decoded with FFmpeg (feature `ingest-file-ffmpeg`)
//! - `stub://<name>`, a synthetic clip of `synthetic_frames` flat frames at
//!   `synthetic_fps`, used by tests and by replay-only runs that never look
//!   at pixels
//!
//! Anything with another URL scheme is refused; footage is read from disk only.

use anyhow::{bail, Result};
use std::path::PathBuf;

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegDecoder;
use super::FrameSource;
use crate::frame::RawFrame;

const STUB_SCHEME: &str = "stub://";

/// Where frames come from and how synthetic clips look.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path (e.g. "/srv/footage/lobby.mp4") or "stub://name".
    pub path: String,
    /// Frame rate a synthetic clip reports; `None` models a container
    /// without frame-rate metadata.
    pub synthetic_fps: Option<f64>,
    pub synthetic_frames: u64,
    pub width: u32,
    pub height: u32,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            synthetic_fps: Some(25.0),
            synthetic_frames: 250,
            width: 640,
            height: 480,
        }
    }
}

/// Parsed form of `FileConfig::path`.
#[derive(Clone, Debug, PartialEq, Eq)]
enum InputKind {
    Synthetic(String),
    Local(PathBuf),
}

impl InputKind {
    fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            bail!("video path is empty");
        }
        if let Some(name) = trimmed.strip_prefix(STUB_SCHEME) {
            return Ok(InputKind::Synthetic(name.to_string()));
        }
        if trimmed.contains("://") {
            bail!("'{}' is not a local file; remote inputs are not read", trimmed);
        }
        Ok(InputKind::Local(PathBuf::from(trimmed)))
    }
}

/// Counters for an open file source.
#[derive(Clone, Debug)]
pub struct FileStats {
    pub frames_captured: u64,
    pub path: String,
}

/// A recorded video, read front to back.
pub struct FileSource {
    decoder: Box<dyn FrameSource>,
    path: String,
    frames_read: u64,
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        let decoder: Box<dyn FrameSource> = match InputKind::parse(&config.path)? {
            InputKind::Synthetic(name) => Box::new(SyntheticClip::new(&name, &config)),
            InputKind::Local(path) => open_local(&path)?,
        };
        Ok(Self {
            decoder,
            path: config.path,
            frames_read: 0,
        })
    }

    pub fn stats(&self) -> FileStats {
        FileStats {
            frames_captured: self.frames_read,
            path: self.path.clone(),
        }
    }
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_local(path: &std::path::Path) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(FfmpegDecoder::open(path)?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_local(path: &std::path::Path) -> Result<Box<dyn FrameSource>> {
    bail!(
        "cannot decode {}: built without the ingest-file-ffmpeg feature",
        path.display()
    )
}

impl FrameSource for FileSource {
    fn fps(&self) -> Option<f64> {
        self.decoder.fps()
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let frame = self.decoder.next_frame()?;
        if frame.is_some() {
            self.frames_read += 1;
        }
        Ok(frame)
    }

    fn describe(&self) -> String {
        self.path.clone()
    }
}

// ---- Synthetic clips ----

/// Flat grey frames whose shade steps with the frame number.
struct SyntheticClip {
    fps: Option<f64>,
    remaining: u64,
    emitted: u64,
    width: u32,
    height: u32,
}

impl SyntheticClip {
    fn new(name: &str, config: &FileConfig) -> Self {
        log::info!(
            "synthetic clip '{}': {} frames of {}x{} at {:?} fps",
            name,
            config.synthetic_frames,
            config.width,
            config.height,
            config.synthetic_fps
        );
        Self {
            fps: config.synthetic_fps,
            remaining: config.synthetic_frames,
            emitted: 0,
            width: config.width,
            height: config.height,
        }
    }
}

impl FrameSource for SyntheticClip {
    fn fps(&self) -> Option<f64> {
        self.fps
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        self.emitted += 1;

        let len = self.width as usize * self.height as usize * 3;
        let shade = (self.emitted % 256) as u8;
        RawFrame::from_rgb(vec![shade; len], self.width, self.height).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config(frames: u64) -> FileConfig {
        FileConfig {
            path: "stub://lobby".to_string(),
            synthetic_frames: frames,
            width: 8,
            height: 6,
            ..FileConfig::default()
        }
    }

    #[test]
    fn synthetic_source_ends_after_configured_frames() {
        let mut source = FileSource::new(stub_config(3)).unwrap();
        assert_eq!(source.fps(), Some(25.0));

        let mut count = 0;
        while let Some(frame) = source.next_frame().unwrap() {
            assert_eq!((frame.width, frame.height), (8, 6));
            count += 1;
        }
        assert_eq!(count, 3);
        assert_eq!(source.stats().frames_captured, 3);
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.stats().frames_captured, 3);
    }

    #[test]
    fn rejects_remote_and_empty_paths() {
        for path in ["", "   ", "rtsp://camera/stream", "https://example.com/a.mp4"] {
            let config = FileConfig {
                path: path.to_string(),
                ..FileConfig::default()
            };
            assert!(FileSource::new(config).is_err(), "accepted {:?}", path);
        }
    }

    #[test]
    fn input_kinds_parse() {
        assert_eq!(
            InputKind::parse("stub://gate").unwrap(),
            InputKind::Synthetic("gate".to_string())
        );
        assert_eq!(
            InputKind::parse(" /srv/footage/gate.mp4 ").unwrap(),
            InputKind::Local(PathBuf::from("/srv/footage/gate.mp4"))
        );
    }
}
