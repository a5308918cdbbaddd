use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{Detection, DetectionResult};
use crate::frame::InferenceView;

/// One line of a detections file.
#[derive(Debug, Deserialize)]
struct ReplayLine {
    frame: u64,
    #[serde(default)]
    detections: Vec<Detection>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Clone, Debug)]
enum ReplayEntry {
    Detections(Vec<Detection>),
    Failure(String),
}

/// Replays precomputed detections keyed by frame index.
///
/// Input is JSON lines, one object per frame:
///
/// ```text
/// {"frame": 1, "detections": [{"label": "person", "box": [10, 20, 50, 120]}]}
/// {"frame": 2, "error": "corrupt macroblock"}
/// ```
///
/// Frames with no line produce zero detections. An `error` line makes
/// `detect` fail for that frame.
#[derive(Clone, Debug, Default)]
pub struct ReplayBackend {
    frames: HashMap<u64, ReplayEntry>,
}

impl ReplayBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from per-frame detections; element 0 is frame 1.
    pub fn from_frames(frames: Vec<Vec<Detection>>) -> Self {
        let mut backend = Self::new();
        for (i, detections) in frames.into_iter().enumerate() {
            backend.insert(i as u64 + 1, detections);
        }
        backend
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open detections file {}", path.display()))?;
        Self::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("invalid detections file {}", path.display()))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut backend = Self::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: ReplayLine = serde_json::from_str(&line)
                .map_err(|e| anyhow!("line {}: {}", lineno + 1, e))?;
            if parsed.frame == 0 {
                return Err(anyhow!("line {}: frame indices start at 1", lineno + 1));
            }
            let entry = match parsed.error {
                Some(reason) => ReplayEntry::Failure(reason),
                None => ReplayEntry::Detections(parsed.detections),
            };
            if backend.frames.insert(parsed.frame, entry).is_some() {
                return Err(anyhow!(
                    "line {}: duplicate entry for frame {}",
                    lineno + 1,
                    parsed.frame
                ));
            }
        }
        Ok(backend)
    }

    pub fn insert(&mut self, frame_index: u64, detections: Vec<Detection>) {
        self.frames
            .insert(frame_index, ReplayEntry::Detections(detections));
    }

    /// Make `detect` fail for one frame.
    pub fn insert_failure(&mut self, frame_index: u64, reason: &str) {
        self.frames
            .insert(frame_index, ReplayEntry::Failure(reason.to_string()));
    }

    /// Highest frame index with an entry.
    pub fn last_frame(&self) -> Option<u64> {
        self.frames.keys().max().copied()
    }
}

impl DetectorBackend for ReplayBackend {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(capability, DetectionCapability::ObjectDetection)
    }

    fn detect(&mut self, view: &InferenceView<'_>) -> Result<DetectionResult> {
        match self.frames.get(&view.frame_index()) {
            Some(ReplayEntry::Detections(detections)) => {
                Ok(DetectionResult::new(detections.clone()))
            }
            Some(ReplayEntry::Failure(reason)) => Err(anyhow!("{}", reason)),
            None => Ok(DetectionResult::default()),
        }
    }
}
