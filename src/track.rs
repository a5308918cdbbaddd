//! Track store.
//!
//! A track is the ordered history of center points observed for one key.
//! In the default mode the key is the class label alone, so every person in
//! view feeds the same "person" track. Tracks only grow for the lifetime of
//! an analysis run; a fresh store is built per run.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// One observation of a detection's center at a given frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub frame_index: u64,
    pub center_x: i32,
    pub center_y: i32,
}

impl Sample {
    pub fn new(frame_index: u64, center_x: i32, center_y: i32) -> Self {
        Self {
            frame_index,
            center_x,
            center_y,
        }
    }
}

/// Track identity: class label plus an optional per-instance id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackKey {
    pub label: String,
    pub instance: Option<u32>,
}

impl TrackKey {
    /// Label-keyed track (all objects of a class share it).
    pub fn label(label: &str) -> Self {
        Self {
            label: label.to_string(),
            instance: None,
        }
    }

    pub fn instance(label: &str, instance: u32) -> Self {
        Self {
            label: label.to_string(),
            instance: Some(instance),
        }
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.instance {
            Some(id) => write!(f, "{}#{}", self.label, id),
            None => write!(f, "{}", self.label),
        }
    }
}

/// Per-run mapping from track key to its append-only sample history.
#[derive(Debug, Default)]
pub struct TrackStore {
    tracks: HashMap<TrackKey, Vec<Sample>>,
}

impl TrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample, creating the track on first use.
    ///
    /// Samples must arrive in non-decreasing frame order per track.
    pub fn record(&mut self, key: &TrackKey, sample: Sample) -> Result<(), AnalysisError> {
        if let Some(track) = self.tracks.get_mut(key) {
            if let Some(last) = track.last() {
                if sample.frame_index < last.frame_index {
                    return Err(AnalysisError::OutOfOrderSample {
                        key: key.to_string(),
                        last: last.frame_index,
                        got: sample.frame_index,
                    });
                }
            }
            track.push(sample);
        } else {
            self.tracks.insert(key.clone(), vec![sample]);
        }
        Ok(())
    }

    /// Last `n` samples in insertion order, or fewer when the track is shorter.
    /// Unknown keys yield an empty slice.
    pub fn recent(&self, key: &TrackKey, n: usize) -> &[Sample] {
        let track = self.track(key);
        &track[track.len().saturating_sub(n)..]
    }

    /// Full history for a key.
    pub fn track(&self, key: &TrackKey) -> &[Sample] {
        self.tracks.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self, key: &TrackKey) -> usize {
        self.tracks.get(key).map_or(0, Vec::len)
    }

    /// Keys currently holding history, sorted for stable output.
    pub fn keys(&self) -> Vec<&TrackKey> {
        let mut keys: Vec<&TrackKey> = self.tracks.keys().collect();
        keys.sort();
        keys
    }

    pub fn total_samples(&self) -> usize {
        self.tracks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
