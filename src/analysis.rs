//! Event detection heuristics.
//!
//! Evaluated once per frame, after the session has assigned the frame index.
//! For each detection, in adapter order, the detector records the detection's
//! center into its track and then checks the per-label heuristics against the
//! track as it stands at that moment:
//!
//! - **Loitering** (`loiter_labels`): more than `loiter_window` samples, and
//!   every sample of the last `loiter_window` lies strictly within
//!   `loiter_radius_px` of the window's first sample on both axes.
//! - **Abandonment** (`abandon_labels`): more than `abandon_threshold` samples.
//!
//! After all detections, the frame-level density check fires when more than
//! `crowd_threshold` objects are in view. Conditions re-fire every frame they
//! hold; there is no cooldown.

use serde::{Deserialize, Serialize};

use crate::alert::AlertKind;
use crate::detect::{BoundingBox, Detection};
use crate::error::AnalysisError;
use crate::identity::CentroidMatcher;
use crate::track::{Sample, TrackKey, TrackStore};

pub const DEFAULT_LOITER_WINDOW: usize = 50;
pub const DEFAULT_LOITER_RADIUS_PX: i32 = 20;
pub const DEFAULT_ABANDON_THRESHOLD: usize = 80;
pub const DEFAULT_CROWD_THRESHOLD: usize = 5;

/// How detections are grouped into tracks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TrackingMode {
    /// One track per class label.
    #[default]
    ByLabel,
    /// One track per matched object instance.
    ByInstance {
        max_distance_px: i32,
        max_missing_frames: u64,
    },
}

/// Thresholds and label sets for the heuristics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeuristicConfig {
    pub loiter_window: usize,
    pub loiter_radius_px: i32,
    pub abandon_threshold: usize,
    pub crowd_threshold: usize,
    pub loiter_labels: Vec<String>,
    pub abandon_labels: Vec<String>,
    pub tracking: TrackingMode,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            loiter_window: DEFAULT_LOITER_WINDOW,
            loiter_radius_px: DEFAULT_LOITER_RADIUS_PX,
            abandon_threshold: DEFAULT_ABANDON_THRESHOLD,
            crowd_threshold: DEFAULT_CROWD_THRESHOLD,
            loiter_labels: vec!["person".to_string()],
            abandon_labels: vec![
                "backpack".to_string(),
                "suitcase".to_string(),
                "handbag".to_string(),
            ],
            tracking: TrackingMode::ByLabel,
        }
    }
}

impl HeuristicConfig {
    fn watches_loitering(&self, label: &str) -> bool {
        self.loiter_labels.iter().any(|l| l == label)
    }

    fn watches_abandonment(&self, label: &str) -> bool {
        self.abandon_labels.iter().any(|l| l == label)
    }
}

/// Render hint for one detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationStatus {
    Normal,
    Loitering,
    Abandoned,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub label: String,
    pub bbox: BoundingBox,
    pub status: AnnotationStatus,
}

impl Annotation {
    /// Operator-facing label for this box: the class, or the alert it raised.
    pub fn caption(&self) -> &str {
        match self.status {
            AnnotationStatus::Normal => &self.label,
            AnnotationStatus::Loitering => "Loitering",
            AnnotationStatus::Abandoned => "Abandoned",
        }
    }

    pub fn is_alert(&self) -> bool {
        self.status != AnnotationStatus::Normal
    }
}

/// Heuristic outcome for one frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameEvaluation {
    pub annotations: Vec<Annotation>,
    /// Alerts in firing order: per-detection first, density last.
    pub alerts: Vec<AlertKind>,
    pub unusual_activity: bool,
}

/// Applies the stationarity, duration and density heuristics.
pub struct EventDetector {
    config: HeuristicConfig,
    matcher: Option<CentroidMatcher>,
}

impl EventDetector {
    pub fn new(config: HeuristicConfig) -> Self {
        let matcher = match config.tracking {
            TrackingMode::ByLabel => None,
            TrackingMode::ByInstance {
                max_distance_px,
                max_missing_frames,
            } => Some(CentroidMatcher::new(max_distance_px, max_missing_frames)),
        };
        Self { config, matcher }
    }

    pub fn config(&self) -> &HeuristicConfig {
        &self.config
    }

    /// Record this frame's detections into `tracks` and evaluate them.
    pub fn evaluate(
        &mut self,
        frame_index: u64,
        detections: &[Detection],
        tracks: &mut TrackStore,
    ) -> Result<FrameEvaluation, AnalysisError> {
        let keys = self.track_keys(frame_index, detections);
        let mut eval = FrameEvaluation::default();

        for (det, key) in detections.iter().zip(keys) {
            let (cx, cy) = det.bbox.center();
            tracks.record(&key, Sample::new(frame_index, cx, cy))?;

            let mut status = AnnotationStatus::Normal;

            if self.config.watches_loitering(&det.label) && self.is_loitering(tracks, &key) {
                status = AnnotationStatus::Loitering;
                eval.alerts.push(AlertKind::Loitering);
            }

            if self.config.watches_abandonment(&det.label)
                && tracks.len(&key) > self.config.abandon_threshold
            {
                status = AnnotationStatus::Abandoned;
                eval.alerts.push(AlertKind::ObjectAbandonment {
                    label: det.label.clone(),
                });
            }

            eval.annotations.push(Annotation {
                label: det.label.clone(),
                bbox: det.bbox,
                status,
            });
        }

        if detections.len() > self.config.crowd_threshold {
            eval.unusual_activity = true;
            eval.alerts.push(AlertKind::UnusualActivity);
        }

        Ok(eval)
    }

    fn track_keys(&mut self, frame_index: u64, detections: &[Detection]) -> Vec<TrackKey> {
        match self.matcher.as_mut() {
            None => detections
                .iter()
                .map(|d| TrackKey::label(&d.label))
                .collect(),
            Some(matcher) => matcher
                .assign(frame_index, detections)
                .into_iter()
                .zip(detections)
                .map(|(id, d)| TrackKey::instance(&d.label, id))
                .collect(),
        }
    }

    /// Needs strictly more than `loiter_window` samples before it is eligible.
    fn is_loitering(&self, tracks: &TrackStore, key: &TrackKey) -> bool {
        let window = self.config.loiter_window;
        if tracks.len(key) <= window {
            return false;
        }
        is_stationary(tracks.recent(key, window), self.config.loiter_radius_px)
    }
}

/// True when every sample stays strictly within `radius` of the first sample
/// on both axes.
pub fn is_stationary(window: &[Sample], radius: i32) -> bool {
    let Some(anchor) = window.first() else {
        return false;
    };
    let Ok(radius) = u32::try_from(radius) else {
        return false;
    };
    window.iter().all(|s| {
        s.center_x.abs_diff(anchor.center_x) < radius
            && s.center_y.abs_diff(anchor.center_y) < radius
    })
}
