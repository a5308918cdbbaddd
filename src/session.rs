//! Analysis session: the per-frame loop.
//!
//! A session owns every piece of mutable analysis state (tracks, alert log,
//! frame counter) for exactly one video. Nothing is shared between sessions,
//! so independent videos can be analysed side by side with separate sessions.
//!
//! Frames are processed strictly in order: decode, detect, record, evaluate,
//! log. The heuristics depend on sample order, so a session must never see
//! frames out of sequence.

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::alert::{Alert, AlertLog};
use crate::analysis::{Annotation, EventDetector, HeuristicConfig};
use crate::detect::{DetectionCapability, DetectionResult, DetectorBackend};
use crate::error::AnalysisError;
use crate::frame::RawFrame;
use crate::ingest::FrameSource;
use crate::track::TrackStore;

// -------------------- Video Clock --------------------

/// Converts frame indices to video time using the source frame rate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoClock {
    fps: f64,
}

impl VideoClock {
    /// Rejects a missing, zero, negative or non-finite frame rate.
    pub fn new(fps: Option<f64>) -> Result<Self, AnalysisError> {
        match fps {
            None => Err(AnalysisError::InvalidVideoMetadata(
                "frame rate unavailable".to_string(),
            )),
            Some(fps) if !fps.is_finite() || fps <= 0.0 => Err(
                AnalysisError::InvalidVideoMetadata(format!("frame rate {} is not usable", fps)),
            ),
            Some(fps) => Ok(Self { fps }),
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn seconds(&self, frame_index: u64) -> f64 {
        frame_index as f64 / self.fps
    }

    /// "MM:SS" for a frame index.
    pub fn timestamp(&self, frame_index: u64) -> String {
        format_mm_ss(self.seconds(frame_index))
    }
}

/// Formats seconds as zero-padded "MM:SS", truncating fractions.
/// Minutes keep growing past 99.
pub fn format_mm_ss(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let minutes = (seconds / 60.0).floor() as u64;
    let secs = (seconds % 60.0).floor() as u64;
    format!("{:02}:{:02}", minutes, secs)
}

// -------------------- Reports --------------------

/// Everything the session learned about one frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame_index: u64,
    pub timestamp: String,
    pub annotations: Vec<Annotation>,
    pub alerts: Vec<Alert>,
    pub unusual_activity: bool,
    /// Set when the detector failed and heuristics were skipped.
    pub skipped: Option<String>,
}

/// A frame whose detections were unavailable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedFrame {
    pub frame_index: u64,
    pub timestamp: String,
    pub reason: String,
}

/// Outcome of a finished run.
#[derive(Clone, Debug)]
pub struct SessionReport {
    pub fps: f64,
    pub frames_processed: u64,
    pub alerts: AlertLog,
    pub skipped_frames: Vec<SkippedFrame>,
}

/// Receives each decoded frame together with its report (e.g. overlay writers).
pub trait FrameSink {
    fn on_frame(&mut self, frame: &RawFrame, report: &FrameReport) -> Result<()>;
}

// -------------------- Session --------------------

/// State for one analysis run.
pub struct AnalysisSession {
    clock: VideoClock,
    detector: EventDetector,
    tracks: TrackStore,
    alerts: AlertLog,
    frame_count: u64,
    skipped_frames: Vec<SkippedFrame>,
}

impl AnalysisSession {
    /// Fails with `InvalidVideoMetadata` before any frame is touched.
    pub fn new(fps: Option<f64>, config: HeuristicConfig) -> Result<Self, AnalysisError> {
        let clock = VideoClock::new(fps)?;
        Ok(Self {
            clock,
            detector: EventDetector::new(config),
            tracks: TrackStore::new(),
            alerts: AlertLog::new(),
            frame_count: 0,
            skipped_frames: Vec::new(),
        })
    }

    /// Index the next processed frame will receive (1-based).
    pub fn next_frame_index(&self) -> u64 {
        self.frame_count + 1
    }

    /// Advance one frame with the detector's outcome for it.
    ///
    /// A detector error skips this frame's heuristics entirely and is
    /// recorded in `skipped_frames`; it does not abort the run.
    pub fn process_frame(
        &mut self,
        detections: Result<DetectionResult>,
    ) -> Result<FrameReport, AnalysisError> {
        self.frame_count += 1;
        let frame_index = self.frame_count;
        let timestamp = self.clock.timestamp(frame_index);

        let detections = match detections {
            Ok(result) => result,
            Err(err) => {
                let reason = format!("{:#}", err);
                log::warn!(
                    "{} (at {}); heuristics skipped",
                    AnalysisError::DetectionAdapterFailure {
                        frame_index,
                        reason: reason.clone(),
                    },
                    timestamp
                );
                let skipped = SkippedFrame {
                    frame_index,
                    timestamp,
                    reason,
                };
                let report = FrameReport {
                    frame_index,
                    timestamp: skipped.timestamp.clone(),
                    annotations: Vec::new(),
                    alerts: Vec::new(),
                    unusual_activity: false,
                    skipped: Some(skipped.reason.clone()),
                };
                self.skipped_frames.push(skipped);
                return Ok(report);
            }
        };

        let eval = self
            .detector
            .evaluate(frame_index, &detections.detections, &mut self.tracks)?;

        let alerts: Vec<Alert> = eval
            .alerts
            .into_iter()
            .map(|kind| Alert::new(frame_index, &timestamp, kind))
            .collect();
        for alert in &alerts {
            log::debug!("{} frame={} {}", alert.time, frame_index, alert.message());
        }
        self.alerts.extend(alerts.iter().cloned());

        Ok(FrameReport {
            frame_index,
            timestamp,
            annotations: eval.annotations,
            alerts,
            unusual_activity: eval.unusual_activity,
            skipped: None,
        })
    }

    /// Drive a whole video through `backend` until the source ends.
    pub fn run(
        source: &mut dyn FrameSource,
        backend: &mut dyn DetectorBackend,
        config: HeuristicConfig,
        mut sink: Option<&mut dyn FrameSink>,
    ) -> Result<SessionReport> {
        if !backend.supports(DetectionCapability::ObjectDetection) {
            return Err(anyhow!(
                "backend {} does not provide object detection",
                backend.name()
            ));
        }
        let mut session = Self::new(source.fps(), config)?;
        backend.warm_up()?;
        log::info!(
            "analysing {} at {:.2} fps with backend {}",
            source.describe(),
            session.clock.fps(),
            backend.name()
        );

        while let Some(frame) = source.next_frame()? {
            let frame_index = session.next_frame_index();
            log::trace!(
                "frame {} ({}x{}, {} bytes)",
                frame_index,
                frame.width,
                frame.height,
                frame.byte_len()
            );
            let detections = frame.inference_view(frame_index).run_detector(backend);
            let report = session.process_frame(detections)?;
            if let Some(sink) = sink.as_deref_mut() {
                sink.on_frame(&frame, &report)?;
            }
        }

        let report = session.finish();
        log::info!(
            "processed {} frames: {} alerts, {} skipped",
            report.frames_processed,
            report.alerts.len(),
            report.skipped_frames.len()
        );
        Ok(report)
    }

    pub fn clock(&self) -> &VideoClock {
        &self.clock
    }

    pub fn tracks(&self) -> &TrackStore {
        &self.tracks
    }

    pub fn alerts(&self) -> &AlertLog {
        &self.alerts
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn skipped_frames(&self) -> &[SkippedFrame] {
        &self.skipped_frames
    }

    pub fn finish(self) -> SessionReport {
        SessionReport {
            fps: self.clock.fps(),
            frames_processed: self.frame_count,
            alerts: self.alerts,
            skipped_frames: self.skipped_frames,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertKind;
    use crate::detect::{BoundingBox, Detection};

    fn person() -> Detection {
        Detection::new("person", BoundingBox::new(90, 90, 110, 110).unwrap())
    }

    #[test]
    fn timestamps_follow_frame_rate() {
        let clock = VideoClock::new(Some(25.0)).unwrap();
        assert_eq!(clock.timestamp(125), "00:05");

        let clock = VideoClock::new(Some(30.0)).unwrap();
        assert_eq!(clock.timestamp(3000), "01:40");
        assert_eq!(clock.timestamp(29), "00:00");
    }

    #[test]
    fn format_mm_ss_handles_long_videos() {
        assert_eq!(format_mm_ss(59.99), "00:59");
        assert_eq!(format_mm_ss(6000.0), "100:00");
    }

    #[test]
    fn rejects_unusable_frame_rates() {
        for fps in [None, Some(0.0), Some(-25.0), Some(f64::NAN), Some(f64::INFINITY)] {
            let err = AnalysisSession::new(fps, HeuristicConfig::default()).err();
            assert!(
                matches!(err, Some(AnalysisError::InvalidVideoMetadata(_))),
                "fps {:?} accepted",
                fps
            );
        }
    }

    #[test]
    fn frames_are_numbered_from_one() {
        let mut session = AnalysisSession::new(Some(10.0), HeuristicConfig::default()).unwrap();
        assert_eq!(session.next_frame_index(), 1);
        let report = session
            .process_frame(Ok(DetectionResult::new(vec![person()])))
            .unwrap();
        assert_eq!(report.frame_index, 1);
        assert_eq!(report.timestamp, "00:00");
        assert_eq!(session.tracks().total_samples(), 1);
    }

    #[test]
    fn detector_failure_skips_frame_without_touching_tracks() {
        let mut session = AnalysisSession::new(Some(1.0), HeuristicConfig::default()).unwrap();
        session
            .process_frame(Ok(DetectionResult::new(vec![person()])))
            .unwrap();
        let report = session
            .process_frame(Err(anyhow!("corrupt frame")))
            .unwrap();

        assert_eq!(report.skipped.as_deref(), Some("corrupt frame"));
        assert!(report.alerts.is_empty());
        assert_eq!(session.frame_count(), 2);
        assert_eq!(session.tracks().total_samples(), 1);
        assert_eq!(
            session.skipped_frames(),
            &[SkippedFrame {
                frame_index: 2,
                timestamp: "00:02".to_string(),
                reason: "corrupt frame".to_string(),
            }]
        );
    }

    #[test]
    fn skipped_frame_reason_keeps_error_context() {
        let mut session = AnalysisSession::new(Some(4.0), HeuristicConfig::default()).unwrap();
        let err = anyhow!("truncated packet").context("decode failed");
        let report = session.process_frame(Err(err)).unwrap();

        let skipped = &session.skipped_frames()[0];
        assert_eq!(skipped.reason, "decode failed: truncated packet");
        assert_eq!(report.skipped.as_deref(), Some(skipped.reason.as_str()));
        assert_eq!(report.timestamp, skipped.timestamp);
        assert!(!report.unusual_activity);
    }

    #[test]
    fn alerts_are_stamped_with_frame_time() {
        let config = HeuristicConfig {
            crowd_threshold: 0,
            ..HeuristicConfig::default()
        };
        let mut session = AnalysisSession::new(Some(2.0), config).unwrap();
        for _ in 0..3 {
            session
                .process_frame(Ok(DetectionResult::new(vec![person()])))
                .unwrap();
        }
        let report = session.finish();
        let times: Vec<&str> = report.alerts.iter().map(|a| a.time.as_str()).collect();
        assert_eq!(times, vec!["00:00", "00:01", "00:01"]);
        assert!(report
            .alerts
            .iter()
            .all(|a| a.kind == AlertKind::UnusualActivity));
        assert_eq!(report.frames_processed, 3);
    }
}
