//! Watchpost: offline event analysis for surveillance video.
//!
//! A video is read frame by frame, each frame is handed to an object
//! detector, and the detections are folded into per-label position tracks.
//! Three heuristics run over those tracks:
//!
//! 1. **Loitering**: a watched label whose recent centers all stay within a
//!    small radius of where the window started.
//! 2. **Object abandonment**: a watched object label seen for more frames
//!    than a duration threshold.
//! 3. **Unusual activity**: more detections in one frame than a crowd
//!    threshold.
//!
//! Every alert is stamped with the video time ("MM:SS") of the frame it
//! fired on and appended to the run's alert log, which is exported as a
//! two-column `Time,Alert` table.
//!
//! # Module Structure
//!
//! - `ingest`: Frame sources (local files, synthetic `stub://` sources)
//! - `frame`: Decoded frames and the read-only view detectors see
//! - `detect`: Detector backends (replayed detections, ONNX via tract)
//! - `track`: Per-label center histories
//! - `analysis`: The event heuristics
//! - `session`: The per-frame loop tying the pieces together
//! - `alert`, `export`, `storage`: The alert log and where it goes
//! - `overlay`: Annotated frame output

pub mod alert;
pub mod analysis;
pub mod config;
pub mod detect;
pub mod error;
pub mod export;
pub mod frame;
pub mod identity;
pub mod ingest;
pub mod overlay;
pub mod session;
pub mod storage;
pub mod track;

pub use alert::{Alert, AlertKind, AlertLog, AlertSpan};
pub use analysis::{
    Annotation, AnnotationStatus, EventDetector, FrameEvaluation, HeuristicConfig, TrackingMode,
};
pub use config::{AnalyzerConfig, OutputSettings};
pub use detect::{
    BoundingBox, Detection, DetectionCapability, DetectionResult, DetectorBackend, ReplayBackend,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use error::AnalysisError;
pub use export::{export_to_path, ExportFormat};
pub use frame::{InferenceView, RawFrame};
pub use ingest::{FileConfig, FileSource, FrameSource};
pub use overlay::AnnotatedFrameWriter;
pub use session::{
    format_mm_ss, AnalysisSession, FrameReport, FrameSink, SessionReport, SkippedFrame,
    VideoClock,
};
pub use storage::{AlertStore, InMemoryAlertStore, RunId, RunRecord, SqliteAlertStore};
pub use track::{Sample, TrackKey, TrackStore};
