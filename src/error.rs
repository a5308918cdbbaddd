use thiserror::Error;

/// Errors raised by the analysis core.
///
/// Plumbing failures (decode, I/O, SQLite) travel as `anyhow::Error`;
/// these variants are the ones callers are expected to match on.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    /// Frame rate missing, zero or not finite. Fatal before the first frame.
    #[error("invalid video metadata: {0}")]
    InvalidVideoMetadata(String),

    /// The detection adapter failed for one frame. Recovered by skipping that frame.
    #[error("detection adapter failed on frame {frame_index}: {reason}")]
    DetectionAdapterFailure { frame_index: u64, reason: String },

    /// A sample arrived for an earlier frame than the track's last sample.
    #[error("out-of-order sample for track {key}: frame {got} after frame {last}")]
    OutOfOrderSample { key: String, last: u64, got: u64 },
}
