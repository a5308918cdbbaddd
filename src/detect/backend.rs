use anyhow::Result;

use crate::detect::result::DetectionResult;
use crate::frame::InferenceView;

/// What a backend can produce.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionCapability {
    /// Labelled bounding boxes per frame.
    ObjectDetection,
    /// Whole-frame class scores only.
    Classification,
}

/// Detection adapter.
///
/// The analysis core treats a backend as a black box: one call per frame,
/// returning labelled boxes in the backend's own order. An `Err` for a
/// frame is recovered by the session (the frame is skipped), so backends
/// should fail per frame rather than panic.
pub trait DetectorBackend: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn supports(&self, capability: DetectionCapability) -> bool;

    /// Labelled boxes for one frame, in the backend's own order.
    ///
    /// The pixel buffer behind `view` is only valid for this call.
    fn detect(&mut self, view: &InferenceView<'_>) -> Result<DetectionResult>;

    /// Called once before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
