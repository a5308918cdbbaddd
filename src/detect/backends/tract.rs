#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::labels::{coco_label, COCO_CLASSES};
use crate::detect::result::{BoundingBox, Detection, DetectionResult};
use crate::frame::InferenceView;

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract-based backend for YOLOv8-style ONNX detectors.
///
/// Expects a `[1, 3, H, W]` float input and a `[1, 4 + classes, anchors]`
/// output of center/size boxes followed by per-class scores. Frames are
/// resized to the model input and boxes are scaled back to frame pixels.
pub struct TractBackend {
    model: OnnxPlan,
    input_width: u32,
    input_height: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    class_id: usize,
    score: f32,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_width: u32, input_height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_height as usize, input_width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_width,
            input_height,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    fn build_input(&self, view: &InferenceView<'_>) -> Result<Tensor> {
        let frame = RgbImage::from_raw(view.width(), view.height(), view.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", view.width(), view.height()))?;
        let resized = image::imageops::resize(
            &frame,
            self.input_width,
            self.input_height,
            FilterType::Triangle,
        );

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.input_height as usize, self.input_width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, frame_w: u32, frame_h: u32) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = scores.shape();
        if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }
        let class_count = (shape[1] - 4).min(COCO_CLASSES.len());
        let anchors = shape[2];
        let sx = frame_w as f32 / self.input_width as f32;
        let sy = frame_h as f32 / self.input_height as f32;

        let mut candidates = Vec::new();
        for i in 0..anchors {
            let mut best_class = 0;
            let mut best_score = f32::NEG_INFINITY;
            for class_id in 0..class_count {
                let score = scores[&[0, 4 + class_id, i][..]];
                if score > best_score {
                    best_score = score;
                    best_class = class_id;
                }
            }
            if best_score < self.confidence_threshold {
                continue;
            }
            let cx = scores[&[0, 0, i][..]] * sx;
            let cy = scores[&[0, 1, i][..]] * sy;
            let w = scores[&[0, 2, i][..]] * sx;
            let h = scores[&[0, 3, i][..]] * sy;
            candidates.push(Candidate {
                class_id: best_class,
                score: best_score,
                x1: (cx - w / 2.0).clamp(0.0, frame_w as f32),
                y1: (cy - h / 2.0).clamp(0.0, frame_h as f32),
                x2: (cx + w / 2.0).clamp(0.0, frame_w as f32),
                y2: (cy + h / 2.0).clamp(0.0, frame_h as f32),
            });
        }

        let kept = non_max_suppression(candidates, self.iou_threshold);
        Ok(kept
            .into_iter()
            .filter_map(|c| {
                let label = coco_label(c.class_id)?;
                let bbox = BoundingBox::new(
                    c.x1.round() as i32,
                    c.y1.round() as i32,
                    c.x2.round() as i32,
                    c.y2.round() as i32,
                )
                .ok()?;
                Some(Detection::new(label, bbox).with_confidence(c.score))
            })
            .collect())
    }
}

fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = ix * iy;
    let union = (a.x2 - a.x1) * (a.y2 - a.y1) + (b.x2 - b.x1) * (b.y2 - b.y1) - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Greedy per-class NMS, highest score first.
fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Candidate> = Vec::new();
    for cand in candidates {
        let overlaps = kept
            .iter()
            .any(|k| k.class_id == cand.class_id && iou(k, &cand) > iou_threshold);
        if !overlaps {
            kept.push(cand);
        }
    }
    kept
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(capability, DetectionCapability::ObjectDetection)
    }

    fn detect(&mut self, view: &InferenceView<'_>) -> Result<DetectionResult> {
        let input = self.build_input(view)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let detections = self.decode(outputs, view.width(), view.height())?;
        Ok(DetectionResult::new(detections))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(class_id: usize, score: f32, x1: f32) -> Candidate {
        Candidate {
            class_id,
            score,
            x1,
            y1: 0.0,
            x2: x1 + 10.0,
            y2: 10.0,
        }
    }

    #[test]
    fn nms_keeps_best_overlapping_box_per_class() {
        let kept = non_max_suppression(
            vec![cand(0, 0.6, 1.0), cand(0, 0.9, 0.0), cand(24, 0.5, 0.0)],
            0.45,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].class_id, 24);
    }
}
