use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates with `x1 < x2` and `y1 < y2`.
///
/// Serialized as `[x1, y1, x2, y2]`; deserialization rejects degenerate boxes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Result<Self> {
        if x1 >= x2 || y1 >= y2 {
            return Err(anyhow!(
                "bounding box [{}, {}, {}, {}] is empty or inverted",
                x1,
                y1,
                x2,
                y2
            ));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// Midpoint, rounded toward negative infinity.
    pub fn center(&self) -> (i32, i32) {
        (midpoint(self.x1, self.x2), midpoint(self.y1, self.y2))
    }

    pub fn width(&self) -> u32 {
        self.x2.abs_diff(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.abs_diff(self.y1)
    }
}

/// Floor of the mean of two coordinates; always fits back into `i32`.
fn midpoint(a: i32, b: i32) -> i32 {
    (i64::from(a) + i64::from(b)).div_euclid(2) as i32
}

impl TryFrom<[i32; 4]> for BoundingBox {
    type Error = anyhow::Error;

    fn try_from(value: [i32; 4]) -> Result<Self> {
        Self::new(value[0], value[1], value[2], value[3])
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// A single labelled box produced by a detector for one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl Detection {
    pub fn new(label: &str, bbox: BoundingBox) -> Self {
        Self {
            label: label.to_string(),
            bbox,
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Result of running detection on a frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    /// Detections in the order the adapter reported them.
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_uses_floor_division() {
        let b = BoundingBox::new(10, 20, 15, 31).unwrap();
        assert_eq!(b.center(), (12, 25));

        let negative = BoundingBox::new(-5, -5, 0, 0).unwrap();
        assert_eq!(negative.center(), (-3, -3));
    }

    #[test]
    fn extreme_boxes_do_not_overflow() {
        let far = BoundingBox::new(2_000_000_000, 0, 2_100_000_000, 10).unwrap();
        assert_eq!(far.center(), (2_050_000_000, 5));

        let full = BoundingBox::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX).unwrap();
        assert_eq!(full.center(), (-1, -1));
        assert_eq!(full.width(), u32::MAX);
        assert_eq!(full.height(), u32::MAX);
    }

    #[test]
    fn rejects_inverted_boxes() {
        assert!(BoundingBox::new(10, 10, 10, 20).is_err());
        assert!(BoundingBox::new(10, 30, 20, 20).is_err());
    }

    #[test]
    fn detection_json_uses_box_array() {
        let det: Detection =
            serde_json::from_str(r#"{"label": "person", "box": [1, 2, 11, 22]}"#).unwrap();
        assert_eq!(det.label, "person");
        assert_eq!(det.bbox, BoundingBox::new(1, 2, 11, 22).unwrap());
        assert_eq!(det.confidence, None);

        let bad = serde_json::from_str::<Detection>(r#"{"label": "person", "box": [5, 5, 1, 1]}"#);
        assert!(bad.is_err());
    }
}
