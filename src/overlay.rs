//! Annotated frame output.
//!
//! Boxes are drawn green for ordinary detections and red for loitering or
//! abandoned objects. A red strip along the top edge marks frames where
//! unusual activity fired.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};

use crate::detect::BoundingBox;
use crate::frame::RawFrame;
use crate::session::{FrameReport, FrameSink};

pub const NORMAL_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const ALERT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const BOX_THICKNESS: u32 = 2;
pub const BANNER_HEIGHT: u32 = 8;

/// Clamp a detection box to pixel coordinates inside a `width` x `height` image.
pub fn clamp_box(bbox: &BoundingBox, dims: (u32, u32)) -> Option<[u32; 4]> {
    let (w, h) = dims;
    if w == 0 || h == 0 {
        return None;
    }
    if bbox.x2 < 0 || bbox.y2 < 0 || bbox.x1 >= w as i32 || bbox.y1 >= h as i32 {
        return None;
    }
    let clamp = |v: i32, max: u32| -> u32 { v.clamp(0, max as i32 - 1) as u32 };
    Some([
        clamp(bbox.x1, w),
        clamp(bbox.y1, h),
        clamp(bbox.x2, w),
        clamp(bbox.y2, h),
    ])
}

/// Draw a rectangle border with given thickness.
pub fn draw_rect(img: &mut RgbImage, bbox_px: [u32; 4], color: Rgb<u8>, thickness: u32) {
    let (w, h) = img.dimensions();
    let [x0, y0, x1, y1] = bbox_px;
    for t in 0..thickness {
        let xx0 = x0.saturating_add(t);
        let yy0 = y0.saturating_add(t);
        let xx1 = x1.saturating_sub(t);
        let yy1 = y1.saturating_sub(t);
        if xx0 >= w || yy0 >= h || xx1 >= w || yy1 >= h || xx0 > xx1 || yy0 > yy1 {
            continue;
        }
        for x in xx0..=xx1 {
            img.put_pixel(x, yy0, color);
            img.put_pixel(x, yy1, color);
        }
        for y in yy0..=yy1 {
            img.put_pixel(xx0, y, color);
            img.put_pixel(xx1, y, color);
        }
    }
}

fn draw_banner(img: &mut RgbImage, color: Rgb<u8>) {
    let (w, h) = img.dimensions();
    for y in 0..BANNER_HEIGHT.min(h) {
        for x in 0..w {
            img.put_pixel(x, y, color);
        }
    }
}

pub const UNUSUAL_ACTIVITY_CAPTION: &str = "Unusual Activity";

/// Captions for a frame's alert boxes, plus the banner caption when unusual
/// activity fired. Frames are rendered without glyphs, so these go to the log.
pub fn alert_captions(report: &FrameReport) -> Vec<&str> {
    let mut captions: Vec<&str> = report
        .annotations
        .iter()
        .filter(|a| a.is_alert())
        .map(|a| a.caption())
        .collect();
    if report.unusual_activity {
        captions.push(UNUSUAL_ACTIVITY_CAPTION);
    }
    captions
}

/// Paint a frame report's annotations onto `img`.
pub fn render_annotations(img: &mut RgbImage, report: &FrameReport) {
    let dims = img.dimensions();
    for annotation in &report.annotations {
        let Some(px) = clamp_box(&annotation.bbox, dims) else {
            continue;
        };
        let color = if annotation.is_alert() {
            ALERT_COLOR
        } else {
            NORMAL_COLOR
        };
        draw_rect(img, px, color, BOX_THICKNESS);
    }
    if report.unusual_activity {
        draw_banner(img, ALERT_COLOR);
    }
}

/// Writes every frame with its annotations as `frame_NNNNNN.png`.
pub struct AnnotatedFrameWriter {
    dir: PathBuf,
    written: u64,
}

impl AnnotatedFrameWriter {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create annotated frame dir {}", dir.display()))?;
        Ok(Self { dir, written: 0 })
    }

    pub fn frame_path(&self, frame_index: u64) -> PathBuf {
        self.dir.join(format!("frame_{:06}.png", frame_index))
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for AnnotatedFrameWriter {
    fn on_frame(&mut self, frame: &RawFrame, report: &FrameReport) -> Result<()> {
        let mut img = frame.to_rgb_image()?;
        render_annotations(&mut img, report);
        let path = self.frame_path(report.frame_index);
        img.save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        let captions = alert_captions(report);
        if !captions.is_empty() {
            log::debug!("{} [{}]: {}", path.display(), report.timestamp, captions.join(", "));
        }
        self.written += 1;
        Ok(())
    }
}
