//! Detector output filtering: score threshold, rescaling, top-k and NMS.

use std::cmp::Ordering;

use anyhow::Result;
use liveness_utils::config::DetectionSettings;
use tract_onnx::prelude::{Tensor, tract_ndarray::ArrayView2};

use crate::model::DETECTION_COLS;

/// Detector post-processing parameters.
#[derive(Debug, Clone)]
pub struct PostprocessConfig {
    /// Minimum confidence score for a detection to be kept.
    pub score_threshold: f32,
    /// IoU above which the lower-scored of two overlapping detections is dropped.
    pub nms_threshold: f32,
    /// Maximum number of detections kept after sorting by score (0 keeps all).
    pub top_k: usize,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        DetectionSettings::default().into()
    }
}

impl From<DetectionSettings> for PostprocessConfig {
    fn from(settings: DetectionSettings) -> Self {
        PostprocessConfig {
            score_threshold: settings.score_threshold,
            nms_threshold: settings.nms_threshold,
            top_k: settings.top_k,
        }
    }
}

impl From<&DetectionSettings> for PostprocessConfig {
    fn from(settings: &DetectionSettings) -> Self {
        settings.clone().into()
    }
}

/// Floating-point box in the coordinate space of the image handed to the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl DetectionBox {
    /// Area of the box; negative extents count as zero.
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &Self) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if intersection <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 { 0.0 } else { intersection / union }
    }
}

/// Facial landmark in the same coordinate space as its [`DetectionBox`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

/// One face candidate reported by a detector.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: DetectionBox,
    /// Right eye, left eye, nose tip, right mouth corner, left mouth corner.
    /// Backends without landmarks report zeros.
    pub landmarks: [Landmark; 5],
    /// Detector confidence.
    pub score: f32,
}

impl Detection {
    /// A candidate without landmark information.
    pub fn new(bbox: DetectionBox, score: f32) -> Self {
        Self {
            bbox,
            landmarks: [Landmark { x: 0.0, y: 0.0 }; 5],
            score,
        }
    }
}

/// Turn raw detector rows into candidates.
///
/// Rows below `score_threshold` or with an empty box are dropped, coordinates
/// are multiplied by `scale_x`/`scale_y`, and the survivors are sorted by
/// descending score, truncated to `top_k`, and suppressed with NMS.
pub fn apply_postprocess(
    output: &Tensor,
    scale_x: f32,
    scale_y: f32,
    config: &PostprocessConfig,
) -> Result<Vec<Detection>> {
    let rows = detection_rows(output)?;

    let mut detections: Vec<Detection> = rows
        .rows()
        .into_iter()
        .filter_map(|row| {
            let score = row[14];
            if !score.is_finite() || score < config.score_threshold {
                return None;
            }
            let bbox = DetectionBox {
                x: row[0] * scale_x,
                y: row[1] * scale_y,
                width: row[2] * scale_x,
                height: row[3] * scale_y,
            };
            if bbox.width <= 0.0 || bbox.height <= 0.0 {
                return None;
            }
            let landmarks = std::array::from_fn(|i| Landmark {
                x: row[4 + i * 2] * scale_x,
                y: row[5 + i * 2] * scale_y,
            });
            Some(Detection {
                bbox,
                landmarks,
                score,
            })
        })
        .collect();

    // Stable sort keeps the detector's order among equal scores.
    detections.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    if config.top_k > 0 {
        detections.truncate(config.top_k);
    }
    if config.nms_threshold > 0.0 && detections.len() > 1 {
        detections = non_max_suppression(detections, config.nms_threshold);
    }
    Ok(detections)
}

fn detection_rows(output: &Tensor) -> Result<ArrayView2<'_, f32>> {
    let rows = match output.shape() {
        [rows, DETECTION_COLS] | [1, rows, DETECTION_COLS] => *rows,
        other => anyhow::bail!(
            "detector output must have shape [N, {DETECTION_COLS}] or [1, N, {DETECTION_COLS}] (got {other:?})"
        ),
    };
    let slice = output
        .as_slice::<f32>()
        .map_err(|e| anyhow::anyhow!("detector output is not f32: {e}"))?;
    ArrayView2::from_shape((rows, DETECTION_COLS), slice)
        .map_err(|_| anyhow::anyhow!("detector output data is not contiguous"))
}

fn non_max_suppression(detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for detection in detections {
        if kept
            .iter()
            .all(|other| detection.bbox.iou(&other.bbox) <= threshold)
        {
            kept.push(detection);
        }
    }
    kept
}
