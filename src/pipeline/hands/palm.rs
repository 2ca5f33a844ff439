use std::{cmp::Ordering, f32::consts::PI, path::Path};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::common::{HandCrop, Letterbox, PALM_INPUT_SIZE, letterbox_tensor};
use crate::types::Frame;

const PALM_KEYPOINTS: usize = 7;
const NMS_THRESHOLD: f32 = 0.3;
/// Palm boxes are widened this much so the fingers stay inside the crop.
const CROP_EXPANSION: f32 = 2.6;
const MIN_CROP_SIDE: f32 = 64.0;

/// A detected palm in frame pixels.
#[derive(Clone, Debug)]
pub struct PalmRegion {
    pub bbox: [f32; 4],
    pub keypoints: Vec<(f32, f32)>,
    pub score: f32,
}

pub struct PalmDetector {
    session: Session,
    anchors: Vec<[f32; 2]>,
}

impl PalmDetector {
    pub fn new(model_path: &Path, optimization: GraphOptimizationLevel, threads: usize) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(optimization)?
            .with_intra_threads(threads)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load palm detector from {}", model_path.display()))?;

        Ok(Self {
            session,
            anchors: generate_anchors(PALM_INPUT_SIZE),
        })
    }

    pub fn detect(&mut self, frame: &Frame, min_score: f32, max_regions: usize) -> Result<Vec<PalmRegion>> {
        let (input, letterbox) = letterbox_tensor(frame, PALM_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run palm detector session")?;
        if outputs.len() < 2 {
            return Err(anyhow!(
                "palm detector returned {} outputs, expected 2",
                outputs.len()
            ));
        }

        let boxes = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let feature_dim = *boxes
            .shape()
            .last()
            .ok_or_else(|| anyhow!("palm box output has no dimensions"))?;

        let candidates = decode_regions(
            boxes
                .as_slice()
                .ok_or_else(|| anyhow!("palm boxes not contiguous"))?,
            feature_dim,
            scores
                .as_slice()
                .ok_or_else(|| anyhow!("palm scores not contiguous"))?,
            &self.anchors,
            &letterbox,
            min_score,
        )?;

        Ok(suppress(candidates, NMS_THRESHOLD, max_regions))
    }
}

/// SSD anchor centers for the 192px palm model: one stride-8 layer and three
/// stride-16 layers, two anchors per cell each.
fn generate_anchors(input_size: u32) -> Vec<[f32; 2]> {
    let mut anchors = Vec::new();
    for (stride, per_cell) in [(8u32, 2usize), (16, 6)] {
        let cells = input_size.div_ceil(stride);
        for y in 0..cells {
            for x in 0..cells {
                let center = [
                    (x as f32 + 0.5) / cells as f32,
                    (y as f32 + 0.5) / cells as f32,
                ];
                anchors.extend(std::iter::repeat_n(center, per_cell));
            }
        }
    }
    anchors
}

fn decode_regions(
    boxes: &[f32],
    feature_dim: usize,
    scores: &[f32],
    anchors: &[[f32; 2]],
    letterbox: &Letterbox,
    min_score: f32,
) -> Result<Vec<PalmRegion>> {
    if feature_dim < 4 + PALM_KEYPOINTS * 2 {
        return Err(anyhow!("palm box feature dimension too small: {feature_dim}"));
    }

    let input = PALM_INPUT_SIZE as f32;
    let scale = letterbox.orig_w.max(letterbox.orig_h) as f32;
    let bias_x = letterbox.pad_x / letterbox.scale;
    let bias_y = letterbox.pad_y / letterbox.scale;
    let to_frame = |nx: f32, ny: f32| (nx * scale - bias_x, ny * scale - bias_y);
    let max_x = letterbox.orig_w.saturating_sub(1) as f32;
    let max_y = letterbox.orig_h.saturating_sub(1) as f32;

    let mut regions = Vec::new();
    for ((raw_score, features), anchor) in scores
        .iter()
        .zip(boxes.chunks_exact(feature_dim))
        .zip(anchors)
    {
        let score = sigmoid(*raw_score);
        if score < min_score {
            continue;
        }

        let cx = features[0] / input + anchor[0];
        let cy = features[1] / input + anchor[1];
        let hw = features[2] / input / 2.0;
        let hh = features[3] / input / 2.0;
        let (x1, y1) = to_frame(cx - hw, cy - hh);
        let (x2, y2) = to_frame(cx + hw, cy + hh);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        let keypoints = features[4..4 + PALM_KEYPOINTS * 2]
            .chunks_exact(2)
            .map(|kp| to_frame(kp[0] / input + anchor[0], kp[1] / input + anchor[1]))
            .collect();

        regions.push(PalmRegion {
            bbox: [
                x1.clamp(0.0, max_x),
                y1.clamp(0.0, max_y),
                x2.clamp(0.0, max_x),
                y2.clamp(0.0, max_y),
            ],
            keypoints,
            score,
        });
    }

    Ok(regions)
}

fn suppress(mut candidates: Vec<PalmRegion>, threshold: f32, limit: usize) -> Vec<PalmRegion> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut kept: Vec<PalmRegion> = Vec::new();
    for candidate in candidates {
        if kept.len() >= limit {
            break;
        }
        if kept.iter().all(|k| iou(&k.bbox, &candidate.bbox) < threshold) {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }

    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

impl PalmRegion {
    /// Square crop around the palm, rotated so the wrist-to-middle-finger
    /// axis (keypoints 0 and 2) points up.
    pub fn hand_crop(&self, orig_w: u32, orig_h: u32) -> HandCrop {
        let center = (
            (self.bbox[0] + self.bbox[2]) * 0.5,
            (self.bbox[1] + self.bbox[3]) * 0.5,
        );
        let side = (self.bbox[2] - self.bbox[0])
            .max(self.bbox[3] - self.bbox[1])
            .max(MIN_CROP_SIDE)
            * CROP_EXPANSION;

        let angle = match (self.keypoints.first(), self.keypoints.get(2)) {
            (Some(wrist), Some(middle)) => {
                let (dx, dy) = (middle.0 - wrist.0, middle.1 - wrist.1);
                dy.atan2(dx) + PI * 0.5
            }
            _ => 0.0,
        };

        HandCrop {
            center,
            side,
            angle,
            orig_w,
            orig_h,
        }
    }
}
