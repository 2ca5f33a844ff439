use std::time::Instant;

use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::pipeline::skeleton::OverlaySurface;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    #[allow(dead_code)]
    pub timestamp: Instant,
}

impl Frame {
    /// Native resolution of the frame, if the capture reported one.
    pub fn size(&self) -> Option<FrameSize> {
        if self.width > 0 && self.height > 0 {
            Some(FrameSize::new(self.width, self.height))
        } else {
            None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// One tracked hand point as sent to the backend.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Landmark {
    pub id: usize,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
}

/// All detected hands flattened hand-major, point-minor. Hand boundaries are
/// not recorded.
pub type LandmarkSet = Vec<Landmark>;

pub const NOSE_INDEX: usize = 0;
pub const LEFT_SHOULDER_INDEX: usize = 11;
pub const RIGHT_SHOULDER_INDEX: usize = 12;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct AnchorPoint {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PoseAnchors {
    pub nose: AnchorPoint,
    pub left_shoulder: AnchorPoint,
    pub right_shoulder: AnchorPoint,
}

impl PoseAnchors {
    /// Reads the anchors at fixed indices 0/11/12. These indices only mean
    /// nose/shoulders for a body pose; for hands they are kept as-is because
    /// the backend expects this layout.
    pub fn from_landmarks(landmarks: &[Landmark]) -> Self {
        let at = |idx: usize| {
            landmarks
                .get(idx)
                .map(|lm| AnchorPoint {
                    x: or_zero(lm.x),
                    y: or_zero(lm.y),
                })
                .unwrap_or_default()
        };

        Self {
            nose: at(NOSE_INDEX),
            left_shoulder: at(LEFT_SHOULDER_INDEX),
            right_shoulder: at(RIGHT_SHOULDER_INDEX),
        }
    }
}

pub(crate) fn or_zero(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value }
}

/// Anchors as last computed, serialized as `{}` before the first hand.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AnchorSnapshot(pub Option<PoseAnchors>);

impl Serialize for AnchorSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.0 {
            Some(anchors) => anchors.serialize(serializer),
            None => serializer.serialize_map(Some(0))?.end(),
        }
    }
}

/// What the detection worker publishes after each runtime result.
#[derive(Clone, Debug)]
pub struct DetectionUpdate {
    pub frame: Frame,
    pub overlay: OverlaySurface,
    pub landmarks: LandmarkSet,
    pub pose_anchors: AnchorSnapshot,
}

/// Latest landmark state held by the UI thread.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    pub landmarks: LandmarkSet,
    pub pose_anchors: AnchorSnapshot,
}

impl AppState {
    pub fn apply(&mut self, update: &DetectionUpdate) {
        self.landmarks = update.landmarks.clone();
        self.pose_anchors = update.pose_anchors;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn landmark(id: usize, x: f32, y: f32) -> Landmark {
        Landmark {
            id,
            x,
            y,
            z: 0.0,
            visibility: 1.0,
        }
    }

    #[test]
    fn anchors_default_to_origin_when_index_missing() {
        let landmarks: Vec<_> = (0..5).map(|i| landmark(i, 0.1 * i as f32 + 0.1, 0.5)).collect();
        let anchors = PoseAnchors::from_landmarks(&landmarks);

        assert_eq!(anchors.nose, AnchorPoint { x: 0.1, y: 0.5 });
        assert_eq!(anchors.left_shoulder, AnchorPoint::default());
        assert_eq!(anchors.right_shoulder, AnchorPoint::default());
    }

    #[test]
    fn anchors_read_fixed_indices() {
        let landmarks: Vec<_> = (0..21).map(|i| landmark(i, i as f32 / 100.0, 0.25)).collect();
        let anchors = PoseAnchors::from_landmarks(&landmarks);

        assert_eq!(anchors.left_shoulder.x, 0.11);
        assert_eq!(anchors.right_shoulder.x, 0.12);
    }

    #[test]
    fn missing_anchor_snapshot_serializes_as_empty_object() {
        let json = serde_json::to_value(AnchorSnapshot(None)).unwrap();
        assert_eq!(json, serde_json::json!({}));

        let json = serde_json::to_value(AnchorSnapshot(Some(PoseAnchors::default()))).unwrap();
        assert_eq!(json["nose"], serde_json::json!({"x": 0.0, "y": 0.0}));
    }

    #[test]
    fn zero_sized_frame_has_no_native_size() {
        let frame = Frame {
            rgba: Vec::new(),
            width: 0,
            height: 480,
            timestamp: Instant::now(),
        };
        assert_eq!(frame.size(), None);
    }
}
