//! Boundary to the hand-tracking runtime.
//!
//! The runtime is opaque to the rest of the application: it is configured
//! once, then turns frames into zero or more hands of 21 native points.

mod common;
mod ort;
mod palm;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::types::Frame;

pub use self::ort::OrtHands;

pub const NUM_LANDMARKS: usize = 21;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandsOptions {
    pub max_num_hands: usize,
    /// 0 trades accuracy for speed, 1 is the full pipeline.
    pub model_complexity: u8,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl Default for HandsOptions {
    fn default() -> Self {
        Self {
            max_num_hands: 2,
            model_complexity: 1,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }
}

impl HandsOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_num_hands == 0 {
            return Err(anyhow!("max_num_hands must be at least 1"));
        }
        if self.model_complexity > 1 {
            return Err(anyhow!(
                "model_complexity must be 0 or 1, got {}",
                self.model_complexity
            ));
        }
        for (name, value) in [
            ("min_detection_confidence", self.min_detection_confidence),
            ("min_tracking_confidence", self.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{name} must lie in [0, 1], got {value}"));
            }
        }
        Ok(())
    }
}

/// A point as produced by the runtime, normalized to the frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NativePoint {
    pub x: f32,
    pub y: f32,
    pub z: Option<f32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HandsResults {
    pub multi_hand_landmarks: Option<Vec<Vec<NativePoint>>>,
}

impl HandsResults {
    pub fn hand_count(&self) -> usize {
        self.multi_hand_landmarks.as_ref().map_or(0, Vec::len)
    }
}

pub trait HandTracker: Send + 'static {
    fn set_options(&mut self, options: &HandsOptions) -> Result<()>;
    fn process(&mut self, frame: &Frame) -> Result<HandsResults>;
}
