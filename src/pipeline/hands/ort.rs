use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    HandTracker, HandsOptions, HandsResults,
    common::{HANDPOSE_INPUT_SIZE, crop_tensor},
    palm::PalmDetector,
};
use crate::{model_download::ModelFiles, types::Frame};

/// ONNX Runtime running the MediaPipe palm detector followed by the handpose
/// estimator on each detected palm.
pub struct OrtHands {
    handpose: Session,
    palm_detector: PalmDetector,
    options: HandsOptions,
}

fn session_tuning(model_complexity: u8) -> (GraphOptimizationLevel, usize) {
    match model_complexity {
        0 => (GraphOptimizationLevel::Level1, 1),
        _ => (GraphOptimizationLevel::Level3, 2),
    }
}

impl OrtHands {
    pub fn load(models: &ModelFiles, options: &HandsOptions) -> Result<Self> {
        options.validate()?;
        let (optimization, threads) = session_tuning(options.model_complexity);

        let handpose = load_session(&models.handpose_estimator, optimization, threads)?;
        // GraphOptimizationLevel is not Clone; re-derive it for the second session.
        let (palm_optimization, _) = session_tuning(options.model_complexity);
        let palm_detector = PalmDetector::new(&models.palm_detector, palm_optimization, threads)?;
        log::info!(
            "hand runtime ready using {} and {}",
            models.handpose_estimator.display(),
            models.palm_detector.display()
        );

        Ok(Self {
            handpose,
            palm_detector,
            options: options.clone(),
        })
    }
}

fn load_session(path: &Path, optimization: GraphOptimizationLevel, threads: usize) -> Result<Session> {
    Session::builder()?
        .with_optimization_level(optimization)?
        .with_intra_threads(threads)?
        .commit_from_file(path)
        .with_context(|| format!("failed to load ORT session from {}", path.display()))
}

impl HandTracker for OrtHands {
    fn set_options(&mut self, options: &HandsOptions) -> Result<()> {
        options.validate()?;
        if options.model_complexity != self.options.model_complexity {
            log::warn!(
                "model_complexity {} only applies when the runtime is loaded; keeping {}",
                options.model_complexity,
                self.options.model_complexity
            );
        }
        self.options = HandsOptions {
            model_complexity: self.options.model_complexity,
            ..options.clone()
        };
        Ok(())
    }

    fn process(&mut self, frame: &Frame) -> Result<HandsResults> {
        let palms = self.palm_detector.detect(
            frame,
            self.options.min_detection_confidence,
            self.options.max_num_hands,
        )?;

        let mut hands = Vec::with_capacity(palms.len());
        for palm in &palms {
            let crop = palm.hand_crop(frame.width, frame.height);
            let input = crop_tensor(frame, &crop, HANDPOSE_INPUT_SIZE)?;
            let outputs = self
                .handpose
                .run(ort::inputs![Tensor::from_array(input)?])
                .context("failed to run handpose session")?;
            if outputs.len() < 1 {
                return Err(anyhow!("handpose model returned no outputs"));
            }

            let presence = if outputs.len() > 1 {
                outputs[1]
                    .try_extract_array::<f32>()
                    .ok()
                    .and_then(|arr| arr.iter().next().copied())
                    .unwrap_or(0.0)
            } else {
                1.0
            };
            if presence < self.options.min_tracking_confidence {
                log::debug!("dropping hand with presence {presence:.2}");
                continue;
            }

            let coords = outputs[0].try_extract_array::<f32>()?;
            let flattened: Vec<f32> = coords.iter().copied().collect();
            hands.push(crop.project(&flattened, HANDPOSE_INPUT_SIZE)?);
        }

        Ok(HandsResults {
            multi_hand_landmarks: Some(hands),
        })
    }
}
