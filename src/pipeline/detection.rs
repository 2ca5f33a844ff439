use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use super::{
    hands::{HandTracker, HandsOptions, HandsResults},
    skeleton::{self, OverlaySurface},
};
use crate::{
    error::CaptureError,
    types::{
        AnchorSnapshot, DetectionUpdate, Frame, FrameSize, Landmark, LandmarkSet, PoseAnchors,
        or_zero,
    },
};

/// Surface size used when a frame carries no resolution.
pub const DEFAULT_SURFACE_SIZE: FrameSize = FrameSize::new(640, 480);

/// Single-slot channel for detection updates. Publishing into a full slot
/// replaces the pending update, so the reader always sees the newest one.
pub fn latest_value_channel() -> (UpdatePublisher, Receiver<DetectionUpdate>) {
    let (tx, rx) = bounded(1);
    let publisher = UpdatePublisher {
        tx,
        stale: rx.clone(),
    };
    (publisher, rx)
}

#[derive(Clone, Debug)]
pub struct UpdatePublisher {
    tx: Sender<DetectionUpdate>,
    stale: Receiver<DetectionUpdate>,
}

impl UpdatePublisher {
    pub fn publish(&self, mut update: DetectionUpdate) {
        loop {
            match self.tx.try_send(update) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => return,
                Err(TrySendError::Full(pending)) => {
                    // Evict the unread update; the reader may have taken it already.
                    let _ = self.stale.try_recv();
                    update = pending;
                }
            }
        }
    }
}

/// Sole owner of the hand runtime and of the current landmark state.
pub struct DetectionBridge<T: HandTracker> {
    tracker: T,
    landmarks: LandmarkSet,
    pose_anchors: Option<PoseAnchors>,
    surface: OverlaySurface,
    default_size: FrameSize,
    updates: UpdatePublisher,
}

impl<T: HandTracker> DetectionBridge<T> {
    pub fn configure(
        mut tracker: T,
        options: &HandsOptions,
        default_size: FrameSize,
        updates: UpdatePublisher,
    ) -> Result<Self, CaptureError> {
        options
            .validate()
            .and_then(|()| tracker.set_options(options))
            .map_err(CaptureError::RuntimeInit)?;
        log::info!(
            "hand runtime configured: max_hands={} complexity={} detection>={} tracking>={}",
            options.max_num_hands,
            options.model_complexity,
            options.min_detection_confidence,
            options.min_tracking_confidence
        );

        Ok(Self {
            tracker,
            landmarks: Vec::new(),
            pose_anchors: None,
            surface: OverlaySurface::new(default_size),
            default_size,
            updates,
        })
    }

    #[cfg(test)]
    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    #[cfg(test)]
    pub fn pose_anchors(&self) -> Option<PoseAnchors> {
        self.pose_anchors
    }

    #[cfg(test)]
    pub fn surface(&self) -> &OverlaySurface {
        &self.surface
    }

    pub fn process_frame(&mut self, frame: Frame) -> Result<(), CaptureError> {
        let results = self
            .tracker
            .process(&frame)
            .map_err(|err| CaptureError::FramePipeline(format!("{err:#}")))?;
        self.on_results(frame, results);
        Ok(())
    }

    pub fn on_results(&mut self, frame: Frame, results: HandsResults) {
        self.surface
            .resize(frame.size().unwrap_or(self.default_size));

        self.landmarks = flatten_hands(&results);
        // With no hands the previous anchors stay in place on purpose.
        if results.hand_count() > 0 {
            self.pose_anchors = Some(PoseAnchors::from_landmarks(&self.landmarks));
        }

        skeleton::draw_landmarks(&mut self.surface, &self.landmarks);

        let update = DetectionUpdate {
            frame,
            overlay: self.surface.clone(),
            landmarks: self.landmarks.clone(),
            pose_anchors: AnchorSnapshot(self.pose_anchors),
        };
        self.updates.publish(update);
    }

    pub fn spawn(self, frame_rx: Receiver<Frame>) -> thread::JoinHandle<()> {
        thread::spawn(move || self.run(frame_rx))
    }

    fn run(mut self, frame_rx: Receiver<Frame>) {
        while let Some(frame) = recv_latest_frame(&frame_rx) {
            if let Err(err) = self.process_frame(frame) {
                log::warn!("{err}");
            }
        }
        log::info!("frame stream closed, detection worker exiting");
    }
}

fn flatten_hands(results: &HandsResults) -> LandmarkSet {
    results
        .multi_hand_landmarks
        .iter()
        .flatten()
        .flat_map(|hand| {
            hand.iter().enumerate().map(|(id, point)| Landmark {
                id,
                x: point.x,
                y: point.y,
                z: point.z.map_or(0.0, or_zero),
                visibility: 1.0,
            })
        })
        .collect()
}

fn recv_latest_frame(frame_rx: &Receiver<Frame>) -> Option<Frame> {
    let mut frame = frame_rx.recv().ok()?;
    while let Ok(newer) = frame_rx.try_recv() {
        frame = newer;
    }
    Some(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::hands::NativePoint;
    use crate::types::AnchorPoint;
    use anyhow::anyhow;
    use crossbeam_channel::unbounded;
    use std::time::Instant;

    /// Results are pushed straight into `on_results`; the runtime is idle.
    struct IdleTracker;

    impl HandTracker for IdleTracker {
        fn set_options(&mut self, _: &HandsOptions) -> anyhow::Result<()> {
            Ok(())
        }

        fn process(&mut self, _: &Frame) -> anyhow::Result<HandsResults> {
            Ok(HandsResults::default())
        }
    }

    fn hand(offset: f32) -> Vec<NativePoint> {
        (0..21)
            .map(|i| NativePoint {
                x: offset + i as f32 / 100.0,
                y: 0.5,
                z: if i % 2 == 0 { Some(-0.1) } else { None },
            })
            .collect()
    }

    fn hands(list: Vec<Vec<NativePoint>>) -> HandsResults {
        HandsResults {
            multi_hand_landmarks: Some(list),
        }
    }

    fn frame(width: u32, height: u32) -> Frame {
        Frame {
            rgba: vec![0; (width * height * 4) as usize],
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    fn bridge() -> (DetectionBridge<IdleTracker>, Receiver<DetectionUpdate>) {
        let (tx, rx) = latest_value_channel();
        let bridge =
            DetectionBridge::configure(IdleTracker, &HandsOptions::default(), DEFAULT_SURFACE_SIZE, tx)
                .unwrap();
        (bridge, rx)
    }

    #[test]
    fn hands_are_flattened_hand_major() {
        let (mut bridge, rx) = bridge();
        bridge.on_results(frame(32, 24), hands(vec![hand(0.0), hand(0.5)]));

        let landmarks = bridge.landmarks();
        assert_eq!(landmarks.len(), 42);
        assert_eq!(landmarks[20].id, 20);
        assert_eq!(landmarks[21].id, 0);
        assert_eq!(landmarks[21].x, 0.5);
        assert_eq!(landmarks[1].z, 0.0);
        assert_eq!(landmarks[2].z, -0.1);
        assert!(landmarks.iter().all(|lm| lm.visibility == 1.0));

        let update = rx.try_recv().unwrap();
        assert_eq!(update.landmarks.len(), 42);
    }

    #[test]
    fn zero_hands_empty_landmarks_but_keep_anchors() {
        let (mut bridge, _rx) = bridge();
        bridge.on_results(frame(32, 24), hands(vec![hand(0.0)]));
        let anchors = bridge.pose_anchors().unwrap();
        assert_eq!(anchors.left_shoulder.x, 0.11);

        bridge.on_results(frame(32, 24), hands(Vec::new()));
        assert!(bridge.landmarks().is_empty());
        assert_eq!(bridge.pose_anchors(), Some(anchors));

        bridge.on_results(frame(32, 24), HandsResults::default());
        assert!(bridge.landmarks().is_empty());
        assert_eq!(bridge.pose_anchors(), Some(anchors));
    }

    #[test]
    fn short_hand_defaults_missing_anchors() {
        let (mut bridge, _rx) = bridge();
        let mut partial = hand(0.0);
        partial.truncate(4);
        bridge.on_results(frame(32, 24), hands(vec![partial]));

        let anchors = bridge.pose_anchors().unwrap();
        assert_eq!(anchors.nose, AnchorPoint { x: 0.0, y: 0.5 });
        assert_eq!(anchors.right_shoulder, AnchorPoint::default());
    }

    #[test]
    fn surface_follows_frame_size_with_default_fallback() {
        let (mut bridge, _rx) = bridge();
        bridge.on_results(frame(32, 24), HandsResults::default());
        assert_eq!((bridge.surface().width, bridge.surface().height), (32, 24));

        bridge.on_results(frame(0, 0), HandsResults::default());
        assert_eq!(
            (bridge.surface().width, bridge.surface().height),
            (DEFAULT_SURFACE_SIZE.width, DEFAULT_SURFACE_SIZE.height)
        );
    }

    #[test]
    fn busy_subscriber_sees_only_the_newest_update() {
        let (mut bridge, rx) = bridge();
        bridge.on_results(frame(8, 8), hands(vec![hand(0.0)]));
        bridge.on_results(frame(8, 8), hands(Vec::new()));

        assert!(rx.try_recv().unwrap().landmarks.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn publishing_after_the_reader_is_gone_is_a_noop() {
        let (tx, rx) = latest_value_channel();
        let mut bridge =
            DetectionBridge::configure(IdleTracker, &HandsOptions::default(), DEFAULT_SURFACE_SIZE, tx)
                .unwrap();
        drop(rx);
        bridge.on_results(frame(8, 8), hands(vec![hand(0.0)]));
        assert_eq!(bridge.landmarks().len(), 21);
    }

    #[test]
    fn nan_depth_is_reported_as_zero() {
        let (mut bridge, _rx) = bridge();
        let mut odd = hand(0.0);
        odd[3].z = Some(f32::NAN);
        bridge.on_results(frame(8, 8), hands(vec![odd]));
        assert_eq!(bridge.landmarks()[3].z, 0.0);
    }

    /// Fails on 1px frames, finds one hand otherwise.
    struct PickyTracker;

    impl HandTracker for PickyTracker {
        fn set_options(&mut self, _: &HandsOptions) -> anyhow::Result<()> {
            Ok(())
        }

        fn process(&mut self, frame: &Frame) -> anyhow::Result<HandsResults> {
            if frame.width == 1 {
                Err(anyhow!("inference blew up"))
            } else {
                Ok(hands(vec![hand(0.0)]))
            }
        }
    }

    #[test]
    fn worker_skips_failed_frames_and_exits_when_stream_closes() {
        let (update_tx, update_rx) = latest_value_channel();
        let bridge = DetectionBridge::configure(
            PickyTracker,
            &HandsOptions::default(),
            DEFAULT_SURFACE_SIZE,
            update_tx,
        )
        .unwrap();
        let (frame_tx, frame_rx) = unbounded();
        let worker = bridge.spawn(frame_rx);

        frame_tx.send(frame(1, 1)).unwrap();
        frame_tx.send(frame(8, 8)).unwrap();
        let update = update_rx.recv().unwrap();
        assert_eq!(update.landmarks.len(), 21);
        assert_eq!(update.frame.width, 8);

        drop(frame_tx);
        worker.join().unwrap();
    }

    #[test]
    fn invalid_options_fail_configuration() {
        let (tx, _rx) = latest_value_channel();
        let tracker = IdleTracker;
        let options = HandsOptions {
            min_tracking_confidence: 2.0,
            ..HandsOptions::default()
        };
        let result = DetectionBridge::configure(tracker, &options, DEFAULT_SURFACE_SIZE, tx);
        assert!(matches!(result, Err(CaptureError::RuntimeInit(_))));
    }
}
