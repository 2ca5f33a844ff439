use std::{
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::bounded;

use crate::{
    config::AppConfig,
    error::CaptureError,
    pipeline::{
        CameraAcquisition, CameraStream, CaptureBackend, DEFAULT_SURFACE_SIZE, DetectionBridge,
        FrameSink, HandTracker, HandsOptions, UpdatePublisher,
    },
    status::{NoticeBoard, StatusIndicator, StatusState},
    types::FrameSize,
};

pub const LOADING_MESSAGE: &str = "Loading libraries...";
pub const RUNTIME_TIMEOUT_MESSAGE: &str = "Error: hand-tracking libraries did not load";
pub const RUNTIME_INIT_MESSAGE: &str = "Error initializing hand tracking";

/// Reports which pieces the hand runtime still needs before it can load.
pub trait RuntimeCheck {
    fn missing_entry_points(&self) -> Vec<&'static str>;
}

/// Polls `check` every `interval` until nothing is missing or `timeout`
/// elapses.
pub fn wait_for_runtime<P: RuntimeCheck>(
    check: &P,
    interval: Duration,
    timeout: Duration,
) -> Result<(), CaptureError> {
    let started = Instant::now();
    loop {
        let missing = check.missing_entry_points();
        if missing.is_empty() {
            log::info!("hand runtime available after {:?}", started.elapsed());
            return Ok(());
        }

        let elapsed = started.elapsed();
        if elapsed >= timeout {
            log::error!("hand runtime still missing {missing:?} after {timeout:?}");
            return Err(CaptureError::LibraryLoadTimeout(timeout));
        }
        thread::sleep(interval.min(timeout - elapsed));
    }
}

/// Everything kept alive while the camera is running.
pub struct Session {
    camera: Option<CameraStream>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Session {
    fn shutdown(&mut self) {
        // The worker exits once the camera drops the last frame sender.
        if let Some(camera) = self.camera.take() {
            camera.stop();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub struct AppBootstrap<P, B> {
    check: P,
    backend: B,
    options: HandsOptions,
    target: FrameSize,
    refresh_interval: Duration,
    poll_interval: Duration,
    load_timeout: Duration,
    status: StatusIndicator,
    notices: NoticeBoard,
    updates: UpdatePublisher,
}

impl<P: RuntimeCheck, B: CaptureBackend> AppBootstrap<P, B> {
    pub fn new(
        config: &AppConfig,
        check: P,
        backend: B,
        status: StatusIndicator,
        notices: NoticeBoard,
        updates: UpdatePublisher,
    ) -> Self {
        Self {
            check,
            backend,
            options: config.hands.clone(),
            target: config.camera.target(),
            refresh_interval: config.camera.refresh_interval(),
            poll_interval: config.runtime.poll_interval(),
            load_timeout: config.runtime.load_timeout(),
            status,
            notices,
            updates,
        }
    }

    /// Waits for the runtime, loads it with `load_tracker` and starts the
    /// camera. Every failure is reported through the status indicator before
    /// it is returned.
    pub fn run<T, L>(self, load_tracker: L) -> Result<Session, CaptureError>
    where
        T: HandTracker,
        L: FnOnce(&HandsOptions) -> anyhow::Result<T>,
    {
        self.status
            .set_status(Some(StatusState::Loading), LOADING_MESSAGE);

        if let Err(err) = wait_for_runtime(&self.check, self.poll_interval, self.load_timeout) {
            self.status
                .set_status(Some(StatusState::Error), RUNTIME_TIMEOUT_MESSAGE);
            return Err(err);
        }

        let bridge = load_tracker(&self.options)
            .map_err(CaptureError::RuntimeInit)
            .and_then(|tracker| {
                DetectionBridge::configure(
                    tracker,
                    &self.options,
                    DEFAULT_SURFACE_SIZE,
                    self.updates.clone(),
                )
            });
        let bridge = match bridge {
            Ok(bridge) => bridge,
            Err(err) => {
                log::error!("{err}");
                self.status
                    .set_status(Some(StatusState::Error), RUNTIME_INIT_MESSAGE);
                return Err(err);
            }
        };

        let (frame_tx, frame_rx) = bounded(1);
        let worker = bridge.spawn(frame_rx);

        let mut acquisition = CameraAcquisition::new(
            self.backend,
            self.target,
            self.refresh_interval,
            self.status,
            self.notices,
        );
        match acquisition.start(FrameSink::new(frame_tx)) {
            Ok(camera) => Ok(Session {
                camera: Some(camera),
                worker: Some(worker),
            }),
            Err(err) => {
                // All frame senders are gone, so the worker is already winding down.
                let _ = worker.join();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pipeline::{
            camera::{FrameCallback, FrameSource, READY_MESSAGE},
            hands::HandsResults,
            latest_value_channel,
        },
        status::StatusUpdate,
        types::Frame,
    };
    use anyhow::anyhow;
    use crossbeam_channel::{Receiver, unbounded};
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    /// Reports the runtime missing for the first `misses` polls.
    struct CountdownCheck {
        misses: usize,
        polls: AtomicUsize,
    }

    impl CountdownCheck {
        fn new(misses: usize) -> Self {
            Self {
                misses,
                polls: AtomicUsize::new(0),
            }
        }
    }

    impl RuntimeCheck for CountdownCheck {
        fn missing_entry_points(&self) -> Vec<&'static str> {
            if self.polls.fetch_add(1, Ordering::SeqCst) < self.misses {
                vec!["palm.onnx"]
            } else {
                Vec::new()
            }
        }
    }

    struct NoHands;

    impl HandTracker for NoHands {
        fn set_options(&mut self, _: &HandsOptions) -> anyhow::Result<()> {
            Ok(())
        }

        fn process(&mut self, _: &Frame) -> anyhow::Result<HandsResults> {
            Ok(HandsResults::default())
        }
    }

    #[derive(Clone, Default)]
    struct CountingBackend {
        starts: Arc<AtomicUsize>,
    }

    struct NeverReads;

    impl FrameSource for NeverReads {
        fn next_frame(&mut self) -> anyhow::Result<Frame> {
            Err(anyhow!("unused"))
        }
    }

    impl CaptureBackend for CountingBackend {
        type Managed = ();
        type Direct = NeverReads;

        fn start_managed(&self, _: FrameSize, _: FrameCallback) -> anyhow::Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn open_direct(&self, _: FrameSize) -> anyhow::Result<NeverReads> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(NeverReads)
        }
    }

    fn fast_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.runtime.poll_interval_ms = 5;
        config.runtime.load_timeout_ms = 40;
        config
    }

    fn bootstrap(
        check: CountdownCheck,
        backend: CountingBackend,
    ) -> (AppBootstrap<CountdownCheck, CountingBackend>, Receiver<StatusUpdate>) {
        let (status_tx, status_rx) = unbounded();
        let (update_tx, _update_rx) = latest_value_channel();
        let bootstrap = AppBootstrap::new(
            &fast_config(),
            check,
            backend,
            StatusIndicator::new(status_tx),
            NoticeBoard::detached(),
            update_tx,
        );
        (bootstrap, status_rx)
    }

    fn messages(rx: &Receiver<StatusUpdate>) -> Vec<(Option<StatusState>, String)> {
        rx.try_iter().map(|u| (u.state, u.message)).collect()
    }

    #[test]
    fn wait_returns_once_the_runtime_appears() {
        let check = CountdownCheck::new(2);
        wait_for_runtime(&check, Duration::from_millis(1), Duration::from_secs(5)).unwrap();
        assert_eq!(check.polls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn timeout_aborts_without_touching_the_camera() {
        let backend = CountingBackend::default();
        let starts = backend.starts.clone();
        let (bootstrap, status_rx) = bootstrap(CountdownCheck::new(usize::MAX), backend);

        let started = Instant::now();
        let mut loader_called = false;
        let result = bootstrap.run(|_| {
            loader_called = true;
            Ok(NoHands)
        });

        assert!(matches!(result, Err(CaptureError::LibraryLoadTimeout(_))));
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert!(!loader_called);
        assert_eq!(starts.load(Ordering::SeqCst), 0);
        assert_eq!(
            messages(&status_rx),
            vec![
                (Some(StatusState::Loading), LOADING_MESSAGE.to_string()),
                (Some(StatusState::Error), RUNTIME_TIMEOUT_MESSAGE.to_string()),
            ]
        );
    }

    #[test]
    fn loader_failure_is_reported_as_init_error() {
        let backend = CountingBackend::default();
        let starts = backend.starts.clone();
        let (bootstrap, status_rx) = bootstrap(CountdownCheck::new(0), backend);

        let result = bootstrap.run(|_| Err::<NoHands, _>(anyhow!("corrupt model")));

        assert!(matches!(result, Err(CaptureError::RuntimeInit(_))));
        assert_eq!(starts.load(Ordering::SeqCst), 0);
        let statuses = messages(&status_rx);
        assert_eq!(
            statuses.last(),
            Some(&(Some(StatusState::Error), RUNTIME_INIT_MESSAGE.to_string()))
        );
    }

    #[test]
    fn ready_runtime_starts_the_camera() {
        let backend = CountingBackend::default();
        let starts = backend.starts.clone();
        let (bootstrap, status_rx) = bootstrap(CountdownCheck::new(1), backend);

        let session = bootstrap.run(|_| Ok(NoHands)).unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(
            messages(&status_rx),
            vec![
                (Some(StatusState::Loading), LOADING_MESSAGE.to_string()),
                (Some(StatusState::Ready), READY_MESSAGE.to_string()),
            ]
        );
        drop(session);
    }
}
