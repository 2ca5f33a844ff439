use std::{thread, time::Duration};

use anyhow::anyhow;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, select, tick};

use crate::{
    error::CaptureError,
    status::{NoticeBoard, StatusIndicator, StatusState},
    types::{Frame, FrameSize},
};

pub const READY_MESSAGE: &str = "Ready - camera active";
pub const READY_FALLBACK_MESSAGE: &str = "Ready - camera active (fallback)";
pub const CAMERA_ERROR_MESSAGE: &str = "Error: could not start the camera";
pub const CAMERA_FAILURE_NOTICE: &str =
    "Could not start the camera on this device. Check camera permissions or try another camera.";

pub type FrameCallback = Box<dyn FnMut(Frame) + Send>;

/// A device opened for pull-based reads.
pub trait FrameSource {
    fn next_frame(&mut self) -> anyhow::Result<Frame>;
}

/// The two ways a camera can be brought up. Handles returned from either
/// method are created and dropped on the same thread, so they need not be
/// `Send`.
pub trait CaptureBackend: Clone + Send + 'static {
    /// Keeps a self-driven capture alive until dropped.
    type Managed;
    type Direct: FrameSource;

    fn start_managed(&self, target: FrameSize, on_frame: FrameCallback) -> anyhow::Result<Self::Managed>;
    fn open_direct(&self, target: FrameSize) -> anyhow::Result<Self::Direct>;
}

/// Hands frames to the detection worker, dropping them while it is busy.
#[derive(Clone, Debug)]
pub struct FrameSink {
    tx: Sender<Frame>,
}

impl FrameSink {
    pub fn new(tx: Sender<Frame>) -> Self {
        Self { tx }
    }

    pub fn feed(&self, frame: Frame) -> Result<(), CaptureError> {
        match self.tx.try_send(frame) {
            Ok(()) | Err(TrySendError::Full(_)) => Ok(()),
            Err(TrySendError::Disconnected(_)) => Err(CaptureError::FramePipeline(
                "detection worker is gone".to_string(),
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CaptureMode {
    Primary,
    Fallback,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AcquisitionState {
    Uninitialized,
    AttemptingPrimary,
    Running(CaptureMode),
    AttemptingFallback,
    Failed,
}

pub struct CameraAcquisition<B: CaptureBackend> {
    backend: B,
    target: FrameSize,
    refresh_interval: Duration,
    status: StatusIndicator,
    notices: NoticeBoard,
    state: AcquisitionState,
}

impl<B: CaptureBackend> CameraAcquisition<B> {
    pub fn new(
        backend: B,
        target: FrameSize,
        refresh_interval: Duration,
        status: StatusIndicator,
        notices: NoticeBoard,
    ) -> Self {
        Self {
            backend,
            target,
            refresh_interval,
            status,
            notices,
            state: AcquisitionState::Uninitialized,
        }
    }

    #[cfg(test)]
    fn state(&self) -> AcquisitionState {
        self.state
    }

    fn enter(&mut self, next: AcquisitionState) {
        log::debug!("camera acquisition {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Brings the camera up, preferring the managed path. On failure of both
    /// paths the error status and notice are reported once.
    pub fn start(&mut self, sink: FrameSink) -> Result<CameraStream, CaptureError> {
        self.enter(AcquisitionState::AttemptingPrimary);
        let primary = match self.start_primary(sink.clone()) {
            Ok(stream) => {
                self.enter(AcquisitionState::Running(CaptureMode::Primary));
                self.status.set_status(Some(StatusState::Ready), READY_MESSAGE);
                log::info!("camera running via managed capture");
                return Ok(stream);
            }
            Err(err) => err,
        };
        log::warn!("managed capture failed to start, trying direct capture: {primary:#}");

        self.enter(AcquisitionState::AttemptingFallback);
        match self.start_fallback(sink) {
            Ok(stream) => {
                self.enter(AcquisitionState::Running(CaptureMode::Fallback));
                self.status
                    .set_status(Some(StatusState::Ready), READY_FALLBACK_MESSAGE);
                log::info!(
                    "camera running via direct capture every {:?}",
                    self.refresh_interval
                );
                Ok(stream)
            }
            Err(fallback) => {
                self.enter(AcquisitionState::Failed);
                log::error!("direct capture failed to start: {fallback:#}");
                self.status
                    .set_status(Some(StatusState::Error), CAMERA_ERROR_MESSAGE);
                self.notices.append(CAMERA_FAILURE_NOTICE);
                Err(CaptureError::CameraStart { primary, fallback })
            }
        }
    }

    fn start_primary(&self, sink: FrameSink) -> anyhow::Result<CameraStream> {
        let backend = self.backend.clone();
        let target = self.target;
        spawn_owner("camera-managed", move |started, stop_rx| {
            let on_frame: FrameCallback = Box::new(move |frame| {
                if let Err(err) = sink.feed(frame) {
                    log::warn!("{err}");
                }
            });
            let handle = match backend.start_managed(target, on_frame) {
                Ok(handle) => handle,
                Err(err) => {
                    let _ = started.send(Err(err));
                    return;
                }
            };
            let _ = started.send(Ok(()));
            // Park until the stream is stopped, then release the device here.
            let _ = stop_rx.recv();
            drop(handle);
        })
    }

    fn start_fallback(&self, sink: FrameSink) -> anyhow::Result<CameraStream> {
        let backend = self.backend.clone();
        let target = self.target;
        let interval = self.refresh_interval;
        spawn_owner("camera-direct", move |started, stop_rx| {
            let source = match backend.open_direct(target) {
                Ok(source) => source,
                Err(err) => {
                    let _ = started.send(Err(err));
                    return;
                }
            };
            let _ = started.send(Ok(()));
            run_feed_loop(source, &sink, interval, &stop_rx);
        })
    }
}

/// Pulls a frame on every refresh tick until stopped. A failed read or feed
/// only skips that tick.
fn run_feed_loop<S: FrameSource>(
    mut source: S,
    sink: &FrameSink,
    interval: Duration,
    stop_rx: &Receiver<()>,
) {
    let ticker = tick(interval);
    loop {
        select! {
            recv(stop_rx) -> _ => break,
            recv(ticker) -> _ => {
                let result = source
                    .next_frame()
                    .and_then(|frame| sink.feed(frame).map_err(anyhow::Error::from));
                if let Err(err) = result {
                    log::warn!("skipping camera frame: {err:#}");
                }
            }
        }
    }
    log::info!("direct capture loop stopped");
}

/// Runs `body` on a dedicated thread that owns the device, and waits for it
/// to report whether the device started.
fn spawn_owner<F>(name: &str, body: F) -> anyhow::Result<CameraStream>
where
    F: FnOnce(Sender<anyhow::Result<()>>, Receiver<()>) + Send + 'static,
{
    let (started_tx, started_rx) = bounded(1);
    let (stop_tx, stop_rx) = bounded::<()>(0);

    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || body(started_tx, stop_rx))?;

    match started_rx.recv() {
        Ok(Ok(())) => Ok(CameraStream {
            stop: Some(stop_tx),
            handle: Some(handle),
        }),
        Ok(Err(err)) => {
            let _ = handle.join();
            Err(err)
        }
        Err(_) => {
            let _ = handle.join();
            Err(anyhow!("{name} thread exited before reporting start"))
        }
    }
}

/// A running capture. Stopping closes the stop channel and joins the owner
/// thread, which releases the device.
#[derive(Debug)]
pub struct CameraStream {
    stop: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CameraStream {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}
