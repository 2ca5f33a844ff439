use anyhow::{Context, Result, anyhow};
use nokhwa::{
    CallbackCamera, Camera,
    pixel_format::RgbFormat,
    utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution},
};

use super::{
    camera::{CaptureBackend, FrameCallback, FrameSource},
    rgba_converter,
};
use crate::types::{Frame, FrameSize};

const TARGET_FRAME_RATE: u32 = 30;

// Formats most drivers hand out without conversion; macOS built-in cameras
// often reject YUYV even when it is listed.
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::MJPEG,
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::NV12,
    FrameFormat::YUYV,
    FrameFormat::GRAY,
];

/// Format requests in order of preference: the exact target first, then
/// whatever the device is most comfortable with.
fn requested_formats(target: FrameSize) -> [RequestedFormat<'static>; 3] {
    let exact = CameraFormat::new(
        Resolution::new(target.width, target.height),
        FrameFormat::MJPEG,
        TARGET_FRAME_RATE,
    );
    [
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(exact)),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

/// Cameras reached through nokhwa. The managed path lets nokhwa drive the
/// capture thread; the direct path reads frames on demand.
#[derive(Clone, Debug)]
pub struct NokhwaBackend {
    index: CameraIndex,
}

impl NokhwaBackend {
    pub fn new(index: u32) -> Self {
        Self {
            index: CameraIndex::Index(index),
        }
    }
}

/// Stops the callback stream when dropped.
pub struct ManagedCamera(CallbackCamera);

impl Drop for ManagedCamera {
    fn drop(&mut self) {
        if let Err(err) = self.0.stop_stream() {
            log::warn!("failed to stop managed camera: {err}");
        }
    }
}

pub struct DirectCamera(Camera);

impl FrameSource for DirectCamera {
    fn next_frame(&mut self) -> Result<Frame> {
        let buffer = self.0.frame().context("camera frame read failed")?;
        rgba_converter::buffer_to_frame(&buffer)
    }
}

impl Drop for DirectCamera {
    fn drop(&mut self) {
        if let Err(err) = self.0.stop_stream() {
            log::warn!("failed to stop direct camera: {err}");
        }
    }
}

impl CaptureBackend for NokhwaBackend {
    type Managed = ManagedCamera;
    type Direct = DirectCamera;

    fn start_managed(&self, target: FrameSize, mut on_frame: FrameCallback) -> Result<ManagedCamera> {
        let [requested, ..] = requested_formats(target);
        let mut camera = CallbackCamera::new(self.index.clone(), requested, move |buffer| {
            match rgba_converter::buffer_to_frame(&buffer) {
                Ok(frame) => on_frame(frame),
                Err(err) => log::warn!("failed to decode camera frame: {err:#}"),
            }
        })
        .context("failed to create managed camera")?;
        camera
            .open_stream()
            .context("failed to open managed camera stream")?;
        Ok(ManagedCamera(camera))
    }

    fn open_direct(&self, target: FrameSize) -> Result<DirectCamera> {
        let mut last_err = None;
        for requested in requested_formats(target) {
            match Camera::new(self.index.clone(), requested) {
                Ok(mut camera) => match camera.open_stream() {
                    Ok(()) => {
                        log::info!("direct camera opened with {}", camera.camera_format());
                        return Ok(DirectCamera(camera));
                    }
                    Err(err) => last_err = Some(anyhow::Error::from(err)),
                },
                Err(err) => last_err = Some(err.into()),
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("no supported camera format")))
    }
}
