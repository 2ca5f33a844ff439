pub mod camera;
pub mod detection;
pub mod device;
pub mod hands;
pub mod rgba_converter;
pub mod skeleton;

pub use camera::{CameraAcquisition, CameraStream, CaptureBackend, FrameSink};
pub use detection::{DEFAULT_SURFACE_SIZE, DetectionBridge, UpdatePublisher, latest_value_channel};
pub use device::NokhwaBackend;
pub use hands::{HandTracker, HandsOptions, OrtHands};
