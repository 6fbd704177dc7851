pub mod camera;
pub mod config;
pub mod context;
pub mod encoder;
pub mod error;
pub mod pipeline;
pub mod signals;
pub mod stream;
pub mod watchdog;

#[cfg(feature = "libcamera")]
pub mod libcamera_backend;

pub use camera::{CameraBackend, CameraHandler};
pub use config::CaptureConfig;
pub use context::CaptureContext;
pub use pipeline::{FramePipeline, FrameSlot};
