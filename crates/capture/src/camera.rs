use std::sync::Arc;

use crate::error::CaptureError;
use crate::pipeline::FramePipeline;

/// Seam to the camera vendor library.
///
/// The backend owns the device, its DMA buffers, and the ring of reusable
/// capture requests; completed frames reach the pipeline through the
/// completion callback the backend installs at init. `submit_next` is called
/// from the trigger signal handler and must not allocate or lock.
pub trait CameraBackend: Send + Sync {
    /// Submit the next reusable capture request to the hardware.
    fn submit_next(&self) -> Result<(), CaptureError>;

    /// Stop capture. In-flight requests complete as cancelled and are
    /// dropped by the completion callback.
    fn stop(&self);
}

/// High-level "capture one frame" interface over the vendor backend,
/// enforcing the backpressure policy.
pub struct CameraHandler {
    backend: Box<dyn CameraBackend>,
    pipeline: Arc<FramePipeline>,
}

impl CameraHandler {
    pub fn new(backend: Box<dyn CameraBackend>, pipeline: Arc<FramePipeline>) -> Self {
        Self { backend, pipeline }
    }

    /// Ask the hardware for one more frame.
    ///
    /// The queue counter may lag the queue by one (the consumer has passed
    /// `wait` but not yet `claim`ed) and may be posted without a frame to
    /// wake the consumer at shutdown, so the gate keeps a one-buffer margin:
    /// at `capacity - 2` enqueued the submit is still safe, above that the
    /// encoder has fallen behind and the request fails with
    /// `BufferNotReady`.
    pub fn queue_request(&self) -> Result<(), CaptureError> {
        let enqueued = self.pipeline.queued_hint();
        if enqueued > self.pipeline.capacity() as i32 - 2 {
            return Err(CaptureError::BufferNotReady);
        }

        self.backend.submit_next()
    }

    pub fn stop(&self) {
        self.backend.stop();
    }
}
