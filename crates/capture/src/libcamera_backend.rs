//! libcamera-backed capture: DMA buffer allocation, request recycling, and
//! the completion callback that feeds the frame pipeline.

use std::cell::UnsafeCell;
use std::sync::Arc;

use libcamera::camera::{ActiveCamera, CameraConfigurationStatus};
use libcamera::camera_manager::CameraManager;
use libcamera::control::ControlList;
use libcamera::controls::{
    AeEnable, AfMode, AnalogueGain, AwbEnable, ExposureTime, FrameDurationLimits, HdrMode,
    LensPosition, rpi,
};
use libcamera::framebuffer_allocator::{FrameBuffer, FrameBufferAllocator};
use libcamera::framebuffer_map::MemoryMappedFrameBuffer;
use libcamera::geometry::Size;
use libcamera::pixel_format::PixelFormat;
use libcamera::request::{Request, RequestStatus, ReuseFlag};
use libcamera::stream::StreamRole;

use handoff::SpscRing;

use crate::camera::CameraBackend;
use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::pipeline::{FramePipeline, FrameSlot};

/// YU12 fourcc: the planar YUV420 layout the encoder consumes.
const PIXEL_FORMAT_YU12: PixelFormat = PixelFormat::new(u32::from_le_bytes(*b"YU12"), 0);

pub struct LibcameraBackend {
    /// Completed requests parked until the next trigger resubmits them.
    /// Producer: the completion callback. Consumer: the trigger handler.
    /// FIFO rotation preserves the original cookie order.
    ready: Arc<SpscRing<Request>>,
    allocator: FrameBufferAllocator,
    active: UnsafeCell<ActiveCamera<'static>>,
}

// SAFETY: libcamera serializes request submission internally; our submit
// path is only entered from the trigger signal handler (which cannot nest)
// and `stop` only after `running` is cleared and triggers are refused.
unsafe impl Send for LibcameraBackend {}
unsafe impl Sync for LibcameraBackend {}

impl LibcameraBackend {
    /// Bring the camera up, fail-fast: manager, acquisition, exact-match
    /// configuration, DMA buffers and mappings, request ring, controls,
    /// start. No partial state survives an error.
    pub fn open(
        config: &CaptureConfig,
        pipeline: Arc<FramePipeline>,
    ) -> Result<Self, CaptureError> {
        let frame_bytes = config.frame_bytes();

        // The manager must outlive every camera object derived from it; it
        // is bound once for the process lifetime.
        let manager: &'static CameraManager = Box::leak(Box::new(
            CameraManager::new().map_err(|_| CaptureError::ManagerStart)?,
        ));
        let cameras: &'static _ = &*Box::leak(Box::new(manager.cameras()));
        let camera: &'static _ = &*Box::leak(Box::new(
            cameras.get(0).ok_or(CaptureError::NoCameras)?,
        ));
        let mut active = camera.acquire().map_err(|_| CaptureError::AcquireFailed)?;

        let mut cfgs = camera
            .generate_configuration(&[StreamRole::VideoRecording])
            .ok_or(CaptureError::ConfigurationRejected)?;
        {
            let mut cfg = cfgs
                .get_mut(0)
                .ok_or(CaptureError::ConfigurationRejected)?;
            cfg.set_pixel_format(PIXEL_FORMAT_YU12);
            cfg.set_size(Size {
                width: config.frame_width,
                height: config.frame_height,
            });
            cfg.set_buffer_count(config.dma_buffers as u32);
        }

        // An adjusted mode would silently change frame geometry under the
        // encoder; only an exact match is acceptable.
        match cfgs.validate() {
            CameraConfigurationStatus::Valid => {}
            CameraConfigurationStatus::Adjusted => {
                return Err(CaptureError::ConfigurationAdjusted);
            }
            CameraConfigurationStatus::Invalid => {
                return Err(CaptureError::ConfigurationRejected);
            }
        }
        active
            .configure(&mut cfgs)
            .map_err(|_| CaptureError::ConfigurationRejected)?;

        let cfg = cfgs.get(0).ok_or(CaptureError::ConfigurationRejected)?;
        let stream = cfg.stream().ok_or(CaptureError::ConfigurationRejected)?;

        let mut allocator = FrameBufferAllocator::new(camera);
        let buffers = allocator
            .alloc(&stream)
            .map_err(|_| CaptureError::AllocationFailed)?;
        if buffers.len() != config.dma_buffers {
            return Err(CaptureError::AllocationFailed);
        }

        let ready = Arc::new(SpscRing::with_capacity(config.dma_buffers));
        let mut slots = Vec::with_capacity(config.dma_buffers);
        let mut requests = Vec::with_capacity(config.dma_buffers);

        for (cookie, buffer) in buffers.into_iter().enumerate() {
            let mapped = MemoryMappedFrameBuffer::new(buffer)
                .map_err(|_| CaptureError::AllocationFailed)?;
            slots.push(frame_slot(&mapped, frame_bytes)?);

            let mut request = active
                .create_request(Some(cookie as u64))
                .ok_or(CaptureError::AllocationFailed)?;
            request
                .add_buffer(&stream, mapped)
                .map_err(|_| CaptureError::AllocationFailed)?;
            requests.push(request);
        }

        let slots: Arc<[FrameSlot]> = slots.into();

        // Completion path, on libcamera's thread: cancelled requests are
        // teardown traffic and are dropped without touching the queue.
        {
            let pipeline = Arc::clone(&pipeline);
            let ready = Arc::clone(&ready);
            let slots = Arc::clone(&slots);
            active.on_request_completed(move |mut request| {
                if request.status() == RequestStatus::Cancelled {
                    return;
                }

                let slot = slots[request.cookie() as usize];
                if pipeline.deliver(slot).is_err() {
                    // Unreachable while the backpressure gate holds; parking
                    // the request keeps the buffer out of rotation rather
                    // than corrupting the queue.
                    return;
                }

                request.reuse(ReuseFlag::REUSE_BUFFERS);
                let _ = ready.push(request);
            });
        }

        let controls = build_controls(config)?;
        active
            .start(Some(&controls))
            .map_err(|_| CaptureError::ConfigurationRejected)?;

        // Every request starts out ready; each trigger submits exactly one.
        for request in requests {
            ready
                .push(request)
                .map_err(|_| CaptureError::AllocationFailed)?;
        }

        tracing::info!(
            buffers = config.dma_buffers,
            frame_bytes,
            width = config.frame_width,
            height = config.frame_height,
            "Camera started"
        );

        Ok(Self {
            ready,
            allocator,
            active: UnsafeCell::new(active),
        })
    }
}

impl CameraBackend for LibcameraBackend {
    fn submit_next(&self) -> Result<(), CaptureError> {
        let Some(request) = self.ready.pop() else {
            return Err(CaptureError::QueueFailed);
        };

        // SAFETY: sole submitter (trigger handler, non-nesting); libcamera's
        // queueRequest is internally synchronized against its own threads.
        let active = unsafe { &mut *self.active.get() };
        active
            .queue_request(request)
            .map_err(|_| CaptureError::QueueFailed)
    }

    fn stop(&self) {
        // SAFETY: called after `running` is cleared, so no trigger can race
        // a submit against the stop.
        let active = unsafe { &mut *self.active.get() };
        if active.stop().is_err() {
            tracing::warn!("Camera stop reported an error");
        }
        // Field order handles the rest of teardown: requests (with their
        // mappings), then the allocator, then the camera release on drop.
    }
}

/// Resolve one mapped buffer to the flat YUV420 region the encoder reads.
/// The allocator lays Y/U/V out back to back in one dmabuf; anything else is
/// a hard init failure.
fn frame_slot(
    mapped: &MemoryMappedFrameBuffer<FrameBuffer>,
    frame_bytes: usize,
) -> Result<FrameSlot, CaptureError> {
    let planes = mapped.data();
    if planes.len() != 3 {
        return Err(CaptureError::PlaneLayout);
    }

    let total: usize = planes.iter().map(|plane| plane.len()).sum();
    if total != frame_bytes {
        return Err(CaptureError::PlaneLayout);
    }

    let base = planes[0].as_ptr();
    // SAFETY: pointer arithmetic stays within the single mapping checked
    // above; only addresses are compared.
    let contiguous = unsafe {
        planes[1].as_ptr() == base.add(planes[0].len())
            && planes[2].as_ptr() == planes[1].as_ptr().add(planes[1].len())
    };
    if !contiguous {
        return Err(CaptureError::PlaneLayout);
    }

    Ok(FrameSlot::new(base, frame_bytes))
}

/// Fixed-everything controls for repeatable dataset capture: pinned frame
/// interval, exposure at the minimum interval, manual focus at ~12 inches,
/// unity gain, no AWB/HDR, and ISP stats output disabled.
fn build_controls(config: &CaptureConfig) -> Result<ControlList, CaptureError> {
    // libcamera's duration-valued controls take microseconds.
    let duration_min_us = config.frame_duration_min / 1_000;
    let duration_max_us = config.frame_duration_max / 1_000;

    let mut controls = ControlList::new();
    controls
        .set(FrameDurationLimits([duration_min_us, duration_max_us]))
        .map_err(|_| CaptureError::ConfigurationRejected)?;
    controls
        .set(AeEnable(false))
        .map_err(|_| CaptureError::ConfigurationRejected)?;
    controls
        .set(ExposureTime(duration_min_us as i32))
        .map_err(|_| CaptureError::ConfigurationRejected)?;
    controls
        .set(AfMode::Manual)
        .map_err(|_| CaptureError::ConfigurationRejected)?;
    controls
        .set(LensPosition(3.33))
        .map_err(|_| CaptureError::ConfigurationRejected)?;
    controls
        .set(AwbEnable(false))
        .map_err(|_| CaptureError::ConfigurationRejected)?;
    controls
        .set(AnalogueGain(1.0))
        .map_err(|_| CaptureError::ConfigurationRejected)?;
    controls
        .set(HdrMode::Off)
        .map_err(|_| CaptureError::ConfigurationRejected)?;
    controls
        .set(rpi::StatsOutputEnable(false))
        .map_err(|_| CaptureError::ConfigurationRejected)?;

    Ok(controls)
}
