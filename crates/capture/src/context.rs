use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64};

use handoff::Semaphore;

use crate::camera::CameraHandler;
use crate::pipeline::FramePipeline;

/// Counters bumped from signal-handler context and reported by the main
/// thread at shutdown. Handlers must not touch the logger.
#[derive(Debug, Default)]
pub struct TriggerStats {
    pub accepted: AtomicU64,
    pub backpressure: AtomicU64,
    pub submit_failures: AtomicU64,
    pub watchdog_resets: AtomicU64,
}

/// Process-wide state the signal handlers need to reach.
///
/// Built once before any handler is installed and shared as an `Arc`
/// captured by the handler closures; nothing here is a global.
pub struct CaptureContext {
    /// Release on shutdown; every consumer loop and the trigger handler
    /// load it with Acquire.
    pub running: AtomicBool,
    pub pipeline: Arc<FramePipeline>,
    pub camera: CameraHandler,
    /// Shared with the streamer; the watchdog and shutdown handlers close
    /// it out from under a blocked writer.
    pub sockfd: Arc<AtomicI32>,
    pub stats: TriggerStats,
    /// Posted by the main thread once `running` is set.
    pub thread1_ready: Semaphore,
    /// Posted by the stream thread once it is initialized.
    pub thread2_ready: Semaphore,
}
