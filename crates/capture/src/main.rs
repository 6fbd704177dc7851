use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Context as _;

use capture::camera::CameraHandler;
use capture::config::CaptureConfig;
use capture::context::{CaptureContext, TriggerStats};
use capture::encoder::{EncodeError, FrameEncoder};
use capture::pipeline::FramePipeline;
use capture::signals;
use capture::stream::{PacketSink, PacketStreamer};
use capture::watchdog::{SOCKET_RESET_INTERVAL, WatchdogTimer};
use common::setup_logging;
use handoff::Semaphore;

fn main() {
    if let Err(err) = run() {
        tracing::error!(error = %err, "Capture node failed");
        eprintln!("capture: {err:#}");
        process::exit(exit_code(&err));
    }
}

/// Init failures keep their OS errno visible to the operator as a negative
/// exit status; everything else exits 1.
fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(io) = cause.downcast_ref::<std::io::Error>()
            && let Some(errno) = io.raw_os_error()
        {
            return -errno;
        }
        if let Some(errno) = cause.downcast_ref::<nix::errno::Errno>() {
            return -(*errno as i32);
        }
    }
    1
}

fn run() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.txt"));
    let config = CaptureConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    setup_logging(&config.environment, config.log_file.as_deref())
        .context("Failed to initialize logging")?;
    tracing::info!(?config, "Capture node starting");

    let pipeline = Arc::new(FramePipeline::new(config.dma_buffers)?);
    let camera = build_camera(&config, Arc::clone(&pipeline))?;

    let ctx = Arc::new(CaptureContext {
        running: AtomicBool::new(false),
        pipeline: Arc::clone(&pipeline),
        camera,
        sockfd: Arc::new(AtomicI32::new(-1)),
        stats: TriggerStats::default(),
        thread1_ready: Semaphore::new(0)?,
        thread2_ready: Semaphore::new(0)?,
    });

    common::rt::pin_to_core(config.recording_cpu).context("Failed to set CPU affinity")?;
    common::rt::set_fifo_max_priority()
        .context("Failed to set real-time scheduling policy")?;

    let watchdog =
        WatchdogTimer::new(SOCKET_RESET_INTERVAL).context("Failed to create socket watchdog")?;
    signals::install(&ctx).context("Failed to install signal handlers")?;
    signals::register_with_kernel()
        .context("Failed to register with the GPIO interrupt driver")?;

    let streamer = PacketStreamer::new(config.server_addr, Arc::clone(&ctx.sockfd));
    streamer
        .connect()
        .context("Failed to reach the ingest server")?;
    let encoder = build_encoder(&config)?;

    let stream_ctx = Arc::clone(&ctx);
    let stream_thread = thread::Builder::new()
        .name("stream".into())
        .spawn(move || stream_loop(stream_ctx, encoder, streamer, watchdog))
        .context("Failed to spawn stream thread")?;

    // Readiness handshake: the consumer must be parked on the queue before
    // the first trigger can race a request into the hardware.
    ctx.thread2_ready.wait()?;
    ctx.running.store(true, Ordering::Release);
    ctx.thread1_ready.post()?;
    tracing::info!("Pipeline running; waiting for trigger signals");

    while ctx.running.load(Ordering::Acquire) {
        thread::park_timeout(Duration::from_millis(100));
    }

    match stream_thread.join() {
        Ok(result) => result?,
        Err(_) => anyhow::bail!("Stream thread panicked"),
    }
    ctx.camera.stop();

    let stats = &ctx.stats;
    tracing::info!(
        accepted = stats.accepted.load(Ordering::Relaxed),
        backpressure = stats.backpressure.load(Ordering::Relaxed),
        submit_failures = stats.submit_failures.load(Ordering::Relaxed),
        watchdog_resets = stats.watchdog_resets.load(Ordering::Relaxed),
        "Capture node stopped"
    );
    Ok(())
}

/// Consumer loop: block on the queue counter, encode, stream. The watchdog
/// is re-armed each pass so a stalled stream drops its socket after 0.3 s.
fn stream_loop(
    ctx: Arc<CaptureContext>,
    mut encoder: Box<dyn FrameEncoder>,
    mut streamer: PacketStreamer,
    watchdog: WatchdogTimer,
) -> anyhow::Result<()> {
    ctx.thread2_ready.post()?;
    ctx.thread1_ready.wait()?;
    tracing::info!("Stream thread consuming");

    let mut frames = 0u64;
    let mut transmit_failures = 0u64;

    let mut consume = || -> anyhow::Result<()> {
        while ctx.running.load(Ordering::Acquire) {
            watchdog.arm().context("Failed to re-arm socket watchdog")?;
            ctx.pipeline.wait()?;
            if !ctx.running.load(Ordering::Acquire) {
                break;
            }

            let Some(slot) = ctx.pipeline.claim() else {
                continue;
            };

            let timestamp_ns = monotonic_ns()?;
            // SAFETY: the slot is leased to this thread until its buffer's
            // request is refilled, which the backpressure gate prevents
            // until the encode below has finished.
            let frame = unsafe { slot.bytes() };

            match encoder.encode_frame(frame, timestamp_ns, &mut streamer) {
                Ok(()) => {
                    frames += 1;
                    if frames.is_multiple_of(30) {
                        tracing::debug!(frames, transmit_failures, "Stream progress");
                    }
                }
                Err(EncodeError::Transmit(err)) => {
                    transmit_failures += 1;
                    tracing::warn!(error = %err, "Packet lost; reconnecting on the next one");
                }
                Err(err) => return Err(err).context("Encoder failed"),
            }
        }
        Ok(())
    };

    let result = consume();
    // On an encoder failure the main thread is still parked on `running`;
    // clear it so shutdown converges either way.
    ctx.running.store(false, Ordering::Release);

    // Drain the codec and close the stream on a packet boundary.
    if let Err(err) = encoder.finish(&mut streamer) {
        tracing::warn!(error = %err, "Encoder flush failed during shutdown");
    }
    if let Err(err) = streamer.send_packet(&wire::EOSTREAM) {
        tracing::warn!(error = %err, "Failed to send end-of-stream sentinel");
    }

    tracing::info!(frames, transmit_failures, "Stream thread exiting");
    result
}

fn monotonic_ns() -> anyhow::Result<u64> {
    let now = nix::time::clock_gettime(nix::time::ClockId::CLOCK_MONOTONIC)
        .context("clock_gettime failed")?;
    Ok(now.tv_sec() as u64 * 1_000_000_000 + now.tv_nsec() as u64)
}

#[cfg(feature = "libcamera")]
fn build_camera(
    config: &CaptureConfig,
    pipeline: Arc<FramePipeline>,
) -> anyhow::Result<CameraHandler> {
    let backend =
        capture::libcamera_backend::LibcameraBackend::open(config, Arc::clone(&pipeline))
            .context("Failed to initialize camera")?;
    Ok(CameraHandler::new(Box::new(backend), pipeline))
}

#[cfg(not(feature = "libcamera"))]
fn build_camera(
    _config: &CaptureConfig,
    _pipeline: Arc<FramePipeline>,
) -> anyhow::Result<CameraHandler> {
    anyhow::bail!("Built without a camera backend; rebuild with --features libcamera")
}

#[cfg(feature = "ffmpeg")]
fn build_encoder(config: &CaptureConfig) -> anyhow::Result<Box<dyn FrameEncoder>> {
    let encoder = capture::encoder::H264Encoder::new(
        config.frame_width,
        config.frame_height,
        config.frame_duration_min,
    )
    .context("Failed to initialize encoder")?;
    Ok(Box::new(encoder))
}

#[cfg(not(feature = "ffmpeg"))]
fn build_encoder(_config: &CaptureConfig) -> anyhow::Result<Box<dyn FrameEncoder>> {
    anyhow::bail!("Built without an encoder backend; rebuild with --features ffmpeg")
}
