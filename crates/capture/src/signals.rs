use std::fs;
use std::io;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use signal_hook::consts::{SIGINT, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook::low_level;

use crate::context::CaptureContext;
use crate::error::CaptureError;

const GPIO_PID_PROC: &str = "/proc/gpio_interrupt_pid";

/// Install the trigger, watchdog, and shutdown handlers.
///
/// Handler bodies are restricted to atomics, `sem_post`, `close`, and the
/// vendor submit path; they never allocate or log.
pub fn install(ctx: &Arc<CaptureContext>) -> io::Result<()> {
    let trigger = Arc::clone(ctx);
    // SAFETY: the closures below only perform async-signal-safe work, per
    // the restriction documented above.
    unsafe {
        low_level::register(SIGUSR1, move || handle_trigger(&trigger))?;
    }

    let watchdog = Arc::clone(ctx);
    unsafe {
        low_level::register(SIGUSR2, move || handle_socket_reset(&watchdog))?;
    }

    for signal in [SIGINT, SIGTERM] {
        let shutdown = Arc::clone(ctx);
        unsafe {
            low_level::register(signal, move || handle_shutdown(&shutdown))?;
        }
    }

    Ok(())
}

/// GPIO edge: submit one capture request, unless shutdown has begun.
fn handle_trigger(ctx: &CaptureContext) {
    if !ctx.running.load(Ordering::Acquire) {
        return;
    }

    match ctx.camera.queue_request() {
        Ok(()) => {
            ctx.stats.accepted.fetch_add(1, Ordering::Relaxed);
        }
        Err(CaptureError::BufferNotReady) => {
            ctx.stats.backpressure.fetch_add(1, Ordering::Relaxed);
        }
        Err(_) => {
            ctx.stats.submit_failures.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Watchdog expiry: the stream stalled for the full interval. Drop the
/// socket so the next write starts from a clean connection.
fn handle_socket_reset(ctx: &CaptureContext) {
    let fd = ctx.sockfd.swap(-1, Ordering::AcqRel);
    if fd >= 0 {
        // SAFETY: fd was a connected socket owned by the streamer; a writer
        // racing this close sees an error and reconnects.
        unsafe { libc::close(fd) };
        ctx.stats.watchdog_resets.fetch_add(1, Ordering::Relaxed);
    }
}

/// SIGINT/SIGTERM: stop admitting triggers, drop the socket, and wake the
/// consumer so it observes the cleared flag.
fn handle_shutdown(ctx: &CaptureContext) {
    ctx.running.store(false, Ordering::Release);

    let fd = ctx.sockfd.swap(-1, Ordering::AcqRel);
    if fd >= 0 {
        unsafe { libc::close(fd) };
    }

    ctx.pipeline.wake();
}

/// Hand our PID to the GPIO driver; subsequent shutter edges arrive as
/// SIGUSR1.
pub fn register_with_kernel() -> io::Result<()> {
    fs::write(GPIO_PID_PROC, std::process::id().to_string())
}
