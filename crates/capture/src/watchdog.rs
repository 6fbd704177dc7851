use std::io;
use std::mem::MaybeUninit;
use std::ptr;
use std::time::Duration;

/// Interval after which a silent stream is considered stuck.
pub const SOCKET_RESET_INTERVAL: Duration = Duration::from_millis(300);

/// One-shot POSIX timer that raises SIGUSR2 when the stream stalls.
///
/// Re-armed at the top of every loop iteration; while frames flow faster
/// than the interval it never expires. On expiry the signal handler closes
/// the socket and the next packet reconnects.
pub struct WatchdogTimer {
    timer_id: libc::timer_t,
    interval: Duration,
}

impl WatchdogTimer {
    pub fn new(interval: Duration) -> io::Result<Self> {
        // SAFETY: zeroed sigevent with the signal fields filled in is the
        // documented initialization for SIGEV_SIGNAL delivery.
        let mut sev: libc::sigevent = unsafe { MaybeUninit::zeroed().assume_init() };
        sev.sigev_notify = libc::SIGEV_SIGNAL;
        sev.sigev_signo = libc::SIGUSR2;

        let mut timer_id: libc::timer_t = ptr::null_mut();
        let ret = unsafe { libc::timer_create(libc::CLOCK_MONOTONIC, &mut sev, &mut timer_id) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self { timer_id, interval })
    }

    /// (Re)arm the one-shot expiry.
    pub fn arm(&self) -> io::Result<()> {
        let its = libc::itimerspec {
            it_interval: libc::timespec {
                tv_sec: 0,
                tv_nsec: 0,
            },
            it_value: libc::timespec {
                tv_sec: self.interval.as_secs() as libc::time_t,
                tv_nsec: self.interval.subsec_nanos() as libc::c_long,
            },
        };

        let ret = unsafe { libc::timer_settime(self.timer_id, 0, &its, ptr::null_mut()) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for WatchdogTimer {
    fn drop(&mut self) {
        // SAFETY: timer_id came from timer_create and is deleted once.
        unsafe { libc::timer_delete(self.timer_id) };
    }
}

// SAFETY: POSIX timer ids are process-wide and may be armed from any thread.
unsafe impl Send for WatchdogTimer {}
