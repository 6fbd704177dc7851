use nix::errno::Errno;
use nix::sched::{CpuSet, sched_setaffinity};
use nix::unistd::Pid;

/// Pin the calling thread to one core.
pub fn pin_to_core(core: usize) -> Result<(), Errno> {
    let mut cpuset = CpuSet::new();
    cpuset.set(core)?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)?;
    tracing::info!(core, "Pinned to core");
    Ok(())
}

/// Switch the calling thread to SCHED_FIFO at the maximum supported
/// priority. Requires CAP_SYS_NICE or an rtprio limit.
pub fn set_fifo_max_priority() -> Result<(), Errno> {
    // SAFETY: plain syscalls over a fully initialized sched_param.
    let max = unsafe { libc::sched_get_priority_max(libc::SCHED_FIFO) };
    if max < 0 {
        return Err(Errno::last());
    }

    let param = libc::sched_param {
        sched_priority: max,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret < 0 {
        return Err(Errno::last());
    }

    tracing::info!(priority = max, "SCHED_FIFO scheduling enabled");
    Ok(())
}
