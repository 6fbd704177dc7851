use nix::errno::Errno;
use std::cell::UnsafeCell;
use std::ffi::CString;
use std::os::raw::c_int;

use crate::errors::HandoffError;

/// Unnamed POSIX counting semaphore for in-process producer/consumer
/// wakeups.
///
/// `post` is async-signal-safe and may be called from a completion callback
/// or a signal handler. `value` uses `sem_getvalue`, which is inherently
/// racy; callers that gate on it must carry their own margin.
pub struct Semaphore {
    sem: Box<UnsafeCell<libc::sem_t>>,
}

impl Semaphore {
    pub fn new(initial: u32) -> Result<Self, HandoffError> {
        // SAFETY: sem_t is plain data until sem_init runs; the Box keeps its
        // address stable for the semaphore's lifetime.
        let sem = Box::new(UnsafeCell::new(unsafe {
            std::mem::zeroed::<libc::sem_t>()
        }));

        let ret = unsafe { libc::sem_init(sem.get(), 0, initial) };
        if ret != 0 {
            return Err(HandoffError::Semaphore(Errno::last()));
        }

        Ok(Self { sem })
    }

    /// Block until the count is positive, restarting on EINTR. The camera
    /// node takes trigger signals constantly; an interrupted wait is not an
    /// event.
    pub fn wait(&self) -> Result<(), HandoffError> {
        loop {
            let ret = unsafe { libc::sem_wait(self.sem.get()) };
            if ret == 0 {
                return Ok(());
            }

            let errno = Errno::last();
            if errno != Errno::EINTR {
                return Err(HandoffError::Semaphore(errno));
            }
        }
    }

    pub fn try_wait(&self) -> Result<bool, HandoffError> {
        let ret = unsafe { libc::sem_trywait(self.sem.get()) };
        if ret == 0 {
            Ok(true)
        } else {
            let errno = Errno::last();
            if errno == Errno::EAGAIN {
                Ok(false)
            } else {
                Err(HandoffError::Semaphore(errno))
            }
        }
    }

    pub fn post(&self) -> Result<(), HandoffError> {
        let ret = unsafe { libc::sem_post(self.sem.get()) };
        if ret != 0 {
            return Err(HandoffError::Semaphore(Errno::last()));
        }
        Ok(())
    }

    pub fn value(&self) -> Result<i32, HandoffError> {
        let mut val: c_int = 0;
        let ret = unsafe { libc::sem_getvalue(self.sem.get(), &mut val) };
        if ret != 0 {
            return Err(HandoffError::Semaphore(Errno::last()));
        }
        Ok(val)
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        // SAFETY: destroyed exactly once, after both sides have stopped.
        unsafe {
            libc::sem_destroy(self.sem.get());
        }
    }
}

unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

/// Named POSIX semaphore for cross-process signalling, such as the
/// frameset consumer-ready handshake.
pub struct NamedSemaphore {
    sem: *mut libc::sem_t,
}

impl NamedSemaphore {
    pub fn create(name: &str, initial: u32) -> Result<Self, HandoffError> {
        let c_name = CString::new(name).map_err(|_| HandoffError::InvalidName)?;

        let sem = unsafe { libc::sem_open(c_name.as_ptr(), libc::O_CREAT, 0o644, initial) };
        if sem == libc::SEM_FAILED {
            return Err(HandoffError::Semaphore(Errno::last()));
        }

        Ok(Self { sem })
    }

    pub fn open(name: &str) -> Result<Self, HandoffError> {
        let c_name = CString::new(name).map_err(|_| HandoffError::InvalidName)?;

        let sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };
        if sem == libc::SEM_FAILED {
            return Err(HandoffError::Semaphore(Errno::last()));
        }

        Ok(Self { sem })
    }

    /// Open the semaphore if it exists, create it otherwise. Lets a restarted
    /// process reattach to a live consumer without missing a beat.
    pub fn ensure(name: &str, initial: u32) -> Result<Self, HandoffError> {
        match Self::open(name) {
            Ok(sem) => Ok(sem),
            Err(_) => Self::create(name, initial),
        }
    }

    pub fn post(&self) -> Result<(), HandoffError> {
        let ret = unsafe { libc::sem_post(self.sem) };
        if ret != 0 {
            return Err(HandoffError::Semaphore(Errno::last()));
        }
        Ok(())
    }

    pub fn wait(&self) -> Result<(), HandoffError> {
        loop {
            let ret = unsafe { libc::sem_wait(self.sem) };
            if ret == 0 {
                return Ok(());
            }

            let errno = Errno::last();
            if errno != Errno::EINTR {
                return Err(HandoffError::Semaphore(errno));
            }
        }
    }

    pub fn try_wait(&self) -> Result<bool, HandoffError> {
        let ret = unsafe { libc::sem_trywait(self.sem) };
        if ret == 0 {
            Ok(true)
        } else {
            let errno = Errno::last();
            if errno == Errno::EAGAIN {
                Ok(false)
            } else {
                Err(HandoffError::Semaphore(errno))
            }
        }
    }

    pub fn unlink(name: &str) -> Result<(), HandoffError> {
        let c_name = CString::new(name).map_err(|_| HandoffError::InvalidName)?;
        let ret = unsafe { libc::sem_unlink(c_name.as_ptr()) };
        if ret != 0 {
            return Err(HandoffError::Semaphore(Errno::last()));
        }
        Ok(())
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        unsafe {
            libc::sem_close(self.sem);
        }
    }
}

unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_then_wait_does_not_block() {
        let sem = Semaphore::new(0).unwrap();
        sem.post().unwrap();
        sem.wait().unwrap();
        assert_eq!(sem.value().unwrap(), 0);
    }

    #[test]
    fn test_value_tracks_posts() {
        let sem = Semaphore::new(2).unwrap();
        assert_eq!(sem.value().unwrap(), 2);

        sem.post().unwrap();
        assert_eq!(sem.value().unwrap(), 3);

        assert!(sem.try_wait().unwrap());
        assert_eq!(sem.value().unwrap(), 2);
    }

    #[test]
    fn test_try_wait_on_empty_semaphore() {
        let sem = Semaphore::new(0).unwrap();
        assert!(!sem.try_wait().unwrap());
    }
}
