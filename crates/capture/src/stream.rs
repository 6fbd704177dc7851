use std::io;
use std::net::{SocketAddr, TcpStream};
use std::os::fd::IntoRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use common::retry::RetryPolicy;

use crate::error::TransmitError;

/// Receives complete wire-framed packets from the encoder.
pub trait PacketSink {
    fn send_packet(&mut self, packet: &[u8]) -> Result<(), TransmitError>;
}

/// Streams encoded packets to the ingest server.
///
/// The fd is shared with the watchdog and shutdown signal handlers, either
/// of which may close it at any time. A write that fails for any reason
/// abandons the rest of its packet and clears the fd, so the stream always
/// resumes on a packet boundary.
pub struct PacketStreamer {
    addr: SocketAddr,
    sockfd: Arc<AtomicI32>,
}

impl PacketStreamer {
    pub fn new(addr: SocketAddr, sockfd: Arc<AtomicI32>) -> Self {
        Self { addr, sockfd }
    }

    /// Establish the initial connection. Later reconnects happen lazily in
    /// `send_packet`.
    pub fn connect(&self) -> Result<(), TransmitError> {
        let stream = RetryPolicy::default()
            .run("Stream connect", || TcpStream::connect(self.addr))
            .map_err(TransmitError::Connect)?;

        self.install(stream);
        tracing::info!(peer = %self.addr, "Stream connected");
        Ok(())
    }

    fn reconnect(&self) -> Result<(), TransmitError> {
        let stream = TcpStream::connect(self.addr).map_err(TransmitError::Connect)?;
        self.install(stream);
        tracing::info!(peer = %self.addr, "Stream reconnected");
        Ok(())
    }

    fn install(&self, stream: TcpStream) {
        let fd = stream.into_raw_fd();
        let old = self.sockfd.swap(fd, Ordering::AcqRel);
        if old >= 0 {
            // SAFETY: old was a socket this streamer owned.
            unsafe { libc::close(old) };
        }
    }

    fn teardown(&self) {
        let fd = self.sockfd.swap(-1, Ordering::AcqRel);
        if fd >= 0 {
            unsafe { libc::close(fd) };
        }
    }
}

impl PacketSink for PacketStreamer {
    fn send_packet(&mut self, packet: &[u8]) -> Result<(), TransmitError> {
        if self.sockfd.load(Ordering::Acquire) < 0 {
            self.reconnect()?;
        }

        let mut written = 0;
        while written < packet.len() {
            let fd = self.sockfd.load(Ordering::Acquire);
            if fd < 0 {
                // Closed underneath us mid-packet by the watchdog or
                // shutdown; the remainder cannot be framed, drop it.
                return Err(TransmitError::Write(io::Error::from_raw_os_error(
                    libc::EBADF,
                )));
            }

            let remaining = &packet[written..];
            // SAFETY: the buffer is live for the call; a stale or closed fd
            // makes the write fail, which we treat as a lost packet.
            let n = unsafe { libc::write(fd, remaining.as_ptr().cast(), remaining.len()) };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                self.teardown();
                return Err(TransmitError::Write(err));
            }

            written += n as usize;
        }

        Ok(())
    }
}
