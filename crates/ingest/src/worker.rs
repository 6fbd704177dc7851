use std::io::{self, Read};
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use common::retry::RetryPolicy;

use crate::decoder::{DecodeEvent, VideoDecoder};
use crate::error::IngestError;
use crate::sink::FrameSink;
use crate::timestamps::TimestampQueue;

/// Why a connection ended without a protocol error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// The sender closed the stream with the end-of-stream sentinel.
    EndOfStream,
    /// The peer disconnected cleanly on a packet boundary; the camera will
    /// reconnect.
    Disconnected,
}

#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub packets: u64,
    pub frames: u64,
}

/// Per-connection bounds.
pub struct StreamLimits {
    /// Largest encoded frame accepted from the wire.
    pub max_frame_size: usize,
    /// Bytes of one decoded YUV420 frame.
    pub frame_bytes: usize,
}

/// Fresh decoder per connection; codec state does not survive a flush.
pub type DecoderFactory = Box<dyn Fn() -> Result<Box<dyn VideoDecoder>, IngestError> + Send>;

pub struct WorkerConfig {
    pub name: String,
    pub port: u16,
    pub core: usize,
    pub limits: StreamLimits,
}

/// Per-connection ingest loop.
///
/// Reads `{timestamp, size, payload}` tuples, feeds the decoder, and pairs
/// every decoded frame with the next queued timestamp. Decoder output is
/// not 1:1 with input packets, so the queue is drained after every packet
/// and again after the end-of-stream flush. Any short read terminates the
/// connection as a protocol violation.
pub fn run_connection<R: Read>(
    mut stream: R,
    decoder: &mut dyn VideoDecoder,
    sink: &mut dyn FrameSink,
    limits: &StreamLimits,
) -> Result<(ConnectionEnd, ConnectionStats), IngestError> {
    let mut timestamps = TimestampQueue::new();
    let mut frame_buf = vec![0u8; limits.frame_bytes];
    let mut payload = vec![0u8; limits.max_frame_size];
    let mut stats = ConnectionStats::default();

    loop {
        let mut ts_bytes = [0u8; wire::TIMESTAMP_BYTES];
        let n = read_full(&mut stream, &mut ts_bytes)?;
        if n == 0 {
            return Ok((ConnectionEnd::Disconnected, stats));
        }
        if n < ts_bytes.len() {
            return Err(IngestError::Protocol(format!(
                "Unexpected timestamp read of {n} bytes"
            )));
        }

        if wire::is_eostream(&ts_bytes) {
            tracing::info!("End of stream received");
            decoder.flush()?;
            drain_decoder(decoder, sink, &mut timestamps, &mut frame_buf, &mut stats)?;
            if !timestamps.is_empty() {
                tracing::warn!(
                    remaining = timestamps.len(),
                    "Timestamps left unpaired at end of stream"
                );
            }
            return Ok((ConnectionEnd::EndOfStream, stats));
        }

        let timestamp_ns = u64::from_be_bytes(ts_bytes);
        timestamps.push(timestamp_ns);

        let mut size_bytes = [0u8; wire::SIZE_BYTES];
        let n = read_full(&mut stream, &mut size_bytes)?;
        if n < size_bytes.len() {
            return Err(IngestError::Protocol(format!(
                "Unexpected frame size read of {n} bytes"
            )));
        }

        let frame_size = u32::from_be_bytes(size_bytes) as usize;
        if frame_size > limits.max_frame_size {
            return Err(IngestError::Protocol(format!(
                "Frame of {frame_size} bytes exceeds the {} byte receive buffer",
                limits.max_frame_size
            )));
        }

        let n = read_full(&mut stream, &mut payload[..frame_size])?;
        if n < frame_size {
            return Err(IngestError::Protocol(format!(
                "Unexpected frame read of {n} bytes, wanted {frame_size}"
            )));
        }

        decoder.decode_packet(&payload[..frame_size])?;
        stats.packets += 1;

        drain_decoder(decoder, sink, &mut timestamps, &mut frame_buf, &mut stats)?;
    }
}

/// Pull decoded frames until the codec wants more input or ends the stream,
/// pairing each with the next timestamp in FIFO order.
fn drain_decoder(
    decoder: &mut dyn VideoDecoder,
    sink: &mut dyn FrameSink,
    timestamps: &mut TimestampQueue,
    frame_buf: &mut [u8],
    stats: &mut ConnectionStats,
) -> Result<(), IngestError> {
    loop {
        match decoder.receive_frame(frame_buf)? {
            DecodeEvent::Frame => {
                let Some(timestamp_ns) = timestamps.pop() else {
                    return Err(IngestError::Protocol(
                        "Decoder emitted more frames than received packets".into(),
                    ));
                };
                sink.publish(timestamp_ns, frame_buf)?;
                stats.frames += 1;
            }
            DecodeEvent::NeedsInput | DecodeEvent::EndOfStream => return Ok(()),
        }
    }
}

/// Read until `buf` is full or the stream ends; returns the bytes read.
fn read_full<R: Read>(stream: &mut R, buf: &mut [u8]) -> Result<usize, IngestError> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(filled)
}

/// One worker per camera: pin to the configured core, accept a stream, run
/// it to end-of-stream or error, and accept again, since the camera
/// reconnects on packet boundaries after socket resets.
pub fn run_worker(
    cfg: WorkerConfig,
    decoder_factory: DecoderFactory,
    mut sink: Box<dyn FrameSink>,
    shutdown: Arc<AtomicBool>,
) -> Result<(), IngestError> {
    common::rt::pin_to_core(cfg.core)
        .map_err(|errno| io::Error::from_raw_os_error(errno as i32))?;

    let listener =
        RetryPolicy::default().run("Listener bind", || TcpListener::bind(("0.0.0.0", cfg.port)))?;
    listener.set_nonblocking(true)?;
    tracing::info!(camera = %cfg.name, port = cfg.port, core = cfg.core, "Worker listening");

    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                tracing::info!(camera = %cfg.name, %peer, "Stream connected");
                stream.set_nonblocking(false)?;

                let mut decoder = decoder_factory()?;
                match run_connection(stream, decoder.as_mut(), sink.as_mut(), &cfg.limits) {
                    Ok((ConnectionEnd::EndOfStream, stats)) => {
                        tracing::info!(
                            camera = %cfg.name,
                            packets = stats.packets,
                            frames = stats.frames,
                            "Stream complete"
                        );
                        return Ok(());
                    }
                    Ok((ConnectionEnd::Disconnected, stats)) => {
                        tracing::info!(
                            camera = %cfg.name,
                            packets = stats.packets,
                            frames = stats.frames,
                            "Stream disconnected; awaiting reconnect"
                        );
                    }
                    Err(err) => {
                        tracing::error!(camera = %cfg.name, error = %err, "Connection terminated");
                    }
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(err) => return Err(err.into()),
        }
    }

    tracing::info!(camera = %cfg.name, "Worker shutting down");
    Ok(())
}
