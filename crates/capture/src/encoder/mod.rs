use thiserror::Error;

use crate::error::TransmitError;
use crate::stream::PacketSink;

#[cfg(feature = "ffmpeg")]
mod ffmpeg;
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::H264Encoder;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Encoder failure: {0}")]
    Codec(String),

    #[error(transparent)]
    Transmit(#[from] TransmitError),
}

/// Opaque video encoder seam.
///
/// Implementations emit zero or more packets per input frame, each handed to
/// the sink as complete wire-format bytes, and must preserve input order.
/// The sink is format-agnostic.
pub trait FrameEncoder: Send {
    /// Encode one planar YUV420 frame captured at `timestamp_ns`.
    fn encode_frame(
        &mut self,
        frame: &[u8],
        timestamp_ns: u64,
        sink: &mut dyn PacketSink,
    ) -> Result<(), EncodeError>;

    /// Drain any delayed packets at end of stream.
    fn finish(&mut self, sink: &mut dyn PacketSink) -> Result<(), EncodeError>;
}
