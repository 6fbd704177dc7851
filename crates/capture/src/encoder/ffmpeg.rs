use ffmpeg_next as ffmpeg;

use ffmpeg::Dictionary;
use ffmpeg::codec;
use ffmpeg::util::error::EAGAIN;
use ffmpeg::util::format::Pixel;
use ffmpeg::util::frame;
use ffmpeg::util::rational::Rational;

use super::{EncodeError, FrameEncoder};
use crate::stream::PacketSink;

/// Nanosecond pts resolution; wire timestamps pass through the codec
/// unchanged.
const TIME_BASE: Rational = Rational(1, 1_000_000_000);

fn codec_err(err: ffmpeg::Error) -> EncodeError {
    EncodeError::Codec(err.to_string())
}

/// libx264 encoder tuned for the realtime path: zerolatency, no B-frames,
/// so packets leave in capture order with minimal buffering.
pub struct H264Encoder {
    encoder: ffmpeg::encoder::Video,
    frame: frame::Video,
    packet: ffmpeg::Packet,
    width: u32,
    height: u32,
}

impl H264Encoder {
    pub fn new(width: u32, height: u32, frame_duration_ns: i64) -> Result<Self, EncodeError> {
        ffmpeg::init().map_err(codec_err)?;

        let codec = ffmpeg::encoder::find_by_name("libx264")
            .ok_or_else(|| EncodeError::Codec("libx264 encoder not available".into()))?;

        let mut video = codec::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(codec_err)?;

        video.set_width(width);
        video.set_height(height);
        video.set_format(Pixel::YUV420P);
        video.set_time_base(TIME_BASE);
        video.set_max_b_frames(0);
        video.set_gop(60);
        if let Ok(interval) = i32::try_from(frame_duration_ns) {
            video.set_frame_rate(Some(Rational(1_000_000_000, interval)));
        }

        let mut opts = Dictionary::new();
        opts.set("preset", "ultrafast");
        opts.set("tune", "zerolatency");

        let encoder = video.open_with(opts).map_err(codec_err)?;

        Ok(Self {
            encoder,
            frame: frame::Video::new(Pixel::YUV420P, width, height),
            packet: ffmpeg::Packet::empty(),
            width,
            height,
        })
    }

    /// Copy the tightly packed capture planes into the avframe, honoring
    /// its alignment strides.
    fn fill_frame(&mut self, data: &[u8]) {
        let (w, h) = (self.width as usize, self.height as usize);
        let luma = w * h;
        let chroma = luma / 4;

        let planes: [(usize, usize, usize, &[u8]); 3] = [
            (0, w, h, &data[..luma]),
            (1, w / 2, h / 2, &data[luma..luma + chroma]),
            (2, w / 2, h / 2, &data[luma + chroma..luma + 2 * chroma]),
        ];

        for (plane, row_bytes, rows, src) in planes {
            let stride = self.frame.stride(plane);
            let dst = self.frame.data_mut(plane);
            for row in 0..rows {
                dst[row * stride..row * stride + row_bytes]
                    .copy_from_slice(&src[row * row_bytes..(row + 1) * row_bytes]);
            }
        }
    }

    fn drain(&mut self, sink: &mut dyn PacketSink) -> Result<(), EncodeError> {
        loop {
            match self.encoder.receive_packet(&mut self.packet) {
                Ok(()) => {
                    let timestamp_ns = self.packet.pts().unwrap_or(0) as u64;
                    let data = self.packet.data().unwrap_or(&[]);
                    sink.send_packet(&wire::frame_packet(timestamp_ns, data))?;
                }
                Err(ffmpeg::Error::Other { errno }) if errno == EAGAIN => return Ok(()),
                Err(ffmpeg::Error::Eof) => return Ok(()),
                Err(err) => return Err(codec_err(err)),
            }
        }
    }
}

impl FrameEncoder for H264Encoder {
    fn encode_frame(
        &mut self,
        frame: &[u8],
        timestamp_ns: u64,
        sink: &mut dyn PacketSink,
    ) -> Result<(), EncodeError> {
        let expected = (self.width * self.height) as usize * 3 / 2;
        if frame.len() != expected {
            return Err(EncodeError::Codec(format!(
                "Frame of {} bytes does not match the configured {} byte YUV420 layout",
                frame.len(),
                expected
            )));
        }

        self.fill_frame(frame);
        self.frame.set_pts(Some(timestamp_ns as i64));

        loop {
            match self.encoder.send_frame(&self.frame) {
                Ok(()) => break,
                // Internal buffer full; drain and resubmit.
                Err(ffmpeg::Error::Other { errno }) if errno == EAGAIN => self.drain(sink)?,
                Err(err) => return Err(codec_err(err)),
            }
        }

        self.drain(sink)
    }

    fn finish(&mut self, sink: &mut dyn PacketSink) -> Result<(), EncodeError> {
        self.encoder.send_eof().map_err(codec_err)?;
        self.drain(sink)
    }
}
