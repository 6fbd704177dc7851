use ffmpeg_next as ffmpeg;

use ffmpeg::util::error::EAGAIN;
use ffmpeg::util::format::Pixel;
use ffmpeg::util::frame;

use super::{DecodeEvent, VideoDecoder};
use crate::error::IngestError;

fn codec_err(err: ffmpeg::Error) -> IngestError {
    IngestError::Decoder(err.to_string())
}

pub struct H264Decoder {
    decoder: ffmpeg::decoder::Video,
    frame: frame::Video,
    width: u32,
    height: u32,
}

impl H264Decoder {
    pub fn new(width: u32, height: u32) -> Result<Self, IngestError> {
        ffmpeg::init().map_err(codec_err)?;

        let codec = ffmpeg::decoder::find(ffmpeg::codec::Id::H264)
            .ok_or_else(|| IngestError::Decoder("H264 decoder not available".into()))?;
        let decoder = ffmpeg::codec::Context::new_with_codec(codec)
            .decoder()
            .video()
            .map_err(codec_err)?;

        Ok(Self {
            decoder,
            frame: frame::Video::empty(),
            width,
            height,
        })
    }

    /// Flatten the decoded planes into the packed YUV420 layout the dataset
    /// pipeline expects.
    fn copy_planes(&self, out: &mut [u8]) -> Result<(), IngestError> {
        if self.frame.format() != Pixel::YUV420P
            || self.frame.width() != self.width
            || self.frame.height() != self.height
        {
            return Err(IngestError::Decoder(format!(
                "Decoded frame is {}x{} {:?}, expected {}x{} YUV420P",
                self.frame.width(),
                self.frame.height(),
                self.frame.format(),
                self.width,
                self.height,
            )));
        }

        let (w, h) = (self.width as usize, self.height as usize);
        let needed = w * h * 3 / 2;
        if out.len() < needed {
            return Err(IngestError::Decoder(format!(
                "Output buffer of {} bytes cannot hold a {} byte frame",
                out.len(),
                needed
            )));
        }

        let mut offset = 0;
        for (plane, row_bytes, rows) in [(0, w, h), (1, w / 2, h / 2), (2, w / 2, h / 2)] {
            let stride = self.frame.stride(plane);
            let data = self.frame.data(plane);
            for row in 0..rows {
                out[offset..offset + row_bytes]
                    .copy_from_slice(&data[row * stride..row * stride + row_bytes]);
                offset += row_bytes;
            }
        }
        Ok(())
    }
}

impl VideoDecoder for H264Decoder {
    fn decode_packet(&mut self, packet: &[u8]) -> Result<(), IngestError> {
        let packet = ffmpeg::Packet::copy(packet);
        self.decoder.send_packet(&packet).map_err(codec_err)
    }

    fn receive_frame(&mut self, out: &mut [u8]) -> Result<DecodeEvent, IngestError> {
        match self.decoder.receive_frame(&mut self.frame) {
            Ok(()) => {
                self.copy_planes(out)?;
                Ok(DecodeEvent::Frame)
            }
            Err(ffmpeg::Error::Other { errno }) if errno == EAGAIN => Ok(DecodeEvent::NeedsInput),
            Err(ffmpeg::Error::Eof) => Ok(DecodeEvent::EndOfStream),
            Err(err) => Err(codec_err(err)),
        }
    }

    fn flush(&mut self) -> Result<(), IngestError> {
        self.decoder.send_eof().map_err(codec_err)
    }
}
