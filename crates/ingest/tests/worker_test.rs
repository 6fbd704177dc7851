//! Drives the per-connection state machine from in-memory byte streams,
//! with a mock decoder whose internal latency mimics a real codec's
//! not-1:1 packet-to-frame behavior.

use std::collections::VecDeque;
use std::io::Cursor;

use ingest::decoder::{DecodeEvent, VideoDecoder};
use ingest::error::IngestError;
use ingest::sink::FrameSink;
use ingest::worker::{ConnectionEnd, StreamLimits, run_connection};

/// Passthrough decoder that holds `latency` packets before emitting each as
/// a "decoded frame" (the payload itself), and drains fully after a flush.
struct MockDecoder {
    latency: usize,
    pending: VecDeque<Vec<u8>>,
    flushed: bool,
}

impl MockDecoder {
    fn with_latency(latency: usize) -> Self {
        Self {
            latency,
            pending: VecDeque::new(),
            flushed: false,
        }
    }
}

impl VideoDecoder for MockDecoder {
    fn decode_packet(&mut self, packet: &[u8]) -> Result<(), IngestError> {
        self.pending.push_back(packet.to_vec());
        Ok(())
    }

    fn receive_frame(&mut self, out: &mut [u8]) -> Result<DecodeEvent, IngestError> {
        let ready = if self.flushed {
            !self.pending.is_empty()
        } else {
            self.pending.len() > self.latency
        };

        if !ready {
            return Ok(if self.flushed {
                DecodeEvent::EndOfStream
            } else {
                DecodeEvent::NeedsInput
            });
        }

        let frame = self.pending.pop_front().unwrap();
        out[..frame.len()].copy_from_slice(&frame);
        out[frame.len()..].fill(0);
        Ok(DecodeEvent::Frame)
    }

    fn flush(&mut self) -> Result<(), IngestError> {
        self.flushed = true;
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    published: Vec<(u64, Vec<u8>)>,
}

impl FrameSink for RecordingSink {
    fn publish(&mut self, timestamp_ns: u64, frame: &[u8]) -> Result<(), IngestError> {
        self.published.push((timestamp_ns, frame.to_vec()));
        Ok(())
    }
}

fn limits() -> StreamLimits {
    StreamLimits {
        max_frame_size: 256,
        frame_bytes: 64,
    }
}

/// Build a wire stream of `count` packets with distinct timestamps and
/// payloads, optionally closed by the sentinel.
fn stream_of(count: usize, with_eos: bool) -> Vec<u8> {
    let mut bytes = Vec::new();
    for i in 0..count {
        let payload = vec![i as u8; 16 + i];
        bytes.extend_from_slice(&wire::frame_packet(1_000 + i as u64, &payload));
    }
    if with_eos {
        bytes.extend_from_slice(&wire::EOSTREAM);
    }
    bytes
}

/// Steady state into EOS: every packet's timestamp is paired with its own
/// frame, in order, despite the decoder's 2-packet latency.
#[test]
fn test_pairs_every_frame_with_its_timestamp() {
    let mut decoder = MockDecoder::with_latency(2);
    let mut sink = RecordingSink::default();

    let (end, stats) = run_connection(
        Cursor::new(stream_of(6, true)),
        &mut decoder,
        &mut sink,
        &limits(),
    )
    .unwrap();

    assert_eq!(end, ConnectionEnd::EndOfStream);
    assert_eq!(stats.packets, 6);
    assert_eq!(stats.frames, 6, "flush must drain the delayed frames");

    for (i, (timestamp, frame)) in sink.published.iter().enumerate() {
        assert_eq!(*timestamp, 1_000 + i as u64);
        assert_eq!(&frame[..16 + i], vec![i as u8; 16 + i].as_slice());
    }
}

/// With a zero-latency decoder, frames and timestamps stay in lockstep
/// packet by packet.
#[test]
fn test_zero_latency_decoder_stays_in_lockstep() {
    let mut decoder = MockDecoder::with_latency(0);
    let mut sink = RecordingSink::default();

    let (end, stats) = run_connection(
        Cursor::new(stream_of(4, true)),
        &mut decoder,
        &mut sink,
        &limits(),
    )
    .unwrap();

    assert_eq!(end, ConnectionEnd::EndOfStream);
    assert_eq!(stats.frames, 4);
    let timestamps: Vec<u64> = sink.published.iter().map(|(ts, _)| *ts).collect();
    assert_eq!(timestamps, vec![1_000, 1_001, 1_002, 1_003]);
}

/// A frame size beyond the receive buffer is a protocol violation that
/// terminates the connection.
#[test]
fn test_oversized_frame_terminates_connection() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(
        &wire::PacketHeader {
            timestamp_ns: 1,
            frame_size: 1_000,
        }
        .encode(),
    );
    bytes.resize(bytes.len() + 1_000, 0);

    let mut decoder = MockDecoder::with_latency(0);
    let mut sink = RecordingSink::default();

    let err = run_connection(Cursor::new(bytes), &mut decoder, &mut sink, &limits()).unwrap_err();
    match err {
        IngestError::Protocol(msg) => assert!(msg.contains("exceeds")),
        other => panic!("Expected Protocol error, got {other:?}"),
    }
}

/// A stream truncated mid-payload is a protocol violation, not a clean
/// disconnect.
#[test]
fn test_short_read_is_protocol_error() {
    let mut bytes = stream_of(1, false);
    bytes.truncate(bytes.len() - 3);

    let mut decoder = MockDecoder::with_latency(0);
    let mut sink = RecordingSink::default();

    let err = run_connection(Cursor::new(bytes), &mut decoder, &mut sink, &limits()).unwrap_err();
    assert!(matches!(err, IngestError::Protocol(_)));
}

/// EOF on a packet boundary is a clean disconnect: the camera dropped the
/// socket (watchdog) and will reconnect.
#[test]
fn test_disconnect_on_packet_boundary_is_clean() {
    let mut decoder = MockDecoder::with_latency(0);
    let mut sink = RecordingSink::default();

    let (end, stats) = run_connection(
        Cursor::new(stream_of(3, false)),
        &mut decoder,
        &mut sink,
        &limits(),
    )
    .unwrap();

    assert_eq!(end, ConnectionEnd::Disconnected);
    assert_eq!(stats.packets, 3);
    assert_eq!(stats.frames, 3);
}

/// Timestamp conservation: the queue never goes negative, and a decoder
/// that emits more frames than packets is rejected.
#[test]
fn test_overproducing_decoder_is_a_protocol_error() {
    struct DoublingDecoder {
        ready: usize,
    }

    impl VideoDecoder for DoublingDecoder {
        fn decode_packet(&mut self, _packet: &[u8]) -> Result<(), IngestError> {
            self.ready += 2;
            Ok(())
        }

        fn receive_frame(&mut self, out: &mut [u8]) -> Result<DecodeEvent, IngestError> {
            if self.ready == 0 {
                return Ok(DecodeEvent::NeedsInput);
            }
            self.ready -= 1;
            out.fill(0xAB);
            Ok(DecodeEvent::Frame)
        }

        fn flush(&mut self) -> Result<(), IngestError> {
            Ok(())
        }
    }

    let mut decoder = DoublingDecoder { ready: 0 };
    let mut sink = RecordingSink::default();

    let err = run_connection(
        Cursor::new(stream_of(2, true)),
        &mut decoder,
        &mut sink,
        &limits(),
    )
    .unwrap_err();
    assert!(matches!(err, IngestError::Protocol(_)));
}

/// An empty connection (open, then close) is a clean disconnect with no
/// traffic.
#[test]
fn test_empty_connection_is_clean() {
    let mut decoder = MockDecoder::with_latency(0);
    let mut sink = RecordingSink::default();

    let (end, stats) = run_connection(
        Cursor::new(Vec::new()),
        &mut decoder,
        &mut sink,
        &limits(),
    )
    .unwrap();

    assert_eq!(end, ConnectionEnd::Disconnected);
    assert_eq!(stats.packets, 0);
    assert_eq!(stats.frames, 0);
}
