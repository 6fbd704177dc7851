//! Length-framed packet layout shared by the camera node and the ingest
//! server.
//!
//! A stream is a sequence of `{u64 timestamp_ns, u32 frame_size, payload}`
//! tuples, header fields big-endian, closed by an 8-byte `EOSTREAM` sentinel
//! occupying the timestamp slot with nothing after it.

pub const TIMESTAMP_BYTES: usize = 8;
pub const SIZE_BYTES: usize = 4;
pub const HEADER_BYTES: usize = TIMESTAMP_BYTES + SIZE_BYTES;

/// End-of-stream sentinel. Sent as-is, without a size or payload.
pub const EOSTREAM: [u8; TIMESTAMP_BYTES] = *b"EOSTREAM";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub timestamp_ns: u64,
    pub frame_size: u32,
}

impl PacketHeader {
    pub fn encode(&self) -> [u8; HEADER_BYTES] {
        let mut bytes = [0u8; HEADER_BYTES];
        bytes[..TIMESTAMP_BYTES].copy_from_slice(&self.timestamp_ns.to_be_bytes());
        bytes[TIMESTAMP_BYTES..].copy_from_slice(&self.frame_size.to_be_bytes());
        bytes
    }

    pub fn parse(bytes: &[u8; HEADER_BYTES]) -> Self {
        let mut timestamp = [0u8; TIMESTAMP_BYTES];
        timestamp.copy_from_slice(&bytes[..TIMESTAMP_BYTES]);
        let mut size = [0u8; SIZE_BYTES];
        size.copy_from_slice(&bytes[TIMESTAMP_BYTES..]);

        Self {
            timestamp_ns: u64::from_be_bytes(timestamp),
            frame_size: u32::from_be_bytes(size),
        }
    }
}

/// True when the bytes read from the timestamp slot are the end-of-stream
/// sentinel rather than a timestamp.
pub fn is_eostream(timestamp_slot: &[u8; TIMESTAMP_BYTES]) -> bool {
    *timestamp_slot == EOSTREAM
}

/// Frame one encoded packet for the wire.
pub fn frame_packet(timestamp_ns: u64, payload: &[u8]) -> Vec<u8> {
    let header = PacketHeader {
        timestamp_ns,
        frame_size: payload.len() as u32,
    };

    let mut packet = Vec::with_capacity(HEADER_BYTES + payload.len());
    packet.extend_from_slice(&header.encode());
    packet.extend_from_slice(payload);
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let header = PacketHeader {
            timestamp_ns: 1_726_000_123_456_789,
            frame_size: 48_213,
        };
        assert_eq!(PacketHeader::parse(&header.encode()), header);
    }

    #[test]
    fn test_header_layout_is_big_endian() {
        let header = PacketHeader {
            timestamp_ns: 0x0102_0304_0506_0708,
            frame_size: 0x0A0B_0C0D,
        };
        assert_eq!(
            header.encode(),
            [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x0A, 0x0B, 0x0C, 0x0D]
        );
    }

    #[test]
    fn test_frame_packet_prefixes_header() {
        let packet = frame_packet(7, b"abc");
        assert_eq!(packet.len(), HEADER_BYTES + 3);

        let header = PacketHeader::parse(&packet[..HEADER_BYTES].try_into().unwrap());
        assert_eq!(header.timestamp_ns, 7);
        assert_eq!(header.frame_size, 3);
        assert_eq!(&packet[HEADER_BYTES..], b"abc");
    }

    #[test]
    fn test_sentinel_detection() {
        assert!(is_eostream(b"EOSTREAM"));
        assert!(!is_eostream(&7u64.to_be_bytes()));

        // A real timestamp cannot collide with the sentinel: the ASCII bytes
        // decode to ~158 years of monotonic nanoseconds.
        let as_timestamp = u64::from_be_bytes(EOSTREAM);
        assert!(as_timestamp > 1_000_000_000_000_000_000);
    }
}
