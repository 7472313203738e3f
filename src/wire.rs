use std::net::Ipv4Addr;
use bytes::{BufMut, Bytes, BytesMut};
use crate::error::{SendError, SendResult};
use crate::ip_envelope::{Ipv4Envelope, PROTOCOL_TCP};
use crate::segment::Segment;

/// Serialization of a fully populated segment to its on-the-wire bytes. This is a seam for
///  plugging in a different wire format; the sender core only ever sees the encoded bytes.
pub trait SegmentEncoder: Send + Sync + 'static {
    fn encode(&self, segment: &Segment) -> SendResult<Bytes>;
}

/// RFC 793 segment layout - all numbers in network byte order (BE):
///
/// ```ascii
///  0: source port (u16)
///  2: destination port (u16)
///  4: sequence number (u32)
///  8: acknowledgment number (u32)
/// 12: data offset, i.e. header length in 32-bit words (4 bits) | reserved (4 bits)
/// 13: flags (8 bits)
/// 14: window (u16)
/// 16: checksum (u16) over the IPv4 pseudo header, the TCP header and the payload
/// 18: urgent pointer (u16)
/// 20: options, padded with 0 bytes to a multiple of 4 bytes
///  *: payload
/// ```
pub struct TcpSegmentEncoder;

impl TcpSegmentEncoder {
    pub const MIN_HEADER_LEN: usize = 20;
    pub const MAX_HEADER_LEN: usize = 60;
    pub const MAX_OPTIONS_LEN: usize = Self::MAX_HEADER_LEN - Self::MIN_HEADER_LEN;

    const CHECKSUM_OFFSET: usize = 16;
}

impl SegmentEncoder for TcpSegmentEncoder {
    fn encode(&self, segment: &Segment) -> SendResult<Bytes> {
        let header = &segment.header;

        if header.options.len() > Self::MAX_OPTIONS_LEN {
            return Err(SendError::Encoding(format!("options have {} bytes, maximum is {}", header.options.len(), Self::MAX_OPTIONS_LEN)));
        }

        let padded_options_len = header.options.len().next_multiple_of(4);
        let header_len = Self::MIN_HEADER_LEN + padded_options_len;
        let segment_len = header_len + segment.payload.len();

        if segment_len > u16::MAX as usize - Ipv4Envelope::HEADER_LEN {
            return Err(SendError::Encoding(format!("segment of {} bytes does not fit into an IPv4 packet", segment_len)));
        }

        let mut buf = BytesMut::with_capacity(segment_len);
        buf.put_u16(header.src_port);
        buf.put_u16(header.dst_port);
        buf.put_u32(header.seq);
        buf.put_u32(header.ack);
        buf.put_u8(((header_len / 4) as u8) << 4);
        buf.put_u8(header.flags.bits());
        buf.put_u16(header.window);
        buf.put_u16(0); // checksum, patched below
        buf.put_u16(header.urgent_pointer);
        buf.put_slice(&header.options);
        buf.put_bytes(0, padded_options_len - header.options.len());
        buf.put_slice(&segment.payload);

        let checksum = tcp_checksum(segment.source, segment.destination, &buf);
        buf[Self::CHECKSUM_OFFSET..Self::CHECKSUM_OFFSET + 2].copy_from_slice(&checksum.to_be_bytes());

        Ok(buf.freeze())
    }
}

/// One's complement checksum over the IPv4 pseudo header and the encoded segment. Applied to a
///  segment with a correct checksum in place, this returns 0.
pub fn tcp_checksum(source: Ipv4Addr, destination: Ipv4Addr, segment: &[u8]) -> u16 {
    let mut sum: u64 = 0;

    for pair in source.octets().chunks_exact(2).chain(destination.octets().chunks_exact(2)) {
        sum += u16::from_be_bytes([pair[0], pair[1]]) as u64;
    }
    sum += PROTOCOL_TCP as u64;
    sum += segment.len() as u64;

    let mut words = segment.chunks_exact(2);
    for pair in &mut words {
        sum += u16::from_be_bytes([pair[0], pair[1]]) as u64;
    }
    if let [last] = words.remainder() {
        sum += u16::from_be_bytes([*last, 0]) as u64;
    }

    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}
