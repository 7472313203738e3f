use std::net::Ipv4Addr;
use bytes::BufMut;
use crate::error::{SendError, SendResult};

pub const PROTOCOL_TCP: u8 = 6;
pub const DEFAULT_TTL: u8 = 64;

/// The IPv4 header wrapped around every outgoing segment.
///
/// ```ascii
///  0: version (4 bits, always 4) | header length in 32-bit words (4 bits, always 5)
///  1: type of service (always 0)
///  2: total length including this header (u16 BE)
///  4: identification (always 0)
///  6: flags (3 bits, 'don't fragment' is 010) | fragment offset (13 bits, always 0)
///  8: time to live
///  9: protocol
/// 10: header checksum - left at 0 for the raw transport (i.e. the kernel) to fill in
/// 12: source address
/// 16: destination address
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Ipv4Envelope {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub protocol: u8,
    pub ttl: u8,
    pub dont_fragment: bool,
    pub total_len: u16,
}

impl Ipv4Envelope {
    pub const HEADER_LEN: usize = 20;

    const VERSION_AND_IHL: u8 = 0x45;
    const FLAG_DONT_FRAGMENT: u16 = 0x4000;

    /// An envelope for a TCP payload with 'don't fragment' set
    pub fn for_tcp(source: Ipv4Addr, destination: Ipv4Addr, ttl: u8, payload_len: usize) -> SendResult<Ipv4Envelope> {
        let total_len = u16::try_from(Self::HEADER_LEN + payload_len)
            .map_err(|_| SendError::Encoding(format!("payload of {} bytes does not fit into an IPv4 packet", payload_len)))?;

        Ok(Ipv4Envelope {
            source,
            destination,
            protocol: PROTOCOL_TCP,
            ttl,
            dont_fragment: true,
            total_len,
        })
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u8(Self::VERSION_AND_IHL);
        buf.put_u8(0);
        buf.put_u16(self.total_len);
        buf.put_u16(0);
        buf.put_u16(if self.dont_fragment { Self::FLAG_DONT_FRAGMENT } else { 0 });
        buf.put_u8(self.ttl);
        buf.put_u8(self.protocol);
        buf.put_u16(0);
        buf.put_slice(&self.source.octets());
        buf.put_slice(&self.destination.octets());
    }
}
