use std::fmt::{Debug, Formatter};
use std::net::Ipv4Addr;
use bitflags::bitflags;
use bytes::Bytes;

bitflags! {
    #[derive(PartialEq, Eq, Copy, Clone, Debug)]
    pub struct TcpFlags: u8 {
        const FIN = 0b0000_0001;
        const SYN = 0b0000_0010;
        const RST = 0b0000_0100;
        const PSH = 0b0000_1000;
        const ACK = 0b0001_0000;
        const URG = 0b0010_0000;
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SegmentHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: TcpFlags,
    pub window: u16,
    /// urgent data is not supported, so this is always 0 for segments built by this crate
    pub urgent_pointer: u16,
    pub options: Bytes,
}

/// A segment is built with its control fields (seq, ack, flags, urgent pointer, options) and
///  payload; ports, window and addresses are connection-derived and filled in by
///  [crate::packet_sender::PacketSender::prepare] right before encoding.
#[derive(Clone, Eq, PartialEq)]
pub struct Segment {
    pub header: SegmentHeader,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub payload: Bytes,
}

impl Debug for Segment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SEG{{{}->{}:{} seq={} ack={} {:?} len={}}}",
               self.source, self.destination, self.header.dst_port,
               self.header.seq, self.header.ack, self.header.flags, self.payload.len())
    }
}

impl Segment {
    pub fn new(seq: u32, ack: u32, flags: TcpFlags, payload: Bytes) -> Segment {
        Segment {
            header: SegmentHeader {
                src_port: 0,
                dst_port: 0,
                seq,
                ack,
                flags,
                window: 0,
                urgent_pointer: 0,
                options: Bytes::new(),
            },
            source: Ipv4Addr::UNSPECIFIED,
            destination: Ipv4Addr::UNSPECIFIED,
            payload,
        }
    }

    pub fn payload_len(&self) -> u32 {
        self.payload.len() as u32
    }

    /// The cumulative ack value that confirms this segment: the peer has received everything
    ///  up to and including the segment's last payload byte.
    pub fn ack_target(&self) -> u32 {
        self.header.seq.wrapping_add(self.payload_len())
    }
}
