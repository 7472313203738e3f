use bytes::Bytes;
use tracing::trace;
use crate::error::SendResult;
use crate::packet_sender::PacketSender;
use crate::segment::{Segment, TcpFlags};

/// Control segments carry no payload and are transmitted exactly once. They do not take part in
///  retransmission, and they do not advance the connection's sequence counter: seq and ack are
///  chosen by the connection state machine.
impl PacketSender {
    pub async fn send_ack(&self, seq: u32, ack: u32) -> SendResult<()> {
        trace!("sending ACK seq {} ack {}", seq, ack);
        self.send_segment(Segment::new(seq, ack, TcpFlags::ACK, Bytes::new())).await
    }

    pub async fn send_reset(&self, seq: u32, ack: u32) -> SendResult<()> {
        trace!("sending RST seq {} ack {}", seq, ack);
        self.send_segment(Segment::new(seq, ack, TcpFlags::RST, Bytes::new())).await
    }

    pub async fn send_fin(&self, seq: u32, ack: u32) -> SendResult<()> {
        trace!("sending FIN seq {} ack {}", seq, ack);
        self.send_segment(Segment::new(seq, ack, TcpFlags::FIN | TcpFlags::ACK, Bytes::new())).await
    }
}
