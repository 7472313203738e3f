use std::sync::Arc;
use bytes::Bytes;
use tracing::{error, trace};
use crate::connection::ConnectionContext;
use crate::error::SendResult;
use crate::ip_envelope::Ipv4Envelope;
use crate::raw_transport::RawTransport;
use crate::segment::Segment;
use crate::wire::SegmentEncoder;

/// A segment that is fully framed and ready to go on the wire. Retransmissions re-send this
///  exact packet, so they are byte-identical to the first transmission.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutboundPacket {
    pub seq: u32,
    pub envelope: Ipv4Envelope,
    pub bytes: Bytes,
}

/// Framing and transmission of segments for one connection: fills in the connection-derived
///  header fields, encodes the segment, wraps it in an IPv4 envelope and hands it to the raw
///  transport. There is no retry here - that is the caller's responsibility.
#[derive(Clone)]
pub struct PacketSender {
    context: Arc<ConnectionContext>,
    encoder: Arc<dyn SegmentEncoder>,
    transport: Arc<dyn RawTransport>,
}

impl PacketSender {
    pub fn new(context: Arc<ConnectionContext>, encoder: Arc<dyn SegmentEncoder>, transport: Arc<dyn RawTransport>) -> PacketSender {
        PacketSender {
            context,
            encoder,
            transport,
        }
    }

    pub fn context(&self) -> &Arc<ConnectionContext> {
        &self.context
    }

    /// Requires seq, ack, flags, urgent pointer and options to be set; sets everything else
    pub fn prepare(&self, mut segment: Segment) -> SendResult<OutboundPacket> {
        let endpoints = self.context.endpoints();
        segment.header.src_port = endpoints.local_addr.port();
        segment.header.dst_port = endpoints.remote_addr.port();
        segment.header.window = self.context.window();
        segment.source = *endpoints.local_addr.ip();
        segment.destination = *endpoints.remote_addr.ip();

        let bytes = self.encoder.encode(&segment)
            .inspect_err(|e| error!("error encoding {:?}: {}", segment, e))?;

        let envelope = Ipv4Envelope::for_tcp(segment.source, segment.destination, self.context.config().ttl, bytes.len())?;

        Ok(OutboundPacket {
            seq: segment.header.seq,
            envelope,
            bytes,
        })
    }

    pub async fn transmit(&self, packet: &OutboundPacket) -> SendResult<()> {
        trace!("transmitting segment seq {} to {}: {} bytes", packet.seq, packet.envelope.destination, packet.bytes.len());

        self.transport.transmit(&packet.envelope, &packet.bytes).await
            .inspect_err(|e| error!("error transmitting segment seq {}: {}", packet.seq, e))
    }

    /// Frame and transmit a segment once
    pub async fn send_segment(&self, segment: Segment) -> SendResult<()> {
        let packet = self.prepare(segment)?;
        self.transmit(&packet).await
    }
}
