use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use bytes::{Buf, Bytes};
use tokio::time::Instant;
use crate::config::SenderConfig;
use crate::connection::{ConnectionContext, Endpoints};
use crate::error::SendResult;
use crate::ip_envelope::Ipv4Envelope;
use crate::raw_transport::RawTransport;
use crate::segment::TcpFlags;

pub fn test_endpoints() -> Endpoints {
    Endpoints {
        local_addr: SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 40000),
        remote_addr: SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 80),
    }
}

pub fn test_context(config: SenderConfig, initial_seq: u32, initial_ack: u32) -> Arc<ConnectionContext> {
    Arc::new(ConnectionContext::new(test_endpoints(), initial_seq, initial_ack, 1024, Arc::new(config)))
}

#[derive(Clone, Debug)]
pub struct SentPacket {
    pub at: Instant,
    pub envelope: Ipv4Envelope,
    pub bytes: Bytes,
}

/// A [RawTransport] that records every packet together with the (tokio) time it was sent at
pub struct RecordingTransport {
    sent: Mutex<Vec<SentPacket>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<RecordingTransport> {
        Arc::new(RecordingTransport {
            sent: Default::default(),
        })
    }

    pub fn sent(&self) -> Vec<SentPacket> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl RawTransport for RecordingTransport {
    async fn transmit(&self, envelope: &Ipv4Envelope, payload: &[u8]) -> SendResult<()> {
        self.sent.lock().unwrap().push(SentPacket {
            at: Instant::now(),
            envelope: envelope.clone(),
            bytes: Bytes::copy_from_slice(payload),
        });
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodedSegment {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: TcpFlags,
    pub window: u16,
    pub payload: Bytes,
}

/// parses the fields of an encoded segment that tests are interested in
pub fn decode_segment(mut buf: &[u8]) -> DecodedSegment {
    let header_len = ((buf[12] >> 4) as usize) * 4;
    let payload = Bytes::copy_from_slice(&buf[header_len..]);

    let src_port = buf.get_u16();
    let dst_port = buf.get_u16();
    let seq = buf.get_u32();
    let ack = buf.get_u32();
    let _data_offset = buf.get_u8();
    let flags = TcpFlags::from_bits_retain(buf.get_u8());
    let window = buf.get_u16();

    DecodedSegment {
        src_port,
        dst_port,
        seq,
        ack,
        flags,
        window,
        payload,
    }
}
