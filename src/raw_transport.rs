use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
#[cfg(test)] use mockall::automock;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::{error, info, trace};
use crate::error::SendResult;
use crate::ip_envelope::Ipv4Envelope;

/// This is an abstraction for writing an IP packet to the network, introduced to facilitate
///  mocking the I/O part away for testing
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RawTransport: Send + Sync + 'static {
    async fn transmit(&self, envelope: &Ipv4Envelope, payload: &[u8]) -> SendResult<()>;
}

/// A raw IPv4 socket with 'header included', i.e. this code writes the IP header itself and the
///  kernel only fills in the header checksum.
///
/// NB: Opening a raw socket requires elevated privileges (`CAP_NET_RAW` on Linux)
pub struct RawIpSocket {
    socket: Arc<Socket>,
}

impl RawIpSocket {
    pub fn new() -> anyhow::Result<RawIpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::TCP))?;
        socket.set_header_included(true)?;
        info!("opened raw IPv4 socket");

        Ok(RawIpSocket {
            socket: Arc::new(socket),
        })
    }
}

#[async_trait]
impl RawTransport for RawIpSocket {
    async fn transmit(&self, envelope: &Ipv4Envelope, payload: &[u8]) -> SendResult<()> {
        let mut packet = BytesMut::with_capacity(Ipv4Envelope::HEADER_LEN + payload.len());
        envelope.ser(&mut packet);
        packet.put_slice(payload);

        let to = SockAddr::from(SocketAddr::V4(SocketAddrV4::new(envelope.destination, 0)));
        trace!("raw socket: sending {} bytes to {}", packet.len(), envelope.destination);

        let socket = self.socket.clone();
        let result = tokio::task::spawn_blocking(move || socket.send_to(&packet, &to))
            .await
            .map_err(std::io::Error::other)?;

        if let Err(e) = &result {
            error!("error sending raw packet to {}: {}", envelope.destination, e);
        }
        result?;
        Ok(())
    }
}
