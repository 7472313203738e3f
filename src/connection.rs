use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use crate::ack_broadcaster::AckBroadcaster;
use crate::config::SenderConfig;
use crate::delivery_reports::{DeliveryReport, DeliveryReportNotifier};
use crate::dispatcher::run_dispatcher;
use crate::error::SendResult;
use crate::packet_sender::PacketSender;
use crate::raw_transport::RawTransport;
use crate::send_buffer::SendBuffer;
use crate::wire::SegmentEncoder;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Endpoints {
    pub local_addr: SocketAddrV4,
    pub remote_addr: SocketAddrV4,
}

/// Per-connection state shared by the connection's tasks.
///
/// `next_seq` is the sequence number for the next chunk of outgoing data. It counts bytes that
///  were *assigned* to segments, not bytes that were confirmed. `next_ack` and `window` are
///  maintained by the receive path and reported to the peer in every outgoing segment.
pub struct ConnectionContext {
    endpoints: Endpoints,
    next_seq: AtomicU32,
    next_ack: AtomicU32,
    window: AtomicU16,
    config: Arc<SenderConfig>,
    send_buffer: SendBuffer,
    acks: Arc<AckBroadcaster>,
}

impl ConnectionContext {
    pub fn new(endpoints: Endpoints, initial_seq: u32, initial_ack: u32, window: u16, config: Arc<SenderConfig>) -> ConnectionContext {
        ConnectionContext {
            endpoints,
            next_seq: AtomicU32::new(initial_seq),
            next_ack: AtomicU32::new(initial_ack),
            window: AtomicU16::new(window),
            config,
            send_buffer: SendBuffer::new(),
            acks: AckBroadcaster::new(),
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    pub fn send_buffer(&self) -> &SendBuffer {
        &self.send_buffer
    }

    pub fn acks(&self) -> &Arc<AckBroadcaster> {
        &self.acks
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq.load(Ordering::Acquire)
    }

    /// Returns the sequence number for `len` bytes of data and advances the counter past them
    ///  (wrapping around at `u32::MAX`)
    pub fn assign_seq(&self, len: u32) -> u32 {
        self.next_seq.fetch_add(len, Ordering::AcqRel)
    }

    pub fn next_ack(&self) -> u32 {
        self.next_ack.load(Ordering::Acquire)
    }

    pub fn set_next_ack(&self, ack: u32) {
        self.next_ack.store(ack, Ordering::Release);
    }

    pub fn window(&self) -> u16 {
        self.window.load(Ordering::Acquire)
    }

    pub fn set_window(&self, window: u16) {
        self.window.store(window, Ordering::Release);
    }
}

/// The sending half of a connection: the entry point for the connection state machine.
///
/// Starting a connection spawns its dispatcher task on the current tokio runtime. Data passed
///  to [Connection::enqueue_for_send] is cut into segments and delivered reliably in the
///  background; the outcome per segment is published as a [DeliveryReport].
///
/// Dropping a connection without calling [Connection::close] closes the send buffer as well.
///  The dispatcher then finishes the data that is already buffered and terminates in the
///  background, releasing the connection's state.
pub struct Connection {
    sender: PacketSender,
    reports: Arc<DeliveryReportNotifier>,
    dispatcher: Option<JoinHandle<()>>,
}

impl Connection {
    pub fn start(
        endpoints: Endpoints,
        initial_seq: u32,
        initial_ack: u32,
        window: u16,
        config: Arc<SenderConfig>,
        encoder: Arc<dyn SegmentEncoder>,
        transport: Arc<dyn RawTransport>,
    ) -> anyhow::Result<Connection> {
        config.validate()?;

        info!("starting sender for {} -> {}, initial seq {}", endpoints.local_addr, endpoints.remote_addr, initial_seq);

        let reports = Arc::new(DeliveryReportNotifier::new(config.delivery_report_capacity));
        let context = Arc::new(ConnectionContext::new(endpoints, initial_seq, initial_ack, window, config));
        let sender = PacketSender::new(context, encoder, transport);
        let dispatcher = tokio::spawn(run_dispatcher(sender.clone(), reports.clone()));

        Ok(Connection {
            sender,
            reports,
            dispatcher: Some(dispatcher),
        })
    }

    pub fn context(&self) -> &Arc<ConnectionContext> {
        self.sender.context()
    }

    pub fn enqueue_for_send(&self, data: &[u8]) -> SendResult<()> {
        self.context().send_buffer().append(data)
    }

    /// To be called by the receive path for every cumulative ack number it observes
    pub fn on_ack_received(&self, ack: u32) {
        self.context().acks().publish(ack);
    }

    pub fn next_seq(&self) -> u32 {
        self.context().next_seq()
    }

    pub fn set_next_ack(&self, ack: u32) {
        self.context().set_next_ack(ack);
    }

    pub fn set_window(&self, window: u16) {
        self.context().set_window(window);
    }

    pub fn subscribe_delivery_reports(&self) -> broadcast::Receiver<DeliveryReport> {
        self.reports.subscribe()
    }

    pub async fn send_ack(&self, seq: u32, ack: u32) -> SendResult<()> {
        self.sender.send_ack(seq, ack).await
    }

    pub async fn send_reset(&self, seq: u32, ack: u32) -> SendResult<()> {
        self.sender.send_reset(seq, ack).await
    }

    pub async fn send_fin(&self, seq: u32, ack: u32) -> SendResult<()> {
        self.sender.send_fin(seq, ack).await
    }

    /// Stops accepting data and waits until everything that was already buffered is sent and
    ///  its delivery has concluded (acknowledged or given up)
    pub async fn close(mut self) {
        debug!("closing sender for {}", self.context().endpoints().remote_addr);
        self.context().send_buffer().close();

        if let Some(dispatcher) = self.dispatcher.take() {
            if let Err(e) = dispatcher.await {
                error!("dispatcher terminated abnormally: {}", e);
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.dispatcher.is_some() {
            debug!("sender for {} dropped without close - draining in the background", self.context().endpoints().remote_addr);
            self.context().send_buffer().close();
        }
    }
}
