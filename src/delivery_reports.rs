use tokio::sync::broadcast;
use tracing::trace;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeliveryOutcome {
    Acknowledged,
    /// The segment was given up. Its data is dropped; nothing re-queues it.
    Failed { reason: String },
}

/// The outcome of delivering one chunk of the send buffer
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeliveryReport {
    pub seq: u32,
    pub len: u32,
    pub outcome: DeliveryOutcome,
}

pub struct DeliveryReportNotifier {
    sender: broadcast::Sender<DeliveryReport>,
}

impl DeliveryReportNotifier {
    pub fn new(capacity: usize) -> DeliveryReportNotifier {
        let (sender, _) = broadcast::channel(capacity);

        DeliveryReportNotifier {
            sender
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryReport> {
        self.sender.subscribe()
    }

    pub fn send_report(&self, report: DeliveryReport) {
        trace!("delivery report: {:?}", report);
        let _ = self.sender.send(report);
    }
}
