use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use crate::delivery_reports::{DeliveryOutcome, DeliveryReport, DeliveryReportNotifier};
use crate::packet_sender::PacketSender;

/// Drains the connection's send buffer: every chunk of up to `max_segment_size` bytes becomes a
///  data segment that is delivered reliably by a detached attempt, so the dispatcher never waits
///  for an ack before taking the next chunk.
///
/// No more than `max_segments_in_flight` attempts are outstanding at any time. Sequence numbers
///  are assigned only after a slot is available, in the order chunks leave the buffer.
///
/// Terminates after the send buffer is closed and drained, and all attempts concluded.
pub async fn run_dispatcher(sender: PacketSender, reports: Arc<DeliveryReportNotifier>) {
    let context = sender.context().clone();
    let config = context.config();
    let in_flight = Arc::new(Semaphore::new(config.max_segments_in_flight));
    let mut attempts = JoinSet::new();

    info!("starting dispatcher for {}", context.endpoints().remote_addr);

    loop {
        let permit = match in_flight.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                error!("in-flight semaphore closed - stopping dispatcher");
                break;
            }
        };

        let chunk = match context.send_buffer().take_chunk(config.max_segment_size).await {
            Some(chunk) => chunk,
            None => break,
        };

        let segment = sender.data_segment(chunk);
        let seq = segment.header.seq;
        let len = segment.payload_len();
        debug!("dispatching segment seq {} with {} bytes", seq, len);

        let sender = sender.clone();
        let reports = reports.clone();
        attempts.spawn(async move {
            let result = sender.send_with_retransmit(segment).await;
            drop(permit);

            let outcome = match result {
                Ok(()) => DeliveryOutcome::Acknowledged,
                Err(e) => {
                    error!("giving up on segment seq {} with {} bytes: {}", seq, len, e);
                    DeliveryOutcome::Failed { reason: e.to_string() }
                }
            };
            reports.send_report(DeliveryReport { seq, len, outcome });
        });

        while let Some(finished) = attempts.try_join_next() {
            if let Err(e) = finished {
                warn!("delivery attempt terminated abnormally: {}", e);
            }
        }
    }

    debug!("send buffer closed - waiting for {} outstanding deliveries", attempts.len());
    while let Some(finished) = attempts.join_next().await {
        if let Err(e) = finished {
            warn!("delivery attempt terminated abnormally: {}", e);
        }
    }
    info!("dispatcher for {} terminated", context.endpoints().remote_addr);
}
