use bytes::Bytes;
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};
use crate::ack_watcher::watch_for_ack;
use crate::error::{SendError, SendResult};
use crate::packet_sender::PacketSender;
use crate::retransmit_timer::run_retransmit_timer;
use crate::segment::{Segment, TcpFlags};

impl PacketSender {
    /// Builds a data segment for `payload`, assigning it the connection's next sequence number
    ///  and advancing the counter by the payload length right away.
    pub fn data_segment(&self, payload: Bytes) -> Segment {
        let context = self.context();
        let seq = context.assign_seq(payload.len() as u32);
        Segment::new(seq, context.next_ack(), TcpFlags::PSH | TcpFlags::ACK, payload)
    }

    /// Send a chunk of data and wait until it is acknowledged or given up
    pub async fn send_data(&self, payload: Bytes) -> SendResult<()> {
        debug!("sending {} bytes of data", payload.len());
        let segment = self.data_segment(payload);
        self.send_with_retransmit(segment).await
    }

    /// Transmits `segment` and retransmits the identical bytes with exponential backoff until the
    ///  ack `seq + payload length` is observed, or the configured number of retransmissions is
    ///  exhausted.
    ///
    /// The ack watcher and the retransmit timer are tasks owned by this call. Both are cancelled
    ///  and joined before it returns; if this future is dropped instead, dropping their cancel
    ///  senders stops them.
    pub async fn send_with_retransmit(&self, segment: Segment) -> SendResult<()> {
        let context = self.context();
        let config = context.config();

        let seq = segment.header.seq;
        let target_ack = segment.ack_target();
        let packet = self.prepare(segment)?;

        // subscribe before the first transmission so that an early ack can not be missed
        let subscription = context.acks().subscribe(config.ack_inbox_capacity);

        self.transmit(&packet).await?;

        let (ack_found_send, mut ack_found) = oneshot::channel();
        let (kill_ack_listen, ack_listen_cancel) = oneshot::channel();
        let ack_listener = tokio::spawn(watch_for_ack(subscription, target_ack, ack_found_send, ack_listen_cancel));

        let (resend_tick_send, mut resend_ticks) = mpsc::channel(config.resend_limit.max(1) as usize);
        let (timeout_send, mut timeout) = oneshot::channel();
        let (kill_timer, timer_cancel) = oneshot::channel();
        let timer = tokio::spawn(run_retransmit_timer(config.base_resend_delay, config.resend_limit, resend_tick_send, timeout_send, timer_cancel));

        let mut retransmissions = 0u32;
        let mut ack_listener_alive = true;
        let mut timer_alive = true;
        let result = loop {
            select! {
                biased;
                found = &mut ack_found, if ack_listener_alive => {
                    match found {
                        Ok(()) => {
                            trace!("segment seq {} acknowledged after {} retransmissions", seq, retransmissions);
                            break Ok(());
                        }
                        Err(_) => {
                            warn!("ack listener for segment seq {} terminated without result", seq);
                            ack_listener_alive = false;
                        }
                    }
                }
                Some(tick) = resend_ticks.recv() => {
                    retransmissions += 1;
                    debug!("retransmitting segment seq {} (resend #{})", seq, tick);
                    if let Err(e) = self.transmit(&packet).await {
                        break Err(e);
                    }
                }
                timed_out = &mut timeout, if timer_alive => {
                    match timed_out {
                        Ok(()) => {
                            error!("resend of segment seq {} timed out", seq);
                            break Err(SendError::RetransmissionTimeout { seq, retransmissions });
                        }
                        Err(_) => {
                            warn!("resend timer for segment seq {} terminated without result", seq);
                            timer_alive = false;
                        }
                    }
                }
                else => {
                    error!("ack listener and resend timer for segment seq {} terminated unexpectedly", seq);
                    break Err(SendError::RetransmissionTimeout { seq, retransmissions });
                }
            }
        };

        let _ = kill_timer.send(());
        let _ = kill_ack_listen.send(());
        for (name, handle) in [("resend timer", timer), ("ack listener", ack_listener)] {
            if let Err(e) = handle.await {
                warn!("{} for segment seq {} failed: {}", name, seq, e);
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::{sleep, Instant};
    use crate::config::SenderConfig;
    use crate::raw_transport::MockRawTransport;
    use crate::test_util::{decode_segment, test_context, RecordingTransport};
    use crate::wire::TcpSegmentEncoder;
    use super::*;
    use rstest::rstest;

    fn config(resend_limit: u32) -> SenderConfig {
        SenderConfig {
            max_segment_size: 4,
            base_resend_delay: Duration::from_millis(100),
            resend_limit,
            ..SenderConfig::default()
        }
    }

    fn recording_sender(config: SenderConfig, initial_seq: u32) -> (PacketSender, Arc<RecordingTransport>) {
        let transport = RecordingTransport::new();
        let sender = PacketSender::new(test_context(config, initial_seq, 9), Arc::new(TcpSegmentEncoder), transport.clone());
        (sender, transport)
    }

    #[tokio::test]
    async fn test_data_segment_assigns_seq() {
        let (sender, _) = recording_sender(config(3), 100);

        let a = sender.data_segment(Bytes::from_static(b"ABCD"));
        let b = sender.data_segment(Bytes::from_static(b"EF"));

        assert_eq!((a.header.seq, a.header.ack, a.header.flags), (100, 9, TcpFlags::PSH | TcpFlags::ACK));
        assert_eq!(b.header.seq, 104);
        assert_eq!(sender.context().next_seq(), 106);
    }

    #[tokio::test]
    async fn test_data_segment_seq_wraps_around() {
        let (sender, _) = recording_sender(config(3), u32::MAX - 1);

        let a = sender.data_segment(Bytes::from_static(b"ABCD"));
        assert_eq!(a.header.seq, u32::MAX - 1);
        assert_eq!(a.ack_target(), 2);
        assert_eq!(sender.context().next_seq(), 2);
    }

    #[rstest]
    #[case::no_retries(0, vec![0])]
    #[case::one_retry(1, vec![0, 100])]
    #[case::three_retries(3, vec![0, 100, 300, 700])]
    #[case::five_retries(5, vec![0, 100, 300, 700, 1500, 3100])]
    fn test_timeout_after_exactly_resend_limit(#[case] resend_limit: u32, #[case] expected_send_millis: Vec<u128>) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build().unwrap();

        rt.block_on(async move {
            let (sender, transport) = recording_sender(config(resend_limit), 500);
            let start = Instant::now();

            let result = sender.send_data(Bytes::from_static(b"ABCD")).await;

            match result {
                Err(SendError::RetransmissionTimeout { seq, retransmissions }) => {
                    assert_eq!(seq, 500);
                    assert_eq!(retransmissions, resend_limit);
                }
                other => panic!("expected timeout, got {:?}", other),
            }

            let send_millis: Vec<u128> = transport.sent().iter().map(|p| (p.at - start).as_millis()).collect();
            assert_eq!(send_millis, expected_send_millis);
            assert_eq!(sender.context().acks().subscriber_count(), 0);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_retransmissions_are_byte_identical() {
        let (sender, transport) = recording_sender(config(3), 500);

        // the window changes between retransmissions, but the retransmitted bytes do not
        let context = sender.context().clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(150)).await;
            context.set_window(1);
            context.set_next_ack(12345);
        });

        let _ = sender.send_data(Bytes::from_static(b"ABCD")).await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 4);
        for packet in &sent {
            assert_eq!(packet.bytes, sent[0].bytes);
            assert_eq!(packet.envelope, sent[0].envelope);
        }
        let decoded = decode_segment(&sent[0].bytes);
        assert_eq!(decoded.seq, 500);
        assert_eq!(decoded.payload.as_ref(), b"ABCD");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_before_first_tick() {
        let (sender, transport) = recording_sender(config(3), 500);

        let acks = sender.context().acks().clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            acks.publish(504);
        });

        let start = Instant::now();
        sender.send_data(Bytes::from_static(b"ABCD")).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(50));
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(sender.context().acks().subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_after_retransmissions_stops_further_ticks() {
        let (sender, transport) = recording_sender(config(5), 500);

        let acks = sender.context().acks().clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(350)).await;
            acks.publish(503);
            acks.publish(505);
            acks.publish(504);
        });

        sender.send_data(Bytes::from_static(b"ABCD")).await.unwrap();
        assert_eq!(transport.sent().len(), 3);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.sent().len(), 3);
        assert_eq!(sender.context().acks().subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_just_before_first_tick_prevents_retransmission() {
        let (sender, transport) = recording_sender(config(3), 500);

        let acks = sender.context().acks().clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(99)).await;
            acks.publish(504);
        });

        let start = Instant::now();
        sender.send_data(Bytes::from_static(b"ABCD")).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(99));
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_at_tick_instant_allows_at_most_one_retransmission() {
        let (sender, transport) = recording_sender(config(3), 500);

        // ack and first tick become ready at the same instant, so either may be processed first
        let acks = sender.context().acks().clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            acks.publish(504);
        });

        sender.send_data(Bytes::from_static(b"ABCD")).await.unwrap();
        assert!(transport.sent().len() <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_segments_are_confirmed_independently() {
        let (sender, transport) = recording_sender(config(3), 0);

        let first = {
            let sender = sender.clone();
            let segment = sender.data_segment(Bytes::from_static(b"ABCD"));
            tokio::spawn(async move { sender.send_with_retransmit(segment).await })
        };
        let second = {
            let sender = sender.clone();
            let segment = sender.data_segment(Bytes::from_static(b"EFGH"));
            tokio::spawn(async move { sender.send_with_retransmit(segment).await })
        };

        sleep(Duration::from_millis(10)).await;
        assert_eq!(sender.context().acks().subscriber_count(), 2);

        // confirmed out of order
        sender.context().acks().publish(8);
        second.await.unwrap().unwrap();
        sleep(Duration::from_millis(10)).await;
        sender.context().acks().publish(4);
        first.await.unwrap().unwrap();

        assert_eq!(transport.sent().len(), 2);
        assert_eq!(sender.context().acks().subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_transmit_error_aborts_attempt() {
        let mut transport = MockRawTransport::new();
        transport.expect_transmit()
            .times(1)
            .returning(|_, _| Err(SendError::Transmit(std::io::Error::other("no route to host"))));
        let sender = PacketSender::new(test_context(config(3), 0, 0), Arc::new(TcpSegmentEncoder), Arc::new(transport));

        let start = Instant::now();
        let result = sender.send_data(Bytes::from_static(b"ABCD")).await;

        assert!(matches!(result, Err(SendError::Transmit(_))));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(sender.context().acks().subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retransmit_error_aborts_attempt() {
        let mut transport = MockRawTransport::new();
        let mut seq = mockall::Sequence::new();
        transport.expect_transmit()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        transport.expect_transmit()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(SendError::Transmit(std::io::Error::other("interface down"))));
        let sender = PacketSender::new(test_context(config(3), 0, 0), Arc::new(TcpSegmentEncoder), Arc::new(transport));

        let start = Instant::now();
        let result = sender.send_data(Bytes::from_static(b"ABCD")).await;

        assert!(matches!(result, Err(SendError::Transmit(_))));
        assert_eq!(start.elapsed(), Duration::from_millis(100));
        assert_eq!(sender.context().acks().subscriber_count(), 0);

        // the timer was cancelled, so there are no more transmit calls (which the mock would reject)
        sleep(Duration::from_secs(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_encoding_error_aborts_before_transmission() {
        let (sender, transport) = recording_sender(config(3), 0);

        let mut segment = sender.data_segment(Bytes::from_static(b"ABCD"));
        segment.header.options = Bytes::from(vec![0u8; 48]);

        let result = sender.send_with_retransmit(segment).await;
        assert!(matches!(result, Err(SendError::Encoding(_))));
        assert!(transport.sent().is_empty());
        assert_eq!(sender.context().acks().subscriber_count(), 0);
    }
}
