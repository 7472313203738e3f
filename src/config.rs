use std::time::Duration;
use anyhow::bail;
use tokio::sync::Semaphore;
use crate::ip_envelope::{Ipv4Envelope, DEFAULT_TTL};
use crate::wire::TcpSegmentEncoder;

#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// This is the maximum number of payload bytes per data segment, as negotiated during
    ///  connection setup. The send buffer is cut into chunks of at most this size.
    ///
    /// With full Ethernet frames and no IP or TCP options, this is `1500 - 20 - 20 = 1460`.
    pub max_segment_size: usize,

    /// The delay before the first retransmission of an unacknowledged segment. Every further
    ///  retransmission doubles the delay.
    pub base_resend_delay: Duration,

    /// This is the number of retransmissions of a segment before delivery is given up and
    ///  reported as a timeout.
    pub resend_limit: u32,

    /// Capacity of each ack watcher's inbox. If a watcher falls behind by more than this number
    ///  of acks, further acks are dropped for that watcher (the publisher never blocks).
    pub ack_inbox_capacity: usize,

    /// Upper bound for the number of data segments that are sent but not yet acknowledged (or
    ///  given up). The dispatcher does not take the next chunk from the send buffer while this
    ///  many segments are in flight.
    pub max_segments_in_flight: usize,

    pub ttl: u8,

    pub delivery_report_capacity: usize,
}

impl SenderConfig {
    /// IPv4 with end-to-end full Ethernet MTU and neither IP nor TCP options
    pub fn default_ipv4() -> SenderConfig {
        SenderConfig {
            max_segment_size: 1460,
            base_resend_delay: Duration::from_millis(500),
            resend_limit: 5,
            ack_inbox_capacity: 32,
            max_segments_in_flight: 64,
            ttl: DEFAULT_TTL,
            delivery_report_capacity: 128,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let max_mss = u16::MAX as usize - Ipv4Envelope::HEADER_LEN - TcpSegmentEncoder::MAX_HEADER_LEN;

        if self.max_segment_size == 0 {
            bail!("maximum segment size must not be 0");
        }
        if self.max_segment_size > max_mss {
            bail!("maximum segment size {} exceeds the maximum of {} bytes that fit into an IPv4 packet", self.max_segment_size, max_mss);
        }
        if self.base_resend_delay.is_zero() {
            bail!("base resend delay must be greater than 0");
        }
        if self.ack_inbox_capacity == 0 {
            bail!("ack inbox capacity must be greater than 0");
        }
        if self.max_segments_in_flight == 0 || self.max_segments_in_flight > Semaphore::MAX_PERMITS {
            bail!("maximum number of segments in flight must be between 1 and {}", Semaphore::MAX_PERMITS);
        }
        if self.ttl == 0 {
            bail!("TTL must be greater than 0");
        }
        if self.delivery_report_capacity == 0 {
            bail!("delivery report capacity must be greater than 0");
        }
        Ok(())
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self::default_ipv4()
    }
}
