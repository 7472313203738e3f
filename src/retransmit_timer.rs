use std::time::Duration;
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tracing::trace;

/// The sequence of delays between retransmissions: `initial_delay`, doubling after each step,
///  for a total of `resend_limit` steps. Doubling saturates at [Duration::MAX].
#[derive(Clone, Debug)]
pub struct BackoffSchedule {
    next_delay: Duration,
    remaining: u32,
}

impl BackoffSchedule {
    pub fn new(initial_delay: Duration, resend_limit: u32) -> BackoffSchedule {
        BackoffSchedule {
            next_delay: initial_delay,
            remaining: resend_limit,
        }
    }
}

impl Iterator for BackoffSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let delay = self.next_delay;
        self.next_delay = self.next_delay.saturating_mul(2);
        Some(delay)
    }
}

/// Emits a 'resend now' tick (carrying its 1-based number) on `ticks` after each delay of the
///  [BackoffSchedule], and then a single signal on `timeout`.
///
/// If `cancel` fires (or its sender is dropped) while waiting, the timer terminates immediately
///  without sending anything else. `ticks` should have capacity for `resend_limit` entries so
///  that sending a tick never waits for the consumer.
pub async fn run_retransmit_timer(
    initial_delay: Duration,
    resend_limit: u32,
    ticks: mpsc::Sender<u32>,
    timeout: oneshot::Sender<()>,
    mut cancel: oneshot::Receiver<()>,
) {
    for (idx, delay) in BackoffSchedule::new(initial_delay, resend_limit).enumerate() {
        select! {
            biased;
            _ = &mut cancel => {
                trace!("retransmit timer cancelled");
                return;
            }
            _ = sleep(delay) => {
                if ticks.send(idx as u32 + 1).await.is_err() {
                    return;
                }
            }
        }
    }

    trace!("retransmit timer: {} resends elapsed", resend_limit);
    let _ = timeout.send(());
}
