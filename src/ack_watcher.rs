use tokio::select;
use tokio::sync::oneshot;
use tracing::trace;
use crate::ack_broadcaster::AckSubscription;

/// Waits for the ack that confirms one specific segment, i.e. for an ack number that is
///  *exactly* `target_ack`. Acks below or above the target are ignored.
///
/// Terminates on the first of:
/// * the target ack arrives: `success` is signalled
/// * `cancel` fires or its sender is dropped: terminates without signalling
///
/// The subscription is consumed, so it is unregistered on every exit path.
pub async fn watch_for_ack(
    mut subscription: AckSubscription,
    target_ack: u32,
    success: oneshot::Sender<()>,
    mut cancel: oneshot::Receiver<()>,
) {
    trace!("listening for ack {}", target_ack);

    loop {
        select! {
            biased;
            _ = &mut cancel => {
                trace!("ack listener for {} cancelled", target_ack);
                return;
            }
            ack = subscription.recv() => {
                match ack {
                    Some(ack) if ack == target_ack => {
                        trace!("ack listener got matching ack {}", ack);
                        let _ = success.send(());
                        return;
                    }
                    Some(ack) => {
                        trace!("ack listener for {} ignoring ack {}", target_ack, ack);
                    }
                    None => return,
                }
            }
        }
    }
}
