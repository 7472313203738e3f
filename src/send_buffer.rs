use std::cmp::min;
use std::sync::{Mutex, PoisonError};
use bytes::{Bytes, BytesMut};
use tokio::sync::Notify;
use tracing::trace;
use crate::error::{SendError, SendResult};

struct SendBufferState {
    pending: BytesMut,
    closed: bool,
}

/// The pending outbound byte stream of a connection.
///
/// Data is appended by the connection's write path and taken in FIFO order, in chunks of
///  bounded size, by the dispatcher. The lock is never held while waiting for data.
pub struct SendBuffer {
    state: Mutex<SendBufferState>,
    data_available: Notify,
}

impl SendBuffer {
    pub fn new() -> SendBuffer {
        SendBuffer {
            state: Mutex::new(SendBufferState {
                pending: BytesMut::new(),
                closed: false,
            }),
            data_available: Notify::new(),
        }
    }

    pub fn append(&self, data: &[u8]) -> SendResult<()> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.closed {
                return Err(SendError::Closed);
            }
            state.pending.extend_from_slice(data);
            trace!("appended {} bytes to send buffer, now {} bytes pending", data.len(), state.pending.len());
        }
        self.data_available.notify_one();
        Ok(())
    }

    /// Removes and returns up to `max_len` bytes from the start of the buffer, waiting for data
    ///  if the buffer is empty. Returns `None` once the buffer is closed and drained.
    ///
    /// # Panics
    ///
    /// if `max_len` is 0. [crate::config::SenderConfig::validate] rejects a maximum segment size
    ///  of 0, so this does not happen for a config that was validated.
    pub async fn take_chunk(&self, max_len: usize) -> Option<Bytes> {
        assert!(max_len > 0);

        loop {
            // registered before checking the state so that a notification between the check and
            //  the await is not lost
            let notified = self.data_available.notified();

            {
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                if !state.pending.is_empty() {
                    let chunk_len = min(state.pending.len(), max_len);
                    return Some(state.pending.split_to(chunk_len).freeze());
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Rejects further appends. Data that is already buffered can still be taken.
    pub fn close(&self) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
            .closed = true;
        self.data_available.notify_one();
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
            .pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SendBuffer {
    fn default() -> Self {
        Self::new()
    }
}
