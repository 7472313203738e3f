use thiserror::Error;

pub type SendResult<T> = Result<T, SendError>;

#[derive(Error, Debug)]
pub enum SendError {
    /// The segment could not be serialized. This is fatal for the send attempt and not retried.
    #[error("segment could not be encoded: {0}")]
    Encoding(String),

    /// The raw transport failed to write the packet. Not retried at this layer.
    #[error("raw transport write failed: {0}")]
    Transmit(#[from] std::io::Error),

    /// No matching ack was observed within the retransmission budget
    #[error("no ack for segment with seq {seq} after {retransmissions} retransmissions")]
    RetransmissionTimeout {
        seq: u32,
        retransmissions: u32,
    },

    #[error("send buffer is closed")]
    Closed,
}
