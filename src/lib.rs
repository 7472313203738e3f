//! Sender side of a TCP implementation running in user space on top of a raw IPv4 socket.
//!
//! ```ascii
//!  enqueue_for_send
//!        |
//!        v
//!  [SendBuffer] --take_chunk--> dispatcher --spawn--> send_with_retransmit (one per segment)
//!                                                       |        ^       ^
//!                                       transmit (again)|   tick |       | matching ack
//!                                                       v        |       |
//!                                               [RawTransport]  timer  ack watcher
//!                                                                        ^
//!  on_ack_received ---------------------------------------> [AckBroadcaster]
//! ```
//!
//! Receiving, connection establishment and congestion control are not part of this crate.

pub mod ack_broadcaster;
pub mod ack_watcher;
pub mod config;
pub mod connection;
pub mod control;
pub mod delivery;
pub mod delivery_reports;
pub mod dispatcher;
pub mod error;
pub mod ip_envelope;
pub mod packet_sender;
pub mod raw_transport;
pub mod retransmit_timer;
pub mod segment;
pub mod send_buffer;
pub mod wire;

#[cfg(test)]
pub mod test_util;
