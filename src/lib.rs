//! A reliable byte-stream sender built atop an unreliable UDP datagram
//! substrate: sliding window, cumulative ACKs, adaptive RTO, fast
//! retransmit, and TCP-style congestion control. See `SPEC_FULL.md` for the
//! full design.

mod config;
mod congestion;
mod csvlog;
mod dup_ack;
mod err;
mod packet;
mod ring;
mod rto;
mod sender;
mod timestamps;

pub use config::{Cli, Config};
pub use congestion::{CongestionController, CongestionState};
pub use err::Error;
pub use packet::{Flag, Packet, MAX_WINDOW, MSS, PAYLOAD_MAX};
pub use ring::RetransmitBuffer;
pub use rto::RtoEstimator;
pub use sender::Sender;
