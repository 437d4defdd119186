#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod candidate;
pub mod demux;
pub mod error;
pub mod proto;
pub mod tcp_type;

pub use candidate::IceCandidate;
pub use demux::{ConnectionMode, Packet, TcpDemultiplexer};
pub use proto::PacketKind;
pub use tcp_type::TcpCandidateType;
