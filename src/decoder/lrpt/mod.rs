//! Meteor-M LRPT: soft symbols to frames, packets and imagery.

pub mod frames;
pub mod imagery;
pub mod jpeg;
pub mod packets;
pub mod reed_solomon;
pub mod viterbi;

pub use frames::FrameDecoder;
pub use imagery::ImageAssembler;
pub use packets::{Packet, PacketReassembler, Vcdu, VCDU_LEN};
