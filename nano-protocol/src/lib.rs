//!
//! Wire-format codec for the Xbox One NANO gamestreaming protocol.
//!
//! Messages ride an RTP-shaped header (big-endian legacy fields) followed by
//! little-endian payloads. Streamer payloads are only decodable against the
//! set of channels the console has created, so the unpacker takes a
//! [`ChannelMap`] lookup.
//!

use std::collections::HashMap;

use thiserror::Error;

use crate::enums::ChannelClass;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("malformed message at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: &'static str },
    #[error("protocol invariant violated: {0}")]
    InvariantViolation(&'static str),
    #[error("unknown channel id {0}")]
    UnknownChannel(u16),
    #[error("unsupported channel class {0:?}")]
    UnsupportedChannelClass(String),
    #[error("unknown streamer type {stream_type} on {class:?} channel")]
    UnknownStreamerType { class: ChannelClass, stream_type: u32 },
}

/// Lookup from a wire channel id to the class the console assigned it in
/// ChannelCreate. Implemented by the client's channel registry; tests use a
/// plain map.
pub trait ChannelMap {
    fn class_of(&self, channel_id: u16) -> Option<ChannelClass>;
}

impl ChannelMap for HashMap<u16, ChannelClass> {
    fn class_of(&self, channel_id: u16) -> Option<ChannelClass> {
        self.get(&channel_id).copied()
    }
}

pub mod broadcast;
pub mod buffer;
pub mod enums;
pub mod factory;
pub mod packer;
pub mod packet;
