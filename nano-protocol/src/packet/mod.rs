pub mod audio;
pub mod control;
pub mod input;
pub mod video;

use bytes::{BufMut, Bytes, BytesMut};
use num::FromPrimitive;

use crate::CodecError;
use crate::buffer::ByteReader;
use crate::enums::{ChannelClass, ChannelControlType, RtpPayloadType};

pub use audio::AudioPayload;
pub use control::ControlPacket;
pub use input::InputPayload;
pub use video::VideoPayload;

/// Streamer sub-header version used on the reliable TCP leg.
pub const STREAMER_VERSION_TCP: u32 = 3;
/// Streamer sub-header version used on UDP datagrams.
pub const STREAMER_VERSION_UDP: u32 = 0;

/// Synchronization-source field of the RTP header, repurposed to carry the
/// session connection id and the logical channel id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ssrc {
    pub connection_id: u16,
    pub channel_id: u16,
}

/// RTP-shaped message header. `version` is not stored: it is always 2 on
/// the wire and the codec enforces that. `csrc_count` is derived from
/// `csrc_list`.
#[derive(Debug, Clone, PartialEq)]
pub struct RtpHeader {
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: RtpPayloadType,
    pub sequence_num: u16,
    pub timestamp: u32,
    pub ssrc: Ssrc,
    pub csrc_list: Vec<u32>,
    pub streamer: Option<StreamerHeader>,
}

/// Sub-header present when `payload_type == Streamer`. The per-channel type
/// discriminator that follows it on the wire is not stored here: it is read
/// as a raw u32 during decode and rebound into the typed
/// [`StreamerPayload`] once the channel class is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamerHeader {
    pub version: u32,
    pub sequence_num: Option<u32>,
    pub prev_sequence_num: Option<u32>,
}

impl StreamerHeader {
    pub fn tcp(sequence_num: u32, prev_sequence_num: u32) -> Self {
        Self {
            version: STREAMER_VERSION_TCP,
            sequence_num: Some(sequence_num),
            prev_sequence_num: Some(prev_sequence_num),
        }
    }

    pub fn udp() -> Self {
        Self {
            version: STREAMER_VERSION_UDP,
            sequence_num: None,
            prev_sequence_num: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: RtpHeader,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Session-level handshake on the `Control` (0x60) payload type.
    ControlHandshake(ControlHandshake),
    /// Channel lifecycle on the `ChannelControl` (0x61) payload type.
    ChannelControl(ChannelControl),
    UdpHandshake(UdpHandshake),
    Streamer(StreamerPayload),
}

impl Payload {
    /// RTP payload type this payload must be carried under.
    pub fn payload_type(&self) -> RtpPayloadType {
        match self {
            Self::ControlHandshake(_) => RtpPayloadType::Control,
            Self::ChannelControl(_) => RtpPayloadType::ChannelControl,
            Self::UdpHandshake(_) => RtpPayloadType::UdpHandshake,
            Self::Streamer(_) => RtpPayloadType::Streamer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlHandshake {
    pub handshake_type: ChannelControlType,
    pub connection_id: u16,
}

impl ControlHandshake {
    pub fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let offset = reader.position();
        let raw = reader.get_u8("control handshake type")?;
        let handshake_type = ChannelControlType::from_u8(raw).ok_or(CodecError::Malformed {
            offset,
            reason: "unknown control handshake type",
        })?;
        let connection_id = reader.get_u16_le("control handshake connection id")?;
        Ok(Self {
            handshake_type,
            connection_id,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.handshake_type as u8);
        buf.put_u16_le(self.connection_id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHandshake {
    pub unk: u8,
}

impl UdpHandshake {
    pub fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            unk: reader.get_u8("udp handshake")?,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.unk);
    }
}

/// Channel lifecycle payload. Only the console sends Create; Open flows in
/// both directions (the client echoes the flags back); Close carries an
/// opaque reason word.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelControl {
    Create { name: ChannelClass, flags: u32 },
    Open { flags: Bytes },
    Close { flags: u32 },
}

impl ChannelControl {
    pub fn control_type(&self) -> ChannelControlType {
        match self {
            Self::Create { .. } => ChannelControlType::ChannelCreate,
            Self::Open { .. } => ChannelControlType::ChannelOpen,
            Self::Close { .. } => ChannelControlType::ChannelClose,
        }
    }

    pub fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let offset = reader.position();
        let raw = reader.get_u32_le("channel control type")?;
        let control_type = ChannelControlType::from_u32(raw).ok_or(CodecError::Malformed {
            offset,
            reason: "unknown channel control type",
        })?;

        match control_type {
            ChannelControlType::ChannelCreate => {
                let name = reader.get_utf8_u16("channel class name")?;
                let name = ChannelClass::from_name(name)
                    .ok_or_else(|| CodecError::UnsupportedChannelClass(name.to_string()))?;
                let flags = reader.get_u32_le("channel create flags")?;
                Ok(Self::Create { name, flags })
            }
            ChannelControlType::ChannelOpen => {
                let flags = reader.get_blob_u32("channel open flags")?;
                Ok(Self::Open {
                    flags: Bytes::copy_from_slice(flags),
                })
            }
            ChannelControlType::ChannelClose => Ok(Self::Close {
                flags: reader.get_u32_le("channel close flags")?,
            }),
            ChannelControlType::ClientHandshake | ChannelControlType::ServerHandshake => {
                Err(CodecError::Malformed {
                    offset,
                    reason: "handshake type on channel control payload",
                })
            }
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.control_type() as u32);
        match self {
            Self::Create { name, flags } => {
                let name = name.name();
                buf.put_u16_le(name.len() as u16);
                buf.put_slice(name.as_bytes());
                buf.put_u32_le(*flags);
            }
            Self::Open { flags } => {
                buf.put_u32_le(flags.len() as u32);
                buf.put_slice(flags);
            }
            Self::Close { flags } => buf.put_u32_le(*flags),
        }
    }
}

/// Fully decoded channel payload of a streamer message. The wire type
/// discriminator is derivable from the variant, so encode never needs a
/// channel lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamerPayload {
    Video(VideoPayload),
    Audio(AudioPayload),
    Input(InputPayload),
    Control(ControlPacket),
}

impl StreamerPayload {
    /// Raw streamer type written after the sub-header.
    pub fn stream_type(&self) -> u32 {
        match self {
            Self::Video(payload) => payload.payload_type() as u32,
            Self::Audio(payload) => payload.payload_type() as u32,
            Self::Input(payload) => payload.payload_type() as u32,
            // The control channel multiplexes on an inner opcode instead.
            Self::Control(_) => 0,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::Video(payload) => payload.encode(buf),
            Self::Audio(payload) => payload.encode(buf),
            Self::Input(payload) => payload.encode(buf),
            Self::Control(packet) => packet.encode(buf),
        }
    }
}
