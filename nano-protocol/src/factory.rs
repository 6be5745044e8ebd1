//! Message constructors.
//!
//! These fill in the header fields a sender never cares about (zero
//! sequence/timestamp, empty csrc list) and wire the streamer sub-header to
//! the right transport shape. Callers that need a specific header field set
//! it on the returned message before packing.

use bytes::Bytes;

use crate::enums::{ChannelClass, ChannelControlType, RtpPayloadType};
use crate::packet::{
    ChannelControl, ControlHandshake, Message, Payload, RtpHeader, Ssrc, StreamerHeader,
    StreamerPayload, UdpHandshake,
};

pub fn header(payload_type: RtpPayloadType, connection_id: u16, channel_id: u16) -> RtpHeader {
    RtpHeader {
        padding: false,
        extension: false,
        marker: false,
        payload_type,
        sequence_num: 0,
        timestamp: 0,
        ssrc: Ssrc {
            connection_id,
            channel_id,
        },
        csrc_list: Vec::new(),
        streamer: None,
    }
}

/// Reliable streamer message for the TCP control connection. TCP messages
/// carry connection id zero; the console identifies the session by the
/// stream itself.
pub fn streamer_tcp(
    channel_id: u16,
    sequence_num: u32,
    prev_sequence_num: u32,
    payload: StreamerPayload,
) -> Message {
    let mut header = header(RtpPayloadType::Streamer, 0, channel_id);
    header.streamer = Some(StreamerHeader::tcp(sequence_num, prev_sequence_num));
    Message {
        header,
        payload: Payload::Streamer(payload),
    }
}

/// Datagram streamer message. The channel sequence number rides the
/// (16-bit) RTP sequence field here; the sub-header carries none.
pub fn streamer_udp(
    connection_id: u16,
    channel_id: u16,
    sequence_num: u16,
    payload: StreamerPayload,
) -> Message {
    let mut header = header(RtpPayloadType::Streamer, connection_id, channel_id);
    header.sequence_num = sequence_num;
    header.streamer = Some(StreamerHeader::udp());
    Message {
        header,
        payload: Payload::Streamer(payload),
    }
}

pub fn udp_handshake(connection_id: u16, unknown: u8) -> Message {
    Message {
        header: header(RtpPayloadType::UdpHandshake, connection_id, 0),
        payload: Payload::UdpHandshake(UdpHandshake { unk: unknown }),
    }
}

/// Session-level SYN carrying a client-generated connection id.
pub fn control_handshake(connection_id: u16) -> Message {
    Message {
        header: header(RtpPayloadType::Control, 0, 0),
        payload: Payload::ControlHandshake(ControlHandshake {
            handshake_type: ChannelControlType::ClientHandshake,
            connection_id,
        }),
    }
}

pub fn channel_create(name: ChannelClass, flags: u32, channel_id: u16) -> Message {
    Message {
        header: header(RtpPayloadType::ChannelControl, 0, channel_id),
        payload: Payload::ChannelControl(ChannelControl::Create { name, flags }),
    }
}

pub fn channel_open(flags: Bytes, channel_id: u16) -> Message {
    Message {
        header: header(RtpPayloadType::ChannelControl, 0, channel_id),
        payload: Payload::ChannelControl(ChannelControl::Open { flags }),
    }
}

pub fn channel_close(flags: u32, channel_id: u16) -> Message {
    Message {
        header: header(RtpPayloadType::ChannelControl, 0, channel_id),
        payload: Payload::ChannelControl(ChannelControl::Close { flags }),
    }
}
