//! Message-level pack/unpack.
//!
//! Byte order is split down the middle of every message: the RTP header
//! legacy fields (sequence, timestamp, ssrc, csrc list) are big-endian,
//! the streamer sub-header and all payloads little-endian.
//!
//! Payloads are padded to the next 4-byte boundary with ANSI X9.23 (zero
//! fill, final byte is the pad count) and the header `padding` flag records
//! that. Streamer payloads are wrapped in a u32-LE length prefix except on
//! the control channel (`connection_id == 0` and streamer type 0), where
//! the payload runs to the end of the datagram.

use bytes::{BufMut, Bytes, BytesMut};
use num::FromPrimitive;

use crate::buffer::ByteReader;
use crate::enums::{
    AudioPayloadType, ChannelClass, InputPayloadType, RtpPayloadType, VideoPayloadType,
};
use crate::packet::{
    AudioPayload, ChannelControl, ControlHandshake, ControlPacket, InputPayload, Message, Payload,
    RtpHeader, Ssrc, StreamerHeader, StreamerPayload, UdpHandshake, VideoPayload,
};
use crate::{ChannelMap, CodecError};

const RTP_VERSION: u8 = 2;
const PAD_BLOCK: usize = 4;

/// Decode one wire message. Streamer payloads need `channels` to resolve
/// the channel id to its class before the body can be parsed.
pub fn unpack(buf: &[u8], channels: &impl ChannelMap) -> Result<Message, CodecError> {
    let mut reader = ByteReader::new(buf);

    let b0 = reader.get_u8("rtp flags")?;
    let type_offset = reader.position();
    let b1 = reader.get_u8("rtp flags")?;
    if b0 >> 6 != RTP_VERSION {
        return Err(CodecError::InvariantViolation("rtp version must be 2"));
    }
    let padding = b0 & 0x20 != 0;
    let extension = b0 & 0x10 != 0;
    let csrc_count = b0 & 0x0F;
    let marker = b1 & 0x80 != 0;
    let payload_type = RtpPayloadType::from_u8(b1 & 0x7F).ok_or(CodecError::Malformed {
        offset: type_offset,
        reason: "unknown rtp payload type",
    })?;

    let sequence_num = reader.get_u16_be("rtp sequence number")?;
    let timestamp = reader.get_u32_be("rtp timestamp")?;
    let ssrc = Ssrc {
        connection_id: reader.get_u16_be("ssrc connection id")?,
        channel_id: reader.get_u16_be("ssrc channel id")?,
    };
    let mut csrc_list = Vec::with_capacity(csrc_count as usize);
    for _ in 0..csrc_count {
        csrc_list.push(reader.get_u32_be("csrc entry")?);
    }

    // The streamer type is read as a raw u32 here; it is rebound to the
    // channel's enumeration once the class is known.
    let (streamer, stream_type) = if payload_type == RtpPayloadType::Streamer {
        let version = reader.get_u32_le("streamer version")?;
        let (sequence_num, prev_sequence_num) = if version & 1 != 0 {
            (
                Some(reader.get_u32_le("streamer sequence number")?),
                Some(reader.get_u32_le("streamer prev sequence number")?),
            )
        } else {
            (None, None)
        };
        let stream_type = reader.get_u32_le("streamer type")?;
        (
            Some(StreamerHeader {
                version,
                sequence_num,
                prev_sequence_num,
            }),
            stream_type,
        )
    } else {
        (None, 0)
    };

    let mut payload_bytes = reader.rest();
    if padding {
        payload_bytes = strip_padding(payload_bytes, buf.len())?;
    }

    let mut payload_reader = ByteReader::new(payload_bytes);
    let payload = match payload_type {
        RtpPayloadType::Control => {
            let handshake = ControlHandshake::decode(&mut payload_reader)?;
            payload_reader.expect_end("trailing bytes after control handshake")?;
            Payload::ControlHandshake(handshake)
        }
        RtpPayloadType::ChannelControl => {
            let control = ChannelControl::decode(&mut payload_reader)?;
            payload_reader.expect_end("trailing bytes after channel control")?;
            Payload::ChannelControl(control)
        }
        RtpPayloadType::UdpHandshake => {
            let handshake = UdpHandshake::decode(&mut payload_reader)?;
            payload_reader.expect_end("trailing bytes after udp handshake")?;
            Payload::UdpHandshake(handshake)
        }
        RtpPayloadType::Streamer => {
            let body = if ssrc.connection_id == 0 && stream_type == 0 {
                payload_reader.rest()
            } else {
                payload_reader.get_blob_u32("streamer payload length")?
            };
            payload_reader.expect_end("trailing bytes after streamer envelope")?;

            let class = channels
                .class_of(ssrc.channel_id)
                .ok_or(CodecError::UnknownChannel(ssrc.channel_id))?;
            let mut body_reader = ByteReader::new(body);
            let payload = decode_streamer(class, stream_type, &mut body_reader)?;
            body_reader.expect_end("trailing bytes after channel payload")?;
            Payload::Streamer(payload)
        }
    };

    Ok(Message {
        header: RtpHeader {
            padding,
            extension,
            marker,
            payload_type,
            sequence_num,
            timestamp,
            ssrc,
            csrc_list,
            streamer,
        },
        payload,
    })
}

/// `(class, raw streamer type) -> parser` dispatch. Audio and chat-audio
/// channels share payloads, as do input and input-feedback.
fn decode_streamer(
    class: ChannelClass,
    stream_type: u32,
    reader: &mut ByteReader<'_>,
) -> Result<StreamerPayload, CodecError> {
    let unknown = || CodecError::UnknownStreamerType { class, stream_type };
    match class {
        ChannelClass::Video => {
            let payload_type = VideoPayloadType::from_u32(stream_type).ok_or_else(unknown)?;
            Ok(StreamerPayload::Video(VideoPayload::decode(
                payload_type,
                reader,
            )?))
        }
        ChannelClass::Audio | ChannelClass::ChatAudio => {
            let payload_type = AudioPayloadType::from_u32(stream_type).ok_or_else(unknown)?;
            Ok(StreamerPayload::Audio(AudioPayload::decode(
                payload_type,
                reader,
            )?))
        }
        ChannelClass::Input | ChannelClass::InputFeedback => {
            let payload_type = InputPayloadType::from_u32(stream_type).ok_or_else(unknown)?;
            Ok(StreamerPayload::Input(InputPayload::decode(
                payload_type,
                reader,
            )?))
        }
        ChannelClass::Control => {
            if stream_type != 0 {
                return Err(unknown());
            }
            Ok(StreamerPayload::Control(ControlPacket::decode(reader)?))
        }
        ChannelClass::TcpBase => Err(unknown()),
    }
}

fn strip_padding(payload: &[u8], end: usize) -> Result<&[u8], CodecError> {
    let pad = *payload.last().ok_or(CodecError::Malformed {
        offset: end,
        reason: "padding flag set on empty payload",
    })? as usize;
    if pad == 0 || pad > PAD_BLOCK || pad > payload.len() {
        return Err(CodecError::Malformed {
            offset: end - 1,
            reason: "invalid padding length",
        });
    }
    Ok(&payload[..payload.len() - pad])
}

/// Encode one wire message. Padding and the envelope length prefix are
/// derived; the `padding` flag on the input header is ignored.
pub fn pack(msg: &Message) -> Result<Bytes, CodecError> {
    let header = &msg.header;
    if msg.payload.payload_type() != header.payload_type {
        return Err(CodecError::InvariantViolation(
            "payload kind does not match header payload type",
        ));
    }
    if header.csrc_list.len() > 0x0F {
        return Err(CodecError::InvariantViolation("too many csrc entries"));
    }

    let mut payload = BytesMut::new();
    let mut stream_type = None;
    match &msg.payload {
        Payload::ControlHandshake(handshake) => handshake.encode(&mut payload),
        Payload::ChannelControl(control) => control.encode(&mut payload),
        Payload::UdpHandshake(handshake) => handshake.encode(&mut payload),
        Payload::Streamer(streamer) => {
            let ty = streamer.stream_type();
            stream_type = Some(ty);
            let mut body = BytesMut::new();
            streamer.encode(&mut body);
            if !(header.ssrc.connection_id == 0 && ty == 0) {
                payload.put_u32_le(body.len() as u32);
            }
            payload.extend_from_slice(&body);
        }
    }

    let pad = (PAD_BLOCK - payload.len() % PAD_BLOCK) % PAD_BLOCK;
    let padding = pad > 0;
    if padding {
        payload.put_bytes(0, pad - 1);
        payload.put_u8(pad as u8);
    }

    let mut buf = BytesMut::with_capacity(28 + payload.len());
    let b0 = (RTP_VERSION << 6)
        | ((padding as u8) << 5)
        | ((header.extension as u8) << 4)
        | header.csrc_list.len() as u8;
    let b1 = ((header.marker as u8) << 7) | header.payload_type as u8;
    buf.put_u8(b0);
    buf.put_u8(b1);
    buf.put_u16(header.sequence_num);
    buf.put_u32(header.timestamp);
    buf.put_u16(header.ssrc.connection_id);
    buf.put_u16(header.ssrc.channel_id);
    for csrc in &header.csrc_list {
        buf.put_u32(*csrc);
    }

    match (&header.streamer, stream_type) {
        (Some(streamer), Some(stream_type)) => {
            buf.put_u32_le(streamer.version);
            match (
                streamer.version & 1 != 0,
                streamer.sequence_num,
                streamer.prev_sequence_num,
            ) {
                (true, Some(seq), Some(prev)) => {
                    buf.put_u32_le(seq);
                    buf.put_u32_le(prev);
                }
                (false, None, None) => {}
                _ => {
                    return Err(CodecError::InvariantViolation(
                        "streamer sequence fields do not match streamer version",
                    ));
                }
            }
            buf.put_u32_le(stream_type);
        }
        (None, None) => {}
        (Some(_), None) => {
            return Err(CodecError::InvariantViolation(
                "streamer header on non-streamer message",
            ));
        }
        (None, Some(_)) => {
            return Err(CodecError::InvariantViolation(
                "streamer payload without streamer header",
            ));
        }
    }

    buf.extend_from_slice(&payload);
    Ok(buf.freeze())
}

/// Encode messages for the TCP leg: each message is preceded by its u32-LE
/// length.
pub fn pack_tcp(msgs: &[Message]) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::new();
    for msg in msgs {
        let data = pack(msg)?;
        buf.put_u32_le(data.len() as u32);
        buf.extend_from_slice(&data);
    }
    Ok(buf.freeze())
}

/// Decode a TCP read as a sequence of length-framed messages. A truncated
/// trailing frame surfaces as `Malformed`; iteration stops after the first
/// error.
pub fn unpack_tcp<'a, M: ChannelMap>(buf: &'a [u8], channels: &'a M) -> TcpFrames<'a, M> {
    TcpFrames {
        buf,
        channels,
        failed: false,
    }
}

pub struct TcpFrames<'a, M> {
    buf: &'a [u8],
    channels: &'a M,
    failed: bool,
}

impl<M: ChannelMap> Iterator for TcpFrames<'_, M> {
    type Item = Result<Message, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.buf.is_empty() {
            return None;
        }
        if self.buf.len() < 4 {
            self.failed = true;
            return Some(Err(CodecError::Malformed {
                offset: 0,
                reason: "partial tcp frame length",
            }));
        }
        let len = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if self.buf.len() - 4 < len {
            self.failed = true;
            return Some(Err(CodecError::Malformed {
                offset: 4,
                reason: "partial tcp frame",
            }));
        }
        let frame = &self.buf[4..4 + len];
        self.buf = &self.buf[4 + len..];
        let result = unpack(frame, self.channels);
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}
