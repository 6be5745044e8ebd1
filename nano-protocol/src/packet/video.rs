use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};
use num::FromPrimitive;

use crate::CodecError;
use crate::buffer::ByteReader;
use crate::enums::{VideoCodec, VideoPayloadType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbFormat {
    pub bpp: u32,
    pub bytes: u32,
    pub red_mask: u64,
    pub green_mask: u64,
    pub blue_mask: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub codec: VideoCodec,
    /// Present only when `codec` is RGB.
    pub rgb: Option<RgbFormat>,
}

impl VideoFormat {
    pub fn new(fps: u32, width: u32, height: u32, codec: VideoCodec) -> Self {
        Self {
            fps,
            width,
            height,
            codec,
            rgb: None,
        }
    }

    pub fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let fps = reader.get_u32_le("video format fps")?;
        let width = reader.get_u32_le("video format width")?;
        let height = reader.get_u32_le("video format height")?;
        let offset = reader.position();
        let raw = reader.get_u32_le("video format codec")?;
        let codec = VideoCodec::from_u32(raw).ok_or(CodecError::Malformed {
            offset,
            reason: "unknown video codec",
        })?;
        let rgb = if codec == VideoCodec::Rgb {
            Some(RgbFormat {
                bpp: reader.get_u32_le("rgb bpp")?,
                bytes: reader.get_u32_le("rgb bytes")?,
                red_mask: reader.get_u64_le("rgb red mask")?,
                green_mask: reader.get_u64_le("rgb green mask")?,
                blue_mask: reader.get_u64_le("rgb blue mask")?,
            })
        } else {
            None
        };
        Ok(Self {
            fps,
            width,
            height,
            codec,
            rgb,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.fps);
        buf.put_u32_le(self.width);
        buf.put_u32_le(self.height);
        buf.put_u32_le(self.codec as u32);
        if let Some(rgb) = &self.rgb {
            buf.put_u32_le(rgb.bpp);
            buf.put_u32_le(rgb.bytes);
            buf.put_u64_le(rgb.red_mask);
            buf.put_u64_le(rgb.green_mask);
            buf.put_u64_le(rgb.blue_mask);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoServerHandshake {
    pub protocol_version: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Milliseconds since the Unix epoch.
    pub reference_timestamp: u64,
    pub formats: Vec<VideoFormat>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoClientHandshake {
    pub initial_frame_id: u32,
    pub requested_format: VideoFormat,
}

bitflags! {
    /// First byte of the 32-bit video control word; the remaining three
    /// bytes are zero on the wire.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct VideoControlFlags: u32 {
        const LAST_DISPLAYED_FRAME = 0x01;
        const LOST_FRAMES = 0x02;
        const QUEUE_DEPTH = 0x04;
        const STOP_STREAM = 0x08;
        const START_STREAM = 0x10;
        const REQUEST_KEYFRAME = 0x20;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastDisplayedFrame {
    pub frame_id: u32,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LostFrames {
    pub first: u32,
    pub last: u32,
}

/// Video stream control. Optional trailers appear in wire order when the
/// matching flag bit is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoControl {
    pub flags: VideoControlFlags,
    pub last_displayed_frame: Option<LastDisplayedFrame>,
    pub queue_depth: Option<u32>,
    pub lost_frames: Option<LostFrames>,
}

impl VideoControl {
    pub fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let offset = reader.position();
        let raw = reader.get_u32_le("video control flags")?;
        let flags = VideoControlFlags::from_bits(raw).ok_or(CodecError::Malformed {
            offset,
            reason: "unknown video control flag bits",
        })?;

        let last_displayed_frame = if flags.contains(VideoControlFlags::LAST_DISPLAYED_FRAME) {
            Some(LastDisplayedFrame {
                frame_id: reader.get_u32_le("last displayed frame id")?,
                timestamp: reader.get_i64_le("last displayed frame timestamp")?,
            })
        } else {
            None
        };
        let queue_depth = if flags.contains(VideoControlFlags::QUEUE_DEPTH) {
            Some(reader.get_u32_le("queue depth")?)
        } else {
            None
        };
        let lost_frames = if flags.contains(VideoControlFlags::LOST_FRAMES) {
            Some(LostFrames {
                first: reader.get_u32_le("lost frames first")?,
                last: reader.get_u32_le("lost frames last")?,
            })
        } else {
            None
        };

        Ok(Self {
            flags,
            last_displayed_frame,
            queue_depth,
            lost_frames,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.flags.bits());
        if let Some(frame) = &self.last_displayed_frame {
            buf.put_u32_le(frame.frame_id);
            buf.put_i64_le(frame.timestamp);
        }
        if let Some(depth) = self.queue_depth {
            buf.put_u32_le(depth);
        }
        if let Some(lost) = &self.lost_frames {
            buf.put_u32_le(lost.first);
            buf.put_u32_le(lost.last);
        }
    }
}

/// One fragment of a video frame. Frames larger than a datagram arrive as
/// `packet_count` fragments sharing a `frame_id`, positioned by `offset`.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoData {
    pub flags: u32,
    pub frame_id: u32,
    pub timestamp: u64,
    pub total_size: u32,
    pub packet_count: u32,
    pub offset: u32,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VideoPayload {
    ServerHandshake(VideoServerHandshake),
    ClientHandshake(VideoClientHandshake),
    Control(VideoControl),
    Data(VideoData),
}

impl VideoPayload {
    pub fn payload_type(&self) -> VideoPayloadType {
        match self {
            Self::ServerHandshake(_) => VideoPayloadType::ServerHandshake,
            Self::ClientHandshake(_) => VideoPayloadType::ClientHandshake,
            Self::Control(_) => VideoPayloadType::Control,
            Self::Data(_) => VideoPayloadType::Data,
        }
    }

    pub fn decode(
        payload_type: VideoPayloadType,
        reader: &mut ByteReader<'_>,
    ) -> Result<Self, CodecError> {
        match payload_type {
            VideoPayloadType::ServerHandshake => {
                let protocol_version = reader.get_u32_le("video protocol version")?;
                let width = reader.get_u32_le("video width")?;
                let height = reader.get_u32_le("video height")?;
                let fps = reader.get_u32_le("video fps")?;
                let reference_timestamp = reader.get_u64_le("video reference timestamp")?;
                let count = reader.get_u32_le("video format count")?;
                let mut formats = Vec::with_capacity(count.min(64) as usize);
                for _ in 0..count {
                    formats.push(VideoFormat::decode(reader)?);
                }
                Ok(Self::ServerHandshake(VideoServerHandshake {
                    protocol_version,
                    width,
                    height,
                    fps,
                    reference_timestamp,
                    formats,
                }))
            }
            VideoPayloadType::ClientHandshake => Ok(Self::ClientHandshake(VideoClientHandshake {
                initial_frame_id: reader.get_u32_le("video initial frame id")?,
                requested_format: VideoFormat::decode(reader)?,
            })),
            VideoPayloadType::Control => Ok(Self::Control(VideoControl::decode(reader)?)),
            VideoPayloadType::Data => {
                let flags = reader.get_u32_le("video data flags")?;
                let frame_id = reader.get_u32_le("video data frame id")?;
                let timestamp = reader.get_u64_le("video data timestamp")?;
                let total_size = reader.get_u32_le("video data total size")?;
                let packet_count = reader.get_u32_le("video data packet count")?;
                let offset = reader.get_u32_le("video data offset")?;
                let data = reader.get_blob_u32("video data")?;
                Ok(Self::Data(VideoData {
                    flags,
                    frame_id,
                    timestamp,
                    total_size,
                    packet_count,
                    offset,
                    data: Bytes::copy_from_slice(data),
                }))
            }
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::ServerHandshake(handshake) => {
                buf.put_u32_le(handshake.protocol_version);
                buf.put_u32_le(handshake.width);
                buf.put_u32_le(handshake.height);
                buf.put_u32_le(handshake.fps);
                buf.put_u64_le(handshake.reference_timestamp);
                buf.put_u32_le(handshake.formats.len() as u32);
                for format in &handshake.formats {
                    format.encode(buf);
                }
            }
            Self::ClientHandshake(handshake) => {
                buf.put_u32_le(handshake.initial_frame_id);
                handshake.requested_format.encode(buf);
            }
            Self::Control(control) => control.encode(buf),
            Self::Data(data) => {
                buf.put_u32_le(data.flags);
                buf.put_u32_le(data.frame_id);
                buf.put_u64_le(data.timestamp);
                buf.put_u32_le(data.total_size);
                buf.put_u32_le(data.packet_count);
                buf.put_u32_le(data.offset);
                buf.put_u32_le(data.data.len() as u32);
                buf.put_slice(&data.data);
            }
        }
    }
}
