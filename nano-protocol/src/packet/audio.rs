use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};
use num::FromPrimitive;

use crate::CodecError;
use crate::buffer::ByteReader;
use crate::enums::{AudioCodec, AudioPayloadType, AudioSampleType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub bit_depth: u32,
    pub sample_type: AudioSampleType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub channels: u32,
    pub sample_rate: u32,
    pub codec: AudioCodec,
    /// Present only when `codec` is PCM.
    pub pcm: Option<PcmFormat>,
}

impl AudioFormat {
    pub fn new(channels: u32, sample_rate: u32, codec: AudioCodec) -> Self {
        Self {
            channels,
            sample_rate,
            codec,
            pcm: None,
        }
    }

    pub fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let channels = reader.get_u32_le("audio format channels")?;
        let sample_rate = reader.get_u32_le("audio format sample rate")?;
        let offset = reader.position();
        let raw = reader.get_u32_le("audio format codec")?;
        let codec = AudioCodec::from_u32(raw).ok_or(CodecError::Malformed {
            offset,
            reason: "unknown audio codec",
        })?;
        let pcm = if codec == AudioCodec::Pcm {
            let bit_depth = reader.get_u32_le("pcm bit depth")?;
            let offset = reader.position();
            let raw = reader.get_u32_le("pcm sample type")?;
            let sample_type = AudioSampleType::from_u32(raw).ok_or(CodecError::Malformed {
                offset,
                reason: "unknown pcm sample type",
            })?;
            Some(PcmFormat {
                bit_depth,
                sample_type,
            })
        } else {
            None
        };
        Ok(Self {
            channels,
            sample_rate,
            codec,
            pcm,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.channels);
        buf.put_u32_le(self.sample_rate);
        buf.put_u32_le(self.codec as u32);
        if let Some(pcm) = &self.pcm {
            buf.put_u32_le(pcm.bit_depth);
            buf.put_u32_le(pcm.sample_type as u32);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioServerHandshake {
    pub protocol_version: u32,
    /// Milliseconds since the Unix epoch.
    pub reference_timestamp: u64,
    pub formats: Vec<AudioFormat>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioClientHandshake {
    pub initial_frame_id: u32,
    pub requested_format: AudioFormat,
}

bitflags! {
    /// First byte of the 32-bit audio control word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AudioControlFlags: u32 {
        const STOP_STREAM = 0x08;
        const START_STREAM = 0x10;
        const REINITIALIZE = 0x40;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioControl {
    pub flags: AudioControlFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    pub flags: u32,
    pub frame_id: u32,
    pub timestamp: u64,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioPayload {
    ServerHandshake(AudioServerHandshake),
    ClientHandshake(AudioClientHandshake),
    Control(AudioControl),
    Data(AudioData),
}

impl AudioPayload {
    pub fn payload_type(&self) -> AudioPayloadType {
        match self {
            Self::ServerHandshake(_) => AudioPayloadType::ServerHandshake,
            Self::ClientHandshake(_) => AudioPayloadType::ClientHandshake,
            Self::Control(_) => AudioPayloadType::Control,
            Self::Data(_) => AudioPayloadType::Data,
        }
    }

    pub fn decode(
        payload_type: AudioPayloadType,
        reader: &mut ByteReader<'_>,
    ) -> Result<Self, CodecError> {
        match payload_type {
            AudioPayloadType::ServerHandshake => {
                let protocol_version = reader.get_u32_le("audio protocol version")?;
                let reference_timestamp = reader.get_u64_le("audio reference timestamp")?;
                let count = reader.get_u32_le("audio format count")?;
                let mut formats = Vec::with_capacity(count.min(64) as usize);
                for _ in 0..count {
                    formats.push(AudioFormat::decode(reader)?);
                }
                Ok(Self::ServerHandshake(AudioServerHandshake {
                    protocol_version,
                    reference_timestamp,
                    formats,
                }))
            }
            AudioPayloadType::ClientHandshake => Ok(Self::ClientHandshake(AudioClientHandshake {
                initial_frame_id: reader.get_u32_le("audio initial frame id")?,
                requested_format: AudioFormat::decode(reader)?,
            })),
            AudioPayloadType::Control => {
                let offset = reader.position();
                let raw = reader.get_u32_le("audio control flags")?;
                let flags = AudioControlFlags::from_bits(raw).ok_or(CodecError::Malformed {
                    offset,
                    reason: "unknown audio control flag bits",
                })?;
                Ok(Self::Control(AudioControl { flags }))
            }
            AudioPayloadType::Data => {
                let flags = reader.get_u32_le("audio data flags")?;
                let frame_id = reader.get_u32_le("audio data frame id")?;
                let timestamp = reader.get_u64_le("audio data timestamp")?;
                let data = reader.get_blob_u32("audio data")?;
                Ok(Self::Data(AudioData {
                    flags,
                    frame_id,
                    timestamp,
                    data: Bytes::copy_from_slice(data),
                }))
            }
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::ServerHandshake(handshake) => {
                buf.put_u32_le(handshake.protocol_version);
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
            Self::Control(control) => buf.put_u32_le(control.flags.bits()),
            Self::Data(data) => {
                buf.put_u32_le(data.flags);
                buf.put_u32_le(data.frame_id);
                buf.put_u64_le(data.timestamp);
                buf.put_u32_le(data.data.len() as u32);
                buf.put_slice(&data.data);
            }
        }
    }
}
