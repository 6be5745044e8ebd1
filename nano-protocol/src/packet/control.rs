use bytes::{BufMut, Bytes, BytesMut};
use num::FromPrimitive;

use crate::CodecError;
use crate::buffer::ByteReader;
use crate::enums::{ControlOpcode, ControllerEventType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryEntry {
    pub key: u16,
    pub value: u64,
}

/// Body of a control-channel packet, selected by the envelope opcode.
///
/// Several console-originated bodies carry fields whose semantics are
/// unknown; those keep the observed field order verbatim so a re-encode is
/// byte-exact, and nothing interprets them.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlOp {
    SessionInit {
        data: Bytes,
    },
    SessionCreate {
        guid: [u8; 16],
        data: Bytes,
    },
    SessionCreateResponse {
        guid: [u8; 16],
    },
    SessionDestroy {
        unk1: f32,
        data: Bytes,
    },
    VideoStatistics {
        values: [f32; 6],
    },
    RealtimeTelemetry {
        entries: Vec<TelemetryEntry>,
    },
    ChangeVideoQuality {
        values: [u32; 6],
    },
    InitiateNetworkTest {
        guid: [u8; 16],
    },
    NetworkInformation {
        guid: [u8; 16],
        unk1: u64,
        unk2: u8,
        unk3: f32,
    },
    NetworkTestResponse {
        guid: [u8; 16],
        unk1: f32,
        unk2: f32,
        unk3: f32,
        unk4: f32,
        unk5: f32,
        unk6: u64,
        unk7: u64,
        unk8: f32,
    },
    ControllerEvent {
        event: ControllerEventType,
        controller_num: u8,
    },
}

impl ControlOp {
    pub fn opcode(&self) -> ControlOpcode {
        match self {
            Self::SessionInit { .. } => ControlOpcode::SessionInit,
            Self::SessionCreate { .. } => ControlOpcode::SessionCreate,
            Self::SessionCreateResponse { .. } => ControlOpcode::SessionCreateResponse,
            Self::SessionDestroy { .. } => ControlOpcode::SessionDestroy,
            Self::VideoStatistics { .. } => ControlOpcode::VideoStatistics,
            Self::RealtimeTelemetry { .. } => ControlOpcode::RealtimeTelemetry,
            Self::ChangeVideoQuality { .. } => ControlOpcode::ChangeVideoQuality,
            Self::InitiateNetworkTest { .. } => ControlOpcode::InitiateNetworkTest,
            Self::NetworkInformation { .. } => ControlOpcode::NetworkInformation,
            Self::NetworkTestResponse { .. } => ControlOpcode::NetworkTestResponse,
            Self::ControllerEvent { .. } => ControlOpcode::ControllerEvent,
        }
    }

    fn decode(opcode: ControlOpcode, reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        match opcode {
            ControlOpcode::SessionInit => Ok(Self::SessionInit {
                data: Bytes::copy_from_slice(reader.rest()),
            }),
            ControlOpcode::SessionCreate => Ok(Self::SessionCreate {
                guid: reader.get_array("session create guid")?,
                data: Bytes::copy_from_slice(reader.get_blob_u32("session create data")?),
            }),
            ControlOpcode::SessionCreateResponse => Ok(Self::SessionCreateResponse {
                guid: reader.get_array("session create response guid")?,
            }),
            ControlOpcode::SessionDestroy => Ok(Self::SessionDestroy {
                unk1: reader.get_f32_le("session destroy")?,
                data: Bytes::copy_from_slice(reader.get_blob_u32("session destroy data")?),
            }),
            ControlOpcode::VideoStatistics => {
                let mut values = [0f32; 6];
                for value in &mut values {
                    *value = reader.get_f32_le("video statistics")?;
                }
                Ok(Self::VideoStatistics { values })
            }
            ControlOpcode::RealtimeTelemetry => {
                let count = reader.get_u16_le("telemetry count")?;
                let mut entries = Vec::with_capacity(count.min(256) as usize);
                for _ in 0..count {
                    entries.push(TelemetryEntry {
                        key: reader.get_u16_le("telemetry key")?,
                        value: reader.get_u64_le("telemetry value")?,
                    });
                }
                Ok(Self::RealtimeTelemetry { entries })
            }
            ControlOpcode::ChangeVideoQuality => {
                let mut values = [0u32; 6];
                for value in &mut values {
                    *value = reader.get_u32_le("change video quality")?;
                }
                Ok(Self::ChangeVideoQuality { values })
            }
            ControlOpcode::InitiateNetworkTest => Ok(Self::InitiateNetworkTest {
                guid: reader.get_array("network test guid")?,
            }),
            ControlOpcode::NetworkInformation => Ok(Self::NetworkInformation {
                guid: reader.get_array("network information guid")?,
                unk1: reader.get_u64_le("network information")?,
                unk2: reader.get_u8("network information")?,
                unk3: reader.get_f32_le("network information")?,
            }),
            ControlOpcode::NetworkTestResponse => Ok(Self::NetworkTestResponse {
                guid: reader.get_array("network test response guid")?,
                unk1: reader.get_f32_le("network test response")?,
                unk2: reader.get_f32_le("network test response")?,
                unk3: reader.get_f32_le("network test response")?,
                unk4: reader.get_f32_le("network test response")?,
                unk5: reader.get_f32_le("network test response")?,
                unk6: reader.get_u64_le("network test response")?,
                unk7: reader.get_u64_le("network test response")?,
                unk8: reader.get_f32_le("network test response")?,
            }),
            ControlOpcode::ControllerEvent => {
                let offset = reader.position();
                let raw = reader.get_u8("controller event")?;
                let event = ControllerEventType::from_u8(raw).ok_or(CodecError::Malformed {
                    offset,
                    reason: "unknown controller event",
                })?;
                Ok(Self::ControllerEvent {
                    event,
                    controller_num: reader.get_u8("controller number")?,
                })
            }
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::SessionInit { data } => buf.put_slice(data),
            Self::SessionCreate { guid, data } => {
                buf.put_slice(guid);
                buf.put_u32_le(data.len() as u32);
                buf.put_slice(data);
            }
            Self::SessionCreateResponse { guid } => buf.put_slice(guid),
            Self::SessionDestroy { unk1, data } => {
                buf.put_u32_le(unk1.to_bits());
                buf.put_u32_le(data.len() as u32);
                buf.put_slice(data);
            }
            Self::VideoStatistics { values } => {
                for value in values {
                    buf.put_u32_le(value.to_bits());
                }
            }
            Self::RealtimeTelemetry { entries } => {
                buf.put_u16_le(entries.len() as u16);
                for entry in entries {
                    buf.put_u16_le(entry.key);
                    buf.put_u64_le(entry.value);
                }
            }
            Self::ChangeVideoQuality { values } => {
                for value in values {
                    buf.put_u32_le(*value);
                }
            }
            Self::InitiateNetworkTest { guid } => buf.put_slice(guid),
            Self::NetworkInformation {
                guid,
                unk1,
                unk2,
                unk3,
            } => {
                buf.put_slice(guid);
                buf.put_u64_le(*unk1);
                buf.put_u8(*unk2);
                buf.put_u32_le(unk3.to_bits());
            }
            Self::NetworkTestResponse {
                guid,
                unk1,
                unk2,
                unk3,
                unk4,
                unk5,
                unk6,
                unk7,
                unk8,
            } => {
                buf.put_slice(guid);
                buf.put_u32_le(unk1.to_bits());
                buf.put_u32_le(unk2.to_bits());
                buf.put_u32_le(unk3.to_bits());
                buf.put_u32_le(unk4.to_bits());
                buf.put_u32_le(unk5.to_bits());
                buf.put_u64_le(*unk6);
                buf.put_u64_le(*unk7);
                buf.put_u32_le(unk8.to_bits());
            }
            Self::ControllerEvent {
                event,
                controller_num,
            } => {
                buf.put_u8(*event as u8);
                buf.put_u8(*controller_num);
            }
        }
    }
}

/// Envelope wrapping every control-channel streamer message. `unk1` and
/// `unk2` are constant in captures (1 and 1406); `prev_seq_dup` duplicates
/// the channel sequence number that also appears in the streamer sub-header.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlPacket {
    pub prev_seq_dup: u32,
    pub unk1: u16,
    pub unk2: u16,
    pub op: ControlOp,
}

impl ControlPacket {
    pub fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let prev_seq_dup = reader.get_u32_le("control packet prev seq")?;
        let unk1 = reader.get_u16_le("control packet header")?;
        let unk2 = reader.get_u16_le("control packet header")?;
        let offset = reader.position();
        let raw = reader.get_u16_le("control packet opcode")?;
        let opcode = ControlOpcode::from_u16(raw).ok_or(CodecError::Malformed {
            offset,
            reason: "unknown control opcode",
        })?;
        let op = ControlOp::decode(opcode, reader)?;
        Ok(Self {
            prev_seq_dup,
            unk1,
            unk2,
            op,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.prev_seq_dup);
        buf.put_u16_le(self.unk1);
        buf.put_u16_le(self.unk2);
        buf.put_u16_le(self.op.opcode() as u16);
        self.op.encode(buf);
    }
}
