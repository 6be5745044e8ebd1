use bytes::{BufMut, BytesMut};

use crate::CodecError;
use crate::buffer::ByteReader;
use crate::enums::InputPayloadType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputServerHandshake {
    pub protocol_version: u32,
    pub desktop_width: u32,
    pub desktop_height: u32,
    pub max_touches: u32,
    pub initial_frame_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputClientHandshake {
    pub max_touches: u32,
    /// Milliseconds since the Unix epoch.
    pub reference_timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputFrameAck {
    pub acked_frame: u32,
}

/// Digital button states, one byte each in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputButtons {
    pub dpad_up: u8,
    pub dpad_down: u8,
    pub dpad_left: u8,
    pub dpad_right: u8,
    pub start: u8,
    pub back: u8,
    pub left_thumbstick: u8,
    pub right_thumbstick: u8,
    pub left_shoulder: u8,
    pub right_shoulder: u8,
    pub guide: u8,
    pub unknown: u8,
    pub a: u8,
    pub b: u8,
    pub x: u8,
    pub y: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputAnalog {
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub left_thumb_x: i16,
    pub left_thumb_y: i16,
    pub right_thumb_x: i16,
    pub right_thumb_y: i16,
    pub rumble_trigger_l: u8,
    pub rumble_trigger_r: u8,
    pub rumble_handle_l: u8,
    pub rumble_handle_r: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputExtension {
    /// 1 on gamepad-sourced frames.
    pub byte_6: u8,
    pub byte_7: u8,
    pub rumble_trigger_l2: u8,
    pub rumble_trigger_r2: u8,
    pub rumble_handle_l2: u8,
    pub rumble_handle_r2: u8,
    pub byte_12: u8,
    pub byte_13: u8,
    pub byte_14: u8,
}

/// A single controller input report. Timestamps are 10 microsecond ticks
/// relative to the channel's reference timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputFrame {
    pub frame_id: u32,
    pub timestamp: u64,
    pub created_ts: u64,
    pub buttons: InputButtons,
    pub analog: InputAnalog,
    pub extension: InputExtension,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputPayload {
    ServerHandshake(InputServerHandshake),
    ClientHandshake(InputClientHandshake),
    FrameAck(InputFrameAck),
    Frame(InputFrame),
}

impl InputPayload {
    pub fn payload_type(&self) -> InputPayloadType {
        match self {
            Self::ServerHandshake(_) => InputPayloadType::ServerHandshake,
            Self::ClientHandshake(_) => InputPayloadType::ClientHandshake,
            Self::FrameAck(_) => InputPayloadType::FrameAck,
            Self::Frame(_) => InputPayloadType::Frame,
        }
    }

    pub fn decode(
        payload_type: InputPayloadType,
        reader: &mut ByteReader<'_>,
    ) -> Result<Self, CodecError> {
        match payload_type {
            InputPayloadType::ServerHandshake => Ok(Self::ServerHandshake(InputServerHandshake {
                protocol_version: reader.get_u32_le("input protocol version")?,
                desktop_width: reader.get_u32_le("input desktop width")?,
                desktop_height: reader.get_u32_le("input desktop height")?,
                max_touches: reader.get_u32_le("input max touches")?,
                initial_frame_id: reader.get_u32_le("input initial frame id")?,
            })),
            InputPayloadType::ClientHandshake => Ok(Self::ClientHandshake(InputClientHandshake {
                max_touches: reader.get_u32_le("input max touches")?,
                reference_timestamp: reader.get_u64_le("input reference timestamp")?,
            })),
            InputPayloadType::FrameAck => Ok(Self::FrameAck(InputFrameAck {
                acked_frame: reader.get_u32_le("input acked frame")?,
            })),
            InputPayloadType::Frame => {
                let frame_id = reader.get_u32_le("input frame id")?;
                let timestamp = reader.get_u64_le("input frame timestamp")?;
                let created_ts = reader.get_u64_le("input frame created ts")?;

                let b = reader.get_array::<16>("input frame buttons")?;
                let buttons = InputButtons {
                    dpad_up: b[0],
                    dpad_down: b[1],
                    dpad_left: b[2],
                    dpad_right: b[3],
                    start: b[4],
                    back: b[5],
                    left_thumbstick: b[6],
                    right_thumbstick: b[7],
                    left_shoulder: b[8],
                    right_shoulder: b[9],
                    guide: b[10],
                    unknown: b[11],
                    a: b[12],
                    b: b[13],
                    x: b[14],
                    y: b[15],
                };

                let analog = InputAnalog {
                    left_trigger: reader.get_u8("input left trigger")?,
                    right_trigger: reader.get_u8("input right trigger")?,
                    left_thumb_x: reader.get_i16_le("input left thumb x")?,
                    left_thumb_y: reader.get_i16_le("input left thumb y")?,
                    right_thumb_x: reader.get_i16_le("input right thumb x")?,
                    right_thumb_y: reader.get_i16_le("input right thumb y")?,
                    rumble_trigger_l: reader.get_u8("input rumble trigger l")?,
                    rumble_trigger_r: reader.get_u8("input rumble trigger r")?,
                    rumble_handle_l: reader.get_u8("input rumble handle l")?,
                    rumble_handle_r: reader.get_u8("input rumble handle r")?,
                };

                let e = reader.get_array::<9>("input frame extension")?;
                let extension = InputExtension {
                    byte_6: e[0],
                    byte_7: e[1],
                    rumble_trigger_l2: e[2],
                    rumble_trigger_r2: e[3],
                    rumble_handle_l2: e[4],
                    rumble_handle_r2: e[5],
                    byte_12: e[6],
                    byte_13: e[7],
                    byte_14: e[8],
                };

                Ok(Self::Frame(InputFrame {
                    frame_id,
                    timestamp,
                    created_ts,
                    buttons,
                    analog,
                    extension,
                }))
            }
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::ServerHandshake(handshake) => {
                buf.put_u32_le(handshake.protocol_version);
                buf.put_u32_le(handshake.desktop_width);
                buf.put_u32_le(handshake.desktop_height);
                buf.put_u32_le(handshake.max_touches);
                buf.put_u32_le(handshake.initial_frame_id);
            }
            Self::ClientHandshake(handshake) => {
                buf.put_u32_le(handshake.max_touches);
                buf.put_u64_le(handshake.reference_timestamp);
            }
            Self::FrameAck(ack) => buf.put_u32_le(ack.acked_frame),
            Self::Frame(frame) => {
                buf.put_u32_le(frame.frame_id);
                buf.put_u64_le(frame.timestamp);
                buf.put_u64_le(frame.created_ts);

                let buttons = &frame.buttons;
                buf.put_slice(&[
                    buttons.dpad_up,
                    buttons.dpad_down,
                    buttons.dpad_left,
                    buttons.dpad_right,
                    buttons.start,
                    buttons.back,
                    buttons.left_thumbstick,
                    buttons.right_thumbstick,
                    buttons.left_shoulder,
                    buttons.right_shoulder,
                    buttons.guide,
                    buttons.unknown,
                    buttons.a,
                    buttons.b,
                    buttons.x,
                    buttons.y,
                ]);

                let analog = &frame.analog;
                buf.put_u8(analog.left_trigger);
                buf.put_u8(analog.right_trigger);
                buf.put_i16_le(analog.left_thumb_x);
                buf.put_i16_le(analog.left_thumb_y);
                buf.put_i16_le(analog.right_thumb_x);
                buf.put_i16_le(analog.right_thumb_y);
                buf.put_u8(analog.rumble_trigger_l);
                buf.put_u8(analog.rumble_trigger_r);
                buf.put_u8(analog.rumble_handle_l);
                buf.put_u8(analog.rumble_handle_r);

                let extension = &frame.extension;
                buf.put_slice(&[
                    extension.byte_6,
                    extension.byte_7,
                    extension.rumble_trigger_l2,
                    extension.rumble_trigger_r2,
                    extension.rumble_handle_l2,
                    extension.rumble_handle_r2,
                    extension.byte_12,
                    extension.byte_13,
                    extension.byte_14,
                ]);
            }
        }
    }
}
