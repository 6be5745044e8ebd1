use log::{debug, warn};

use nano_protocol::enums::ControllerEventType;
use nano_protocol::packet::StreamerPayload;
use nano_protocol::packet::control::{ControlOp, ControlPacket};

use super::Channel;
use crate::SessionError;
use crate::session::NanoSession;

const CONTROL_UNK1: u16 = 1;
const CONTROL_UNK2: u16 = 1406;

pub(crate) fn on_message(channel: &Channel, packet: ControlPacket) {
    match packet.op {
        ControlOp::RealtimeTelemetry { entries } => {
            debug!("[Control]: telemetry, {} entries", entries.len());
        }
        other => {
            warn!(
                "[Control]: unhandled message on channel {}: {other:?}",
                channel.id
            );
        }
    }
}

async fn send_control(
    channel: &Channel,
    session: &NanoSession,
    op: ControlOp,
) -> Result<(), SessionError> {
    let packet = ControlPacket {
        prev_seq_dup: channel.sequence_num(),
        unk1: CONTROL_UNK1,
        unk2: CONTROL_UNK2,
        op,
    };
    channel
        .send_tcp_streamer(session, StreamerPayload::Control(packet))
        .await
}

pub(crate) async fn change_video_quality(
    channel: &Channel,
    session: &NanoSession,
    values: [u32; 6],
) -> Result<(), SessionError> {
    debug!("[Control]: change video quality {values:?}");
    send_control(channel, session, ControlOp::ChangeVideoQuality { values }).await
}

pub(crate) async fn controller_added(
    channel: &Channel,
    session: &NanoSession,
    controller_num: u8,
) -> Result<(), SessionError> {
    debug!("[Control]: controller {controller_num} added");
    send_control(
        channel,
        session,
        ControlOp::ControllerEvent {
            event: ControllerEventType::Added,
            controller_num,
        },
    )
    .await
}

pub(crate) async fn controller_removed(
    channel: &Channel,
    session: &NanoSession,
    controller_num: u8,
) -> Result<(), SessionError> {
    debug!("[Control]: controller {controller_num} removed");
    send_control(
        channel,
        session,
        ControlOp::ControllerEvent {
            event: ControllerEventType::Removed,
            controller_num,
        },
    )
    .await
}
