use std::time::SystemTime;

use log::{debug, warn};

use nano_protocol::packet::StreamerPayload;
use nano_protocol::packet::input::{
    InputClientHandshake, InputFrame, InputPayload, InputServerHandshake,
};

use super::Channel;
use crate::SessionError;
use crate::session::NanoSession;
use crate::time;

const MAX_TOUCHES: u32 = 10;
const FEEDBACK_PROTOCOL_VERSION: u32 = 3;
// TODO: take the desktop size from the video channel's negotiated format
const FEEDBACK_DESKTOP_WIDTH: u32 = 1280;
const FEEDBACK_DESKTOP_HEIGHT: u32 = 720;

pub(crate) async fn on_message(
    channel: &Channel,
    session: &NanoSession,
    payload: InputPayload,
) -> Result<(), SessionError> {
    match payload {
        InputPayload::ServerHandshake(handshake) => {
            on_server_handshake(channel, session, handshake).await
        }
        InputPayload::FrameAck(ack) => {
            debug!("[Input]: acked frame {}", ack.acked_frame);
            Ok(())
        }
        other => {
            warn!("[Input]: unexpected message on channel {}: {other:?}", channel.id);
            Ok(())
        }
    }
}

async fn on_server_handshake(
    channel: &Channel,
    session: &NanoSession,
    handshake: InputServerHandshake,
) -> Result<(), SessionError> {
    debug!(
        "[Input]: server handshake, desktop {}x{}, initial frame {}",
        handshake.desktop_width, handshake.desktop_height, handshake.initial_frame_id
    );
    channel.set_frame_id(handshake.initial_frame_id);

    let reference = channel.generate_reference_timestamp(session);
    channel
        .send_tcp_streamer(
            session,
            StreamerPayload::Input(InputPayload::ClientHandshake(InputClientHandshake {
                max_touches: MAX_TOUCHES,
                reference_timestamp: time::epoch_millis(reference),
            })),
        )
        .await
}

/// Stamp and send one input report. Frames before the handshake latched a
/// reference timestamp are dropped.
pub(crate) async fn send_frame(
    channel: &Channel,
    session: &NanoSession,
    mut frame: InputFrame,
    created_at: SystemTime,
) -> Result<(), SessionError> {
    let Some(reference) = channel.reference_timestamp() else {
        debug!("[Input]: dropping frame, channel has no reference timestamp yet");
        return Ok(());
    };
    frame.frame_id = channel.next_frame_id();
    frame.timestamp = time::input_ticks(reference, session.clock().wall());
    frame.created_ts = time::input_ticks(reference, created_at);
    channel
        .send_udp_streamer(session, StreamerPayload::Input(InputPayload::Frame(frame)))
        .await
}

/// The input-feedback channel inverts the roles: the client opens with a
/// ServerHandshake and the console acks with a ClientHandshake.
pub(crate) fn on_feedback_message(channel: &Channel, payload: InputPayload) {
    match payload {
        InputPayload::ClientHandshake(handshake) => {
            debug!(
                "[InputFeedback]: console handshake, max touches {}",
                handshake.max_touches
            );
        }
        InputPayload::Frame(frame) => {
            debug!("[InputFeedback]: frame {}", frame.frame_id);
        }
        other => {
            warn!(
                "[InputFeedback]: unexpected message on channel {}: {other:?}",
                channel.id
            );
        }
    }
}

pub(crate) async fn feedback_server_handshake(
    channel: &Channel,
    session: &NanoSession,
) -> Result<(), SessionError> {
    let initial_frame_id = channel.generate_initial_frame_id();
    channel
        .send_tcp_streamer(
            session,
            StreamerPayload::Input(InputPayload::ServerHandshake(InputServerHandshake {
                protocol_version: FEEDBACK_PROTOCOL_VERSION,
                desktop_width: FEEDBACK_DESKTOP_WIDTH,
                desktop_height: FEEDBACK_DESKTOP_HEIGHT,
                max_touches: 0,
                initial_frame_id,
            })),
        )
        .await
}
