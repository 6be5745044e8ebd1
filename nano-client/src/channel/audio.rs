use bytes::Bytes;
use log::{debug, warn};

use nano_protocol::enums::AudioCodec;
use nano_protocol::packet::StreamerPayload;
use nano_protocol::packet::audio::{
    AudioClientHandshake, AudioControl, AudioControlFlags, AudioData, AudioFormat, AudioPayload,
    AudioServerHandshake,
};

use super::Channel;
use crate::SessionError;
use crate::session::NanoSession;
use crate::time;

const CHAT_AUDIO_PROTOCOL_VERSION: u32 = 4;

pub(crate) async fn on_message(
    channel: &Channel,
    session: &NanoSession,
    payload: AudioPayload,
) -> Result<(), SessionError> {
    match payload {
        AudioPayload::Data(data) => {
            session.client().render_audio(data.data).await;
            Ok(())
        }
        AudioPayload::ServerHandshake(handshake) => {
            on_server_handshake(channel, session, handshake).await
        }
        other => {
            warn!("[Audio]: unexpected message on channel {}: {other:?}", channel.id);
            Ok(())
        }
    }
}

async fn on_server_handshake(
    channel: &Channel,
    session: &NanoSession,
    handshake: AudioServerHandshake,
) -> Result<(), SessionError> {
    debug!(
        "[Audio]: server handshake, protocol {}, {} formats",
        handshake.protocol_version,
        handshake.formats.len()
    );
    channel.set_reference_timestamp(time::from_epoch_millis(handshake.reference_timestamp));

    let Some(format) = handshake.formats.first().copied() else {
        warn!("[Audio]: server offered no formats");
        return Ok(());
    };

    let initial_frame_id = channel.generate_initial_frame_id();
    session.client().set_audio_format(&format).await;
    channel
        .send_tcp_streamer(
            session,
            StreamerPayload::Audio(AudioPayload::ClientHandshake(AudioClientHandshake {
                initial_frame_id,
                requested_format: format,
            })),
        )
        .await?;

    channel
        .send_tcp_streamer(
            session,
            StreamerPayload::Audio(AudioPayload::Control(AudioControl {
                flags: AudioControlFlags::START_STREAM,
            })),
        )
        .await
}

/// Chat audio inverts the handshake roles: the console answers with a
/// ClientHandshake picking one of our advertised formats, then drives the
/// stream with Control.
pub(crate) async fn on_chat_message(
    channel: &Channel,
    payload: AudioPayload,
) -> Result<(), SessionError> {
    match payload {
        AudioPayload::ClientHandshake(handshake) => {
            debug!(
                "[ChatAudio]: console accepted format {:?}",
                handshake.requested_format
            );
            Ok(())
        }
        AudioPayload::Control(control) => {
            debug!("[ChatAudio]: control {:?}", control.flags);
            Ok(())
        }
        other => {
            warn!(
                "[ChatAudio]: unexpected message on channel {}: {other:?}",
                channel.id
            );
            Ok(())
        }
    }
}

/// Sent by the client as soon as the chat-audio channel opens, advertising
/// the microphone format.
pub(crate) async fn chat_server_handshake(
    channel: &Channel,
    session: &NanoSession,
) -> Result<(), SessionError> {
    let reference = channel.generate_reference_timestamp(session);
    channel
        .send_tcp_streamer(
            session,
            StreamerPayload::Audio(AudioPayload::ServerHandshake(AudioServerHandshake {
                protocol_version: CHAT_AUDIO_PROTOCOL_VERSION,
                reference_timestamp: time::epoch_millis(reference),
                formats: vec![AudioFormat::new(1, 24000, AudioCodec::Opus)],
            })),
        )
        .await
}

/// Upstream chat-audio data. Frame ids are not used on this path.
pub(crate) async fn send_chat_data(
    channel: &Channel,
    session: &NanoSession,
    data: Bytes,
) -> Result<(), SessionError> {
    let timestamp = time::epoch_millis(session.clock().wall()) / 1000;
    channel
        .send_udp_streamer(
            session,
            StreamerPayload::Audio(AudioPayload::Data(AudioData {
                flags: 4,
                frame_id: 0,
                timestamp,
                data,
            })),
        )
        .await
}
