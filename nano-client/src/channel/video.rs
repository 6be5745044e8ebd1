use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use log::{debug, warn};

use nano_protocol::packet::StreamerPayload;
use nano_protocol::packet::video::{
    VideoClientHandshake, VideoControl, VideoControlFlags, VideoData, VideoFormat, VideoPayload,
    VideoServerHandshake,
};

use super::Channel;
use crate::SessionError;
use crate::client::NanoClient;
use crate::session::NanoSession;
use crate::time;

const FRAME_EXPIRY: Duration = Duration::from_secs(3);

/// Reassembly buffer for fragmented frames, keyed by frame id.
pub(crate) struct VideoState {
    frame_buf: HashMap<u32, PendingFrame>,
}

struct PendingFrame {
    packets: Vec<VideoData>,
    received: u32,
    packet_count: u32,
    arrived_at: Instant,
}

impl VideoState {
    pub(crate) fn new() -> Self {
        Self {
            frame_buf: HashMap::new(),
        }
    }
}

pub(crate) async fn on_message(
    channel: &Channel,
    session: &NanoSession,
    state: &mut VideoState,
    payload: VideoPayload,
) -> Result<(), SessionError> {
    match payload {
        VideoPayload::Data(data) => {
            handle_data(state, session.client(), session.clock().monotonic(), data).await;
            Ok(())
        }
        VideoPayload::ServerHandshake(handshake) => {
            on_server_handshake(channel, session, handshake).await
        }
        other => {
            warn!("[Video]: unexpected message on channel {}: {other:?}", channel.id);
            Ok(())
        }
    }
}

async fn on_server_handshake(
    channel: &Channel,
    session: &NanoSession,
    handshake: VideoServerHandshake,
) -> Result<(), SessionError> {
    debug!(
        "[Video]: server handshake, protocol {} {}x{}@{}, {} formats",
        handshake.protocol_version,
        handshake.width,
        handshake.height,
        handshake.fps,
        handshake.formats.len()
    );
    channel.set_reference_timestamp(time::from_epoch_millis(handshake.reference_timestamp));

    let Some(format) = handshake.formats.first().copied() else {
        warn!("[Video]: server offered no formats");
        return Ok(());
    };
    client_handshake(channel, session, format).await?;
    start_stream(channel, session).await
}

async fn client_handshake(
    channel: &Channel,
    session: &NanoSession,
    format: VideoFormat,
) -> Result<(), SessionError> {
    let initial_frame_id = channel.generate_initial_frame_id();
    session.client().set_video_format(&format).await;
    channel
        .send_tcp_streamer(
            session,
            StreamerPayload::Video(VideoPayload::ClientHandshake(VideoClientHandshake {
                initial_frame_id,
                requested_format: format,
            })),
        )
        .await
}

async fn start_stream(channel: &Channel, session: &NanoSession) -> Result<(), SessionError> {
    channel
        .send_tcp_streamer(
            session,
            StreamerPayload::Video(VideoPayload::Control(VideoControl {
                flags: VideoControlFlags::START_STREAM | VideoControlFlags::REQUEST_KEYFRAME,
                ..Default::default()
            })),
        )
        .await
}

/// Single-fragment frames render immediately. Multi-fragment frames
/// collect until all fragments arrived, then render in offset order.
/// Entries older than the expiry window are dropped on every data message;
/// the keyframe requested at stream start recovers the decoder.
pub(crate) async fn handle_data(
    state: &mut VideoState,
    client: &Arc<NanoClient>,
    now: Instant,
    data: VideoData,
) {
    if data.packet_count == 1 {
        client.render_video(data.data.clone()).await;
    } else {
        let frame_id = data.frame_id;
        let entry = state.frame_buf.entry(frame_id).or_insert_with(|| PendingFrame {
            packets: Vec::with_capacity(data.packet_count as usize),
            received: 0,
            packet_count: data.packet_count,
            arrived_at: now,
        });
        entry.packets.push(data);
        entry.received += 1;
        let finished = entry.received == entry.packet_count;

        if finished && let Some(mut complete) = state.frame_buf.remove(&frame_id) {
            complete.packets.sort_by_key(|packet| packet.offset);
            let total: usize = complete.packets.iter().map(|packet| packet.data.len()).sum();
            let mut frame = BytesMut::with_capacity(total);
            for packet in &complete.packets {
                frame.extend_from_slice(&packet.data);
            }
            client.render_video(frame.freeze()).await;
        }
    }

    state
        .frame_buf
        .retain(|_, pending| now.duration_since(pending.arrived_at) < FRAME_EXPIRY);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::client::test_support::recording_client;
    use bytes::Bytes;

    fn fragment(frame_id: u32, packet_count: u32, offset: u32, data: &[u8]) -> VideoData {
        VideoData {
            flags: 4,
            frame_id,
            timestamp: 0,
            total_size: 0,
            packet_count,
            offset,
            data: Bytes::copy_from_slice(data),
        }
    }

    #[tokio::test]
    async fn test_single_packet_renders_directly() {
        let (client, recorded) = recording_client();
        let mut state = VideoState::new();

        handle_data(&mut state, &client, Instant::now(), fragment(7, 1, 0, b"frame")).await;

        assert_eq!(recorded.video_frames(), vec![Bytes::from_static(b"frame")]);
        assert!(state.frame_buf.is_empty());
    }

    #[tokio::test]
    async fn test_reassembly_orders_by_offset() {
        let (client, recorded) = recording_client();
        let mut state = VideoState::new();
        let now = Instant::now();

        // five fragments of the same frame, deliberately out of order
        let frame_id = 3715731054;
        for (offset, data) in [
            (200u32, b"ee".as_slice()),
            (0, b"aa"),
            (150, b"dd"),
            (50, b"bb"),
        ] {
            handle_data(&mut state, &client, now, fragment(frame_id, 5, offset, data)).await;
            assert!(recorded.video_frames().is_empty());
        }
        handle_data(&mut state, &client, now, fragment(frame_id, 5, 100, b"cc")).await;

        assert_eq!(
            recorded.video_frames(),
            vec![Bytes::from_static(b"aabbccddee")]
        );
        assert!(state.frame_buf.is_empty());
    }

    #[tokio::test]
    async fn test_interleaved_frames_reassemble_independently() {
        let (client, recorded) = recording_client();
        let mut state = VideoState::new();
        let now = Instant::now();

        handle_data(&mut state, &client, now, fragment(1, 2, 0, b"a1")).await;
        handle_data(&mut state, &client, now, fragment(2, 2, 0, b"b1")).await;
        handle_data(&mut state, &client, now, fragment(2, 2, 2, b"b2")).await;
        handle_data(&mut state, &client, now, fragment(1, 2, 2, b"a2")).await;

        assert_eq!(
            recorded.video_frames(),
            vec![Bytes::from_static(b"b1b2"), Bytes::from_static(b"a1a2")]
        );
    }

    #[tokio::test]
    async fn test_incomplete_frame_expires() {
        let (client, recorded) = recording_client();
        let mut state = VideoState::new();
        let start = Instant::now();

        handle_data(&mut state, &client, start, fragment(9, 2, 0, b"old")).await;
        assert_eq!(state.frame_buf.len(), 1);

        // another frame arriving four seconds later sweeps the stale entry
        let later = start + Duration::from_secs(4);
        handle_data(&mut state, &client, later, fragment(10, 2, 0, b"new")).await;
        assert_eq!(state.frame_buf.len(), 1);
        assert!(state.frame_buf.contains_key(&10));

        // the straggler fragment of the expired frame cannot complete it
        handle_data(&mut state, &client, later, fragment(9, 2, 3, b"late")).await;
        assert!(recorded.video_frames().is_empty());
    }

    #[tokio::test]
    async fn test_fresh_frame_survives_sweep() {
        let (client, _recorded) = recording_client();
        let mut state = VideoState::new();
        let start = Instant::now();

        handle_data(&mut state, &client, start, fragment(1, 3, 0, b"x")).await;
        let later = start + Duration::from_secs(2);
        handle_data(&mut state, &client, later, fragment(1, 3, 1, b"y")).await;
        assert_eq!(state.frame_buf.len(), 1);
    }
}
