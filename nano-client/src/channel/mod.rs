pub mod audio;
pub mod control;
pub mod input;
pub mod video;

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::SystemTime;

use bytes::Bytes;
use log::{debug, warn};
use rand::Rng;
use tokio::sync::Mutex;

use nano_protocol::enums::ChannelClass;
use nano_protocol::packet::StreamerPayload;
use nano_protocol::{ChannelMap, factory};

use crate::SessionError;
use crate::session::NanoSession;
use crate::time;

/// One logical channel created by the console. Shared counters live here;
/// per-class state sits behind the `state` lock.
pub struct Channel {
    pub id: u16,
    pub class: ChannelClass,
    pub flags: u32,
    open: AtomicBool,
    sequence_num: AtomicU32,
    frame_id: AtomicU32,
    reference_timestamp: StdMutex<Option<SystemTime>>,
    state: Mutex<ChannelState>,
}

enum ChannelState {
    Video(video::VideoState),
    Audio,
    ChatAudio,
    Control,
    Input,
    InputFeedback,
}

impl Channel {
    /// `None` for classes without a client-side state machine (TcpBase).
    pub fn new(id: u16, class: ChannelClass, flags: u32) -> Option<Self> {
        let state = match class {
            ChannelClass::Video => ChannelState::Video(video::VideoState::new()),
            ChannelClass::Audio => ChannelState::Audio,
            ChannelClass::ChatAudio => ChannelState::ChatAudio,
            ChannelClass::Control => ChannelState::Control,
            ChannelClass::Input => ChannelState::Input,
            ChannelClass::InputFeedback => ChannelState::InputFeedback,
            ChannelClass::TcpBase => return None,
        };
        Some(Self {
            id,
            class,
            flags,
            open: AtomicBool::new(false),
            sequence_num: AtomicU32::new(0),
            frame_id: AtomicU32::new(0),
            reference_timestamp: StdMutex::new(None),
            state: Mutex::new(state),
        })
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub(crate) fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub fn sequence_num(&self) -> u32 {
        self.sequence_num.load(Ordering::SeqCst)
    }

    fn advance_sequence(&self) -> (u32, u32) {
        let prev = self.sequence_num.fetch_add(1, Ordering::SeqCst);
        (prev + 1, prev)
    }

    pub fn frame_id(&self) -> u32 {
        self.frame_id.load(Ordering::SeqCst)
    }

    pub(crate) fn set_frame_id(&self, frame_id: u32) {
        debug!("[{:?}]: initial frame id {}", self.class, frame_id);
        self.frame_id.store(frame_id, Ordering::SeqCst);
    }

    pub(crate) fn next_frame_id(&self) -> u32 {
        self.frame_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn generate_initial_frame_id(&self) -> u32 {
        let frame_id = rand::rng().random_range(0..=500);
        self.set_frame_id(frame_id);
        frame_id
    }

    pub fn reference_timestamp(&self) -> Option<SystemTime> {
        *self.reference_timestamp.lock().expect("reference timestamp")
    }

    pub(crate) fn set_reference_timestamp(&self, timestamp: SystemTime) {
        debug!(
            "[{:?}]: reference timestamp {} ms",
            self.class,
            time::epoch_millis(timestamp)
        );
        *self.reference_timestamp.lock().expect("reference timestamp") = Some(timestamp);
    }

    pub(crate) fn generate_reference_timestamp(&self, session: &NanoSession) -> SystemTime {
        let timestamp = session.clock().wall();
        self.set_reference_timestamp(timestamp);
        timestamp
    }

    /// Reliable send. The previous sequence number rides along and the
    /// counter advances, so per-channel TCP messages are totally ordered.
    pub(crate) async fn send_tcp_streamer(
        &self,
        session: &NanoSession,
        payload: StreamerPayload,
    ) -> Result<(), SessionError> {
        let (sequence_num, prev_sequence_num) = self.advance_sequence();
        let msg = factory::streamer_tcp(self.id, sequence_num, prev_sequence_num, payload);
        session.control().send(&msg).await
    }

    /// Datagram send. The advanced sequence number is carried (truncated)
    /// in the RTP header.
    pub(crate) async fn send_udp_streamer(
        &self,
        session: &NanoSession,
        payload: StreamerPayload,
    ) -> Result<(), SessionError> {
        let (sequence_num, _) = self.advance_sequence();
        let msg = factory::streamer_udp(
            session.connection_id(),
            self.id,
            sequence_num as u16,
            payload,
        );
        session.streamer().send(&msg).await
    }

    pub(crate) async fn on_open(
        &self,
        session: &NanoSession,
        open_flags: Bytes,
    ) -> Result<(), SessionError> {
        self.set_open(true);
        session.send_channel_open(open_flags, self.id).await?;

        // The inverted channels speak first once open.
        match &*self.state.lock().await {
            ChannelState::ChatAudio => audio::chat_server_handshake(self, session).await?,
            ChannelState::InputFeedback => input::feedback_server_handshake(self, session).await?,
            _ => {}
        }
        Ok(())
    }

    pub(crate) async fn on_close(&self, session: &NanoSession, flags: u32) {
        self.set_open(false);
        debug!("[{:?}]: channel {} closed, flags {:#x}", self.class, self.id, flags);
        match &*self.state.lock().await {
            ChannelState::Audio | ChannelState::ChatAudio => session.client().close().await,
            _ => {}
        }
    }

    pub(crate) async fn on_message(
        &self,
        session: &NanoSession,
        payload: StreamerPayload,
    ) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        match (&mut *state, payload) {
            (ChannelState::Video(video_state), StreamerPayload::Video(payload)) => {
                video::on_message(self, session, video_state, payload).await
            }
            (ChannelState::Audio, StreamerPayload::Audio(payload)) => {
                audio::on_message(self, session, payload).await
            }
            (ChannelState::ChatAudio, StreamerPayload::Audio(payload)) => {
                audio::on_chat_message(self, payload).await
            }
            (ChannelState::Input, StreamerPayload::Input(payload)) => {
                input::on_message(self, session, payload).await
            }
            (ChannelState::InputFeedback, StreamerPayload::Input(payload)) => {
                input::on_feedback_message(self, payload);
                Ok(())
            }
            (ChannelState::Control, StreamerPayload::Control(packet)) => {
                control::on_message(self, packet);
                Ok(())
            }
            (_, payload) => {
                warn!(
                    "[{:?}]: payload kind does not match channel {}: {payload:?}",
                    self.class, self.id
                );
                Ok(())
            }
        }
    }
}

/// Channels keyed by the server-assigned channel id. Mutated only from the
/// control receive task; read by the decode and send paths.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: HashMap<u16, Arc<Channel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, channel: Arc<Channel>) {
        self.channels.insert(channel.id, channel);
    }

    pub fn get(&self, channel_id: u16) -> Option<Arc<Channel>> {
        self.channels.get(&channel_id).cloned()
    }

    pub fn by_class(&self, class: ChannelClass) -> Option<Arc<Channel>> {
        self.channels
            .values()
            .find(|channel| channel.class == class)
            .cloned()
    }
}

impl ChannelMap for ChannelRegistry {
    fn class_of(&self, channel_id: u16) -> Option<ChannelClass> {
        self.channels.get(&channel_id).map(|channel| channel.class)
    }
}
