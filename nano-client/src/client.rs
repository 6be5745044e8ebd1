use std::sync::Mutex as StdMutex;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use log::warn;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use nano_protocol::enums::{ChannelClass, VideoQuality};
use nano_protocol::packet::audio::AudioFormat;
use nano_protocol::packet::input::InputFrame;
use nano_protocol::packet::video::VideoFormat;

use crate::SessionError;
use crate::channel::{audio, control, input};
use crate::session::NanoSession;

const PUMP_INTERVAL: Duration = Duration::from_millis(100);

/// Receives the negotiated video format and decoded-stream bytes.
/// `pump` is driven roughly every 100 ms for sinks that poll.
pub trait VideoSink: Send + 'static {
    fn open(&mut self) {}
    fn setup(&mut self, format: &VideoFormat);
    fn render(&mut self, frame: Bytes);
    fn pump(&mut self) {}
    fn close(&mut self) {}
}

pub trait AudioSink: Send + 'static {
    fn open(&mut self) {}
    fn setup(&mut self, format: &AudioFormat);
    fn render(&mut self, samples: Bytes);
    fn pump(&mut self) {}
    fn close(&mut self) {}
}

/// Events an input adapter hands to the client on each pump.
#[derive(Debug, Clone)]
pub enum InputCommand {
    Frame {
        frame: InputFrame,
        created_at: SystemTime,
    },
    ControllerAdded(u8),
    ControllerRemoved(u8),
}

pub trait InputSource: Send + 'static {
    fn open(&mut self) {}
    fn poll(&mut self) -> Vec<InputCommand>;
    fn close(&mut self) {}
}

type ErrorHandler = Box<dyn Fn(&str) + Send + Sync>;

/// Facade between the protocol engine and the rendering/input
/// collaborators. Channels push media into the sinks; the pump loop polls
/// the input source and routes its events upstream.
pub struct NanoClient {
    video: Mutex<Box<dyn VideoSink>>,
    audio: Mutex<Box<dyn AudioSink>>,
    input: Mutex<Box<dyn InputSource>>,
    on_error: StdMutex<Option<ErrorHandler>>,
    session: StdMutex<Option<Weak<NanoSession>>>,
    pump_task: StdMutex<Option<JoinHandle<()>>>,
}

impl NanoClient {
    pub fn new(
        video: impl VideoSink,
        audio: impl AudioSink,
        input: impl InputSource,
    ) -> Arc<Self> {
        Arc::new(Self {
            video: Mutex::new(Box::new(video)),
            audio: Mutex::new(Box::new(audio)),
            input: Mutex::new(Box::new(input)),
            on_error: StdMutex::new(None),
            session: StdMutex::new(None),
            pump_task: StdMutex::new(None),
        })
    }

    pub fn set_error_handler(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        *self.on_error.lock().expect("error handler") = Some(Box::new(handler));
    }

    pub(crate) async fn open(self: Arc<Self>, session: &Arc<NanoSession>) {
        *self.session.lock().expect("session slot") = Some(Arc::downgrade(session));
        self.video.lock().await.open();
        self.audio.lock().await.open();
        self.input.lock().await.open();

        let client = Arc::clone(&self);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(PUMP_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                client.pump().await;
            }
        });
        if let Some(old) = self.pump_task.lock().expect("pump task").replace(task) {
            old.abort();
        }
    }

    pub async fn close(&self) {
        if let Some(task) = self.pump_task.lock().expect("pump task").take() {
            task.abort();
        }
        self.video.lock().await.close();
        self.audio.lock().await.close();
        self.input.lock().await.close();
    }

    /// One poll cycle: drive the sinks and forward pending input events.
    pub async fn pump(&self) {
        self.video.lock().await.pump();
        self.audio.lock().await.pump();
        let commands = self.input.lock().await.poll();
        for command in commands {
            let result = match command {
                InputCommand::Frame { frame, created_at } => {
                    self.send_input(frame, created_at).await
                }
                InputCommand::ControllerAdded(num) => self.controller_added(num).await,
                InputCommand::ControllerRemoved(num) => self.controller_removed(num).await,
            };
            if let Err(err) = result {
                warn!("[Client]: input command failed: {err}");
            }
        }
    }

    fn session(&self) -> Option<Arc<NanoSession>> {
        self.session
            .lock()
            .expect("session slot")
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Send one controller report. Quietly dropped until the input channel
    /// has completed its handshake.
    pub async fn send_input(
        &self,
        frame: InputFrame,
        created_at: SystemTime,
    ) -> Result<(), SessionError> {
        let Some(session) = self.session() else {
            return Ok(());
        };
        let Some(channel) = session.channel_by_class(ChannelClass::Input).await else {
            return Ok(());
        };
        input::send_frame(&channel, &session, frame, created_at).await
    }

    pub async fn send_chat_audio(&self, data: Bytes) -> Result<(), SessionError> {
        let Some(session) = self.session() else {
            return Ok(());
        };
        let Some(channel) = session.channel_by_class(ChannelClass::ChatAudio).await else {
            return Ok(());
        };
        audio::send_chat_data(&channel, &session, data).await
    }

    pub async fn controller_added(&self, controller_num: u8) -> Result<(), SessionError> {
        let Some(session) = self.session() else {
            return Ok(());
        };
        let Some(channel) = session.channel_by_class(ChannelClass::Control).await else {
            return Ok(());
        };
        control::controller_added(&channel, &session, controller_num).await
    }

    pub async fn controller_removed(&self, controller_num: u8) -> Result<(), SessionError> {
        let Some(session) = self.session() else {
            return Ok(());
        };
        let Some(channel) = session.channel_by_class(ChannelClass::Control).await else {
            return Ok(());
        };
        control::controller_removed(&channel, &session, controller_num).await
    }

    pub async fn change_video_quality(&self, quality: VideoQuality) -> Result<(), SessionError> {
        let Some(session) = self.session() else {
            return Ok(());
        };
        let Some(channel) = session.channel_by_class(ChannelClass::Control).await else {
            return Ok(());
        };
        control::change_video_quality(&channel, &session, quality.params()).await
    }

    pub async fn set_video_format(&self, format: &VideoFormat) {
        self.video.lock().await.setup(format);
    }

    pub async fn set_audio_format(&self, format: &AudioFormat) {
        self.audio.lock().await.setup(format);
    }

    pub async fn render_video(&self, frame: Bytes) {
        self.video.lock().await.render(frame);
    }

    pub async fn render_audio(&self, samples: Bytes) {
        self.audio.lock().await.render(samples);
    }

    pub(crate) fn gamestream_error(&self, message: &str) {
        warn!("[Client]: gamestream error: {message}");
        if let Some(handler) = &*self.on_error.lock().expect("error handler") {
            handler(message);
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    #[derive(Clone, Default)]
    pub(crate) struct Recorded {
        video_formats: Arc<StdMutex<Vec<VideoFormat>>>,
        video_frames: Arc<StdMutex<Vec<Bytes>>>,
        audio_formats: Arc<StdMutex<Vec<AudioFormat>>>,
        audio_frames: Arc<StdMutex<Vec<Bytes>>>,
        input_queue: Arc<StdMutex<Vec<InputCommand>>>,
    }

    impl Recorded {
        pub(crate) fn video_formats(&self) -> Vec<VideoFormat> {
            self.video_formats.lock().expect("records").clone()
        }

        pub(crate) fn video_frames(&self) -> Vec<Bytes> {
            self.video_frames.lock().expect("records").clone()
        }

        pub(crate) fn audio_formats(&self) -> Vec<AudioFormat> {
            self.audio_formats.lock().expect("records").clone()
        }

        pub(crate) fn audio_frames(&self) -> Vec<Bytes> {
            self.audio_frames.lock().expect("records").clone()
        }

        pub(crate) fn queue_input(&self, command: InputCommand) {
            self.input_queue.lock().expect("records").push(command);
        }
    }

    struct RecordingVideoSink(Recorded);

    impl VideoSink for RecordingVideoSink {
        fn setup(&mut self, format: &VideoFormat) {
            self.0.video_formats.lock().expect("records").push(*format);
        }

        fn render(&mut self, frame: Bytes) {
            self.0.video_frames.lock().expect("records").push(frame);
        }
    }

    struct RecordingAudioSink(Recorded);

    impl AudioSink for RecordingAudioSink {
        fn setup(&mut self, format: &AudioFormat) {
            self.0.audio_formats.lock().expect("records").push(*format);
        }

        fn render(&mut self, samples: Bytes) {
            self.0.audio_frames.lock().expect("records").push(samples);
        }
    }

    struct QueueInputSource(Recorded);

    impl InputSource for QueueInputSource {
        fn poll(&mut self) -> Vec<InputCommand> {
            self.0.input_queue.lock().expect("records").drain(..).collect()
        }
    }

    pub(crate) fn recording_client() -> (Arc<NanoClient>, Recorded) {
        let recorded = Recorded::default();
        let client = NanoClient::new(
            RecordingVideoSink(recorded.clone()),
            RecordingAudioSink(recorded.clone()),
            QueueInputSource(recorded.clone()),
        );
        (client, recorded)
    }
}
