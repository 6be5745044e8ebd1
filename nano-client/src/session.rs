use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info, warn};
use rand::Rng;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;

use nano_protocol::enums::{ChannelClass, ChannelControlType};
use nano_protocol::packet::{ChannelControl, Message, Payload, StreamerPayload};
use nano_protocol::{factory, packer};

use crate::SessionError;
use crate::channel::{Channel, ChannelRegistry};
use crate::client::NanoClient;
use crate::time::{Clock, SystemClock};
use crate::transport::{ControlReceiver, ControlTransport, StreamerTransport};

/// Connection parameters delivered by the SmartGlass bootstrap
/// (the Initializing broadcast state).
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub address: String,
    pub session_id: String,
    pub tcp_port: u16,
    pub udp_port: u16,
}

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const UDP_HANDSHAKE_INTERVAL: Duration = Duration::from_millis(500);
const DATAGRAM_BUFFER_SIZE: usize = 2048;

/// One gamestreaming session: the paired transports, the channel registry,
/// and the bring-up state machine.
///
/// The console drives everything after `connect`: it creates and opens
/// channels over the control connection, and the per-channel state
/// machines respond. Dropping the session without `stop` leaves the
/// receive tasks running; call [`NanoSession::stop`].
pub struct NanoSession {
    params: SessionParams,
    client: Arc<NanoClient>,
    clock: Arc<dyn Clock>,
    control: ControlTransport,
    streamer: StreamerTransport,
    channels: RwLock<ChannelRegistry>,
    connection_id: AtomicU16,
    connected: watch::Sender<bool>,
    udp_connected: watch::Sender<bool>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl NanoSession {
    pub async fn start(
        client: Arc<NanoClient>,
        params: SessionParams,
    ) -> Result<Arc<Self>, SessionError> {
        Self::start_with_clock(client, params, Arc::new(SystemClock)).await
    }

    pub async fn start_with_clock(
        client: Arc<NanoClient>,
        params: SessionParams,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, SessionError> {
        let (control, receiver) = ControlTransport::connect(&params.address, params.tcp_port).await?;
        let streamer = StreamerTransport::connect(&params.address, params.udp_port).await?;

        let session = Arc::new(Self {
            params,
            client: client.clone(),
            clock,
            control,
            streamer,
            channels: RwLock::new(ChannelRegistry::new()),
            connection_id: AtomicU16::new(0),
            connected: watch::Sender::new(false),
            udp_connected: watch::Sender::new(false),
            tasks: StdMutex::new(Vec::new()),
        });

        let control_task = tokio::spawn(control_recv_loop(session.clone(), receiver));
        let streamer_task = tokio::spawn(streamer_recv_loop(session.clone()));
        session
            .tasks
            .lock()
            .expect("session tasks")
            .extend([control_task, streamer_task]);

        client.open(&session).await;
        Ok(session)
    }

    /// Two-phase bring-up: the control handshake assigns the connection
    /// id, then UDP handshakes repeat until the console's first datagram
    /// confirms the media path. `timeout` bounds the whole exchange.
    pub async fn connect(&self, timeout: Duration) -> Result<(), SessionError> {
        tokio::time::timeout(timeout, self.bring_up())
            .await
            .map_err(|_| SessionError::HandshakeTimeout)?
    }

    async fn bring_up(&self) -> Result<(), SessionError> {
        let connection_id = rand::rng().random_range(50000u16..=60000);
        debug!("[Session]: control handshake, proposed connection id {connection_id}");
        self.control
            .send(&factory::control_handshake(connection_id))
            .await?;

        let mut connected = self.connected.subscribe();
        connected
            .wait_for(|ready| *ready)
            .await
            .map_err(|_| SessionError::HandshakeTimeout)?;

        let mut udp_connected = self.udp_connected.subscribe();
        while !*udp_connected.borrow_and_update() {
            self.streamer
                .send(&factory::udp_handshake(self.connection_id(), 1))
                .await?;
            tokio::select! {
                changed = udp_connected.wait_for(|ready| *ready) => {
                    changed.map_err(|_| SessionError::HandshakeTimeout)?;
                }
                () = tokio::time::sleep(UDP_HANDSHAKE_INTERVAL) => {}
            }
        }
        debug!("[Session]: media path confirmed");
        Ok(())
    }

    /// Cancel the receive tasks, close the control socket, close the
    /// client.
    pub async fn stop(&self) {
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .expect("session tasks")
            .drain(..)
            .collect();
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }
        self.control.shutdown().await;
        self.client.close().await;
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    /// Server-assigned connection id; zero until the control handshake
    /// completes.
    pub fn connection_id(&self) -> u16 {
        self.connection_id.load(Ordering::SeqCst)
    }

    pub async fn channel_by_class(&self, class: ChannelClass) -> Option<Arc<Channel>> {
        self.channels.read().await.by_class(class)
    }

    pub(crate) fn control(&self) -> &ControlTransport {
        &self.control
    }

    pub(crate) fn streamer(&self) -> &StreamerTransport {
        &self.streamer
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn client(&self) -> &Arc<NanoClient> {
        &self.client
    }

    pub(crate) async fn send_channel_open(
        &self,
        flags: Bytes,
        channel_id: u16,
    ) -> Result<(), SessionError> {
        self.control
            .send(&factory::channel_open(flags, channel_id))
            .await
    }

    async fn handle_control_message(&self, msg: Message) {
        let channel_id = msg.header.ssrc.channel_id;
        match msg.payload {
            Payload::ControlHandshake(handshake) => {
                if handshake.handshake_type == ChannelControlType::ServerHandshake {
                    self.connection_id
                        .store(handshake.connection_id, Ordering::SeqCst);
                    info!(
                        "[Session]: connected, connection id {}",
                        handshake.connection_id
                    );
                    self.connected.send_replace(true);
                } else {
                    warn!(
                        "[Session]: unexpected control handshake type {:?}",
                        handshake.handshake_type
                    );
                }
            }
            Payload::ChannelControl(control) => {
                self.handle_channel_control(channel_id, control).await;
            }
            Payload::Streamer(payload) => self.route_streamer(channel_id, payload).await,
            Payload::UdpHandshake(_) => {
                warn!("[Session]: udp handshake on the control transport");
            }
        }
    }

    async fn handle_channel_control(&self, channel_id: u16, control: ChannelControl) {
        match control {
            ChannelControl::Create { name, flags } => match Channel::new(channel_id, name, flags) {
                Some(channel) => {
                    info!(
                        "[Session]: channel created: id={channel_id} class={name:?} flags={flags:#x}"
                    );
                    self.channels.write().await.insert(Arc::new(channel));
                }
                None => {
                    warn!("[Session]: no state machine for channel class {name:?}, ignoring create");
                }
            },
            ChannelControl::Open { flags } => {
                let channel = { self.channels.read().await.get(channel_id) };
                let Some(channel) = channel else {
                    warn!("[Session]: open for unknown channel {channel_id}");
                    return;
                };
                info!(
                    "[Session]: channel opened: id={channel_id} class={:?} flags={flags:?}",
                    channel.class
                );
                if let Err(err) = channel.on_open(self, flags).await {
                    warn!("[{:?}]: open handler failed: {err}", channel.class);
                }
            }
            ChannelControl::Close { flags } => {
                let channel = { self.channels.read().await.get(channel_id) };
                let Some(channel) = channel else {
                    warn!("[Session]: close for unknown channel {channel_id}");
                    return;
                };
                info!(
                    "[Session]: channel closed: id={channel_id} class={:?}",
                    channel.class
                );
                channel.on_close(self, flags).await;
            }
        }
    }

    async fn route_streamer(&self, channel_id: u16, payload: StreamerPayload) {
        let channel = { self.channels.read().await.get(channel_id) };
        let Some(channel) = channel else {
            warn!("[Session]: streamer message for unknown channel {channel_id}");
            return;
        };
        if let Err(err) = channel.on_message(self, payload).await {
            warn!("[{:?}]: handler failed: {err}", channel.class);
        }
    }

    fn lost(&self, reason: &str) {
        self.client.gamestream_error(reason);
    }
}

async fn control_recv_loop(session: Arc<NanoSession>, mut receiver: ControlReceiver) {
    loop {
        let frame = match receiver.next_frame().await {
            Ok(frame) => frame,
            Err(err) => {
                warn!("[Control]: receive loop ended: {err}");
                session.lost(&format!("control transport lost: {err}"));
                session.client().close().await;
                return;
            }
        };
        let decoded = {
            let registry = session.channels.read().await;
            packer::unpack(&frame, &*registry)
        };
        match decoded {
            Ok(msg) => session.handle_control_message(msg).await,
            Err(err) => warn!("[Control]: dropping malformed message: {err}"),
        }
    }
}

async fn streamer_recv_loop(session: Arc<NanoSession>) {
    let mut buf = [0u8; DATAGRAM_BUFFER_SIZE];
    loop {
        let read = match session.streamer().recv(&mut buf).await {
            Ok(read) => read,
            Err(err) => {
                warn!("[Streamer]: receive loop ended: {err}");
                return;
            }
        };
        if !*session.udp_connected.borrow() {
            session.udp_connected.send_replace(true);
        }

        let decoded = {
            let registry = session.channels.read().await;
            packer::unpack(&buf[..read], &*registry)
        };
        match decoded {
            Ok(msg) => {
                if let Payload::Streamer(payload) = msg.payload {
                    session
                        .route_streamer(msg.header.ssrc.channel_id, payload)
                        .await;
                } else {
                    debug!(
                        "[Streamer]: ignoring non-streamer datagram: {:?}",
                        msg.header.payload_type
                    );
                }
            }
            Err(err) => warn!("[Streamer]: dropping malformed datagram: {err}"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::time::SystemTime;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream, UdpSocket};
    use tokio::time::timeout;

    use nano_protocol::enums::{AudioCodec, VideoCodec, VideoQuality};
    use nano_protocol::packet::audio::{AudioData, AudioFormat, AudioPayload, AudioServerHandshake};
    use nano_protocol::packet::control::ControlOp;
    use nano_protocol::packet::input::{InputButtons, InputFrame, InputPayload, InputServerHandshake};
    use nano_protocol::packet::video::{
        VideoControlFlags, VideoData, VideoFormat, VideoPayload, VideoServerHandshake,
    };
    use nano_protocol::packet::{ControlHandshake, RtpHeader};

    use crate::client::test_support::{Recorded, recording_client};
    use crate::client::InputCommand;
    use nano_protocol::enums::ControllerEventType;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);
    const CONSOLE_CONNECTION_ID: u16 = 12345;

    fn console_channels() -> HashMap<u16, ChannelClass> {
        HashMap::from([
            (1024, ChannelClass::Video),
            (1025, ChannelClass::Audio),
            (1026, ChannelClass::ChatAudio),
            (1027, ChannelClass::Control),
            (1028, ChannelClass::Input),
            (1029, ChannelClass::InputFeedback),
        ])
    }

    /// Scripted console half of the session, talking real sockets.
    struct Console {
        stream: TcpStream,
        udp: UdpSocket,
        client_addr: SocketAddr,
        channels: HashMap<u16, ChannelClass>,
    }

    impl Console {
        async fn accept(listener: TcpListener, udp: UdpSocket) -> Self {
            let (mut stream, _) = listener.accept().await.unwrap();
            let channels = console_channels();

            let msg = read_message(&mut stream, &channels).await;
            match msg.payload {
                Payload::ControlHandshake(handshake) => {
                    assert_eq!(
                        handshake.handshake_type,
                        ChannelControlType::ClientHandshake
                    );
                    assert!((50000..=60000).contains(&handshake.connection_id));
                }
                other => panic!("expected control handshake, got {other:?}"),
            }

            let ack = Message {
                header: factory::header(nano_protocol::enums::RtpPayloadType::Control, 0, 0),
                payload: Payload::ControlHandshake(ControlHandshake {
                    handshake_type: ChannelControlType::ServerHandshake,
                    connection_id: CONSOLE_CONNECTION_ID,
                }),
            };
            write_messages(&mut stream, &[ack]).await;

            let mut buf = [0u8; 256];
            let (read, client_addr) = udp.recv_from(&mut buf).await.unwrap();
            let msg = packer::unpack(&buf[..read], &channels).unwrap();
            assert_eq!(msg.header.ssrc.connection_id, CONSOLE_CONNECTION_ID);
            assert!(matches!(msg.payload, Payload::UdpHandshake(handshake) if handshake.unk == 1));

            let reply = packer::pack(&factory::udp_handshake(CONSOLE_CONNECTION_ID, 1)).unwrap();
            udp.send_to(&reply, client_addr).await.unwrap();

            Self {
                stream,
                udp,
                client_addr,
                channels,
            }
        }

        async fn read(&mut self) -> Message {
            read_message(&mut self.stream, &self.channels).await
        }

        async fn send(&mut self, msgs: &[Message]) {
            write_messages(&mut self.stream, msgs).await;
        }

        async fn send_udp(&self, msg: &Message) {
            let data = packer::pack(msg).unwrap();
            self.udp.send_to(&data, self.client_addr).await.unwrap();
        }

        /// Next streamer datagram from the client, skipping handshake
        /// retries still in flight.
        async fn read_udp(&mut self) -> Message {
            loop {
                let mut buf = [0u8; 2048];
                let (read, _) = timeout(TEST_TIMEOUT, self.udp.recv_from(&mut buf))
                    .await
                    .expect("datagram timed out")
                    .unwrap();
                let msg = packer::unpack(&buf[..read], &self.channels).unwrap();
                if !matches!(msg.payload, Payload::UdpHandshake(_)) {
                    return msg;
                }
            }
        }

        /// Create and open a channel, consuming the client's open echo.
        async fn open_channel(&mut self, class: ChannelClass, channel_id: u16, flags: Bytes) {
            self.send(&[
                factory::channel_create(class, 0, channel_id),
                factory::channel_open(flags.clone(), channel_id),
            ])
            .await;

            let echo = self.read().await;
            assert_eq!(echo.header.ssrc.channel_id, channel_id);
            match echo.payload {
                Payload::ChannelControl(ChannelControl::Open { flags: echoed }) => {
                    assert_eq!(echoed, flags);
                }
                other => panic!("expected open echo, got {other:?}"),
            }
        }
    }

    async fn read_message(
        stream: &mut TcpStream,
        channels: &HashMap<u16, ChannelClass>,
    ) -> Message {
        let mut len = [0u8; 4];
        timeout(TEST_TIMEOUT, stream.read_exact(&mut len))
            .await
            .expect("read timed out")
            .unwrap();
        let mut data = vec![0u8; u32::from_le_bytes(len) as usize];
        timeout(TEST_TIMEOUT, stream.read_exact(&mut data))
            .await
            .expect("read timed out")
            .unwrap();
        packer::unpack(&data, channels).unwrap()
    }

    async fn write_messages(stream: &mut TcpStream, msgs: &[Message]) {
        let data = packer::pack_tcp(msgs).unwrap();
        stream.write_all(&data).await.unwrap();
    }

    fn streamer_header(msg: &RtpHeader) -> (u32, u32) {
        let streamer = msg.streamer.unwrap();
        (
            streamer.sequence_num.unwrap(),
            streamer.prev_sequence_num.unwrap(),
        )
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        timeout(TEST_TIMEOUT, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn start_session() -> (
        Arc<NanoSession>,
        Arc<crate::client::NanoClient>,
        Recorded,
        Console,
    ) {
        start_session_with(Arc::new(SystemClock)).await
    }

    async fn start_session_with(
        clock: Arc<dyn Clock>,
    ) -> (
        Arc<NanoSession>,
        Arc<crate::client::NanoClient>,
        Recorded,
        Console,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let tcp_port = listener.local_addr().unwrap().port();
        let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let udp_port = udp.local_addr().unwrap().port();

        let console = tokio::spawn(Console::accept(listener, udp));

        let (client, recorded) = recording_client();
        let session = NanoSession::start_with_clock(
            client.clone(),
            SessionParams {
                address: "127.0.0.1".to_string(),
                session_id: "{FE3A0100-C2CC-4AFD-9161-0E9DAFF129FA}".to_string(),
                tcp_port,
                udp_port,
            },
            clock,
        )
        .await
        .unwrap();
        session.connect(CONNECT_TIMEOUT).await.unwrap();
        assert_eq!(session.connection_id(), CONSOLE_CONNECTION_ID);

        let console = timeout(TEST_TIMEOUT, console).await.unwrap().unwrap();
        (session, client, recorded, console)
    }

    fn video_format() -> VideoFormat {
        VideoFormat::new(30, 1280, 720, VideoCodec::H264)
    }

    fn video_fragment(frame_id: u32, packet_count: u32, offset: u32, data: &[u8]) -> Message {
        factory::streamer_udp(
            CONSOLE_CONNECTION_ID,
            1024,
            1,
            StreamerPayload::Video(VideoPayload::Data(VideoData {
                flags: 4,
                frame_id,
                timestamp: 0,
                total_size: 0,
                packet_count,
                offset,
                data: Bytes::copy_from_slice(data),
            })),
        )
    }

    #[tokio::test]
    async fn test_video_channel_flow() {
        let (session, _client, recorded, mut console) = start_session().await;

        console
            .open_channel(
                ChannelClass::Video,
                1024,
                Bytes::from_static(&[0x01, 0x00, 0x02, 0x00]),
            )
            .await;

        let formats = vec![video_format(), VideoFormat::new(30, 640, 360, VideoCodec::H264)];
        console
            .send(&[factory::streamer_tcp(
                1024,
                1,
                0,
                StreamerPayload::Video(VideoPayload::ServerHandshake(VideoServerHandshake {
                    protocol_version: 5,
                    width: 1280,
                    height: 720,
                    fps: 30,
                    reference_timestamp: 1495315092425,
                    formats: formats.clone(),
                })),
            )])
            .await;

        // client handshake first, stream start second
        let handshake = console.read().await;
        assert_eq!(streamer_header(&handshake.header), (1, 0));
        match handshake.payload {
            Payload::Streamer(StreamerPayload::Video(VideoPayload::ClientHandshake(payload))) => {
                assert!(payload.initial_frame_id <= 500);
                assert_eq!(payload.requested_format, formats[0]);
            }
            other => panic!("expected video client handshake, got {other:?}"),
        }

        let control = console.read().await;
        assert_eq!(streamer_header(&control.header), (2, 1));
        match control.payload {
            Payload::Streamer(StreamerPayload::Video(VideoPayload::Control(payload))) => {
                assert!(payload.flags.contains(VideoControlFlags::START_STREAM));
                assert!(payload.flags.contains(VideoControlFlags::REQUEST_KEYFRAME));
            }
            other => panic!("expected video control, got {other:?}"),
        }

        assert_eq!(recorded.video_formats(), vec![formats[0]]);

        // fragmented frame over UDP, out of order
        for (offset, data) in [(8u32, b"cc".as_slice()), (0, b"aa"), (4, b"bb")] {
            console.send_udp(&video_fragment(99, 3, offset, data)).await;
        }
        wait_until(|| !recorded.video_frames().is_empty()).await;
        assert_eq!(recorded.video_frames(), vec![Bytes::from_static(b"aabbcc")]);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_audio_channel_flow_and_close() {
        let (session, _client, recorded, mut console) = start_session().await;

        console
            .open_channel(ChannelClass::Audio, 1025, Bytes::new())
            .await;

        let format = AudioFormat::new(2, 48000, AudioCodec::Aac);
        console
            .send(&[factory::streamer_tcp(
                1025,
                1,
                0,
                StreamerPayload::Audio(AudioPayload::ServerHandshake(AudioServerHandshake {
                    protocol_version: 4,
                    reference_timestamp: 1495315092424,
                    formats: vec![format],
                })),
            )])
            .await;

        let handshake = console.read().await;
        match handshake.payload {
            Payload::Streamer(StreamerPayload::Audio(AudioPayload::ClientHandshake(payload))) => {
                assert!(payload.initial_frame_id <= 500);
                assert_eq!(payload.requested_format, format);
            }
            other => panic!("expected audio client handshake, got {other:?}"),
        }
        let control = console.read().await;
        match control.payload {
            Payload::Streamer(StreamerPayload::Audio(AudioPayload::Control(payload))) => {
                assert!(payload
                    .flags
                    .contains(nano_protocol::packet::audio::AudioControlFlags::START_STREAM));
            }
            other => panic!("expected audio control, got {other:?}"),
        }
        assert_eq!(recorded.audio_formats(), vec![format]);

        console
            .send_udp(&factory::streamer_udp(
                CONSOLE_CONNECTION_ID,
                1025,
                1,
                StreamerPayload::Audio(AudioPayload::Data(AudioData {
                    flags: 4,
                    frame_id: 0,
                    timestamp: 3365588462,
                    data: Bytes::from_static(b"aac-frame"),
                })),
            ))
            .await;
        wait_until(|| !recorded.audio_frames().is_empty()).await;
        assert_eq!(recorded.audio_frames(), vec![Bytes::from_static(b"aac-frame")]);

        let channel = session.channel_by_class(ChannelClass::Audio).await.unwrap();
        assert!(channel.is_open());
        console.send(&[factory::channel_close(0, 1025)]).await;
        wait_until(|| !channel.is_open()).await;

        session.stop().await;
    }

    #[tokio::test]
    async fn test_input_and_control_channels() {
        let (session, client, recorded, mut console) = start_session().await;

        console
            .open_channel(ChannelClass::Input, 1028, Bytes::new())
            .await;
        console
            .open_channel(ChannelClass::Control, 1027, Bytes::new())
            .await;

        console
            .send(&[factory::streamer_tcp(
                1028,
                1,
                0,
                StreamerPayload::Input(InputPayload::ServerHandshake(InputServerHandshake {
                    protocol_version: 3,
                    desktop_width: 1280,
                    desktop_height: 720,
                    max_touches: 0,
                    initial_frame_id: 500,
                })),
            )])
            .await;

        let handshake = console.read().await;
        assert_eq!(streamer_header(&handshake.header), (1, 0));
        match handshake.payload {
            Payload::Streamer(StreamerPayload::Input(InputPayload::ClientHandshake(payload))) => {
                assert_eq!(payload.max_touches, 10);
                assert!(payload.reference_timestamp > 0);
            }
            other => panic!("expected input client handshake, got {other:?}"),
        }

        // the handshake latched the reference timestamp, frames flow now
        let input_channel = session.channel_by_class(ChannelClass::Input).await.unwrap();
        assert!(input_channel.reference_timestamp().is_some());

        let frame = InputFrame {
            buttons: InputButtons {
                a: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        client.send_input(frame, SystemTime::now()).await.unwrap();

        let msg = console.read_udp().await;
        assert_eq!(msg.header.ssrc.channel_id, 1028);
        match msg.payload {
            Payload::Streamer(StreamerPayload::Input(InputPayload::Frame(frame))) => {
                assert_eq!(frame.frame_id, 501);
                assert_eq!(frame.buttons.a, 1);
                assert!(frame.created_ts <= frame.timestamp);
            }
            other => panic!("expected input frame, got {other:?}"),
        }

        client.controller_added(0).await.unwrap();
        let msg = console.read().await;
        assert_eq!(streamer_header(&msg.header), (1, 0));
        match msg.payload {
            Payload::Streamer(StreamerPayload::Control(packet)) => {
                assert_eq!(packet.prev_seq_dup, 0);
                assert_eq!(packet.unk1, 1);
                assert_eq!(packet.unk2, 1406);
                assert_eq!(
                    packet.op,
                    ControlOp::ControllerEvent {
                        event: ControllerEventType::Added,
                        controller_num: 0,
                    }
                );
            }
            other => panic!("expected controller event, got {other:?}"),
        }

        client
            .change_video_quality(VideoQuality::Low)
            .await
            .unwrap();
        let msg = console.read().await;
        assert_eq!(streamer_header(&msg.header), (2, 1));
        match msg.payload {
            Payload::Streamer(StreamerPayload::Control(packet)) => {
                assert_eq!(packet.prev_seq_dup, 1);
                assert_eq!(
                    packet.op,
                    ControlOp::ChangeVideoQuality {
                        values: [3000001, 1, 30000, 1001, 3600, 0],
                    }
                );
            }
            other => panic!("expected change video quality, got {other:?}"),
        }

        // commands queued on the input source go out via the pump loop
        recorded.queue_input(InputCommand::ControllerRemoved(2));
        let msg = console.read().await;
        match msg.payload {
            Payload::Streamer(StreamerPayload::Control(packet)) => {
                assert_eq!(
                    packet.op,
                    ControlOp::ControllerEvent {
                        event: ControllerEventType::Removed,
                        controller_num: 2,
                    }
                );
            }
            other => panic!("expected controller event, got {other:?}"),
        }

        session.stop().await;
    }

    #[tokio::test]
    async fn test_input_frame_timestamps_in_ten_microsecond_ticks() {
        let clock = Arc::new(crate::time::mock::MockClock::new(1_498_690_645_999));
        let (session, client, _recorded, mut console) = start_session_with(clock.clone()).await;

        console
            .open_channel(ChannelClass::Input, 1028, Bytes::new())
            .await;
        console
            .send(&[factory::streamer_tcp(
                1028,
                1,
                0,
                StreamerPayload::Input(InputPayload::ServerHandshake(InputServerHandshake {
                    protocol_version: 3,
                    desktop_width: 1280,
                    desktop_height: 720,
                    max_touches: 0,
                    initial_frame_id: 672208545,
                })),
            )])
            .await;

        let handshake = console.read().await;
        match handshake.payload {
            Payload::Streamer(StreamerPayload::Input(InputPayload::ClientHandshake(payload))) => {
                assert_eq!(payload.reference_timestamp, 1_498_690_645_999);
            }
            other => panic!("expected input client handshake, got {other:?}"),
        }

        // 583.706515 seconds after the reference timestamp was latched
        clock.advance(Duration::from_micros(583_706_515));
        let frame = InputFrame {
            buttons: InputButtons {
                dpad_right: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        client.send_input(frame, clock.wall()).await.unwrap();

        let msg = console.read_udp().await;
        match msg.payload {
            Payload::Streamer(StreamerPayload::Input(InputPayload::Frame(frame))) => {
                assert_eq!(frame.frame_id, 672208546);
                assert_eq!(frame.timestamp, 58_370_651);
                assert_eq!(frame.created_ts, 58_370_651);
                assert_eq!(frame.buttons.dpad_right, 1);
            }
            other => panic!("expected input frame, got {other:?}"),
        }

        session.stop().await;
    }

    #[tokio::test]
    async fn test_inverted_channels_speak_first_on_open() {
        let (session, client, _recorded, mut console) = start_session().await;

        console
            .open_channel(ChannelClass::InputFeedback, 1029, Bytes::new())
            .await;
        let msg = console.read().await;
        assert_eq!(msg.header.ssrc.channel_id, 1029);
        assert_eq!(streamer_header(&msg.header), (1, 0));
        match msg.payload {
            Payload::Streamer(StreamerPayload::Input(InputPayload::ServerHandshake(payload))) => {
                assert_eq!(payload.protocol_version, 3);
                assert_eq!(payload.desktop_width, 1280);
                assert_eq!(payload.desktop_height, 720);
                assert_eq!(payload.max_touches, 0);
                assert!(payload.initial_frame_id <= 500);
            }
            other => panic!("expected input-feedback handshake, got {other:?}"),
        }

        console
            .open_channel(ChannelClass::ChatAudio, 1026, Bytes::new())
            .await;
        let msg = console.read().await;
        assert_eq!(msg.header.ssrc.channel_id, 1026);
        match msg.payload {
            Payload::Streamer(StreamerPayload::Audio(AudioPayload::ServerHandshake(payload))) => {
                assert_eq!(payload.protocol_version, 4);
                assert!(payload.reference_timestamp > 0);
                assert_eq!(
                    payload.formats,
                    vec![AudioFormat::new(1, 24000, AudioCodec::Opus)]
                );
            }
            other => panic!("expected chat-audio handshake, got {other:?}"),
        }

        client
            .send_chat_audio(Bytes::from_static(b"opus-frame"))
            .await
            .unwrap();
        let msg = console.read_udp().await;
        assert_eq!(msg.header.ssrc.channel_id, 1026);
        match msg.payload {
            Payload::Streamer(StreamerPayload::Audio(AudioPayload::Data(data))) => {
                assert_eq!(data.flags, 4);
                assert_eq!(data.frame_id, 0);
                assert_eq!(data.data, Bytes::from_static(b"opus-frame"));
            }
            other => panic!("expected chat-audio data, got {other:?}"),
        }

        session.stop().await;
    }

    #[tokio::test]
    async fn test_connect_times_out_without_console_ack() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let tcp_port = listener.local_addr().unwrap().port();
        let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let udp_port = udp.local_addr().unwrap().port();

        // accept the connection, then stay silent
        let silent = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(stream);
            drop(udp);
        });

        let (client, _recorded) = recording_client();
        let session = NanoSession::start(
            client,
            SessionParams {
                address: "127.0.0.1".to_string(),
                session_id: "{FE3A0100-C2CC-4AFD-9161-0E9DAFF129FA}".to_string(),
                tcp_port,
                udp_port,
            },
        )
        .await
        .unwrap();

        match session.connect(Duration::from_millis(200)).await {
            Err(SessionError::HandshakeTimeout) => {}
            other => panic!("unexpected result: {other:?}"),
        }

        session.stop().await;
        silent.abort();
    }

    #[tokio::test]
    async fn test_unsupported_channel_create_is_ignored() {
        let (session, _client, _recorded, mut console) = start_session().await;

        // TcpBase has no client state machine; the session must survive
        console
            .send(&[factory::channel_create(ChannelClass::TcpBase, 0, 1030)])
            .await;
        console
            .open_channel(ChannelClass::Video, 1024, Bytes::new())
            .await;
        assert!(session.channel_by_class(ChannelClass::Video).await.is_some());
        assert!(session.channel_by_class(ChannelClass::TcpBase).await.is_none());

        session.stop().await;
    }
}
