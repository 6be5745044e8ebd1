//! SmartGlass broadcast-channel JSON messages.
//!
//! The console negotiates a gamestream over its companion SmartGlass
//! connection with a handful of JSON messages tagged by an integer `type`.
//! The session core never talks that channel itself; these value types let
//! the bootstrap collaborator hand over a typed
//! (`session id`, `tcp port`, `udp port`) tuple and the stream
//! configuration table.

use num::FromPrimitive as _;
use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast message with unknown type {0}")]
    UnknownType(i64),
    #[error("broadcast message with unknown state {0}")]
    UnknownState(i64),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum BroadcastMessageType {
    Unknown = 0x0,
    StartGameStream = 0x1,
    StopGameStream = 0x2,
    GameStreamState = 0x3,
    GameStreamEnabled = 0x4,
    GameStreamError = 0x5,
    Telemetry = 0x6,
    PreviewStatus = 0x7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum GameStreamState {
    Unknown = 0x0,
    Initializing = 0x1,
    Started = 0x2,
    Stopped = 0x3,
    Paused = 0x4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum GameStreamErrorCode {
    Unknown = 0x0,
    General = 0x1,
    FailedToInstantiate = 0x2,
    FailedToInitialize = 0x3,
    FailedToStart = 0x4,
    FailedToStop = 0x5,
    NoController = 0x6,
    DifferentMsaActive = 0x7,
    DrmVideo = 0x8,
    HdcpVideo = 0x9,
    KinectTitle = 0xA,
    ProhibitedGame = 0xB,
    PoorNetworkConnection = 0xC,
    StreamingDisabled = 0xD,
    CannotReachConsole = 0xE,
    GenericError = 0xF,
    VersionMismatch = 0x10,
    NoProfile = 0x11,
    BroadcastInProgress = 0x12,
}

/// Stream configuration table sent with StartGameStream. The console
/// expects every value as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamestreamConfiguration {
    pub audio_fec_type: String,
    pub audio_sync_policy: String,
    pub audio_sync_max_latency: String,
    pub audio_sync_desired_latency: String,
    pub audio_sync_min_latency: String,
    pub audio_sync_compress_latency: String,
    pub audio_sync_compress_factor: String,
    pub audio_sync_lengthen_factor: String,
    pub audio_buffer_length_hns: String,
    pub enable_opus_chat_audio: String,
    pub enable_dynamic_bitrate: String,
    pub enable_audio_chat: String,
    pub enable_video_frame_acks: String,
    pub enable_opus_audio: String,
    pub dynamic_bitrate_update_ms: String,
    pub dynamic_bitrate_scale_factor: String,
    pub input_reads_per_second: String,
    pub video_fec_type: String,
    pub video_fec_level: String,
    pub video_maximum_width: String,
    pub video_maximum_height: String,
    pub video_maximum_frame_rate: String,
    pub video_packet_utilization: String,
    pub video_packet_defrag_timeout_ms: String,
    #[serde(rename = "sendKeyframesOverTCP")]
    pub send_keyframes_over_tcp: String,
    pub udp_sub_burst_groups: String,
    pub udp_burst_duration_ms: String,
    pub udp_max_send_packets_in_winsock: String,
    pub urcp_type: String,
    pub urcp_fixed_rate: String,
    pub urcp_maximum_rate: String,
    pub urcp_minimum_rate: String,
    pub urcp_maximum_window: String,
    pub urcp_keep_alive_timeout_ms: String,
}

impl Default for GamestreamConfiguration {
    fn default() -> Self {
        let s = |value: &str| value.to_string();
        Self {
            audio_fec_type: s("0"),
            audio_sync_policy: s("1"),
            audio_sync_max_latency: s("170"),
            audio_sync_desired_latency: s("40"),
            audio_sync_min_latency: s("10"),
            audio_sync_compress_latency: s("100"),
            audio_sync_compress_factor: s("0.99"),
            audio_sync_lengthen_factor: s("1.01"),
            audio_buffer_length_hns: s("10000000"),
            enable_opus_chat_audio: s("true"),
            enable_dynamic_bitrate: s("false"),
            enable_audio_chat: s("true"),
            enable_video_frame_acks: s("false"),
            enable_opus_audio: s("false"),
            dynamic_bitrate_update_ms: s("5000"),
            dynamic_bitrate_scale_factor: s("1"),
            input_reads_per_second: s("120"),
            video_fec_type: s("0"),
            video_fec_level: s("3"),
            video_maximum_width: s("1280"),
            video_maximum_height: s("720"),
            video_maximum_frame_rate: s("60"),
            video_packet_utilization: s("0"),
            video_packet_defrag_timeout_ms: s("16"),
            send_keyframes_over_tcp: s("false"),
            udp_sub_burst_groups: s("5"),
            udp_burst_duration_ms: s("11"),
            udp_max_send_packets_in_winsock: s("250"),
            urcp_type: s("0"),
            urcp_fixed_rate: s("-1"),
            urcp_maximum_rate: s("10000000"),
            urcp_minimum_rate: s("256000"),
            urcp_maximum_window: s("1310720"),
            urcp_keep_alive_timeout_ms: s("0"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameStream {
    #[serde(rename = "type")]
    pub message_type: u32,
    pub re_query_preview_status: bool,
    pub configuration: GamestreamConfiguration,
}

impl StartGameStream {
    pub fn new(configuration: GamestreamConfiguration) -> Self {
        Self {
            message_type: BroadcastMessageType::StartGameStream as u32,
            re_query_preview_status: true,
            configuration,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopGameStream {
    #[serde(rename = "type")]
    pub message_type: u32,
}

impl StopGameStream {
    pub fn new() -> Self {
        Self {
            message_type: BroadcastMessageType::StopGameStream as u32,
        }
    }
}

impl Default for StopGameStream {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStreamEnabled {
    #[serde(rename = "type")]
    pub message_type: u32,
    pub enabled: bool,
    pub can_be_enabled: bool,
    pub major_protocol_version: u32,
    pub minor_protocol_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStreamError {
    #[serde(rename = "type")]
    pub message_type: u32,
    pub error_type: u32,
    pub error_value: u32,
}

impl GameStreamError {
    pub fn code(&self) -> Option<GameStreamErrorCode> {
        GameStreamErrorCode::from_u32(self.error_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewStatus {
    #[serde(rename = "type")]
    pub message_type: u32,
    pub is_public_preview: bool,
    pub is_internal_preview: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStreamStateBase {
    #[serde(rename = "type")]
    pub message_type: u32,
    pub state: u32,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStreamStateInitializing {
    #[serde(rename = "type")]
    pub message_type: u32,
    pub state: u32,
    pub session_id: String,
    pub tcp_port: u16,
    pub udp_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStreamStateStarted {
    #[serde(rename = "type")]
    pub message_type: u32,
    pub state: u32,
    pub session_id: String,
    pub is_wireless_connection: bool,
    pub wireless_channel: u32,
    pub transmit_link_speed: u32,
}

#[derive(Debug, Clone)]
pub enum GameStreamStateMessage {
    Unknown(GameStreamStateBase),
    Initializing(GameStreamStateInitializing),
    Started(GameStreamStateStarted),
    Stopped(GameStreamStateBase),
    Paused(GameStreamStateBase),
}

impl GameStreamStateMessage {
    pub fn state(&self) -> GameStreamState {
        match self {
            Self::Unknown(_) => GameStreamState::Unknown,
            Self::Initializing(_) => GameStreamState::Initializing,
            Self::Started(_) => GameStreamState::Started,
            Self::Stopped(_) => GameStreamState::Stopped,
            Self::Paused(_) => GameStreamState::Paused,
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            Self::Unknown(msg) | Self::Stopped(msg) | Self::Paused(msg) => &msg.session_id,
            Self::Initializing(msg) => &msg.session_id,
            Self::Started(msg) => &msg.session_id,
        }
    }
}

#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    StartGameStream(StartGameStream),
    StopGameStream(StopGameStream),
    GameStreamState(GameStreamStateMessage),
    GameStreamEnabled(GameStreamEnabled),
    GameStreamError(GameStreamError),
    Telemetry(Value),
    PreviewStatus(PreviewStatus),
}

/// Classify and parse a broadcast message by its integer `type` (and
/// `state` for GameStreamState messages).
pub fn parse(data: &Value) -> Result<BroadcastMessage, BroadcastError> {
    let raw_type = data.get("type").and_then(Value::as_i64).unwrap_or(-1);
    let message_type =
        BroadcastMessageType::from_i64(raw_type).ok_or(BroadcastError::UnknownType(raw_type))?;

    match message_type {
        BroadcastMessageType::Unknown => Err(BroadcastError::UnknownType(raw_type)),
        BroadcastMessageType::StartGameStream => Ok(BroadcastMessage::StartGameStream(
            serde_json::from_value(data.clone())?,
        )),
        BroadcastMessageType::StopGameStream => Ok(BroadcastMessage::StopGameStream(
            serde_json::from_value(data.clone())?,
        )),
        BroadcastMessageType::GameStreamState => {
            let raw_state = data.get("state").and_then(Value::as_i64).unwrap_or(-1);
            let state = GameStreamState::from_i64(raw_state)
                .ok_or(BroadcastError::UnknownState(raw_state))?;
            let message = match state {
                GameStreamState::Unknown => {
                    GameStreamStateMessage::Unknown(serde_json::from_value(data.clone())?)
                }
                GameStreamState::Initializing => {
                    GameStreamStateMessage::Initializing(serde_json::from_value(data.clone())?)
                }
                GameStreamState::Started => {
                    GameStreamStateMessage::Started(serde_json::from_value(data.clone())?)
                }
                GameStreamState::Stopped => {
                    GameStreamStateMessage::Stopped(serde_json::from_value(data.clone())?)
                }
                GameStreamState::Paused => {
                    GameStreamStateMessage::Paused(serde_json::from_value(data.clone())?)
                }
            };
            Ok(BroadcastMessage::GameStreamState(message))
        }
        BroadcastMessageType::GameStreamEnabled => Ok(BroadcastMessage::GameStreamEnabled(
            serde_json::from_value(data.clone())?,
        )),
        BroadcastMessageType::GameStreamError => Ok(BroadcastMessage::GameStreamError(
            serde_json::from_value(data.clone())?,
        )),
        BroadcastMessageType::Telemetry => Ok(BroadcastMessage::Telemetry(data.clone())),
        BroadcastMessageType::PreviewStatus => Ok(BroadcastMessage::PreviewStatus(
            serde_json::from_value(data.clone())?,
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_initializing_state() {
        let data = json!({
            "type": 3,
            "state": 1,
            "sessionId": "{12345678-9abc-def0-1234-56789abcdef0}",
            "tcpPort": 9999,
            "udpPort": 9998,
        });
        match parse(&data).unwrap() {
            BroadcastMessage::GameStreamState(GameStreamStateMessage::Initializing(msg)) => {
                assert_eq!(msg.session_id, "{12345678-9abc-def0-1234-56789abcdef0}");
                assert_eq!(msg.tcp_port, 9999);
                assert_eq!(msg.udp_port, 9998);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_parse_enabled() {
        let data = json!({
            "type": 4,
            "enabled": true,
            "canBeEnabled": true,
            "majorProtocolVersion": 6,
            "minorProtocolVersion": 0,
        });
        match parse(&data).unwrap() {
            BroadcastMessage::GameStreamEnabled(msg) => {
                assert!(msg.enabled);
                assert_eq!(msg.major_protocol_version, 6);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_code() {
        let data = json!({ "type": 5, "errorType": 6, "errorValue": 0 });
        match parse(&data).unwrap() {
            BroadcastMessage::GameStreamError(msg) => {
                assert_eq!(msg.code(), Some(GameStreamErrorCode::NoController));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let data = json!({ "type": 42 });
        assert!(matches!(
            parse(&data),
            Err(BroadcastError::UnknownType(42))
        ));
    }

    #[test]
    fn test_start_stream_serializes_config() {
        let msg = StartGameStream::new(GamestreamConfiguration::default());
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], 1);
        assert_eq!(value["reQueryPreviewStatus"], true);
        assert_eq!(value["configuration"]["audioSyncPolicy"], "1");
        assert_eq!(value["configuration"]["sendKeyframesOverTCP"], "false");
        assert_eq!(value["configuration"]["urcpMaximumWindow"], "1310720");
    }
}
