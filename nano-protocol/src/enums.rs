use num_derive::FromPrimitive;

/// Payload type carried in the RTP header flags. Values are private to the
/// NANO protocol, not IANA-registered RTP types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum RtpPayloadType {
    Streamer = 0x23,
    Control = 0x60,
    ChannelControl = 0x61,
    UdpHandshake = 0x64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum ChannelControlType {
    ClientHandshake = 0x0,
    ServerHandshake = 0x1,
    ChannelCreate = 0x2,
    ChannelOpen = 0x3,
    ChannelClose = 0x4,
}

/// Logical channel classes the console can create. The wire carries the
/// canonical RDP class strings; `TcpBase` is recognized but has no client
/// state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelClass {
    Video,
    Audio,
    ChatAudio,
    Control,
    Input,
    InputFeedback,
    TcpBase,
}

impl ChannelClass {
    pub fn name(self) -> &'static str {
        match self {
            Self::Video => "Microsoft::Rdp::Dct::Channel::Class::Video",
            Self::Audio => "Microsoft::Rdp::Dct::Channel::Class::Audio",
            Self::ChatAudio => "Microsoft::Rdp::Dct::Channel::Class::ChatAudio",
            Self::Control => "Microsoft::Rdp::Dct::Channel::Class::Control",
            Self::Input => "Microsoft::Rdp::Dct::Channel::Class::Input",
            Self::InputFeedback => "Microsoft::Rdp::Dct::Channel::Class::Input Feedback",
            Self::TcpBase => "Microsoft::Rdp::Dct::Channel::Class::TcpBase",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Microsoft::Rdp::Dct::Channel::Class::Video" => Some(Self::Video),
            "Microsoft::Rdp::Dct::Channel::Class::Audio" => Some(Self::Audio),
            "Microsoft::Rdp::Dct::Channel::Class::ChatAudio" => Some(Self::ChatAudio),
            "Microsoft::Rdp::Dct::Channel::Class::Control" => Some(Self::Control),
            "Microsoft::Rdp::Dct::Channel::Class::Input" => Some(Self::Input),
            "Microsoft::Rdp::Dct::Channel::Class::Input Feedback" => Some(Self::InputFeedback),
            "Microsoft::Rdp::Dct::Channel::Class::TcpBase" => Some(Self::TcpBase),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum VideoPayloadType {
    ServerHandshake = 0x1,
    ClientHandshake = 0x2,
    Control = 0x3,
    Data = 0x4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum AudioPayloadType {
    ServerHandshake = 0x1,
    ClientHandshake = 0x2,
    Control = 0x3,
    Data = 0x4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum InputPayloadType {
    ServerHandshake = 0x1,
    ClientHandshake = 0x2,
    FrameAck = 0x3,
    Frame = 0x4,
}

/// Opcode inside the control channel's packet envelope. The outer streamer
/// type on that channel is always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum ControlOpcode {
    SessionInit = 0x1,
    SessionCreate = 0x2,
    SessionCreateResponse = 0x3,
    SessionDestroy = 0x4,
    VideoStatistics = 0x5,
    RealtimeTelemetry = 0x6,
    ChangeVideoQuality = 0x7,
    InitiateNetworkTest = 0x8,
    NetworkInformation = 0x9,
    NetworkTestResponse = 0xA,
    ControllerEvent = 0xB,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum ControllerEventType {
    Removed = 0x0,
    Added = 0x1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum VideoCodec {
    H264 = 0x0,
    // IYUV or NV12, discriminated elsewhere
    Yuv = 0x1,
    Rgb = 0x2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum AudioCodec {
    Opus = 0x0,
    Aac = 0x1,
    Pcm = 0x2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum AudioSampleType {
    Integer = 0x0,
    Float = 0x1,
}

/// Preset argument vectors for the control channel's ChangeVideoQuality
/// message, as captured from the official client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoQuality {
    VeryHigh,
    High,
    Middle,
    Low,
}

impl VideoQuality {
    pub fn params(self) -> [u32; 6] {
        match self {
            Self::VeryHigh => [12_000_000, 3, 60_000, 1001, 59, 0],
            Self::High => [8_000_000, 2, 60_000, 1001, 59, 0],
            Self::Middle => [6_000_002, 2, 60_000, 1001, 3600, 0],
            Self::Low => [3_000_001, 1, 30_000, 1001, 3600, 0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num::FromPrimitive;

    #[test]
    fn test_payload_type_values() {
        assert_eq!(RtpPayloadType::from_u8(0x23), Some(RtpPayloadType::Streamer));
        assert_eq!(RtpPayloadType::from_u8(0x60), Some(RtpPayloadType::Control));
        assert_eq!(
            RtpPayloadType::from_u8(0x61),
            Some(RtpPayloadType::ChannelControl)
        );
        assert_eq!(
            RtpPayloadType::from_u8(0x64),
            Some(RtpPayloadType::UdpHandshake)
        );
        assert_eq!(RtpPayloadType::from_u8(0x22), None);
    }

    #[test]
    fn test_channel_class_names_round_trip() {
        for class in [
            ChannelClass::Video,
            ChannelClass::Audio,
            ChannelClass::ChatAudio,
            ChannelClass::Control,
            ChannelClass::Input,
            ChannelClass::InputFeedback,
            ChannelClass::TcpBase,
        ] {
            assert_eq!(ChannelClass::from_name(class.name()), Some(class));
        }
        assert_eq!(
            ChannelClass::from_name("Microsoft::Rdp::Dct::Channel::Class::Haptics"),
            None
        );
    }

    #[test]
    fn test_quality_presets() {
        assert_eq!(VideoQuality::Low.params(), [3_000_001, 1, 30_000, 1001, 3600, 0]);
        assert_eq!(VideoQuality::VeryHigh.params()[0], 12_000_000);
    }
}
