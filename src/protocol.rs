//! Shared types exchanged with the voice transport and the primary session

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a remote voice stream: (participant id, stream id)
///
/// A key may be reused by a later stream after removal; remove/announce
/// ordering from the transport distinguishes the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamKey {
    pub participant: i32,
    pub stream: u8,
}

impl StreamKey {
    pub fn new(participant: i32, stream: u8) -> Self {
        Self { participant, stream }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player {} voice #{}", self.participant, self.stream)
    }
}

/// Reference id of a local playback endpoint, embedded by the remote
/// sender as user data on the stream announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointRef(pub i32);

impl fmt::Display for EndpointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint {}", self.0)
    }
}

/// Remote stream parameters carried by an announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub sampling_rate: u32,
    pub channels: u16,
    /// Encoder delay in samples
    pub encoder_delay: u32,
    pub endpoint_ref: EndpointRef,
}

impl StreamInfo {
    pub fn new(sampling_rate: u32, channels: u16, encoder_delay: u32, endpoint_ref: EndpointRef) -> Self {
        Self {
            sampling_rate,
            channels,
            encoder_delay,
            endpoint_ref,
        }
    }
}

/// Entry of the transport's registry of currently announced remote streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnouncedStream {
    pub key: StreamKey,
    pub info: StreamInfo,
}

/// Voice session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VoiceSessionState {
    #[default]
    Uninitialized,
    Disconnected,
    ConnectingToMaster,
    JoinedLobby,
    JoiningVoiceRoom,
    Joined,
    Leaving,
}

impl VoiceSessionState {
    /// Whether a new connection may be dispatched from this state
    pub fn is_idle(self) -> bool {
        matches!(self, VoiceSessionState::Uninitialized | VoiceSessionState::Disconnected)
    }
}

/// Connectivity of the primary session, as reported by its client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PrimarySessionState {
    #[default]
    PeerCreated,
    Disconnected,
    Joined,
    Busy,
}

/// How the primary session is hosted; decides where the voice session connects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostingMode {
    SelfHosted { master_address: String },
    Managed { region: String },
}

impl Default for HostingMode {
    fn default() -> Self {
        HostingMode::Managed {
            region: "eu".to_string(),
        }
    }
}

/// Options passed when joining or creating a voice room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomOptions {
    /// Whether the room is advertised in room listings
    pub visible: bool,
}

impl RoomOptions {
    pub fn hidden() -> Self {
        Self { visible: false }
    }
}

/// Operation codes reported back by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationCode {
    Authenticate,
    JoinLobby,
    JoinGame,
    Leave,
}

/// Result of an operation dispatched to the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationResponse {
    pub code: OperationCode,
    pub success: bool,
}

/// Handle of a local outgoing voice created through the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalVoiceId(pub u8);

/// Events raised by the voice transport during a service tick
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    StateChanged(VoiceSessionState),
    StreamAnnounced { key: StreamKey, info: StreamInfo },
    StreamRemoved(StreamKey),
    AudioFrame { key: StreamKey, samples: Vec<f32> },
    OperationResponse(OperationResponse),
}

/// Audio device description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDeviceInfo {
    pub id: String,
    pub name: String,
    pub is_input: bool,
    pub is_default: bool,
}

impl AudioDeviceInfo {
    pub fn input(name: impl Into<String>, is_default: bool) -> Self {
        let name = name.into();
        Self {
            id: format!("input:{}", name),
            name,
            is_input: true,
            is_default,
        }
    }
}
