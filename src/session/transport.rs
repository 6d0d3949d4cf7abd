//! Collaborator interfaces consumed by the session coordinator
//!
//! The voice transport and the primary session are external components; the
//! core only talks to them through these traits.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::protocol::{
    AnnouncedStream, HostingMode, LocalVoiceId, PrimarySessionState, RoomOptions, StreamInfo,
    TransportEvent,
};

/// Where the voice transport should connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    /// Self-hosted master server address
    Master(String),
    /// Managed cloud region
    Region(String),
}

impl From<&HostingMode> for ConnectTarget {
    fn from(mode: &HostingMode) -> Self {
        match mode {
            HostingMode::SelfHosted { master_address } => ConnectTarget::Master(master_address.clone()),
            HostingMode::Managed { region } => ConnectTarget::Region(region.clone()),
        }
    }
}

/// Connection request handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub app_id: String,
    pub app_version: String,
    pub target: ConnectTarget,
}

/// Voice transport client
///
/// Operations only dispatch requests; results come back as
/// [`TransportEvent`]s from [`VoiceTransport::service`].
pub trait VoiceTransport {
    /// Returns whether the request could be sent
    fn connect(&mut self, request: &ConnectRequest) -> bool;

    fn disconnect(&mut self);

    fn join_or_create_room(&mut self, name: &str, options: RoomOptions) -> bool;

    fn leave_room(&mut self) -> bool;

    /// Remote streams the transport currently knows about
    fn announced_streams(&self) -> Vec<AnnouncedStream>;

    fn create_local_voice(&mut self, info: StreamInfo) -> Option<LocalVoiceId>;

    fn remove_local_voice(&mut self, id: LocalVoiceId);

    /// Run one service tick and collect the events it raised
    fn service(&mut self) -> Vec<TransportEvent>;
}

/// Read-only view of the primary session
pub trait PrimarySession {
    fn state(&self) -> PrimarySessionState;

    fn room_name(&self) -> Option<String>;

    fn hosting(&self) -> HostingMode;

    /// Name of the active room, if the primary session is in one
    fn active_room(&self) -> Option<String> {
        match self.state() {
            PrimarySessionState::Joined => self.room_name(),
            _ => None,
        }
    }
}

/// Snapshot of the primary session published by its owner
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimarySnapshot {
    pub state: PrimarySessionState,
    pub room_name: Option<String>,
    pub hosting: HostingMode,
}

/// Primary session view shared between its owner and the coordinator
#[derive(Debug, Clone, Default)]
pub struct SharedPrimarySession {
    inner: Arc<RwLock<PrimarySnapshot>>,
}

impl SharedPrimarySession {
    pub fn new(hosting: HostingMode) -> Self {
        Self {
            inner: Arc::new(RwLock::new(PrimarySnapshot {
                hosting,
                ..Default::default()
            })),
        }
    }

    pub fn set_joined(&self, room_name: impl Into<String>) {
        let mut snapshot = self.inner.write();
        snapshot.state = PrimarySessionState::Joined;
        snapshot.room_name = Some(room_name.into());
    }

    pub fn set_left(&self) {
        let mut snapshot = self.inner.write();
        snapshot.state = PrimarySessionState::PeerCreated;
        snapshot.room_name = None;
    }

    pub fn set_disconnected(&self) {
        let mut snapshot = self.inner.write();
        snapshot.state = PrimarySessionState::Disconnected;
        snapshot.room_name = None;
    }

    pub fn set_busy(&self) {
        self.inner.write().state = PrimarySessionState::Busy;
    }

    pub fn set_hosting(&self, hosting: HostingMode) {
        self.inner.write().hosting = hosting;
    }
}

impl PrimarySession for SharedPrimarySession {
    fn state(&self) -> PrimarySessionState {
        self.inner.read().state
    }

    fn room_name(&self) -> Option<String> {
        self.inner.read().room_name.clone()
    }

    fn hosting(&self) -> HostingMode {
        self.inner.read().hosting.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_room_requires_joined() {
        let primary = SharedPrimarySession::new(HostingMode::default());
        assert_eq!(primary.active_room(), None);

        primary.set_joined("Arena1");
        assert_eq!(primary.active_room().as_deref(), Some("Arena1"));

        primary.set_busy();
        assert_eq!(primary.active_room(), None);
        assert_eq!(primary.room_name().as_deref(), Some("Arena1"));

        primary.set_left();
        assert_eq!(primary.room_name(), None);
    }

    #[test]
    fn test_connect_target_from_hosting() {
        let self_hosted = HostingMode::SelfHosted {
            master_address: "10.0.0.5:5055".to_string(),
        };
        assert_eq!(
            ConnectTarget::from(&self_hosted),
            ConnectTarget::Master("10.0.0.5:5055".to_string())
        );
        assert_eq!(
            ConnectTarget::from(&HostingMode::Managed { region: "us".to_string() }),
            ConnectTarget::Region("us".to_string())
        );
    }
}
