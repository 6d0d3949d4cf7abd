//! Voice session coordinator
//!
//! Keeps the voice session in the voice room that belongs to the primary
//! session's current room:
//!
//! ```text
//! Uninitialized/Disconnected ──connect()──► ConnectingToMaster ──► JoinedLobby
//!                                                                      │
//!                      primary in room R: join hidden "R_voice_" ◄─────┤
//!                      primary not in room: disconnect ◄───────────────┘
//! JoiningVoiceRoom ──► Joined
//! any ──transport Disconnected──► Disconnected (+ queued reconnect)
//! ```
//!
//! A failed room join is reported by the transport as a plain disconnect and
//! is handled as one.

use crate::config::VoiceSettings;
use crate::constants::VOICE_ROOM_SUFFIX;
use crate::error::SessionError;
use crate::protocol::{RoomOptions, VoiceSessionState};
use crate::session::transport::{ConnectRequest, ConnectTarget, PrimarySession, VoiceTransport};

/// Name of the voice room that mirrors a primary room
pub fn voice_room_name(primary_room: &str) -> String {
    format!("{}{}", primary_room, VOICE_ROOM_SUFFIX)
}

/// What a voice state change means for the rest of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    /// A voice room was joined; endpoints should be re-discovered
    RoomJoined,
    /// The voice session is gone along with every remote stream
    SessionLost,
}

/// Drives the voice session from primary session events
pub struct SessionCoordinator<T, P> {
    transport: T,
    primary: P,
    settings: VoiceSettings,
    state: VoiceSessionState,
    /// Set while a reconnect waits for the disconnect it triggered
    reconnect: bool,
    /// Set from a dispatched disconnect until the transport reports it done
    disconnecting: bool,
    shut_down: bool,
    /// Voice room being joined or joined
    voice_room: Option<String>,
}

impl<T: VoiceTransport, P: PrimarySession> SessionCoordinator<T, P> {
    pub fn new(transport: T, primary: P, settings: VoiceSettings) -> Self {
        Self {
            transport,
            primary,
            settings,
            state: VoiceSessionState::Uninitialized,
            reconnect: false,
            disconnecting: false,
            shut_down: false,
            voice_room: None,
        }
    }

    /// Request a connection to the server the primary session uses.
    ///
    /// Returns whether the request was dispatched, not whether it succeeded.
    pub fn connect(&mut self) -> bool {
        match self.try_connect() {
            Ok(()) => true,
            Err(SessionError::ConnectPending) => {
                tracing::debug!("Connect ignored, attempt already pending");
                false
            }
            Err(e) => {
                tracing::warn!("Connect not sent: {}", e);
                false
            }
        }
    }

    fn try_connect(&mut self) -> Result<(), SessionError> {
        if self.shut_down {
            return Err(SessionError::ShutDown);
        }
        if self.state == VoiceSessionState::ConnectingToMaster {
            return Err(SessionError::ConnectPending);
        }
        if !self.state.is_idle() {
            return Err(SessionError::NotDisconnected(self.state));
        }

        let target = ConnectTarget::from(&self.primary.hosting());
        match &target {
            ConnectTarget::Master(address) => tracing::info!("Connecting to master {}", address),
            ConnectTarget::Region(region) => tracing::info!("Connecting to region {}", region),
        }

        let request = ConnectRequest {
            app_id: self.settings.app_id.clone(),
            app_version: self.settings.app_version.clone(),
            target,
        };
        if !self.transport.connect(&request) {
            return Err(SessionError::Rejected("connect"));
        }

        self.set_state(VoiceSessionState::ConnectingToMaster);
        Ok(())
    }

    /// Tear the voice session down. Idempotent, and honoured after shutdown.
    pub fn disconnect(&mut self) {
        if self.state.is_idle() || self.disconnecting {
            tracing::debug!("Disconnect ignored in state {:?}", self.state);
            return;
        }
        self.transport.disconnect();
        self.disconnecting = true;
        self.set_state(VoiceSessionState::Leaving);
    }

    /// Connect now if idle, otherwise disconnect and connect once the
    /// disconnect completes. Repeated requests while one is pending coalesce.
    pub fn request_reconnect(&mut self) {
        if self.shut_down {
            tracing::warn!("Reconnect ignored, voice session is shut down");
            return;
        }
        if self.state.is_idle() {
            self.connect();
            return;
        }
        if self.reconnect {
            tracing::debug!("Reconnect already pending");
            return;
        }

        tracing::info!("Reconnecting voice session");
        self.reconnect = true;
        self.disconnect();
    }

    /// The primary session finished joining a room
    pub fn on_primary_session_joined_room(&mut self) {
        if self.shut_down {
            tracing::warn!("Primary room join ignored, voice session is shut down");
            return;
        }
        if !self.settings.auto_connect {
            return;
        }

        if self.state == VoiceSessionState::Joined {
            // Back to the lobby; the lobby handler joins the new voice room
            tracing::info!("Primary room changed, leaving voice room");
            if !self.transport.leave_room() {
                tracing::warn!("Leave voice room not sent, reconnecting instead");
                self.request_reconnect();
            }
        } else {
            self.request_reconnect();
        }
    }

    pub fn on_primary_session_left_room(&mut self) {
        if self.settings.auto_disconnect {
            self.disconnect();
        }
    }

    pub fn on_primary_session_disconnected(&mut self) {
        if self.settings.auto_disconnect {
            self.disconnect();
        }
    }

    /// Handle a state change reported by the voice transport
    pub fn on_voice_session_state_changed(&mut self, new_state: VoiceSessionState) -> Transition {
        if new_state == self.state {
            return Transition::None;
        }
        // Events queued before the disconnect was dispatched are stale
        if self.disconnecting && new_state != VoiceSessionState::Disconnected {
            tracing::debug!("Ignoring {:?} while disconnecting", new_state);
            return Transition::None;
        }
        let old_state = self.state;
        self.set_state(new_state);

        match new_state {
            VoiceSessionState::JoinedLobby => {
                if self.shut_down {
                    self.disconnect();
                    return Transition::None;
                }
                match self.join_voice_room() {
                    Ok(()) => {}
                    Err(SessionError::NoPrimaryRoom) => {
                        tracing::warn!("Primary session is not in a room, disconnecting voice client");
                        self.disconnect();
                    }
                    Err(e) => {
                        tracing::error!("Voice room join failed: {}", e);
                        self.disconnect();
                    }
                }
                Transition::None
            }
            VoiceSessionState::Joined => {
                tracing::info!(
                    "Joined voice room {}",
                    self.voice_room.as_deref().unwrap_or_default()
                );
                Transition::RoomJoined
            }
            VoiceSessionState::Disconnected => {
                // Join failures are indistinguishable from other disconnects here;
                // an error code from the transport would slot in at this point.
                if old_state == VoiceSessionState::JoiningVoiceRoom {
                    tracing::warn!(
                        "Disconnected while joining voice room {}",
                        self.voice_room.as_deref().unwrap_or_default()
                    );
                }
                self.voice_room = None;
                self.disconnecting = false;

                let reconnect = std::mem::take(&mut self.reconnect);
                if reconnect && !self.shut_down {
                    self.connect();
                }
                Transition::SessionLost
            }
            _ => Transition::None,
        }
    }

    fn join_voice_room(&mut self) -> Result<(), SessionError> {
        let primary_room = self.primary.active_room().ok_or(SessionError::NoPrimaryRoom)?;
        let name = voice_room_name(&primary_room);

        if !self.transport.join_or_create_room(&name, RoomOptions::hidden()) {
            return Err(SessionError::Rejected("join room"));
        }

        tracing::info!("Joining voice room {}", name);
        self.voice_room = Some(name);
        self.set_state(VoiceSessionState::JoiningVoiceRoom);
        Ok(())
    }

    /// Disconnect and refuse everything but [`Self::disconnect`] afterwards
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.reconnect = false;
        self.disconnect();
        self.shut_down = true;
        tracing::info!("Voice session shut down");
    }

    fn set_state(&mut self, state: VoiceSessionState) {
        if state != self.state {
            tracing::info!("Voice client state: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    pub fn state(&self) -> VoiceSessionState {
        self.state
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Voice room name while joined, empty otherwise
    pub fn current_room_name(&self) -> &str {
        match (self.state, &self.voice_room) {
            (VoiceSessionState::Joined, Some(name)) => name.as_str(),
            _ => "",
        }
    }

    pub fn settings(&self) -> &VoiceSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut VoiceSettings {
        &mut self.settings
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
