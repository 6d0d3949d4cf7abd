//! Voice client: one owned instance ties the session coordinator, the
//! binding table and the local recorders to a transport.
//!
//! Everything runs on the host's service tick; [`VoiceNetwork::service`]
//! pulls the transport's events and dispatches them in order.

use serde::Serialize;

use crate::audio::device::DeviceCatalog;
use crate::binding::endpoint::{Endpoint, EndpointHandle};
use crate::binding::table::{BindingStats, BindingTable};
use crate::config::{AppConfig, VoiceSettings};
use crate::error::DeviceError;
use crate::local::recorder::{Recorder, RecorderSet};
use crate::protocol::{EndpointRef, OperationCode, TransportEvent, VoiceSessionState};
use crate::session::coordinator::{SessionCoordinator, Transition};
use crate::session::transport::{PrimarySession, VoiceTransport};

/// Snapshot of the client for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceStatus {
    pub state: VoiceSessionState,
    pub room: String,
    pub reconnect_pending: bool,
    pub shut_down: bool,
    pub recorders: usize,
    pub microphone: Option<String>,
    pub bindings: BindingStats,
}

/// Voice client driven by the host frame loop
pub struct VoiceNetwork<T, P> {
    coordinator: SessionCoordinator<T, P>,
    bindings: BindingTable,
    recorders: RecorderSet,
}

impl<T: VoiceTransport, P: PrimarySession> VoiceNetwork<T, P> {
    pub fn new(transport: T, primary: P, settings: VoiceSettings, catalog: Box<dyn DeviceCatalog>) -> Self {
        let bindings = BindingTable::new(settings.play_delay_ms);
        let recorders = RecorderSet::new(catalog, settings.debug_info);
        Self {
            coordinator: SessionCoordinator::new(transport, primary, settings),
            bindings,
            recorders,
        }
    }

    /// Build from application config, applying the configured microphone
    pub fn from_config(transport: T, primary: P, config: &AppConfig, catalog: Box<dyn DeviceCatalog>) -> Self {
        let mut network = Self::new(transport, primary, config.voice.clone(), catalog);
        if config.devices.microphone.is_some()
            && network
                .set_microphone(config.devices.microphone.clone())
                .is_err()
        {
            tracing::warn!("Configured microphone ignored, using the system default");
        }
        network
    }

    /// Run one service tick. Returns the number of events handled.
    pub fn service(&mut self) -> usize {
        let events = self.coordinator.transport_mut().service();
        let count = events.len();

        let mut rediscover = false;
        for event in events {
            rediscover |= self.dispatch(event) == Transition::RoomJoined;
        }

        // Pick up streams whose announcements were not delivered this tick
        if rediscover {
            let streams = self.coordinator.transport().announced_streams();
            self.bindings.resync(streams);
        }
        count
    }

    /// Handle a single transport event
    pub fn dispatch(&mut self, event: TransportEvent) -> Transition {
        match event {
            TransportEvent::StateChanged(state) => {
                let transition = self.coordinator.on_voice_session_state_changed(state);
                if transition == Transition::SessionLost {
                    self.bindings.reset();
                    self.recorders.on_session_lost();
                }
                return transition;
            }
            TransportEvent::StreamAnnounced { key, info } => {
                self.bindings.on_stream_announced(key, info);
            }
            TransportEvent::StreamRemoved(key) => {
                self.bindings.on_stream_removed(key);
            }
            TransportEvent::AudioFrame { key, samples } => {
                self.bindings.on_audio_frame(key, &samples);
            }
            TransportEvent::OperationResponse(response) => {
                if !response.success {
                    tracing::debug!("Operation {:?} failed", response.code);
                } else if response.code == OperationCode::JoinGame && !self.recorders.is_empty() {
                    self.recorders
                        .on_joined_voice_room(self.coordinator.transport_mut());
                }
            }
        }
        Transition::None
    }

    pub fn connect(&mut self) -> bool {
        self.coordinator.connect()
    }

    pub fn disconnect(&mut self) {
        self.coordinator.disconnect();
    }

    pub fn request_reconnect(&mut self) {
        self.coordinator.request_reconnect();
    }

    pub fn on_primary_session_joined_room(&mut self) {
        self.coordinator.on_primary_session_joined_room();
    }

    pub fn on_primary_session_left_room(&mut self) {
        self.coordinator.on_primary_session_left_room();
    }

    pub fn on_primary_session_disconnected(&mut self) {
        self.coordinator.on_primary_session_disconnected();
    }

    /// A playback endpoint became available
    pub fn register_endpoint(&mut self, endpoint: EndpointHandle) {
        if self.coordinator.is_shut_down() {
            tracing::warn!("{} not registered, voice client is shut down", endpoint.endpoint_ref());
            return;
        }
        self.bindings.try_link_endpoint(endpoint);
    }

    /// A playback endpoint is being destroyed
    pub fn unregister_endpoint(&mut self, endpoint: &dyn Endpoint) {
        self.bindings.unlink_endpoint(endpoint);
    }

    /// Add or replace a local recorder. A replaced recorder's voice is
    /// released before the new one is created.
    pub fn add_recorder(&mut self, recorder: Recorder) {
        if self.coordinator.is_shut_down() {
            tracing::warn!("Recorder for {} not added, voice client is shut down", recorder.endpoint_ref);
            return;
        }
        let joined = self.coordinator.state() == VoiceSessionState::Joined;
        self.recorders.add(recorder, self.coordinator.transport_mut());
        if joined {
            self.recorders
                .on_joined_voice_room(self.coordinator.transport_mut());
        }
    }

    pub fn remove_recorder(&mut self, endpoint_ref: EndpointRef) -> Option<Recorder> {
        if self.coordinator.is_shut_down() {
            return self.recorders.forget(endpoint_ref);
        }
        self.recorders
            .remove(endpoint_ref, self.coordinator.transport_mut())
    }

    /// Change the global microphone; invalid devices are logged and ignored
    pub fn set_microphone(&mut self, microphone: Option<String>) -> Result<(), DeviceError> {
        self.recorders.set_microphone(microphone).map_err(|e| {
            tracing::error!("{}", e);
            e
        })
    }

    /// Disconnect and release every endpoint; the client stays unusable
    pub fn shutdown(&mut self) {
        self.coordinator.shutdown();
        self.bindings.clear();
    }

    pub fn state(&self) -> VoiceSessionState {
        self.coordinator.state()
    }

    pub fn current_room_name(&self) -> &str {
        self.coordinator.current_room_name()
    }

    pub fn status(&self) -> VoiceStatus {
        VoiceStatus {
            state: self.coordinator.state(),
            room: self.coordinator.current_room_name().to_string(),
            reconnect_pending: self.coordinator.reconnect_pending(),
            shut_down: self.coordinator.is_shut_down(),
            recorders: self.recorders.len(),
            microphone: self.recorders.microphone().map(str::to_string),
            bindings: self.bindings.stats(),
        }
    }

    pub fn coordinator(&self) -> &SessionCoordinator<T, P> {
        &self.coordinator
    }

    pub fn coordinator_mut(&mut self) -> &mut SessionCoordinator<T, P> {
        &mut self.coordinator
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    pub fn recorders(&self) -> &RecorderSet {
        &self.recorders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::device::StaticDeviceCatalog;
    use crate::binding::endpoint::Speaker;
    use crate::network::loopback::{LoopbackTransport, TransportOp};
    use crate::protocol::{HostingMode, StreamInfo, StreamKey};
    use crate::session::transport::SharedPrimarySession;
    use std::sync::Arc;

    type Network = VoiceNetwork<LoopbackTransport, SharedPrimarySession>;

    fn network() -> (Network, SharedPrimarySession) {
        let primary = SharedPrimarySession::new(HostingMode::default());
        let network = VoiceNetwork::new(
            LoopbackTransport::new(),
            primary.clone(),
            VoiceSettings::default(),
            Box::new(StaticDeviceCatalog::from_names(["Built-in"])),
        );
        (network, primary)
    }

    fn run(network: &mut Network) {
        while network.service() > 0 {}
    }

    fn join(network: &mut Network, primary: &SharedPrimarySession, room: &str) {
        primary.set_joined(room);
        network.on_primary_session_joined_room();
        run(network);
        assert_eq!(network.state(), VoiceSessionState::Joined);
    }

    fn info(endpoint_ref: i32) -> StreamInfo {
        StreamInfo::new(48000, 1, 0, EndpointRef(endpoint_ref))
    }

    #[test]
    fn test_stream_before_endpoint_end_to_end() {
        let (mut network, primary) = network();
        let peer = network.coordinator().transport().remote_peer(7);
        join(&mut network, &primary, "Arena1");

        peer.publish(1, StreamInfo::new(24000, 2, 120, EndpointRef(42)));
        peer.send_frame(1, vec![0.0; 480]);
        run(&mut network);
        assert_eq!(network.bindings().stats().frames_dropped, 1);

        let speaker = Arc::new(Speaker::new(EndpointRef(42)));
        network.register_endpoint(speaker.clone());
        assert_eq!(speaker.stats().links, 1);
        assert_eq!(speaker.link_params().unwrap().sampling_rate, 24000);

        peer.send_frame(1, vec![0.0; 480]);
        run(&mut network);
        assert_eq!(speaker.stats().frames_received, 1);
    }

    #[test]
    fn test_streams_in_room_link_on_join() {
        let (mut network, primary) = network();
        let peer = network.coordinator().transport().remote_peer(7);
        peer.publish(1, info(42));

        let speaker = Arc::new(Speaker::new(EndpointRef(42)));
        network.register_endpoint(speaker.clone());
        join(&mut network, &primary, "Arena1");

        assert!(speaker.is_linked());
        assert_eq!(speaker.stats().links, 1);
        assert_eq!(network.bindings().stats().protocol_warnings, 0);
    }

    #[test]
    fn test_room_change_relinks_endpoints() {
        let (mut network, primary) = network();
        let peer = network.coordinator().transport().remote_peer(7);
        let speaker = Arc::new(Speaker::new(EndpointRef(42)));
        network.register_endpoint(speaker.clone());
        join(&mut network, &primary, "Arena1");
        peer.publish(1, info(42));
        run(&mut network);
        assert!(speaker.is_linked());

        primary.set_joined("Arena2");
        network.on_primary_session_joined_room();
        run(&mut network);

        assert_eq!(network.current_room_name(), "Arena2_voice_");
        assert!(speaker.is_linked());
        assert_eq!(speaker.stats().unlinks, 1);
        assert_eq!(speaker.stats().links, 2);
    }

    #[test]
    fn test_disconnect_unlinks_everything() {
        let (mut network, primary) = network();
        let peer = network.coordinator().transport().remote_peer(7);
        let speaker = Arc::new(Speaker::new(EndpointRef(42)));
        network.register_endpoint(speaker.clone());
        join(&mut network, &primary, "Arena1");
        peer.publish(1, info(42));
        run(&mut network);

        primary.set_disconnected();
        network.on_primary_session_disconnected();
        run(&mut network);

        assert_eq!(network.state(), VoiceSessionState::Disconnected);
        assert!(!speaker.is_linked());
        let stats = network.bindings().stats();
        assert_eq!(stats.announced, 0);
        assert_eq!(stats.endpoints, 1);
        assert_eq!(stats.protocol_warnings, 0);
    }

    #[test]
    fn test_recorders_get_voice_after_join() {
        let (mut network, primary) = network();
        network.add_recorder(Recorder::new(EndpointRef(5), 48000, 1));
        join(&mut network, &primary, "Arena1");

        assert!(network.recorders().get(EndpointRef(5)).unwrap().voice().is_some());
        assert_eq!(network.coordinator().transport().local_voice_count(), 1);

        // Late recorders get their voice right away
        network.add_recorder(Recorder::new(EndpointRef(6), 48000, 1));
        assert!(network.recorders().get(EndpointRef(6)).unwrap().voice().is_some());

        network.remove_recorder(EndpointRef(6));
        assert_eq!(network.coordinator().transport().local_voice_count(), 1);

        network.disconnect();
        run(&mut network);
        assert!(network.recorders().get(EndpointRef(5)).unwrap().voice().is_none());
    }

    #[test]
    fn test_readding_recorder_keeps_one_voice() {
        let (mut network, primary) = network();
        join(&mut network, &primary, "Arena1");

        network.add_recorder(Recorder::new(EndpointRef(5), 48000, 1));
        network.add_recorder(Recorder::new(EndpointRef(5), 48000, 1));
        assert_eq!(network.status().recorders, 1);
        assert_eq!(network.coordinator().transport().local_voice_count(), 1);

        network.remove_recorder(EndpointRef(5));
        assert_eq!(network.coordinator().transport().local_voice_count(), 0);
    }

    #[test]
    fn test_disconnect_before_lobby_skips_voice_room() {
        let (mut network, primary) = network();
        primary.set_joined("Arena1");

        assert!(network.connect());
        network.disconnect();
        run(&mut network);

        assert_eq!(network.state(), VoiceSessionState::Disconnected);
        assert!(!network
            .coordinator()
            .transport()
            .ops()
            .iter()
            .any(|op| matches!(op, TransportOp::JoinOrCreateRoom { .. })));
    }

    #[test]
    fn test_shutdown_releases_and_rejects() {
        let (mut network, primary) = network();
        let peer = network.coordinator().transport().remote_peer(7);
        let speaker = Arc::new(Speaker::new(EndpointRef(42)));
        network.register_endpoint(speaker.clone());
        network.add_recorder(Recorder::new(EndpointRef(5), 48000, 1));
        join(&mut network, &primary, "Arena1");
        peer.publish(1, info(42));
        run(&mut network);

        network.shutdown();
        run(&mut network);
        assert!(!speaker.is_linked());
        assert!(network.status().shut_down);
        assert_eq!(network.state(), VoiceSessionState::Disconnected);

        // Teardown paths stay safe
        network.unregister_endpoint(speaker.as_ref());
        let ops_before = network.coordinator().transport().ops().len();
        network.remove_recorder(EndpointRef(5));
        assert_eq!(network.coordinator().transport().ops().len(), ops_before);

        assert!(!network.connect());
        network.register_endpoint(speaker.clone());
        assert_eq!(network.bindings().stats().endpoints, 0);
    }

    #[test]
    fn test_from_config_applies_microphone() {
        let mut config = AppConfig::default();
        config.devices.microphone = Some("Built-in".to_string());
        let network: Network = VoiceNetwork::from_config(
            LoopbackTransport::new(),
            SharedPrimarySession::default(),
            &config,
            Box::new(StaticDeviceCatalog::from_names(["Built-in"])),
        );
        assert_eq!(network.status().microphone.as_deref(), Some("Built-in"));

        config.devices.microphone = Some("Missing".to_string());
        let network: Network = VoiceNetwork::from_config(
            LoopbackTransport::new(),
            SharedPrimarySession::default(),
            &config,
            Box::new(StaticDeviceCatalog::from_names(["Built-in"])),
        );
        assert_eq!(network.status().microphone, None);
    }

    #[test]
    fn test_status_serializes() {
        let (mut network, primary) = network();
        join(&mut network, &primary, "Arena1");
        let json = serde_json::to_value(network.status()).unwrap();
        assert_eq!(json["state"], "Joined");
        assert_eq!(json["room"], "Arena1_voice_");
        assert_eq!(json["bindings"]["bound"], 0);
    }

    #[test]
    fn test_removed_stream_frame_dropped() {
        let (mut network, primary) = network();
        let speaker = Arc::new(Speaker::new(EndpointRef(42)));
        network.register_endpoint(speaker.clone());
        join(&mut network, &primary, "Arena1");

        let key = StreamKey::new(7, 1);
        network.dispatch(TransportEvent::StreamAnnounced { key, info: info(42) });
        network.dispatch(TransportEvent::StreamRemoved(key));
        network.dispatch(TransportEvent::AudioFrame {
            key,
            samples: vec![0.0; 10],
        });

        assert_eq!(speaker.stats().frames_received, 0);
        let stats = network.bindings().stats();
        assert_eq!(stats.frames_dropped, 1);
        assert_eq!(stats.protocol_warnings, 1);
        assert!(!network
            .coordinator()
            .transport()
            .ops()
            .contains(&TransportOp::Disconnect));
    }
}
