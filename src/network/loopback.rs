//! In-process voice transport
//!
//! Plays the part of the voice server for the simulator and for tests:
//! requests are recorded and answered with the state changes a real server
//! would produce, delivered on the next [`VoiceTransport::service`] tick.
//! Remote participants publish streams through a [`RemotePeer`] handle.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::protocol::{
    AnnouncedStream, LocalVoiceId, OperationCode, OperationResponse, RoomOptions, StreamInfo,
    StreamKey, TransportEvent, VoiceSessionState,
};
use crate::session::transport::{ConnectRequest, VoiceTransport};

/// Request received by the loopback transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOp {
    Connect(ConnectRequest),
    Disconnect,
    JoinOrCreateRoom { name: String, options: RoomOptions },
    LeaveRoom,
    CreateLocalVoice(StreamInfo),
    RemoveLocalVoice(LocalVoiceId),
}

/// Activity of remote participants in the voice room
#[derive(Debug, Clone)]
enum RemoteEvent {
    Publish { key: StreamKey, info: StreamInfo },
    Unpublish(StreamKey),
    Frame { key: StreamKey, samples: Vec<f32> },
}

/// Handle a simulated remote participant uses to publish audio
#[derive(Debug, Clone)]
pub struct RemotePeer {
    participant: i32,
    tx: Sender<RemoteEvent>,
}

impl RemotePeer {
    pub fn participant(&self) -> i32 {
        self.participant
    }

    pub fn publish(&self, stream: u8, info: StreamInfo) {
        let key = StreamKey::new(self.participant, stream);
        let _ = self.tx.send(RemoteEvent::Publish { key, info });
    }

    pub fn unpublish(&self, stream: u8) {
        let key = StreamKey::new(self.participant, stream);
        let _ = self.tx.send(RemoteEvent::Unpublish(key));
    }

    pub fn send_frame(&self, stream: u8, samples: Vec<f32>) {
        let key = StreamKey::new(self.participant, stream);
        let _ = self.tx.send(RemoteEvent::Frame { key, samples });
    }
}

/// Voice transport that runs entirely in process
pub struct LoopbackTransport {
    state: VoiceSessionState,
    room: Option<String>,
    ops: Vec<TransportOp>,
    pending: VecDeque<TransportEvent>,
    remote_tx: Sender<RemoteEvent>,
    remote_rx: Receiver<RemoteEvent>,
    /// Streams remote participants publish in the room
    published: BTreeMap<StreamKey, StreamInfo>,
    /// Streams announced to this client in the current room
    announced: BTreeMap<StreamKey, StreamInfo>,
    local_voices: HashSet<LocalVoiceId>,
    next_local_voice: u8,
    fail_next_join: bool,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        let (remote_tx, remote_rx) = unbounded();
        Self {
            state: VoiceSessionState::Uninitialized,
            room: None,
            ops: Vec::new(),
            pending: VecDeque::new(),
            remote_tx,
            remote_rx,
            published: BTreeMap::new(),
            announced: BTreeMap::new(),
            local_voices: HashSet::new(),
            next_local_voice: 1,
            fail_next_join: false,
        }
    }

    /// Handle for a remote participant in the voice room
    pub fn remote_peer(&self, participant: i32) -> RemotePeer {
        RemotePeer {
            participant,
            tx: self.remote_tx.clone(),
        }
    }

    /// Make the next room join end in a disconnect
    pub fn fail_next_join(&mut self) {
        self.fail_next_join = true;
    }

    /// Every request received so far
    pub fn ops(&self) -> &[TransportOp] {
        &self.ops
    }

    pub fn state(&self) -> VoiceSessionState {
        self.state
    }

    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    pub fn local_voice_count(&self) -> usize {
        self.local_voices.len()
    }

    fn push_state(&mut self, state: VoiceSessionState) {
        self.state = state;
        self.pending.push_back(TransportEvent::StateChanged(state));
    }

    fn push_response(&mut self, code: OperationCode, success: bool) {
        self.pending
            .push_back(TransportEvent::OperationResponse(OperationResponse { code, success }));
    }

    /// Remove every stream announced in the room the client is leaving
    fn withdraw_announced(&mut self) {
        let announced = std::mem::take(&mut self.announced);
        for key in announced.into_keys() {
            self.pending.push_back(TransportEvent::StreamRemoved(key));
        }
        self.local_voices.clear();
    }

    fn apply_remote(&mut self, event: RemoteEvent) -> Option<TransportEvent> {
        let joined = self.state == VoiceSessionState::Joined;
        match event {
            RemoteEvent::Publish { key, info } => {
                self.published.insert(key, info);
                if !joined {
                    return None;
                }
                self.announced.insert(key, info);
                Some(TransportEvent::StreamAnnounced { key, info })
            }
            RemoteEvent::Unpublish(key) => {
                self.published.remove(&key);
                self.announced.remove(&key)?;
                Some(TransportEvent::StreamRemoved(key))
            }
            RemoteEvent::Frame { key, samples } => {
                if !joined || !self.announced.contains_key(&key) {
                    return None;
                }
                Some(TransportEvent::AudioFrame { key, samples })
            }
        }
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceTransport for LoopbackTransport {
    fn connect(&mut self, request: &ConnectRequest) -> bool {
        self.ops.push(TransportOp::Connect(request.clone()));
        if !self.state.is_idle() {
            return false;
        }
        self.push_state(VoiceSessionState::ConnectingToMaster);
        self.push_response(OperationCode::Authenticate, true);
        self.push_response(OperationCode::JoinLobby, true);
        self.push_state(VoiceSessionState::JoinedLobby);
        true
    }

    fn disconnect(&mut self) {
        self.ops.push(TransportOp::Disconnect);
        if self.state.is_idle() {
            return;
        }
        self.withdraw_announced();
        self.room = None;
        self.push_state(VoiceSessionState::Leaving);
        self.push_state(VoiceSessionState::Disconnected);
    }

    fn join_or_create_room(&mut self, name: &str, options: RoomOptions) -> bool {
        self.ops.push(TransportOp::JoinOrCreateRoom {
            name: name.to_string(),
            options,
        });
        if self.state != VoiceSessionState::JoinedLobby {
            return false;
        }

        self.push_state(VoiceSessionState::JoiningVoiceRoom);
        if std::mem::take(&mut self.fail_next_join) {
            self.push_response(OperationCode::JoinGame, false);
            self.push_state(VoiceSessionState::Disconnected);
            return true;
        }

        self.room = Some(name.to_string());
        self.push_state(VoiceSessionState::Joined);
        self.push_response(OperationCode::JoinGame, true);
        // The server tells newcomers about streams already in the room
        for (key, info) in self.published.clone() {
            self.announced.insert(key, info);
            self.pending.push_back(TransportEvent::StreamAnnounced { key, info });
        }
        true
    }

    fn leave_room(&mut self) -> bool {
        self.ops.push(TransportOp::LeaveRoom);
        if self.state != VoiceSessionState::Joined {
            return false;
        }
        self.withdraw_announced();
        self.room = None;
        self.push_state(VoiceSessionState::Leaving);
        self.push_response(OperationCode::Leave, true);
        self.push_state(VoiceSessionState::JoinedLobby);
        true
    }

    fn announced_streams(&self) -> Vec<AnnouncedStream> {
        self.announced
            .iter()
            .map(|(key, info)| AnnouncedStream { key: *key, info: *info })
            .collect()
    }

    fn create_local_voice(&mut self, info: StreamInfo) -> Option<LocalVoiceId> {
        self.ops.push(TransportOp::CreateLocalVoice(info));
        if self.state != VoiceSessionState::Joined {
            return None;
        }
        let id = LocalVoiceId(self.next_local_voice);
        self.next_local_voice = self.next_local_voice.wrapping_add(1);
        self.local_voices.insert(id);
        Some(id)
    }

    fn remove_local_voice(&mut self, id: LocalVoiceId) {
        self.ops.push(TransportOp::RemoveLocalVoice(id));
        self.local_voices.remove(&id);
    }

    fn service(&mut self) -> Vec<TransportEvent> {
        let mut events: Vec<TransportEvent> = self.pending.drain(..).collect();
        while let Ok(remote) = self.remote_rx.try_recv() {
            if let Some(event) = self.apply_remote(remote) {
                events.push(event);
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EndpointRef;
    use crate::session::transport::ConnectTarget;

    fn request() -> ConnectRequest {
        ConnectRequest {
            app_id: String::new(),
            app_version: "1.0".to_string(),
            target: ConnectTarget::Region("eu".to_string()),
        }
    }

    fn join(transport: &mut LoopbackTransport) {
        assert!(transport.connect(&request()));
        assert!(transport.join_or_create_room("Arena1_voice_", RoomOptions::hidden()));
        transport.service();
    }

    #[test]
    fn test_connect_only_when_idle() {
        let mut transport = LoopbackTransport::new();
        assert!(transport.connect(&request()));
        assert!(!transport.connect(&request()));
        assert_eq!(
            transport.service(),
            vec![
                TransportEvent::StateChanged(VoiceSessionState::ConnectingToMaster),
                TransportEvent::OperationResponse(OperationResponse {
                    code: OperationCode::Authenticate,
                    success: true,
                }),
                TransportEvent::OperationResponse(OperationResponse {
                    code: OperationCode::JoinLobby,
                    success: true,
                }),
                TransportEvent::StateChanged(VoiceSessionState::JoinedLobby),
            ]
        );
    }

    #[test]
    fn test_existing_streams_announced_on_join() {
        let mut transport = LoopbackTransport::new();
        let peer = transport.remote_peer(7);
        peer.publish(1, StreamInfo::new(48000, 1, 0, EndpointRef(42)));
        peer.send_frame(1, vec![0.0; 10]);
        assert!(transport.service().is_empty());

        assert!(transport.connect(&request()));
        assert!(transport.join_or_create_room("Arena1_voice_", RoomOptions::hidden()));
        let events = transport.service();

        assert!(events.contains(&TransportEvent::StreamAnnounced {
            key: StreamKey::new(7, 1),
            info: StreamInfo::new(48000, 1, 0, EndpointRef(42)),
        }));
        assert_eq!(transport.announced_streams().len(), 1);
        assert_eq!(transport.room(), Some("Arena1_voice_"));
    }

    #[test]
    fn test_leave_withdraws_streams() {
        let mut transport = LoopbackTransport::new();
        let peer = transport.remote_peer(7);
        join(&mut transport);

        peer.publish(1, StreamInfo::new(48000, 1, 0, EndpointRef(42)));
        transport.service();

        assert!(transport.leave_room());
        let events = transport.service();
        assert_eq!(events[0], TransportEvent::StreamRemoved(StreamKey::new(7, 1)));
        assert!(events.contains(&TransportEvent::OperationResponse(OperationResponse {
            code: OperationCode::Leave,
            success: true,
        })));
        assert_eq!(
            events.last(),
            Some(&TransportEvent::StateChanged(VoiceSessionState::JoinedLobby))
        );
        assert!(transport.announced_streams().is_empty());
    }

    #[test]
    fn test_failed_join_disconnects() {
        let mut transport = LoopbackTransport::new();
        transport.fail_next_join();
        assert!(transport.connect(&request()));
        transport.service();

        assert!(transport.join_or_create_room("Arena1_voice_", RoomOptions::hidden()));
        let events = transport.service();
        assert_eq!(
            events.last(),
            Some(&TransportEvent::StateChanged(VoiceSessionState::Disconnected))
        );
        assert_eq!(transport.room(), None);
    }

    #[test]
    fn test_local_voice_needs_room() {
        let mut transport = LoopbackTransport::new();
        let info = StreamInfo::new(48000, 1, 0, EndpointRef(1));
        assert_eq!(transport.create_local_voice(info), None);

        join(&mut transport);
        let id = transport.create_local_voice(info).unwrap();
        assert_eq!(transport.local_voice_count(), 1);
        transport.remove_local_voice(id);
        assert_eq!(transport.local_voice_count(), 0);
    }
}
