//! Local outgoing voices
//!
//! A recorder owns one outgoing stream. Its local voice is created through
//! the transport once a voice room join is confirmed, and is dropped with
//! the session.

use crate::audio::device::DeviceCatalog;
use crate::error::DeviceError;
use crate::protocol::{EndpointRef, LocalVoiceId, StreamInfo};
use crate::session::transport::VoiceTransport;

/// One outgoing voice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorder {
    /// Reference remote clients use to find their endpoint for this voice
    pub endpoint_ref: EndpointRef,
    pub sampling_rate: u32,
    pub channels: u16,
    /// Device chosen for this recorder; `None` follows the global microphone
    pub microphone: Option<String>,
    device: Option<String>,
    voice: Option<LocalVoiceId>,
}

impl Recorder {
    pub fn new(endpoint_ref: EndpointRef, sampling_rate: u32, channels: u16) -> Self {
        Self {
            endpoint_ref,
            sampling_rate,
            channels,
            microphone: None,
            device: None,
            voice: None,
        }
    }

    pub fn with_microphone(mut self, microphone: impl Into<String>) -> Self {
        let microphone = microphone.into();
        self.device = Some(microphone.clone());
        self.microphone = Some(microphone);
        self
    }

    /// Device the recorder captures from; `None` is the system default
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn voice(&self) -> Option<LocalVoiceId> {
        self.voice
    }

    fn stream_info(&self) -> StreamInfo {
        StreamInfo::new(self.sampling_rate, self.channels, 0, self.endpoint_ref)
    }
}

/// Recorders owned by this client plus the global microphone setting
pub struct RecorderSet {
    recorders: Vec<Recorder>,
    global_microphone: Option<String>,
    catalog: Box<dyn DeviceCatalog>,
    debug_info: bool,
}

impl RecorderSet {
    pub fn new(catalog: Box<dyn DeviceCatalog>, debug_info: bool) -> Self {
        if let Err(e) = catalog.require_microphone() {
            tracing::error!("{}", e);
        }
        Self {
            recorders: Vec::new(),
            global_microphone: None,
            catalog,
            debug_info,
        }
    }

    /// Add a recorder; it follows the global microphone unless it picked one.
    ///
    /// A recorder already registered under the same reference is replaced and
    /// its local voice released.
    pub fn add<T: VoiceTransport>(&mut self, mut recorder: Recorder, transport: &mut T) {
        if recorder.microphone.is_none() {
            recorder.device = self.global_microphone.clone();
        }
        if self.remove(recorder.endpoint_ref, transport).is_some() {
            tracing::debug!("Recorder for {} replaced", recorder.endpoint_ref);
        }
        self.recorders.push(recorder);
    }

    /// Remove a recorder, releasing its local voice
    pub fn remove<T: VoiceTransport>(&mut self, endpoint_ref: EndpointRef, transport: &mut T) -> Option<Recorder> {
        let pos = self.recorders.iter().position(|r| r.endpoint_ref == endpoint_ref)?;
        let mut recorder = self.recorders.remove(pos);
        if let Some(id) = recorder.voice.take() {
            transport.remove_local_voice(id);
        }
        Some(recorder)
    }

    /// Remove a recorder without touching the transport
    pub fn forget(&mut self, endpoint_ref: EndpointRef) -> Option<Recorder> {
        let pos = self.recorders.iter().position(|r| r.endpoint_ref == endpoint_ref)?;
        Some(self.recorders.remove(pos))
    }

    /// Change the global microphone. An unknown device leaves the setting
    /// unchanged.
    pub fn set_microphone(&mut self, microphone: Option<String>) -> Result<(), DeviceError> {
        if let Some(name) = &microphone {
            self.catalog.validate_microphone(name)?;
        }

        if self.debug_info {
            tracing::info!("Setting global microphone device to {:?}", microphone);
        }
        for recorder in self.recorders.iter_mut().filter(|r| r.microphone.is_none()) {
            recorder.device = microphone.clone();
        }
        self.global_microphone = microphone;
        Ok(())
    }

    pub fn microphone(&self) -> Option<&str> {
        self.global_microphone.as_deref()
    }

    /// Create local voices for recorders that have none. Returns how many
    /// were created.
    pub fn on_joined_voice_room<T: VoiceTransport>(&mut self, transport: &mut T) -> usize {
        let mut created = 0;
        for recorder in self.recorders.iter_mut().filter(|r| r.voice.is_none()) {
            match transport.create_local_voice(recorder.stream_info()) {
                Some(id) => {
                    if self.debug_info {
                        tracing::info!("Local voice {:?} created for {}", id, recorder.endpoint_ref);
                    }
                    recorder.voice = Some(id);
                    created += 1;
                }
                None => tracing::warn!("Local voice for {} was not created", recorder.endpoint_ref),
            }
        }
        created
    }

    /// Local voices die with the session
    pub fn on_session_lost(&mut self) {
        for recorder in &mut self.recorders {
            recorder.voice = None;
        }
    }

    pub fn get(&self, endpoint_ref: EndpointRef) -> Option<&Recorder> {
        self.recorders.iter().find(|r| r.endpoint_ref == endpoint_ref)
    }

    pub fn len(&self) -> usize {
        self.recorders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::device::StaticDeviceCatalog;
    use crate::network::loopback::LoopbackTransport;
    use crate::protocol::RoomOptions;
    use crate::session::transport::{ConnectRequest, ConnectTarget};

    fn recorders() -> RecorderSet {
        RecorderSet::new(Box::new(StaticDeviceCatalog::from_names(["Built-in", "USB Mic"])), false)
    }

    fn joined_transport() -> LoopbackTransport {
        let mut transport = LoopbackTransport::new();
        transport.connect(&ConnectRequest {
            app_id: String::new(),
            app_version: "1.0".to_string(),
            target: ConnectTarget::Region("eu".to_string()),
        });
        transport.join_or_create_room("Arena1_voice_", RoomOptions::hidden());
        transport.service();
        transport
    }

    #[test]
    fn test_global_microphone_propagates() {
        let mut set = recorders();
        let mut transport = LoopbackTransport::new();
        set.add(Recorder::new(EndpointRef(1), 48000, 1), &mut transport);
        set.add(Recorder::new(EndpointRef(2), 48000, 1).with_microphone("Built-in"), &mut transport);

        set.set_microphone(Some("USB Mic".to_string())).unwrap();

        assert_eq!(set.get(EndpointRef(1)).unwrap().device(), Some("USB Mic"));
        assert_eq!(set.get(EndpointRef(2)).unwrap().device(), Some("Built-in"));

        // Recorders added later follow the global setting too
        set.add(Recorder::new(EndpointRef(3), 48000, 1), &mut transport);
        assert_eq!(set.get(EndpointRef(3)).unwrap().device(), Some("USB Mic"));
    }

    #[test]
    fn test_invalid_microphone_rejected() {
        let mut set = recorders();
        set.set_microphone(Some("USB Mic".to_string())).unwrap();

        let err = set.set_microphone(Some("Headset".to_string())).unwrap_err();
        assert_eq!(err, DeviceError::InvalidMicrophone("Headset".to_string()));
        assert_eq!(set.microphone(), Some("USB Mic"));

        set.set_microphone(None).unwrap();
        assert_eq!(set.microphone(), None);
    }

    #[test]
    fn test_no_microphone_is_not_fatal() {
        let mut set = RecorderSet::new(Box::new(StaticDeviceCatalog::default()), false);
        set.add(Recorder::new(EndpointRef(1), 48000, 1), &mut LoopbackTransport::new());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_readding_replaces_recorder() {
        let mut set = recorders();
        let mut transport = LoopbackTransport::new();
        set.add(Recorder::new(EndpointRef(1), 48000, 1), &mut transport);
        set.add(Recorder::new(EndpointRef(1), 24000, 2), &mut transport);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(EndpointRef(1)).unwrap().channels, 2);
    }

    #[test]
    fn test_readding_releases_local_voice() {
        let mut set = recorders();
        let mut transport = joined_transport();
        set.add(Recorder::new(EndpointRef(5), 48000, 1), &mut transport);
        assert_eq!(set.on_joined_voice_room(&mut transport), 1);

        set.add(Recorder::new(EndpointRef(5), 48000, 1), &mut transport);
        assert_eq!(transport.local_voice_count(), 0);
        assert_eq!(set.on_joined_voice_room(&mut transport), 1);
        assert_eq!(transport.local_voice_count(), 1);

        set.remove(EndpointRef(5), &mut transport);
        assert_eq!(transport.local_voice_count(), 0);
        assert!(set.is_empty());
    }
}
