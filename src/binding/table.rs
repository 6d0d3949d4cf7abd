//! Remote stream to playback endpoint binding table
//!
//! Stream announcements and endpoint registrations arrive in either order.
//! The table remembers both sides and links them as soon as they meet:
//!
//! ```text
//!   on_stream_announced(key, info) ──┐                ┌── try_link_endpoint(endpoint)
//!                                    ▼                ▼
//!   announced: StreamKey → StreamInfo       endpoints: EndpointRef → Endpoint
//!   by_ref:    EndpointRef → [StreamKey]  (announcement order)
//!                                    │                │
//!                                    └──── link() ────┘
//!                                          │
//!   bindings:  StreamKey → EndpointRef  ◄──┴──►  bound_to: EndpointRef → StreamKey
//! ```
//!
//! Invariants: a stream key is bound to at most one endpoint and an endpoint
//! to at most one stream key; every binding refers to an announced stream and
//! a registered endpoint whose reference matches the announcement. When an
//! endpoint has several announced streams, the most recently announced one
//! holds the binding.

use std::collections::HashMap;
use std::sync::Arc;

use crate::binding::endpoint::{Endpoint, EndpointHandle, LinkParams};
use crate::protocol::{AnnouncedStream, EndpointRef, StreamInfo, StreamKey};

/// Binding table for the voice session's remote streams
pub struct BindingTable {
    play_delay_ms: u32,
    announced: HashMap<StreamKey, StreamInfo>,
    by_ref: HashMap<EndpointRef, Vec<StreamKey>>,
    bindings: HashMap<StreamKey, EndpointRef>,
    bound_to: HashMap<EndpointRef, StreamKey>,
    endpoints: HashMap<EndpointRef, EndpointHandle>,
    frames_routed: u64,
    frames_dropped: u64,
    protocol_warnings: u64,
}

impl BindingTable {
    pub fn new(play_delay_ms: u32) -> Self {
        Self {
            play_delay_ms,
            announced: HashMap::new(),
            by_ref: HashMap::new(),
            bindings: HashMap::new(),
            bound_to: HashMap::new(),
            endpoints: HashMap::new(),
            frames_routed: 0,
            frames_dropped: 0,
            protocol_warnings: 0,
        }
    }

    /// A remote stream became known.
    ///
    /// Links it right away when the endpoint named by `info.endpoint_ref` is
    /// registered; otherwise the link happens in [`Self::try_link_endpoint`].
    pub fn on_stream_announced(&mut self, key: StreamKey, info: StreamInfo) {
        let previous = self.announced.insert(key, info);
        if let Some(prev) = previous {
            if self.bindings.contains_key(&key) {
                tracing::warn!("Info duplicate for {}", key);
                self.protocol_warnings += 1;
            }
            self.forget_ref_entry(prev.endpoint_ref, key);
        }
        self.by_ref.entry(info.endpoint_ref).or_default().push(key);

        // Endpoint currently bound to this key under an outdated announcement
        let displaced = previous
            .filter(|prev| prev.endpoint_ref != info.endpoint_ref)
            .and_then(|prev| {
                self.bindings
                    .get(&key)
                    .copied()
                    .filter(|bound| *bound == prev.endpoint_ref)
            });

        let params_changed = previous.map_or(false, |prev| prev != info);
        if !self.link(key, info, params_changed) {
            if displaced.is_some() {
                self.unbind(key);
            }
            tracing::debug!(
                "No {} registered for {} yet, link deferred",
                info.endpoint_ref,
                key
            );
        }
        if let Some(old_ref) = displaced {
            self.rebind_latest(old_ref);
        }
    }

    /// Register an endpoint and link it to the latest stream announced for it.
    ///
    /// Registering a different endpoint instance under a reference that is
    /// already registered replaces the old instance, which is unlinked first.
    pub fn try_link_endpoint(&mut self, endpoint: EndpointHandle) {
        let endpoint_ref = endpoint.endpoint_ref();

        match self.endpoints.get(&endpoint_ref).cloned() {
            Some(existing) if Arc::ptr_eq(&existing, &endpoint) => {
                tracing::debug!("{} already registered", endpoint_ref);
            }
            Some(existing) => {
                tracing::info!("{} registration replaced by a new instance", endpoint_ref);
                self.unlink_endpoint(existing.as_ref());
                self.endpoints.insert(endpoint_ref, endpoint);
            }
            None => {
                tracing::debug!("{} registered", endpoint_ref);
                self.endpoints.insert(endpoint_ref, endpoint);
            }
        }

        if let Some(key) = self.latest_announced(endpoint_ref) {
            let info = self.announced[&key];
            self.link(key, info, false);
        }
    }

    /// A remote stream went away. Returns false if the key was never announced.
    pub fn on_stream_removed(&mut self, key: StreamKey) -> bool {
        let info = match self.announced.remove(&key) {
            Some(info) => info,
            None => {
                tracing::warn!("Voice {} not found", key);
                self.protocol_warnings += 1;
                return false;
            }
        };
        self.forget_ref_entry(info.endpoint_ref, key);

        match self.unbind(key) {
            // An older stream for the same endpoint may still be live
            Some(endpoint_ref) => self.rebind_latest(endpoint_ref),
            None => tracing::debug!("{} removed before any endpoint was linked", key),
        }
        true
    }

    /// Deregister an endpoint and drop every binding that points at it.
    ///
    /// Safe to call from the endpoint's teardown, whether or not the matching
    /// stream removal has arrived. An instance that was already replaced by a
    /// newer registration is ignored. Returns the number of bindings removed.
    pub fn unlink_endpoint(&mut self, endpoint: &dyn Endpoint) -> usize {
        let endpoint_ref = endpoint.endpoint_ref();
        if let Some(current) = self.endpoints.get(&endpoint_ref) {
            if !std::ptr::addr_eq(Arc::as_ptr(current), endpoint as *const dyn Endpoint) {
                tracing::debug!("Stale {} instance already replaced", endpoint_ref);
                return 0;
            }
        }
        let registered = self.endpoints.remove(&endpoint_ref);
        self.bound_to.remove(&endpoint_ref);

        let mut stale = Vec::new();
        self.bindings.retain(|key, bound| {
            if *bound == endpoint_ref {
                stale.push(*key);
                false
            } else {
                true
            }
        });

        for key in &stale {
            if let Some(endpoint) = &registered {
                endpoint.on_unlinked();
            }
            tracing::info!("{} unlinked from {}", key, endpoint_ref);
        }
        stale.len()
    }

    /// Route a decoded frame to the bound endpoint.
    ///
    /// Frames for unbound streams are dropped with a warning. This is expected
    /// while a stream's endpoint has not registered yet and is not fatal.
    pub fn on_audio_frame(&mut self, key: StreamKey, samples: &[f32]) -> bool {
        let endpoint = self
            .bindings
            .get(&key)
            .and_then(|endpoint_ref| self.endpoints.get(endpoint_ref));

        match endpoint {
            Some(endpoint) => {
                endpoint.on_audio_frame(samples);
                self.frames_routed += 1;
                true
            }
            None => {
                tracing::warn!("Audio frame for {} has no linked endpoint", key);
                self.frames_dropped += 1;
                self.protocol_warnings += 1;
                false
            }
        }
    }

    /// Announce every stream in the transport's registry that the table does
    /// not know yet. Returns how many were added.
    pub fn resync<I>(&mut self, streams: I) -> usize
    where
        I: IntoIterator<Item = AnnouncedStream>,
    {
        let mut added = 0;
        for stream in streams {
            if !self.announced.contains_key(&stream.key) {
                self.on_stream_announced(stream.key, stream.info);
                added += 1;
            }
        }
        if added > 0 {
            tracing::info!("Resynced {} remote voices", added);
        }
        added
    }

    /// Forget all remote streams after the voice session was lost.
    /// Endpoint registrations survive so they relink on the next join.
    pub fn reset(&mut self) {
        for (key, endpoint_ref) in self.bindings.drain() {
            if let Some(endpoint) = self.endpoints.get(&endpoint_ref) {
                endpoint.on_unlinked();
            }
            tracing::info!("{} unlinked from {}", key, endpoint_ref);
        }
        self.bound_to.clear();
        self.announced.clear();
        self.by_ref.clear();
    }

    /// Unlink and deregister everything
    pub fn clear(&mut self) {
        self.reset();
        self.endpoints.clear();
    }

    pub fn binding(&self, key: StreamKey) -> Option<EndpointRef> {
        self.bindings.get(&key).copied()
    }

    pub fn stream_for(&self, endpoint_ref: EndpointRef) -> Option<StreamKey> {
        self.bound_to.get(&endpoint_ref).copied()
    }

    pub fn is_registered(&self, endpoint_ref: EndpointRef) -> bool {
        self.endpoints.contains_key(&endpoint_ref)
    }

    pub fn stats(&self) -> BindingStats {
        BindingStats {
            announced: self.announced.len(),
            bound: self.bindings.len(),
            pending: self.announced.len() - self.bindings.len(),
            endpoints: self.endpoints.len(),
            frames_routed: self.frames_routed,
            frames_dropped: self.frames_dropped,
            protocol_warnings: self.protocol_warnings,
        }
    }

    /// Create or replace the binding for `key`. Returns false when the
    /// endpoint is not registered.
    fn link(&mut self, key: StreamKey, info: StreamInfo, params_changed: bool) -> bool {
        let endpoint_ref = info.endpoint_ref;
        let endpoint = match self.endpoints.get(&endpoint_ref) {
            Some(endpoint) => endpoint.clone(),
            None => return false,
        };

        match self.bindings.get(&key).copied() {
            Some(bound) if bound == endpoint_ref => {
                if !params_changed {
                    return true;
                }
                tracing::info!("{} relinked to {} with new parameters", key, endpoint_ref);
            }
            Some(old_ref) => {
                self.bound_to.remove(&old_ref);
                if let Some(old) = self.endpoints.get(&old_ref) {
                    old.on_unlinked();
                }
                tracing::info!("{} speaker replaced ({} -> {})", key, old_ref, endpoint_ref);
            }
            None => {
                tracing::info!("{} speaker created on {}", key, endpoint_ref);
            }
        }

        if let Some(prev_key) = self.bound_to.get(&endpoint_ref).copied() {
            if prev_key != key {
                self.bindings.remove(&prev_key);
                tracing::info!("{} moved from {} to {}", endpoint_ref, prev_key, key);
            }
        }

        endpoint.on_linked(LinkParams {
            sampling_rate: info.sampling_rate,
            channels: info.channels,
            encoder_delay: info.encoder_delay,
            play_delay_ms: self.play_delay_ms,
        });
        self.bindings.insert(key, endpoint_ref);
        self.bound_to.insert(endpoint_ref, key);
        true
    }

    /// Drop the binding for `key`, notifying its endpoint
    fn unbind(&mut self, key: StreamKey) -> Option<EndpointRef> {
        let endpoint_ref = self.bindings.remove(&key)?;
        self.bound_to.remove(&endpoint_ref);
        if let Some(endpoint) = self.endpoints.get(&endpoint_ref) {
            endpoint.on_unlinked();
        }
        tracing::info!("{} unlinked from {}", key, endpoint_ref);
        Some(endpoint_ref)
    }

    /// Link an unbound registered endpoint to its latest announced stream
    fn rebind_latest(&mut self, endpoint_ref: EndpointRef) {
        if self.bound_to.contains_key(&endpoint_ref) {
            return;
        }
        if let Some(key) = self.latest_announced(endpoint_ref) {
            let info = self.announced[&key];
            self.link(key, info, false);
        }
    }

    fn latest_announced(&self, endpoint_ref: EndpointRef) -> Option<StreamKey> {
        self.by_ref.get(&endpoint_ref).and_then(|keys| keys.last()).copied()
    }

    fn forget_ref_entry(&mut self, endpoint_ref: EndpointRef, key: StreamKey) {
        if let Some(keys) = self.by_ref.get_mut(&endpoint_ref) {
            keys.retain(|k| *k != key);
            if keys.is_empty() {
                self.by_ref.remove(&endpoint_ref);
            }
        }
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        assert_eq!(self.bindings.len(), self.bound_to.len());
        for (key, endpoint_ref) in &self.bindings {
            assert_eq!(self.bound_to.get(endpoint_ref), Some(key));
            let info = self.announced.get(key).expect("binding without announcement");
            assert_eq!(info.endpoint_ref, *endpoint_ref);
            let endpoint = self.endpoints.get(endpoint_ref).expect("binding without endpoint");
            assert_eq!(endpoint.endpoint_ref(), *endpoint_ref);
        }
        for (endpoint_ref, keys) in &self.by_ref {
            assert!(!keys.is_empty());
            for key in keys {
                assert_eq!(self.announced[key].endpoint_ref, *endpoint_ref);
            }
        }
        let indexed: usize = self.by_ref.values().map(Vec::len).sum();
        assert_eq!(indexed, self.announced.len());
    }
}

/// Binding table counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BindingStats {
    pub announced: usize,
    pub bound: usize,
    /// Announced streams without a linked endpoint
    pub pending: usize,
    pub endpoints: usize,
    pub frames_routed: u64,
    pub frames_dropped: u64,
    pub protocol_warnings: u64,
}
