//! Playback endpoints
//!
//! An endpoint is a local playback destination for one remote participant's
//! stream. The application creates and destroys endpoints; the binding table
//! only holds shared handles to them and notifies them of link changes.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::audio::buffer::{create_shared_buffer, AudioFrame, SharedRingBuffer};
use crate::constants::ENDPOINT_BUFFER_CAPACITY;
use crate::protocol::EndpointRef;

/// Parameters handed to an endpoint when a stream is linked to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkParams {
    pub sampling_rate: u32,
    pub channels: u16,
    /// Encoder delay in samples
    pub encoder_delay: u32,
    /// Locally configured playback delay
    pub play_delay_ms: u32,
}

/// Local playback destination bound to at most one remote stream
///
/// Callbacks arrive on the service tick; implementations hand audio to their
/// own output thread.
pub trait Endpoint: Send + Sync {
    fn endpoint_ref(&self) -> EndpointRef;

    fn on_linked(&self, params: LinkParams);

    fn on_unlinked(&self);

    fn on_audio_frame(&self, samples: &[f32]);
}

/// Shared endpoint handle
pub type EndpointHandle = Arc<dyn Endpoint>;

/// Endpoint that queues decoded frames for an audio output thread
pub struct Speaker {
    endpoint_ref: EndpointRef,
    link: Mutex<Option<LinkParams>>,
    output: SharedRingBuffer,
    sequence: AtomicU32,
    /// Samples per channel of the last received frame
    frame_samples: AtomicU32,
    link_count: AtomicUsize,
    unlink_count: AtomicUsize,
    frames_received: AtomicU64,
}

impl Speaker {
    pub fn new(endpoint_ref: EndpointRef) -> Self {
        Self::with_capacity(endpoint_ref, ENDPOINT_BUFFER_CAPACITY)
    }

    pub fn with_capacity(endpoint_ref: EndpointRef, capacity: usize) -> Self {
        Self {
            endpoint_ref,
            link: Mutex::new(None),
            output: create_shared_buffer(capacity),
            sequence: AtomicU32::new(0),
            frame_samples: AtomicU32::new(0),
            link_count: AtomicUsize::new(0),
            unlink_count: AtomicUsize::new(0),
            frames_received: AtomicU64::new(0),
        }
    }

    /// Buffer the audio output thread reads from
    pub fn output(&self) -> SharedRingBuffer {
        self.output.clone()
    }

    pub fn is_linked(&self) -> bool {
        self.link.lock().is_some()
    }

    /// Parameters of the current link, if any
    pub fn link_params(&self) -> Option<LinkParams> {
        *self.link.lock()
    }

    /// Audio queued but not yet played, in milliseconds
    pub fn buffer_lag_ms(&self) -> u32 {
        match self.link_params() {
            Some(params) => {
                let per_channel = self.frame_samples.load(Ordering::Relaxed) as u64;
                let frames = self.output.len() as u64;
                (frames * per_channel * 1000 / params.sampling_rate.max(1) as u64) as u32
            }
            None => 0,
        }
    }

    pub fn stats(&self) -> SpeakerStats {
        SpeakerStats {
            links: self.link_count.load(Ordering::Relaxed),
            unlinks: self.unlink_count.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            buffered: self.output.len(),
            overflows: self.output.overflow_count(),
            underruns: self.output.underrun_count(),
        }
    }
}

impl Endpoint for Speaker {
    fn endpoint_ref(&self) -> EndpointRef {
        self.endpoint_ref
    }

    fn on_linked(&self, params: LinkParams) {
        *self.link.lock() = Some(params);
        self.output.clear();
        self.sequence.store(0, Ordering::Relaxed);
        self.link_count.fetch_add(1, Ordering::Relaxed);
    }

    fn on_unlinked(&self) {
        *self.link.lock() = None;
        self.output.clear();
        self.unlink_count.fetch_add(1, Ordering::Relaxed);
    }

    fn on_audio_frame(&self, samples: &[f32]) {
        let channels = match *self.link.lock() {
            Some(params) => params.channels,
            None => return,
        };
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let frame = AudioFrame::new(samples.to_vec(), channels, seq);
        self.frame_samples
            .store(frame.samples_per_channel() as u32, Ordering::Relaxed);
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.output.push(frame);
    }
}

/// Speaker counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeakerStats {
    pub links: usize,
    pub unlinks: usize,
    pub frames_received: u64,
    pub buffered: usize,
    pub overflows: usize,
    /// Reads by the output thread that found nothing queued
    pub underruns: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> LinkParams {
        LinkParams {
            sampling_rate: 48000,
            channels: 1,
            encoder_delay: 0,
            play_delay_ms: 200,
        }
    }

    #[test]
    fn test_frames_need_link() {
        let speaker = Speaker::new(EndpointRef(1));
        speaker.on_audio_frame(&[0.1; 960]);
        assert_eq!(speaker.stats().frames_received, 0);

        speaker.on_linked(params());
        speaker.on_audio_frame(&[0.1; 960]);
        speaker.on_audio_frame(&[0.2; 960]);

        let output = speaker.output();
        assert_eq!(output.pop().unwrap().sequence, 0);
        assert_eq!(output.pop().unwrap().sequence, 1);
        assert!(output.pop().is_none());
        assert_eq!(speaker.stats().frames_received, 2);
        assert_eq!(speaker.stats().underruns, 1);
    }

    #[test]
    fn test_unlink_clears_queue() {
        let speaker = Speaker::new(EndpointRef(1));
        speaker.on_linked(params());
        speaker.on_audio_frame(&[0.0; 960]);
        assert_eq!(speaker.buffer_lag_ms(), 20);

        speaker.on_unlinked();
        assert!(!speaker.is_linked());
        assert_eq!(speaker.stats().buffered, 0);
        assert_eq!(speaker.buffer_lag_ms(), 0);
    }
}
