//! # Voice Room Sync
//!
//! Keeps a voice session in step with the application's primary multiplayer
//! session and routes incoming voice streams to playback endpoints.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────┐        room joined / left / disconnected
//! │   Primary session    │ ─────────────────────────────────────────┐
//! └──────────────────────┘                                          │
//!                                                                   ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Voice client (network::client)                        │
//! │                                                                          │
//! │  ┌─────────────────────────────┐     ┌────────────────────────────────┐  │
//! │  │ Session coordinator         │     │ Binding table (binding::table) │  │
//! │  │ (session::coordinator)      │     │                                │  │
//! │  │  connect / disconnect       │     │  StreamKey ──▶ EndpointRef     │  │
//! │  │  reconnect flag             │     │  announced streams             │  │
//! │  │  "<room>_voice_" join       │     │  registered endpoints          │  │
//! │  └──────────────┬──────────────┘     └───────────────┬────────────────┘  │
//! │                 │ state changes                      │ link / frames     │
//! │  ┌──────────────┴──────────────┐                     ▼                   │
//! │  │ Recorders (local::recorder) │     ┌────────────────────────────────┐  │
//! │  └─────────────────────────────┘     │ Endpoints (binding::endpoint)  │  │
//! │                                      │  Speaker ─▶ ring buffer        │  │
//! │                                      └────────────────────────────────┘  │
//! └────────────────────────────────┬────────────────────────────────────────┘
//!                                  │ service tick
//!                                  ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │               Voice transport (session::transport)                       │
//! │      LoopbackTransport (network::loopback) in process                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod binding;
pub mod config;
pub mod error;
pub mod local;
pub mod network;
pub mod protocol;
pub mod session;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Suffix appended to the primary room name to form the voice room name
    pub const VOICE_ROOM_SUFFIX: &str = "_voice_";

    /// Default playback delay handed to linked endpoints
    pub const DEFAULT_PLAY_DELAY_MS: u32 = 200;

    /// Application version sent with connect requests
    pub const DEFAULT_APP_VERSION: &str = "1.0";

    /// Default sample rate for recorders
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Playback ring buffer capacity (in frames)
    pub const ENDPOINT_BUFFER_CAPACITY: usize = 64;

    /// Service tick interval for the simulator
    pub const SERVICE_INTERVAL_MS: u64 = 20;
}
