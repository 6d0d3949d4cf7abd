//! Voice client and the in-process transport it is tested against

pub mod client;
pub mod loopback;

pub use client::{VoiceNetwork, VoiceStatus};
pub use loopback::{LoopbackTransport, RemotePeer, TransportOp};
