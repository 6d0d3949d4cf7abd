//! Voice session lifecycle, mirrored to the primary session

pub mod coordinator;
pub mod transport;

pub use coordinator::{voice_room_name, SessionCoordinator, Transition};
pub use transport::{
    ConnectRequest, ConnectTarget, PrimarySession, PrimarySnapshot, SharedPrimarySession,
    VoiceTransport,
};
