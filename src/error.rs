//! Error types for the voice session core

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capture device errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("No microphone device found")]
    NoMicrophone,

    #[error("{0} is not a valid microphone device")]
    InvalidMicrophone(String),

    #[error("Device enumeration failed: {0}")]
    Enumeration(String),
}

/// Voice session errors
///
/// These never leave the coordinator; they are logged where they occur.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Primary session is not in a room")]
    NoPrimaryRoom,

    #[error("Voice session is shut down")]
    ShutDown,

    #[error("Connection attempt already pending")]
    ConnectPending,

    #[error("Cannot connect from state {0:?}")]
    NotDisconnected(crate::protocol::VoiceSessionState),

    #[error("Transport rejected {0}")]
    Rejected(&'static str),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
