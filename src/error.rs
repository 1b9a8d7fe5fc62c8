//! Error types for the intercom

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio device errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Chunk codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A received packet does not have the size implied by the chunk geometry.
    #[error("Invalid packet length: expected {expected} bytes, got {actual}")]
    InvalidPacketLength { expected: usize, actual: usize },

    /// A sample block handed to the codec or the ring has the wrong length.
    #[error("Invalid frame size: expected {expected} samples, got {actual}")]
    InvalidFrameSize { expected: usize, actual: usize },
}

/// Transport errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Address resolution failed: {0}")]
    Resolve(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),

    /// The peer's port is closed (ICMP port unreachable surfaced on the socket).
    #[error("Peer unreachable")]
    PeerUnreachable,

    #[error("Transport closed")]
    Closed,

    #[error("Timeout")]
    Timeout,
}

impl NetworkError {
    /// Conditions the receive loop skips over instead of stopping.
    pub fn is_transient(&self) -> bool {
        matches!(self, NetworkError::Timeout | NetworkError::PeerUnreachable)
    }
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
