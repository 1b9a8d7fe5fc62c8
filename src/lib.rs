//! # LAN Intercom
//!
//! Full-duplex, low-latency intercom between two hosts over UDP, built around a
//! sequence-addressed jitter buffer.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────── HOST A ────────────────────────────────┐
//! │                                                                       │
//! │  Microphone ──► input stream ──► CaptureQueue                         │
//! │                                      │                                │
//! │                                      ▼                                │
//! │        ┌─────────────── CallbackBridge (one period) ──────────────┐   │
//! │        │ 1. ChunkSender: seq = recorded++ ──► Transport ──────────┼───┼──► to B
//! │        │ 2. JitterBuffer::take(played++)  ──► output chunk        │   │
//! │        └──────────────────────────────────────────────────────────┘   │
//! │                                      ▲                                │
//! │                                      │ slot = seq % (2 × ctb)         │
//! │  from B ──► Transport ──► ReceiverLoop (own thread) ──► insert        │
//! │                               │                                       │
//! │                               └─► StartupSync: first seq primes play  │
//! │                                                                       │
//! │  FeedbackReporter (tokio interval) ──► HealthReport hook              │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `ctb` is `chunks_to_buffer`.
//!
//! Packets: `[seq: u16 BE][samples: i16 BE × frames_per_chunk × channels]`.

pub mod audio;
pub mod bridge;
pub mod codec;
pub mod config;
pub mod error;
pub mod feedback;
pub mod jitter;
pub mod network;
pub mod session;

pub use bridge::CallbackBridge;
pub use codec::{ChunkCodec, ChunkGeometry};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use jitter::{JitterBuffer, PlaybackCursor, StartupSync};
pub use session::IntercomSession;

/// Application-wide constants
pub mod constants {
    /// Sequence numbers wrap at this modulus (16-bit field on the wire)
    pub const MAX_SEQ: u32 = 65536;

    /// Default number of chunks buffered before playback (ring holds twice this)
    pub const DEFAULT_CHUNKS_TO_BUFFER: usize = 8;

    /// Default sample rate
    pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Default frames per chunk (one audio engine period)
    pub const DEFAULT_FRAMES_PER_CHUNK: usize = 1024;

    /// Default UDP port, used both for listening and for the peer
    pub const DEFAULT_UDP_PORT: u16 = 4444;

    /// Default feedback period in milliseconds
    pub const DEFAULT_FEEDBACK_INTERVAL_MS: u64 = 1000;

    /// Largest UDP payload we accept
    pub const MAX_PACKET_SIZE: usize = 65507;

    /// Size of the sequence number header
    pub const SEQ_HEADER_SIZE: usize = 2;

    /// Chunks of captured audio the capture queue can hold
    pub const CAPTURE_QUEUE_CHUNKS: usize = 4;
}
