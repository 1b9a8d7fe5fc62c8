//! Application configuration
//!
//! Read from a TOML file (explicit path or the platform config directory),
//! every field optional. Command line flags are applied on top by the binary.
//!
//! ```toml
//! [audio]
//! frames_per_second = 44100
//! frames_per_chunk = 1024
//! channels = 2
//!
//! [network]
//! listening_port = 4444
//! destination_address = "localhost"
//! destination_port = 4444
//!
//! [buffer]
//! chunks_to_buffer = 8
//!
//! [feedback]
//! interval_ms = 1000
//! ```

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::codec::ChunkGeometry;
use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub network: NetworkConfig,
    pub buffer: BufferConfig,
    pub feedback: FeedbackConfig,
}

/// Audio engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub frames_per_second: u32,
    pub frames_per_chunk: usize,
    pub channels: u16,
    /// Input device id (see `--list-devices`); default device when absent
    pub input_device: Option<String>,
    /// Output device id; default device when absent
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            frames_per_second: DEFAULT_SAMPLE_RATE,
            frames_per_chunk: DEFAULT_FRAMES_PER_CHUNK,
            channels: DEFAULT_CHANNELS,
            input_device: None,
            output_device: None,
        }
    }
}

impl AudioConfig {
    pub fn geometry(&self) -> ChunkGeometry {
        ChunkGeometry::new(self.frames_per_chunk, self.channels)
    }
}

/// Transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub listening_port: u16,
    pub destination_address: String,
    pub destination_port: u16,
    /// Socket receive buffer in bytes; OS default when absent
    pub recv_buffer_size: Option<usize>,
    /// Receive timeout; the receive loop blocks indefinitely when absent
    pub receive_timeout_ms: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listening_port: DEFAULT_UDP_PORT,
            destination_address: "localhost".to_string(),
            destination_port: DEFAULT_UDP_PORT,
            recv_buffer_size: None,
            receive_timeout_ms: None,
        }
    }
}

/// Jitter buffer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Target buffering depth in chunks; the ring holds twice as many
    pub chunks_to_buffer: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            chunks_to_buffer: DEFAULT_CHUNKS_TO_BUFFER,
        }
    }
}

impl BufferConfig {
    pub fn capacity(&self) -> usize {
        self.chunks_to_buffer * 2
    }
}

/// Feedback reporter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: DEFAULT_FEEDBACK_INTERVAL_MS,
        }
    }
}

impl AppConfig {
    /// Default location: `<config dir>/lan-intercom/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "lan-intercom").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load from `path`, or from the default location if it exists
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => {
                    tracing::debug!("No config file, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let text = std::fs::read_to_string(&path)?;
        let config = Self::from_toml(&text)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Reject settings the core cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.buffer.chunks_to_buffer == 0 {
            return Err(Error::Config("chunks_to_buffer must be positive".into()));
        }
        if self.audio.frames_per_chunk == 0 {
            return Err(Error::Config("frames_per_chunk must be positive".into()));
        }
        if self.audio.channels == 0 {
            return Err(Error::Config("channels must be positive".into()));
        }
        if self.audio.frames_per_second == 0 {
            return Err(Error::Config("frames_per_second must be positive".into()));
        }
        if self.feedback.enabled && self.feedback.interval_ms == 0 {
            return Err(Error::Config("feedback interval must be positive".into()));
        }

        let packet_len = self.audio.geometry().packet_len();
        if packet_len > MAX_PACKET_SIZE {
            return Err(Error::Config(format!(
                "chunk of {} bytes does not fit in one UDP packet ({} max)",
                packet_len, MAX_PACKET_SIZE
            )));
        }

        if MAX_SEQ as usize % self.buffer.capacity() != 0 {
            tracing::warn!(
                "Ring capacity {} does not divide {}: one chunk is misplaced each time \
                 the sequence number wraps",
                self.buffer.capacity(),
                MAX_SEQ
            );
        }
        Ok(())
    }
}
