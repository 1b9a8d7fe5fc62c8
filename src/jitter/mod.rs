//! Jitter compensation: the slot ring and the playback cursor

pub mod cursor;
pub mod ring;

pub use cursor::{initial_cursor, PlaybackCursor, StartupSync};
pub use ring::{InsertOutcome, JitterBuffer, JitterBufferStats, TakeOutcome};
