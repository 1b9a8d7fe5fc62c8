//! Chunk wire codec
//!
//! Packs a sequence number and a block of interleaved `i16` samples into the
//! fixed-size packet exchanged between the two intercom peers.

pub mod chunk;

pub use chunk::{ChunkCodec, ChunkGeometry};
