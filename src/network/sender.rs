//! Chunk sender
//!
//! Stamps each captured chunk with the next sequence number and hands it to
//! the transport. Runs inside the audio callback, so it never waits on
//! anything and reuses one packet buffer.

use bytes::BytesMut;
use std::sync::Arc;

use crate::codec::ChunkCodec;
use crate::error::CodecError;
use crate::feedback::LinkStats;
use crate::network::Transport;

/// Sender side of the intercom; owns the recorded cursor
pub struct ChunkSender<T: Transport> {
    transport: T,
    codec: ChunkCodec,
    /// Next outgoing sequence number, wraps at 65536
    recorded: u16,
    packet: BytesMut,
    stats: Arc<LinkStats>,
}

impl<T: Transport> ChunkSender<T> {
    pub fn new(transport: T, codec: ChunkCodec, stats: Arc<LinkStats>) -> Self {
        let packet = BytesMut::with_capacity(codec.packet_len());
        Self {
            transport,
            codec,
            recorded: 0,
            packet,
            stats,
        }
    }

    /// Sequence number the next chunk will carry
    pub fn recorded(&self) -> u16 {
        self.recorded
    }

    /// Encode `samples` with the current sequence number, send, advance
    ///
    /// A transport failure counts as a lost packet: it is recorded and the
    /// sequence number still advances. Only a wrongly sized block is an error.
    pub fn assign_and_send(&mut self, samples: &[i16]) -> Result<u16, CodecError> {
        let seq = self.recorded;

        self.packet.clear();
        self.codec.encode_into(seq, samples, &mut self.packet)?;

        match self.transport.send(&self.packet) {
            Ok(()) => self.stats.record_sent(self.packet.len()),
            Err(e) => {
                self.stats.record_send_failure();
                tracing::trace!("Send of chunk {} failed: {}", seq, e);
            }
        }

        self.recorded = self.recorded.wrapping_add(1);
        Ok(seq)
    }
}
