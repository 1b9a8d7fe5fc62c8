//! Per-period hook driven by the audio engine
//!
//! Every period performs exactly one send and one play, in that order, so an
//! outgoing chunk leaves on every tick whatever the network is doing and the
//! output never waits on arrivals.

use std::sync::Arc;

use crate::error::CodecError;
use crate::jitter::{JitterBuffer, PlaybackCursor, StartupSync, TakeOutcome};
use crate::network::{ChunkSender, Transport};

/// Owns the sender (recorded cursor) and the playback cursor
pub struct CallbackBridge<T: Transport> {
    sender: ChunkSender<T>,
    buffer: Arc<JitterBuffer>,
    cursor: PlaybackCursor,
    sync: Arc<StartupSync>,
}

impl<T: Transport> CallbackBridge<T> {
    pub fn new(sender: ChunkSender<T>, buffer: Arc<JitterBuffer>, sync: Arc<StartupSync>) -> Self {
        let cursor = PlaybackCursor::new(buffer.capacity());
        Self {
            sender,
            buffer,
            cursor,
            sync,
        }
    }

    /// Run one audio period
    ///
    /// `input` is the freshly captured chunk, `output` receives the chunk to
    /// play. Both must be exactly one chunk long. On a wrongly sized `input`
    /// nothing is sent but the period is still played.
    pub fn process(
        &mut self,
        input: &[i16],
        output: &mut [i16],
    ) -> Result<TakeOutcome, CodecError> {
        let sent = self.sender.assign_and_send(input).map(|_| ());

        if self.cursor.sync_from(&self.sync) {
            tracing::debug!("Playback aligned at slot {}", self.cursor.position());
        }
        let outcome = self.buffer.take_into(self.cursor.position(), output);
        self.cursor.advance();

        sent.map(|_| outcome)
    }

    /// Slot the next period will play
    pub fn played(&self) -> usize {
        self.cursor.position()
    }

    /// Sequence number the next period will send
    pub fn recorded(&self) -> u16 {
        self.sender.recorded()
    }

    pub fn samples_per_chunk(&self) -> usize {
        self.buffer.geometry().samples_per_chunk()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ChunkCodec, ChunkGeometry};
    use crate::feedback::LinkStats;
    use crate::network::ChannelTransport;

    fn bridge(
        chunks_to_buffer: usize,
    ) -> (
        CallbackBridge<ChannelTransport>,
        ChannelTransport,
        Arc<JitterBuffer>,
        Arc<StartupSync>,
    ) {
        let geometry = ChunkGeometry::new(2, 1);
        let (local, peer) = ChannelTransport::pair();
        let buffer = Arc::new(JitterBuffer::new(chunks_to_buffer, geometry));
        let sync = Arc::new(StartupSync::new(chunks_to_buffer, buffer.capacity()));
        let sender = ChunkSender::new(
            local,
            ChunkCodec::new(geometry),
            Arc::new(LinkStats::default()),
        );
        (
            CallbackBridge::new(sender, buffer.clone(), sync.clone()),
            peer,
            buffer,
            sync,
        )
    }

    #[test]
    fn test_one_send_and_one_play_per_period() {
        let (mut bridge, peer, buffer, _) = bridge(4);
        buffer.insert(0, &[5, 6]).unwrap();

        let mut out = [9i16; 2];
        assert_eq!(bridge.process(&[1, 2], &mut out).unwrap(), TakeOutcome::Played);
        assert_eq!(out, [5, 6]);
        assert_eq!(bridge.played(), 1);
        assert_eq!(bridge.recorded(), 1);

        assert_eq!(bridge.process(&[3, 4], &mut out).unwrap(), TakeOutcome::Silence);
        assert_eq!(out, [0, 0]);

        let codec = ChunkCodec::new(ChunkGeometry::new(2, 1));
        let mut buf = [0u8; 16];
        let len = peer.receive(&mut buf).unwrap();
        assert_eq!(codec.decode(&buf[..len]).unwrap(), (0, vec![1, 2]));
        let len = peer.receive(&mut buf).unwrap();
        assert_eq!(codec.decode(&buf[..len]).unwrap(), (1, vec![3, 4]));
    }

    #[test]
    fn test_played_cursor_wraps_at_capacity() {
        let (mut bridge, _peer, _, _) = bridge(2);
        let mut out = [0i16; 2];
        for _ in 0..5 {
            bridge.process(&[0, 0], &mut out).unwrap();
        }
        assert_eq!(bridge.played(), 1);
    }

    #[test]
    fn test_jumps_to_primed_cursor() {
        let (mut bridge, _peer, buffer, sync) = bridge(8);
        let mut out = [0i16; 2];

        bridge.process(&[0, 0], &mut out).unwrap();
        assert_eq!(bridge.played(), 1);

        // First arrival is chunk 100: playback starts 8 chunks behind it
        buffer.insert(92, &[4, 4]).unwrap();
        buffer.insert(100, &[8, 8]).unwrap();
        sync.prime(100);

        assert_eq!(bridge.process(&[0, 0], &mut out).unwrap(), TakeOutcome::Played);
        assert_eq!(out, [4, 4]);
        assert_eq!(bridge.played(), 13);
    }

    #[test]
    fn test_bad_input_still_plays() {
        let (mut bridge, _peer, buffer, _) = bridge(2);
        buffer.insert(0, &[3, 3]).unwrap();

        let mut out = [0i16; 2];
        assert!(bridge.process(&[1], &mut out).is_err());
        assert_eq!(out, [3, 3]);
        assert_eq!(bridge.recorded(), 0);
        assert_eq!(bridge.played(), 1);
    }
}
