//! Receive loop
//!
//! Blocks on the transport, decodes each packet and drops it into the jitter
//! buffer at `seq % capacity`. The first valid chunk primes the playback
//! cursor. Malformed packets are counted and skipped; they never stop the loop
//! or touch the ring.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::codec::ChunkCodec;
use crate::constants::MAX_PACKET_SIZE;
use crate::error::NetworkError;
use crate::feedback::LinkStats;
use crate::jitter::{InsertOutcome, JitterBuffer, StartupSync};
use crate::network::Transport;

/// Receiver side of the intercom
pub struct ReceiverLoop<T: Transport> {
    transport: T,
    codec: ChunkCodec,
    buffer: Arc<JitterBuffer>,
    sync: Arc<StartupSync>,
    stats: Arc<LinkStats>,
    running: Arc<AtomicBool>,
    recv_buf: Vec<u8>,
    samples: Vec<i16>,
}

impl<T: Transport> ReceiverLoop<T> {
    pub fn new(
        transport: T,
        codec: ChunkCodec,
        buffer: Arc<JitterBuffer>,
        sync: Arc<StartupSync>,
        stats: Arc<LinkStats>,
    ) -> Self {
        let samples = buffer.zero_chunk();
        Self {
            transport,
            codec,
            buffer,
            sync,
            stats,
            running: Arc::new(AtomicBool::new(true)),
            recv_buf: vec![0u8; MAX_PACKET_SIZE],
            samples,
        }
    }

    /// Flag that stops [`run`](Self::run) once cleared
    ///
    /// Checked between receives, so a loop blocked on a transport without a
    /// read timeout only notices it after the next packet.
    pub fn running(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Wait for the next valid chunk, buffer it, and return its sequence number
    ///
    /// Malformed packets are dropped and waiting continues. Transport errors are
    /// returned as is.
    pub fn receive_and_buffer(&mut self) -> Result<u16, NetworkError> {
        loop {
            let len = self.transport.receive(&mut self.recv_buf)?;
            let packet = &self.recv_buf[..len];

            let seq = match self.codec.decode_into(packet, &mut self.samples) {
                Ok(seq) => seq,
                Err(e) => {
                    self.stats.record_malformed();
                    tracing::debug!("Dropping malformed packet: {}", e);
                    continue;
                }
            };

            self.stats.record_received(len);
            // Decoded blocks always match the ring geometry
            if let Ok(InsertOutcome::Overwrote) = self.buffer.insert(seq, &self.samples) {
                tracing::trace!(
                    "Chunk {} overwrote unplayed slot {}",
                    seq,
                    self.buffer.slot_index(seq)
                );
            }
            return Ok(seq);
        }
    }

    /// [`receive_and_buffer`](Self::receive_and_buffer), then align playback
    /// if this is the first chunk of the stream
    pub fn receive_and_sync(&mut self) -> Result<u16, NetworkError> {
        let seq = self.receive_and_buffer()?;
        if !self.sync.is_primed() {
            if let Some(cursor) = self.sync.prime(seq) {
                tracing::info!(
                    "First chunk {} received, playback starts at slot {}",
                    seq,
                    cursor
                );
            }
        }
        Ok(seq)
    }

    /// Receive until shutdown or a fatal transport error
    pub fn run(mut self) -> Result<(), NetworkError> {
        tracing::info!(
            "Receive loop started, buffering {} chunks",
            self.buffer.chunks_to_buffer()
        );

        while self.running.load(Ordering::Relaxed) {
            match self.receive_and_sync() {
                Ok(_) => {}
                Err(e) if e.is_transient() => {
                    tracing::trace!("Receive: {}", e);
                }
                Err(e) => {
                    if !self.running.load(Ordering::Relaxed) {
                        break;
                    }
                    tracing::error!("Receive loop stopped: {}", e);
                    return Err(e);
                }
            }
        }

        tracing::debug!("Receive loop shut down");
        Ok(())
    }
}

impl<T: Transport + 'static> ReceiverLoop<T> {
    /// Run the loop on a dedicated thread
    pub fn spawn(self) -> std::io::Result<JoinHandle<Result<(), NetworkError>>> {
        thread::Builder::new()
            .name("intercom-receiver".to_string())
            .spawn(move || self.run())
    }
}
