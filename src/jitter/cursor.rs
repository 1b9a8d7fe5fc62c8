//! Playback cursor and startup synchronisation
//!
//! The receiver sees the first sequence number, the audio callback owns the
//! playback cursor. `StartupSync` is the one-shot hand-off between the two.

use std::sync::atomic::{AtomicUsize, Ordering};

const UNSET: usize = usize::MAX;

/// Initial playback cursor for a stream whose first arrival is `first_seq`
///
/// Puts the cursor `chunks_to_buffer` slots behind the newest arrival, half the
/// ring, which leaves equal headroom for early and late packets.
pub fn initial_cursor(first_seq: u16, chunks_to_buffer: usize, capacity: usize) -> usize {
    (first_seq as i64 - chunks_to_buffer as i64).rem_euclid(capacity as i64) as usize
}

/// One-shot hand-off of the initial playback cursor
#[derive(Debug)]
pub struct StartupSync {
    chunks_to_buffer: usize,
    capacity: usize,
    start: AtomicUsize,
}

impl StartupSync {
    pub fn new(chunks_to_buffer: usize, capacity: usize) -> Self {
        Self {
            chunks_to_buffer,
            capacity,
            start: AtomicUsize::new(UNSET),
        }
    }

    /// Record the first arrival; later calls are ignored
    ///
    /// Returns the cursor if this call primed the synchroniser.
    pub fn prime(&self, first_seq: u16) -> Option<usize> {
        let cursor = initial_cursor(first_seq, self.chunks_to_buffer, self.capacity);
        self.start
            .compare_exchange(UNSET, cursor, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| cursor)
    }

    pub fn start_cursor(&self) -> Option<usize> {
        match self.start.load(Ordering::Acquire) {
            UNSET => None,
            cursor => Some(cursor),
        }
    }

    pub fn is_primed(&self) -> bool {
        self.start_cursor().is_some()
    }
}

/// Next slot to play, wrapping at the ring capacity
#[derive(Debug, Clone)]
pub struct PlaybackCursor {
    position: usize,
    capacity: usize,
    synced: bool,
}

impl PlaybackCursor {
    /// Cursor at slot 0, not yet aligned with the incoming stream
    pub fn new(capacity: usize) -> Self {
        Self {
            position: 0,
            capacity,
            synced: false,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Jump to the primed start position, once
    ///
    /// Returns `true` on the call that performed the jump.
    pub fn sync_from(&mut self, sync: &StartupSync) -> bool {
        if self.synced {
            return false;
        }
        match sync.start_cursor() {
            Some(start) => {
                self.position = start % self.capacity;
                self.synced = true;
                true
            }
            None => false,
        }
    }

    /// Step to the next slot
    pub fn advance(&mut self) {
        self.position = (self.position + 1) % self.capacity;
    }
}
