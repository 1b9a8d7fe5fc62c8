//! Sequence-addressed circular jitter buffer
//!
//! ```text
//!   +-------+-------+-------+   +-------+
//!   | slot0 | slot1 | slot2 |...| slotN |     N = 2 * chunks_to_buffer - 1
//!   +-------+-------+-------+   +-------+
//! ```
//!
//! A chunk with sequence number `s` lands in slot `s % capacity`. Playback reads
//! slots in cursor order and clears them as it goes, so a slot is either FILLED
//! with an unconsumed chunk or EMPTY (all zeros). An insert into a FILLED slot
//! replaces its content (overrun); a take from an EMPTY slot yields silence
//! (underrun).
//!
//! ## Concurrency
//!
//! The receiver thread inserts while the audio callback takes. In steady state
//! they address disjoint slots, one at or ahead of the newest arrival and one at
//! or behind the oldest unplayed chunk. They meet on one slot only when the
//! sender-to-player distance reaches the whole ring (severe overrun). Each slot
//! therefore carries its own mutex: the receiver locks it, the callback only
//! `try_lock`s and plays silence for that period if the receiver holds it.
//! The callback never waits.
//!
//! The chunk being written during such a contended period is already late: the
//! cursor has moved past its slot and would only return to it one full lap
//! later. The callback marks the slot with a skip flag, and whichever side
//! next holds the lock (the receiver right after its write, or the callback on
//! an immediate retry) clears it. The chunk is counted as `discarded` and is
//! never played out of order.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::codec::ChunkGeometry;
use crate::error::CodecError;

struct Slot {
    samples: Box<[i16]>,
    filled: bool,
}

impl Slot {
    fn empty(len: usize) -> Self {
        Self {
            samples: vec![0i16; len].into_boxed_slice(),
            filled: false,
        }
    }
}

struct SlotCell {
    chunk: Mutex<Slot>,
    /// Set by the callback when it found the slot locked
    skip: AtomicBool,
}

/// What an insert did to its slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The slot was empty
    Stored,
    /// An unconsumed chunk was discarded
    Overwrote,
}

/// What a take found in its slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeOutcome {
    /// A received chunk was played and the slot cleared
    Played,
    /// The slot was empty, silence was played
    Silence,
    /// The receiver was writing this very slot, silence was played
    Contended,
}

/// Fixed-capacity ring of chunk slots
pub struct JitterBuffer {
    slots: Box<[SlotCell]>,
    chunks_to_buffer: usize,
    geometry: ChunkGeometry,
    /// Slots currently FILLED
    level: AtomicUsize,
    inserted: AtomicU64,
    overruns: AtomicU64,
    played: AtomicU64,
    underruns: AtomicU64,
    contended: AtomicU64,
    discarded: AtomicU64,
}

impl JitterBuffer {
    /// Create a ring of `2 * chunks_to_buffer` silent slots
    ///
    /// # Panics
    ///
    /// Panics if `chunks_to_buffer` is zero.
    pub fn new(chunks_to_buffer: usize, geometry: ChunkGeometry) -> Self {
        assert!(chunks_to_buffer > 0, "chunks_to_buffer must be positive");

        let capacity = chunks_to_buffer * 2;
        let samples_per_chunk = geometry.samples_per_chunk();
        let slots = (0..capacity)
            .map(|_| SlotCell {
                chunk: Mutex::new(Slot::empty(samples_per_chunk)),
                skip: AtomicBool::new(false),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            chunks_to_buffer,
            geometry,
            level: AtomicUsize::new(0),
            inserted: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            played: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            contended: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Target buffering depth (half the capacity)
    pub fn chunks_to_buffer(&self) -> usize {
        self.chunks_to_buffer
    }

    pub fn geometry(&self) -> ChunkGeometry {
        self.geometry
    }

    /// Slot a sequence number maps to
    pub fn slot_index(&self, seq: u16) -> usize {
        seq as usize % self.capacity()
    }

    /// A fresh silent block of the configured geometry
    pub fn zero_chunk(&self) -> Vec<i16> {
        vec![0i16; self.geometry.samples_per_chunk()]
    }

    /// Store a chunk at `seq % capacity`, overwriting whatever is there
    pub fn insert(&self, seq: u16, samples: &[i16]) -> Result<InsertOutcome, CodecError> {
        let expected = self.geometry.samples_per_chunk();
        if samples.len() != expected {
            return Err(CodecError::InvalidFrameSize {
                expected,
                actual: samples.len(),
            });
        }

        let index = self.slot_index(seq);
        let outcome = {
            let mut slot = self.slots[index].chunk.lock();
            slot.samples.copy_from_slice(samples);

            let outcome = if slot.filled {
                self.overruns.fetch_add(1, Ordering::Relaxed);
                InsertOutcome::Overwrote
            } else {
                slot.filled = true;
                self.level.fetch_add(1, Ordering::Relaxed);
                InsertOutcome::Stored
            };
            self.inserted.fetch_add(1, Ordering::Relaxed);
            outcome
        };

        // The flag is raised while the lock is held, so check after releasing
        self.discard_if_skipped(index);

        Ok(outcome)
    }

    /// Clear a slot the callback gave up on while it was locked
    fn discard_if_skipped(&self, index: usize) {
        let cell = &self.slots[index];
        if cell.skip.swap(false, Ordering::AcqRel) {
            let mut slot = cell.chunk.lock();
            self.discard(&mut slot);
        }
    }

    fn discard(&self, slot: &mut Slot) {
        if slot.filled {
            slot.samples.fill(0);
            slot.filled = false;
            self.level.fetch_sub(1, Ordering::Relaxed);
            self.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Read and clear the slot at `cursor % capacity`
    ///
    /// Destructive: reading the same slot again without an intervening insert
    /// yields silence.
    pub fn take(&self, cursor: usize) -> Vec<i16> {
        let mut chunk = self.zero_chunk();
        self.take_into(cursor, &mut chunk);
        chunk
    }

    /// Read and clear the slot at `cursor % capacity` into `out`
    ///
    /// Never blocks and never allocates; safe to call from the audio callback.
    ///
    /// # Panics
    ///
    /// Panics if `out` is not exactly one chunk long.
    pub fn take_into(&self, cursor: usize, out: &mut [i16]) -> TakeOutcome {
        assert_eq!(
            out.len(),
            self.geometry.samples_per_chunk(),
            "output block must hold exactly one chunk"
        );

        let cell = &self.slots[cursor % self.capacity()];
        let Some(mut slot) = cell.chunk.try_lock() else {
            out.fill(0);
            self.contended.fetch_add(1, Ordering::Relaxed);
            cell.skip.store(true, Ordering::Release);
            // The writer may have released before seeing the flag
            if let Some(mut slot) = cell.chunk.try_lock() {
                if cell.skip.swap(false, Ordering::AcqRel) {
                    self.discard(&mut slot);
                }
            }
            return TakeOutcome::Contended;
        };

        if slot.filled {
            out.copy_from_slice(&slot.samples);
            slot.samples.fill(0);
            slot.filled = false;
            self.level.fetch_sub(1, Ordering::Relaxed);
            self.played.fetch_add(1, Ordering::Relaxed);
            TakeOutcome::Played
        } else {
            out.fill(0);
            self.underruns.fetch_add(1, Ordering::Relaxed);
            TakeOutcome::Silence
        }
    }

    /// Get statistics
    pub fn stats(&self) -> JitterBufferStats {
        JitterBufferStats {
            capacity: self.capacity(),
            level: self.level.load(Ordering::Relaxed),
            inserted: self.inserted.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            played: self.played.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Jitter buffer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JitterBufferStats {
    pub capacity: usize,
    /// Slots holding an unplayed chunk
    pub level: usize,
    pub inserted: u64,
    /// Unplayed chunks discarded by a newer arrival
    pub overruns: u64,
    pub played: u64,
    /// Periods that played silence from an empty slot
    pub underruns: u64,
    /// Periods that played silence because the receiver held the slot
    pub contended: u64,
    /// Late chunks dropped after a contended period
    pub discarded: u64,
}

impl JitterBufferStats {
    /// Fraction of slots holding unplayed chunks
    pub fn fill_level(&self) -> f32 {
        if self.capacity == 0 {
            0.0
        } else {
            self.level as f32 / self.capacity as f32
        }
    }

    /// Fraction of played periods that were silent
    pub fn silence_rate(&self) -> f32 {
        let silent = self.underruns + self.contended;
        let total = self.played + silent;
        if total == 0 {
            0.0
        } else {
            silent as f32 / total as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    fn mono(frames: usize) -> ChunkGeometry {
        ChunkGeometry::new(frames, 1)
    }

    fn payload(tag: i16) -> Vec<i16> {
        vec![tag, tag + 1, -tag]
    }

    #[test]
    fn test_round_trip_then_silence() {
        let ring = JitterBuffer::new(8, mono(3));

        assert_eq!(ring.insert(21, &payload(5)).unwrap(), InsertOutcome::Stored);
        assert_eq!(ring.take(21 + 16), payload(5));
        assert_eq!(ring.take(5), ring.zero_chunk());

        let stats = ring.stats();
        assert_eq!(stats.played, 1);
        assert_eq!(stats.underruns, 1);
        assert_eq!(stats.level, 0);
    }

    #[test]
    fn test_in_order_playout() {
        let ring = JitterBuffer::new(4, mono(3));
        assert_eq!(ring.capacity(), 8);

        for seq in 0..8u16 {
            ring.insert(seq, &payload(seq as i16 * 10)).unwrap();
        }
        for cursor in 0..8usize {
            assert_eq!(ring.take(cursor), payload(cursor as i16 * 10));
        }
        // Ninth take wraps back to slot 0, already consumed
        assert_eq!(ring.take(8), vec![0; 3]);
    }

    #[test]
    fn test_out_of_order_arrival_plays_in_order() {
        let ring = JitterBuffer::new(4, mono(3));

        for seq in [3u16, 1, 0, 2] {
            ring.insert(seq, &payload(seq as i16)).unwrap();
        }
        for cursor in 0..4usize {
            assert_eq!(ring.take(cursor), payload(cursor as i16));
        }
    }

    #[test]
    fn test_overrun_keeps_newest_chunk() {
        let ring = JitterBuffer::new(4, mono(3));

        ring.insert(0, &payload(1)).unwrap();
        assert_eq!(ring.insert(8, &payload(9)).unwrap(), InsertOutcome::Overwrote);

        assert_eq!(ring.take(0), payload(9));
        let stats = ring.stats();
        assert_eq!(stats.overruns, 1);
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.level, 0);
    }

    #[test]
    fn test_sequence_wraparound_stays_in_range() {
        let ring = JitterBuffer::new(8, mono(3));
        assert_eq!(ring.capacity(), 16);
        assert_eq!(ring.slot_index(u16::MAX), 15);
        assert_eq!(ring.slot_index(u16::MAX.wrapping_add(1)), 0);

        ring.insert(u16::MAX, &payload(4)).unwrap();
        assert_eq!(ring.take(15), payload(4));
    }

    #[test]
    fn test_zero_chunk_ignores_ring_state() {
        let ring = JitterBuffer::new(2, ChunkGeometry::new(2, 2));
        ring.insert(1, &[1, 2, 3, 4]).unwrap();
        ring.insert(2, &[5, 6, 7, 8]).unwrap();

        assert_eq!(ring.zero_chunk(), vec![0; 4]);
        let _ = ring.take(1);
        assert_eq!(ring.zero_chunk(), vec![0; 4]);
    }

    #[test]
    fn test_insert_rejects_wrong_block_size() {
        let ring = JitterBuffer::new(2, mono(3));
        assert!(ring.insert(0, &[1, 2]).is_err());
        assert_eq!(ring.stats().inserted, 0);
    }

    #[test]
    fn test_take_skips_slot_held_by_writer() {
        let ring = JitterBuffer::new(2, mono(3));
        assert_eq!(ring.capacity(), 4);
        ring.insert(1, &payload(3)).unwrap();

        // Writer still holds slot 1 when the callback reaches it
        let guard = ring.slots[1].chunk.lock();
        let mut out = vec![7; 3];
        assert_eq!(ring.take_into(1, &mut out), TakeOutcome::Contended);
        assert_eq!(out, vec![0; 3]);
        drop(guard);
        ring.discard_if_skipped(1);

        // One lap later the late chunk is gone instead of playing out of order
        assert_eq!(ring.take_into(5, &mut out), TakeOutcome::Silence);
        assert_eq!(out, vec![0; 3]);

        let stats = ring.stats();
        assert_eq!(stats.contended, 1);
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.level, 0);
    }

    #[test]
    fn test_skip_flag_drops_exactly_one_late_write() {
        let ring = JitterBuffer::new(2, mono(3));

        let guard = ring.slots[1].chunk.lock();
        let mut out = vec![0; 3];
        assert_eq!(ring.take_into(1, &mut out), TakeOutcome::Contended);
        drop(guard);

        // The write that held the lock lands after the cursor passed; it
        // consumes the flag and is cleared
        ring.insert(1, &payload(4)).unwrap();
        assert_eq!(ring.take(5), ring.zero_chunk());

        // A write after that is kept
        ring.insert(9, &payload(6)).unwrap();
        assert_eq!(ring.take(9), payload(6));
        assert_eq!(ring.stats().discarded, 1);
    }

    #[test]
    fn test_concurrent_insert_and_take_keep_counts_consistent() {
        let ring = Arc::new(JitterBuffer::new(4, mono(3)));

        let writer = {
            let ring = ring.clone();
            thread::spawn(move || {
                for seq in 0..2000u16 {
                    ring.insert(seq, &payload(seq as i16)).unwrap();
                }
            })
        };
        let mut out = vec![0; 3];
        for cursor in 0..2000usize {
            ring.take_into(cursor, &mut out);
        }
        writer.join().unwrap();

        let stats = ring.stats();
        assert_eq!(stats.inserted, 2000);
        assert_eq!(
            stats.inserted,
            stats.played + stats.overruns + stats.discarded + stats.level as u64
        );
        assert_eq!(stats.played + stats.underruns + stats.contended, 2000);
    }

    proptest! {
        #[test]
        fn prop_take_returns_inserted_block_once(
            chunks_to_buffer in 1usize..32,
            seq in any::<u16>(),
            block in proptest::collection::vec(any::<i16>(), 3),
            laps in 0usize..4,
        ) {
            let ring = JitterBuffer::new(chunks_to_buffer, mono(3));
            let cursor = ring.slot_index(seq) + laps * ring.capacity();

            ring.insert(seq, &block).unwrap();
            prop_assert!(ring.slot_index(seq) < ring.capacity());
            prop_assert_eq!(ring.take(cursor), block);
            prop_assert_eq!(ring.take(cursor), ring.zero_chunk());
        }
    }
}
