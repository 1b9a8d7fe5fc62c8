//! Lock-free capture queue
//!
//! Single-producer single-consumer sample queue between the input stream
//! callback and the output stream callback, which drives the intercom period.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Captured samples waiting for the next period
pub struct CaptureQueue {
    queue: ArrayQueue<i16>,
    overflow_count: AtomicUsize,
    underrun_count: AtomicUsize,
}

impl CaptureQueue {
    /// Create a queue holding up to `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            overflow_count: AtomicUsize::new(0),
            underrun_count: AtomicUsize::new(0),
        }
    }

    /// Push one sample
    /// Returns false if the queue is full (the sample is dropped)
    pub fn push(&self, sample: i16) -> bool {
        match self.queue.push(sample) {
            Ok(()) => true,
            Err(_) => {
                self.overflow_count.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Push every sample, returns how many were queued
    ///
    /// Samples that do not fit are dropped and each one is counted.
    pub fn push_slice(&self, samples: &[i16]) -> usize {
        samples.iter().filter(|&&s| self.push(s)).count()
    }

    /// Fill `out` with the oldest samples, padding with silence
    ///
    /// Returns the number of captured samples written; a short read counts as
    /// an underrun.
    pub fn pop_chunk_into(&self, out: &mut [i16]) -> usize {
        let mut filled = 0;
        for slot in out.iter_mut() {
            match self.queue.pop() {
                Some(sample) => {
                    *slot = sample;
                    filled += 1;
                }
                None => break,
            }
        }
        if filled < out.len() {
            out[filled..].fill(0);
            self.underrun_count.fetch_add(1, Ordering::Relaxed);
        }
        filled
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            overflows: self.overflow_count.load(Ordering::Relaxed) as u64,
            underruns: self.underrun_count.load(Ordering::Relaxed) as u64,
        }
    }
}

/// Capture queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Captured samples dropped because the queue was full
    pub overflows: u64,
    /// Periods that sent a chunk padded with silence
    pub underruns: u64,
}

/// Thread-safe handle to a capture queue
pub type SharedCaptureQueue = Arc<CaptureQueue>;

/// Create a new shared capture queue
pub fn create_shared_queue(capacity: usize) -> SharedCaptureQueue {
    Arc::new(CaptureQueue::new(capacity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_queue_fifo() {
        let queue = CaptureQueue::new(8);
        assert_eq!(queue.push_slice(&[1, 2, 3, 4, 5]), 5);
        assert_eq!(queue.len(), 5);

        let mut chunk = [0i16; 4];
        assert_eq!(queue.pop_chunk_into(&mut chunk), 4);
        assert_eq!(chunk, [1, 2, 3, 4]);
        assert_eq!(queue.stats().underruns, 0);
    }

    #[test]
    fn test_short_read_pads_with_silence() {
        let queue = CaptureQueue::new(8);
        queue.push_slice(&[7, 8]);

        let mut chunk = [9i16; 4];
        assert_eq!(queue.pop_chunk_into(&mut chunk), 2);
        assert_eq!(chunk, [7, 8, 0, 0]);
        assert_eq!(queue.stats().underruns, 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_overflow_drops_newest() {
        let queue = CaptureQueue::new(2);
        assert_eq!(queue.push_slice(&[1, 2, 3]), 2);
        assert!(!queue.push(4));
        assert_eq!(queue.stats().overflows, 2);

        let mut chunk = [0i16; 2];
        queue.pop_chunk_into(&mut chunk);
        assert_eq!(chunk, [1, 2]);
    }

    #[test]
    fn test_overflowing_slice_counts_every_dropped_sample() {
        let queue = CaptureQueue::new(2);
        assert_eq!(queue.push_slice(&[1, 2, 3, 4, 5]), 2);
        assert_eq!(queue.stats().overflows, 3);
        assert_eq!(queue.len(), 2);
    }
}
