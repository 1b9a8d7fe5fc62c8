//! Wires one intercom endpoint together from a config and a transport

use std::sync::Arc;
use std::time::Duration;

use crate::audio::buffer::{create_shared_queue, SharedCaptureQueue};
use crate::bridge::CallbackBridge;
use crate::codec::ChunkCodec;
use crate::config::AppConfig;
use crate::constants::CAPTURE_QUEUE_CHUNKS;
use crate::error::Result;
use crate::feedback::{FeedbackReporter, HealthMonitor, LinkStats};
use crate::jitter::{JitterBuffer, StartupSync};
use crate::network::{ChunkSender, ReceiverLoop, Transport};

/// All parts of one endpoint, ready to be handed to their threads
///
/// The bridge and capture queue go to the audio streams, the receiver to its
/// own thread, the reporter to the async runtime.
pub struct IntercomSession<T: Transport> {
    pub bridge: CallbackBridge<Arc<T>>,
    pub receiver: ReceiverLoop<Arc<T>>,
    pub monitor: HealthMonitor,
    pub buffer: Arc<JitterBuffer>,
    pub capture: SharedCaptureQueue,
}

impl<T: Transport> IntercomSession<T> {
    pub fn new(config: &AppConfig, transport: T) -> Result<Self> {
        config.validate()?;

        let transport = Arc::new(transport);
        let codec = ChunkCodec::new(config.audio.geometry());
        let chunks_to_buffer = config.buffer.chunks_to_buffer;

        let buffer = Arc::new(JitterBuffer::new(chunks_to_buffer, codec.geometry()));
        let sync = Arc::new(StartupSync::new(chunks_to_buffer, buffer.capacity()));
        let stats = Arc::new(LinkStats::default());
        let capture =
            create_shared_queue(codec.geometry().samples_per_chunk() * CAPTURE_QUEUE_CHUNKS);

        let sender = ChunkSender::new(transport.clone(), codec, stats.clone());
        let bridge = CallbackBridge::new(sender, buffer.clone(), sync.clone());
        let receiver = ReceiverLoop::new(
            transport,
            codec,
            buffer.clone(),
            sync.clone(),
            stats.clone(),
        );
        let monitor = HealthMonitor::new(stats, buffer.clone(), sync, capture.clone());

        let chunk_us = codec.geometry().duration_us(config.audio.frames_per_second);
        tracing::info!(
            "Session: {} frames x {} channels per chunk ({:.1} ms), buffering {} chunks \
             ({:.1} ms) in {} slots",
            codec.geometry().frames_per_chunk,
            codec.geometry().channels,
            chunk_us as f64 / 1000.0,
            chunks_to_buffer,
            (chunk_us * chunks_to_buffer as u64) as f64 / 1000.0,
            buffer.capacity()
        );

        Ok(Self {
            bridge,
            receiver,
            monitor,
            buffer,
            capture,
        })
    }

    /// Feedback reporter for this session, if enabled in the config
    pub fn reporter(&self, config: &AppConfig) -> Option<FeedbackReporter> {
        config.feedback.enabled.then(|| {
            FeedbackReporter::new(
                self.monitor.clone(),
                Duration::from_millis(config.feedback.interval_ms),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jitter::TakeOutcome;
    use crate::network::ChannelTransport;

    fn small_config(chunks_to_buffer: usize) -> AppConfig {
        let mut config = AppConfig::default();
        config.audio.frames_per_chunk = 4;
        config.audio.channels = 2;
        config.buffer.chunks_to_buffer = chunks_to_buffer;
        config
    }

    fn chunk(tag: i16) -> Vec<i16> {
        vec![tag; 8]
    }

    #[test]
    fn test_rejects_invalid_config() {
        let (a, _b) = ChannelTransport::pair();
        assert!(IntercomSession::new(&small_config(0), a).is_err());
    }

    #[test]
    fn test_two_endpoints_exchange_audio_with_buffering_delay() {
        let config = small_config(4);
        let (a, b) = ChannelTransport::pair();
        let mut alice = IntercomSession::new(&config, a).unwrap();
        let mut bob = IntercomSession::new(&config, b).unwrap();

        let silence = chunk(0);
        let mut alice_out = silence.clone();
        let mut bob_out = silence.clone();
        let mut heard = Vec::new();

        // One period at a time: Alice captures and sends, the packet arrives,
        // Bob's engine ticks
        for tag in 1..=12 {
            alice.bridge.process(&chunk(tag), &mut alice_out).unwrap();
            bob.receiver.receive_and_sync().unwrap();
            bob.bridge.process(&silence, &mut bob_out).unwrap();
            heard.push(bob_out[0]);
        }

        // First arrival is seq 0, so playback starts 4 slots behind it: four
        // periods of silence, then Alice's audio in order
        assert_eq!(heard, vec![0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8]);

        let health = bob.monitor.snapshot();
        assert!(health.synced);
        assert_eq!(health.buffer.level, 4);
        assert_eq!(health.buffer.underruns, 4);
        assert_eq!(health.buffer.overruns, 0);
        assert_eq!(health.link.chunks_received, 12);
    }

    #[test]
    fn test_lost_and_reordered_chunks() {
        let config = small_config(4);
        let (a, b) = ChannelTransport::pair();
        let mut bob = IntercomSession::new(&config, b).unwrap();
        let codec = ChunkCodec::new(config.audio.geometry());

        // Chunk 3 is lost and 5 arrives after 6; one arrival per period
        let arrivals = [0u16, 1, 2, 4, 6, 5, 7, 8, 9, 10, 11, 12];
        let mut out = chunk(0);
        let mut heard = Vec::new();
        for seq in arrivals {
            a.send(&codec.encode(seq, &chunk(seq as i16 + 1)).unwrap()).unwrap();
            bob.receiver.receive_and_sync().unwrap();
            let outcome = bob.bridge.process(&chunk(0), &mut out).unwrap();
            heard.push((outcome, out[0]));
        }

        let silent: (TakeOutcome, i16) = (TakeOutcome::Silence, 0);
        let played = |tag: i16| (TakeOutcome::Played, tag);
        assert_eq!(
            heard,
            vec![
                silent, silent, silent, silent,
                played(1), played(2), played(3), silent,
                played(5), played(6), played(7), played(8),
            ]
        );
    }

    #[test]
    fn test_capture_queue_sized_for_several_chunks() {
        let (a, _b) = ChannelTransport::pair();
        let session = IntercomSession::new(&small_config(2), a).unwrap();
        assert_eq!(session.capture.push_slice(&[1; 64]), 8 * CAPTURE_QUEUE_CHUNKS);

        let health = session.monitor.snapshot();
        assert_eq!(health.capture.overflows, 64 - 8 * CAPTURE_QUEUE_CHUNKS as u64);
    }

    #[test]
    fn test_reporter_follows_config() {
        let (a, _b) = ChannelTransport::pair();
        let mut config = small_config(2);
        let session = IntercomSession::new(&config, a).unwrap();
        assert!(session.reporter(&config).is_some());

        config.feedback.enabled = false;
        assert!(session.reporter(&config).is_none());
    }
}
