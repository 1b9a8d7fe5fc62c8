//! Link health counters and the periodic feedback reporter
//!
//! The sender and receiver bump lock-free counters; a reporter task samples
//! them on a fixed period, turns consecutive samples into a [`HealthReport`],
//! hands it to a [`FeedbackHook`] and publishes it on a watch channel of which
//! it is the only writer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::audio::buffer::{CaptureStats, SharedCaptureQueue};
use crate::jitter::{JitterBuffer, JitterBufferStats, StartupSync};

/// Transport-level counters shared by sender and receiver
#[derive(Debug, Default)]
pub struct LinkStats {
    chunks_sent: AtomicU64,
    bytes_sent: AtomicU64,
    send_failures: AtomicU64,
    chunks_received: AtomicU64,
    bytes_received: AtomicU64,
    malformed_packets: AtomicU64,
}

impl LinkStats {
    pub fn record_sent(&self, bytes: usize) {
        self.chunks_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: usize) {
        self.chunks_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        LinkSnapshot {
            chunks_sent: self.chunks_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            chunks_received: self.chunks_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            malformed_packets: self.malformed_packets.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`LinkStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSnapshot {
    pub chunks_sent: u64,
    pub bytes_sent: u64,
    pub send_failures: u64,
    pub chunks_received: u64,
    pub bytes_received: u64,
    pub malformed_packets: u64,
}

/// Everything the core exposes about its health at one instant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthSnapshot {
    pub link: LinkSnapshot,
    pub buffer: JitterBufferStats,
    pub capture: CaptureStats,
    /// Whether the first chunk has arrived and playback is aligned
    pub synced: bool,
}

/// Reads the shared counters
#[derive(Clone)]
pub struct HealthMonitor {
    link: Arc<LinkStats>,
    buffer: Arc<JitterBuffer>,
    sync: Arc<StartupSync>,
    capture: SharedCaptureQueue,
}

impl HealthMonitor {
    pub fn new(
        link: Arc<LinkStats>,
        buffer: Arc<JitterBuffer>,
        sync: Arc<StartupSync>,
        capture: SharedCaptureQueue,
    ) -> Self {
        Self {
            link,
            buffer,
            sync,
            capture,
        }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            link: self.link.snapshot(),
            buffer: self.buffer.stats(),
            capture: self.capture.stats(),
            synced: self.sync.is_primed(),
        }
    }
}

/// Health over one feedback interval
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    /// Totals at the end of the interval
    pub totals: HealthSnapshot,
    pub interval: Duration,
    pub chunks_sent: u64,
    pub chunks_received: u64,
    pub sent_kbps: f64,
    pub received_kbps: f64,
    pub malformed_packets: u64,
    pub overruns: u64,
    /// Periods that played silence (underrun or contended slot)
    pub silent_periods: u64,
    /// Periods that sent a chunk padded because capture fell behind
    pub capture_underruns: u64,
    pub capture_overflows: u64,
}

impl HealthReport {
    /// Delta between two snapshots taken `interval` apart
    pub fn between(
        previous: &HealthSnapshot,
        current: HealthSnapshot,
        interval: Duration,
    ) -> Self {
        let secs = interval.as_secs_f64();
        let kbps = |bytes: u64| {
            if secs > 0.0 {
                bytes as f64 * 8.0 / 1000.0 / secs
            } else {
                0.0
            }
        };

        let link = &current.link;
        let prev = &previous.link;
        let silent_now = current.buffer.underruns + current.buffer.contended;
        let silent_before = previous.buffer.underruns + previous.buffer.contended;

        Self {
            interval,
            chunks_sent: link.chunks_sent.saturating_sub(prev.chunks_sent),
            chunks_received: link.chunks_received.saturating_sub(prev.chunks_received),
            sent_kbps: kbps(link.bytes_sent.saturating_sub(prev.bytes_sent)),
            received_kbps: kbps(link.bytes_received.saturating_sub(prev.bytes_received)),
            malformed_packets: link
                .malformed_packets
                .saturating_sub(prev.malformed_packets),
            overruns: current.buffer.overruns.saturating_sub(previous.buffer.overruns),
            silent_periods: silent_now.saturating_sub(silent_before),
            capture_underruns: current
                .capture
                .underruns
                .saturating_sub(previous.capture.underruns),
            capture_overflows: current
                .capture
                .overflows
                .saturating_sub(previous.capture.overflows),
            totals: current,
        }
    }
}

/// Receives one report per feedback period
pub trait FeedbackHook: Send + 'static {
    fn report(&mut self, report: &HealthReport);
}

impl<F> FeedbackHook for F
where
    F: FnMut(&HealthReport) + Send + 'static,
{
    fn report(&mut self, report: &HealthReport) {
        self(report)
    }
}

/// Hook that writes each report to the log
pub struct LogFeedback;

impl FeedbackHook for LogFeedback {
    fn report(&mut self, report: &HealthReport) {
        let buffer = &report.totals.buffer;
        tracing::info!(
            "sent {:.1} kbps ({} chunks), received {:.1} kbps ({} chunks), buffer {}/{} \
             ({:.0}% full), silent {} ({:.1}% overall), overruns {}, malformed {}",
            report.sent_kbps,
            report.chunks_sent,
            report.received_kbps,
            report.chunks_received,
            buffer.level,
            buffer.capacity,
            buffer.fill_level() * 100.0,
            report.silent_periods,
            buffer.silence_rate() * 100.0,
            report.overruns,
            report.malformed_packets
        );
        if report.capture_underruns > 0 || report.capture_overflows > 0 {
            tracing::warn!(
                "capture fell behind: {} padded chunks, {} dropped samples",
                report.capture_underruns,
                report.capture_overflows
            );
        }
    }
}

/// Periodic reporter task
pub struct FeedbackReporter {
    monitor: HealthMonitor,
    period: Duration,
    publisher: watch::Sender<Option<HealthReport>>,
}

impl FeedbackReporter {
    pub fn new(monitor: HealthMonitor, period: Duration) -> Self {
        let (publisher, _) = watch::channel(None);
        Self {
            monitor,
            period,
            publisher,
        }
    }

    /// Latest report, `None` until the first period has elapsed
    pub fn subscribe(&self) -> watch::Receiver<Option<HealthReport>> {
        self.publisher.subscribe()
    }

    /// Start reporting on the current tokio runtime
    pub fn spawn<H: FeedbackHook>(self, mut hook: H) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            let mut previous = self.monitor.snapshot();
            let mut last = Instant::now();
            loop {
                ticker.tick().await;

                let now = Instant::now();
                let current = self.monitor.snapshot();
                let report = HealthReport::between(&previous, current.clone(), now - last);
                hook.report(&report);
                self.publisher.send_replace(Some(report));

                previous = current;
                last = now;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::create_shared_queue;
    use crate::codec::ChunkGeometry;
    use std::sync::atomic::AtomicUsize;

    fn monitor() -> (HealthMonitor, Arc<LinkStats>, Arc<JitterBuffer>, SharedCaptureQueue) {
        let link = Arc::new(LinkStats::default());
        let buffer = Arc::new(JitterBuffer::new(4, ChunkGeometry::new(2, 1)));
        let sync = Arc::new(StartupSync::new(4, buffer.capacity()));
        let capture = create_shared_queue(4);
        (
            HealthMonitor::new(link.clone(), buffer.clone(), sync, capture.clone()),
            link,
            buffer,
            capture,
        )
    }

    #[test]
    fn test_report_deltas_and_rates() {
        let (monitor, link, buffer, _) = monitor();
        let before = monitor.snapshot();

        for _ in 0..10 {
            link.record_sent(1250);
        }
        link.record_received(2500);
        link.record_malformed();
        buffer.insert(0, &[1, 1]).unwrap();
        buffer.insert(8, &[2, 2]).unwrap();
        let _ = buffer.take(0);
        let _ = buffer.take(1);

        let report = HealthReport::between(&before, monitor.snapshot(), Duration::from_secs(1));
        assert_eq!(report.chunks_sent, 10);
        assert!((report.sent_kbps - 100.0).abs() < 1e-9);
        assert!((report.received_kbps - 20.0).abs() < 1e-9);
        assert_eq!(report.chunks_received, 1);
        assert_eq!(report.malformed_packets, 1);
        assert_eq!(report.overruns, 1);
        assert_eq!(report.silent_periods, 1);
        assert!(!report.totals.synced);
        assert!((report.totals.buffer.silence_rate() - 0.5).abs() < 1e-6);
        assert_eq!(report.totals.buffer.fill_level(), 0.0);
    }

    #[test]
    fn test_report_includes_capture_shortfall() {
        let (monitor, _, _, capture) = monitor();
        let before = monitor.snapshot();

        capture.push_slice(&[1, 2, 3, 4, 5, 6]);
        let mut chunk = [0i16; 3];
        capture.pop_chunk_into(&mut chunk);
        capture.pop_chunk_into(&mut chunk);

        let report = HealthReport::between(&before, monitor.snapshot(), Duration::from_secs(1));
        assert_eq!(report.capture_overflows, 2);
        assert_eq!(report.capture_underruns, 1);
        assert_eq!(report.totals.capture.underruns, 1);
    }

    #[test]
    fn test_zero_interval_has_zero_rate() {
        let (monitor, link, _, _) = monitor();
        link.record_sent(100);
        let report = HealthReport::between(
            &HealthSnapshot::default(),
            monitor.snapshot(),
            Duration::ZERO,
        );
        assert_eq!(report.sent_kbps, 0.0);
        assert_eq!(report.chunks_sent, 1);
    }

    #[tokio::test]
    async fn test_reporter_invokes_hook_and_publishes() {
        let (monitor, link, _, _) = monitor();
        let reporter = FeedbackReporter::new(monitor, Duration::from_millis(10));
        let mut reports = reporter.subscribe();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = reporter.spawn(move |_: &HealthReport| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        link.record_sent(10);
        tokio::time::timeout(Duration::from_secs(5), reports.changed())
            .await
            .expect("no report within timeout")
            .unwrap();
        handle.abort();

        assert!(calls.load(Ordering::SeqCst) >= 1);
        assert!(reports.borrow().is_some());
    }
}
