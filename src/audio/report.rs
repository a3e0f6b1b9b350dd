//! Lock-free report channel for sharing band-energy reports between threads
//!
//! Audio callbacks run on a real-time thread with strict timing requirements,
//! so reports are handed to the UI/engine thread through a SPSC ring buffer
//! instead of a mutex-held queue. The consumer drains the ring once per frame
//! and keeps only the newest report: mouth-state selection depends on smoothed
//! history, not on individual samples, so coalescing is lossless in practice
//! and the latest report always wins.

use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapRb,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

/// Short-window band-energy summary produced by any audio analyzer.
///
/// `rms` is the wideband root-mean-square level; `low` and `high` are mean
/// energies below and above the ~700 Hz split. All values are non-negative.
/// The exact semantics depend on the producer (live capture reports true
/// band energies, the TTS analyzer reports an approximation).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AudioVolumeData {
    pub rms: f32,
    pub low: f32,
    pub high: f32,
}

impl AudioVolumeData {
    /// The all-zero report every producer emits exactly once on stop/end,
    /// forcing the mouth closed.
    pub const SILENCE: Self = Self {
        rms: 0.0,
        low: 0.0,
        high: 0.0,
    };

    pub fn new(rms: f32, low: f32, high: f32) -> Self {
        Self { rms, low, high }
    }
}

/// Anything that can hand the engine its next band-energy report.
///
/// Implemented by the consumer side of [`ReportBus`]; an in-process DSP
/// pipeline reading from a file or network source can implement it directly.
pub trait AudioReportProducer {
    /// The next report, or `None` when no new report has arrived.
    fn next_report(&mut self) -> Option<AudioVolumeData>;
}

/// Producer half of the report channel (owned by an analysis thread)
pub struct ReportProducer {
    producer: ringbuf::HeapProd<AudioVolumeData>,
    reports_sent: Arc<AtomicU64>,
}

impl ReportProducer {
    /// Push a single report into the channel.
    ///
    /// Lock-free and safe to call from audio callbacks. If the ring is full
    /// the report is dropped; the consumer only keeps the newest report per
    /// drain, so a drop under backlog changes nothing it would have seen.
    #[inline]
    pub fn push(&mut self, report: AudioVolumeData) {
        let _ = self.producer.try_push(report);
        self.reports_sent.fetch_add(1, Ordering::Relaxed);
    }
}

/// Consumer half of the report channel (owned by the engine thread)
pub struct ReportConsumer {
    consumer: ringbuf::HeapCons<AudioVolumeData>,
    reports_sent: Arc<AtomicU64>,
}

impl ReportConsumer {
    /// Drain every queued report and return the newest one.
    ///
    /// Returns `None` when nothing arrived since the last drain; the caller
    /// holds the previous mouth state in that case.
    pub fn latest(&mut self) -> Option<AudioVolumeData> {
        let mut newest = None;
        while let Some(report) = self.consumer.try_pop() {
            newest = Some(report);
        }
        newest
    }

    /// Total reports pushed by the producer side (for statistics)
    pub fn reports_sent(&self) -> u64 {
        self.reports_sent.load(Ordering::Relaxed)
    }
}

impl AudioReportProducer for ReportConsumer {
    fn next_report(&mut self) -> Option<AudioVolumeData> {
        self.latest()
    }
}

/// Thread-safe report channel shared between one producer and one consumer.
///
/// The wrapper keeps both halves behind `try_lock` so that callers which
/// never split the bus (audio callbacks, stop paths pushing the final
/// silence report) can still deliver through it without blocking.
pub struct ReportBus {
    producer: Arc<Mutex<Option<ReportProducer>>>,
    consumer: Arc<Mutex<Option<ReportConsumer>>>,
    reports_sent: Arc<AtomicU64>,
}

impl ReportBus {
    /// Create a new report channel holding up to `capacity` queued reports.
    pub fn new(capacity: usize) -> Self {
        let rb = HeapRb::<AudioVolumeData>::new(capacity);
        let (prod, cons) = rb.split();

        let reports_sent = Arc::new(AtomicU64::new(0));

        let producer = ReportProducer {
            producer: prod,
            reports_sent: Arc::clone(&reports_sent),
        };

        let consumer = ReportConsumer {
            consumer: cons,
            reports_sent: Arc::clone(&reports_sent),
        };

        Self {
            producer: Arc::new(Mutex::new(Some(producer))),
            consumer: Arc::new(Mutex::new(Some(consumer))),
            reports_sent,
        }
    }

    /// Take the producer handle (an analysis thread should call this once)
    pub fn take_producer(&self) -> Option<ReportProducer> {
        self.producer.lock().unwrap().take()
    }

    /// Take the consumer handle (the engine thread should call this once)
    pub fn take_consumer(&self) -> Option<ReportConsumer> {
        self.consumer.lock().unwrap().take()
    }

    /// Push a report through the shared producer handle.
    ///
    /// Uses `try_lock` so a contended push from a real-time callback is
    /// skipped rather than blocked; the next report supersedes it anyway.
    pub fn push(&self, report: AudioVolumeData) -> bool {
        if let Ok(mut guard) = self.producer.try_lock() {
            if let Some(ref mut prod) = *guard {
                prod.push(report);
                return true;
            }
        }
        false
    }

    /// Drain queued reports through the shared consumer handle and return
    /// the newest one.
    pub fn latest(&self) -> Option<AudioVolumeData> {
        if let Ok(mut guard) = self.consumer.lock() {
            if let Some(ref mut cons) = *guard {
                return cons.latest();
            }
        }
        None
    }

    /// Total reports pushed so far
    pub fn reports_sent(&self) -> u64 {
        self.reports_sent.load(Ordering::Relaxed)
    }

    /// Clone reference to share between threads
    pub fn clone_ref(&self) -> Self {
        Self {
            producer: Arc::clone(&self.producer),
            consumer: Arc::clone(&self.consumer),
            reports_sent: Arc::clone(&self.reports_sent),
        }
    }
}

impl Clone for ReportBus {
    fn clone(&self) -> Self {
        self.clone_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_wins() {
        let bus = ReportBus::new(8);

        bus.push(AudioVolumeData::new(0.1, 0.0, 0.0));
        bus.push(AudioVolumeData::new(0.2, 0.0, 0.0));
        bus.push(AudioVolumeData::new(0.3, 0.0, 0.0));

        let latest = bus.latest().unwrap();
        assert_eq!(latest.rms, 0.3);

        // Drained: nothing new until the next push
        assert!(bus.latest().is_none());
    }

    #[test]
    fn test_empty_channel() {
        let bus = ReportBus::new(4);
        assert!(bus.latest().is_none());
        assert_eq!(bus.reports_sent(), 0);
    }

    #[test]
    fn test_split_halves() {
        let bus = ReportBus::new(4);

        let mut producer = bus.take_producer().unwrap();
        let mut consumer = bus.take_consumer().unwrap();

        producer.push(AudioVolumeData::SILENCE);
        producer.push(AudioVolumeData::new(0.5, 0.2, 0.1));

        let latest = consumer.latest().unwrap();
        assert_eq!(latest.rms, 0.5);
        assert_eq!(consumer.reports_sent(), 2);

        // Once taken, the shared handles are gone
        assert!(!bus.push(AudioVolumeData::SILENCE));
        assert!(bus.latest().is_none());
    }

    #[test]
    fn test_overflow_keeps_consumer_consistent() {
        let bus = ReportBus::new(2);

        for i in 0..10 {
            bus.push(AudioVolumeData::new(i as f32 * 0.01, 0.0, 0.0));
        }

        // Reports beyond capacity were dropped, but a drain still yields
        // a report and the channel stays usable.
        assert!(bus.latest().is_some());
        bus.push(AudioVolumeData::new(0.99, 0.0, 0.0));
        assert_eq!(bus.latest().unwrap().rms, 0.99);
    }
}
