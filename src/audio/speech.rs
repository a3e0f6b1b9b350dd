//! Speech-output serialization
//!
//! A strict FIFO task queue with a single consumer thread: a new utterance
//! only starts after the previous one's playback has fully resolved, so at
//! most one utterance is ever audible system-wide. Replaces ad-hoc
//! promise-chaining with an explicit queue that can be drained and
//! canceled deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use super::report::ReportBus;
use super::text::TextBasedLipsync;
use super::tts::TtsAudioAnalyzer;

/// One queued unit of speech output.
pub enum Utterance {
    /// An encoded audio buffer from a synthesis backend
    Audio(Vec<u8>),
    /// Text to animate without audio, with its rate multiplier
    Text(String, f32),
}

struct Shared {
    queue: Mutex<VecDeque<Utterance>>,
    available: Condvar,
    cancel_current: AtomicBool,
    shutdown: AtomicBool,
    speaking: AtomicBool,
}

/// FIFO speech queue with one worker thread.
pub struct SpeechQueue {
    shared: Arc<Shared>,
    worker: Option<thread::JoinHandle<()>>,
}

impl SpeechQueue {
    pub fn new(bus: ReportBus) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            cancel_current: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            speaking: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || worker_loop(worker_shared, bus));

        Self {
            shared,
            worker: Some(worker),
        }
    }

    /// Append an utterance; it plays once everything queued before it has
    /// finished.
    pub fn enqueue(&self, utterance: Utterance) {
        let mut queue = self.shared.queue.lock().unwrap();
        queue.push_back(utterance);
        self.shared.available.notify_one();
    }

    /// Whether an utterance is currently playing.
    pub fn is_speaking(&self) -> bool {
        self.shared.speaking.load(Ordering::Relaxed)
    }

    /// Number of utterances waiting behind the current one.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    /// Drop every pending utterance and cancel the one playing now.
    pub fn cancel_all(&self) {
        self.shared.queue.lock().unwrap().clear();
        self.shared.cancel_current.store(true, Ordering::Relaxed);
    }
}

impl Drop for SpeechQueue {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        self.shared.cancel_current.store(true, Ordering::Relaxed);
        self.shared.available.notify_one();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>, bus: ReportBus) {
    let tts = TtsAudioAnalyzer::new(bus.clone_ref());
    let text = TextBasedLipsync::new(bus);

    loop {
        let utterance = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if shared.shutdown.load(Ordering::Relaxed) {
                    return;
                }
                if let Some(utterance) = queue.pop_front() {
                    // Flip both flags under the queue lock so observers
                    // never see the popped utterance as neither queued nor
                    // speaking
                    shared.cancel_current.store(false, Ordering::Relaxed);
                    shared.speaking.store(true, Ordering::Relaxed);
                    break utterance;
                }
                queue = shared.available.wait(queue).unwrap();
            }
        };

        match utterance {
            Utterance::Audio(encoded) => {
                if let Err(e) = tts.play_and_analyze(&encoded, &shared.cancel_current) {
                    log::error!("Utterance playback failed: {}", e);
                }
            }
            Utterance::Text(message, rate) => {
                text.animate(&message, rate, &shared.cancel_current);
            }
        }

        shared.speaking.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::report::AudioVolumeData;
    use std::time::Duration;

    #[test]
    fn test_text_utterances_play_in_order_one_at_a_time() {
        let bus = ReportBus::new(256);
        let consumer_bus = bus.clone_ref();
        let queue = SpeechQueue::new(bus);

        queue.enqueue(Utterance::Text("あ".into(), 10.0));
        queue.enqueue(Utterance::Text("う".into(), 10.0));

        // Wait for both to drain
        let mut waited = Duration::ZERO;
        while (queue.pending() > 0 || queue.is_speaking()) && waited < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(10));
            waited += Duration::from_millis(10);
        }
        assert_eq!(queue.pending(), 0);
        assert!(!queue.is_speaking());

        // The last observable report is the forced silence from the final
        // utterance's completion
        assert_eq!(consumer_bus.latest().unwrap(), AudioVolumeData::SILENCE);
    }

    #[test]
    fn test_cancel_all_clears_pending() {
        let bus = ReportBus::new(256);
        let queue = SpeechQueue::new(bus);

        // Long utterance followed by a backlog
        queue.enqueue(Utterance::Text("ははははははははは".into(), 0.1));
        queue.enqueue(Utterance::Text("あ".into(), 1.0));
        queue.enqueue(Utterance::Text("う".into(), 1.0));

        thread::sleep(Duration::from_millis(50));
        queue.cancel_all();
        assert_eq!(queue.pending(), 0);

        // The canceled current utterance unwinds promptly
        let mut waited = Duration::ZERO;
        while queue.is_speaking() && waited < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(10));
            waited += Duration::from_millis(10);
        }
        assert!(!queue.is_speaking());
    }
}
