//! Band-energy analyzer for raw sample streams
//!
//! Reduces a mono sample stream to periodic `{rms, low, high}` reports.
//! A one-pole low-pass at ~700 Hz splits the signal; per-sample energies are
//! accumulated over roughly one video-frame interval and summarized at the
//! window boundary. Cheap enough to run inline in a real-time audio callback:
//! no allocation, a handful of multiply-adds per sample.

use super::report::AudioVolumeData;

/// Low-pass cutoff for the band split, in Hz.
const SPLIT_CUTOFF_HZ: f32 = 700.0;

/// Reports per second the window size is derived from.
const REPORT_RATE_HZ: u32 = 60;

/// Streaming reducer from raw samples to band-energy reports.
///
/// Knows nothing about mouth states; it is a pure signal-to-features stage.
pub struct VolumeAnalyzer {
    low_state: f32,
    low_alpha: f32,
    rms_sum: f64,
    low_energy: f64,
    high_energy: f64,
    sample_count: usize,
    report_samples: usize,
}

impl VolumeAnalyzer {
    pub fn new(sample_rate: u32) -> Self {
        let sample_rate = sample_rate.max(1);
        Self {
            low_state: 0.0,
            low_alpha: 1.0
                - (-2.0 * std::f32::consts::PI * SPLIT_CUTOFF_HZ / sample_rate as f32).exp(),
            rms_sum: 0.0,
            low_energy: 0.0,
            high_energy: 0.0,
            sample_count: 0,
            report_samples: ((sample_rate / REPORT_RATE_HZ) as usize).max(1),
        }
    }

    /// Number of samples accumulated per report window.
    pub fn report_interval(&self) -> usize {
        self.report_samples
    }

    /// Feed a block of mono samples, emitting a report each time a window
    /// fills. Partial windows carry over to the next call; an empty block
    /// is a no-op.
    pub fn process<F: FnMut(AudioVolumeData)>(&mut self, samples: &[f32], mut emit: F) {
        for &x in samples {
            let low = self.low_state + self.low_alpha * (x - self.low_state);
            self.low_state = low;
            let high = x - low;

            self.rms_sum += (x * x) as f64;
            self.low_energy += (low * low) as f64;
            self.high_energy += (high * high) as f64;
            self.sample_count += 1;

            if self.sample_count >= self.report_samples {
                let n = self.sample_count as f64;
                emit(AudioVolumeData {
                    rms: (self.rms_sum / n).sqrt() as f32,
                    low: (self.low_energy / n) as f32,
                    high: (self.high_energy / n) as f32,
                });
                self.rms_sum = 0.0;
                self.low_energy = 0.0;
                self.high_energy = 0.0;
                self.sample_count = 0;
            }
        }
    }

    /// Discard any partially accumulated window and filter state.
    pub fn reset(&mut self) {
        self.low_state = 0.0;
        self.rms_sum = 0.0;
        self.low_energy = 0.0;
        self.high_energy = 0.0;
        self.sample_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(analyzer: &mut VolumeAnalyzer, samples: &[f32]) -> Vec<AudioVolumeData> {
        let mut out = Vec::new();
        analyzer.process(samples, |r| out.push(r));
        out
    }

    #[test]
    fn test_window_size() {
        assert_eq!(VolumeAnalyzer::new(48000).report_interval(), 800);
        assert_eq!(VolumeAnalyzer::new(44100).report_interval(), 735);
        // Degenerate rates still produce a usable window
        assert_eq!(VolumeAnalyzer::new(30).report_interval(), 1);
    }

    #[test]
    fn test_partial_window_carries_over() {
        let mut analyzer = VolumeAnalyzer::new(48000);
        let block = vec![0.1_f32; 799];
        assert!(collect(&mut analyzer, &block).is_empty());

        // One more sample completes the window
        let reports = collect(&mut analyzer, &[0.1]);
        assert_eq!(reports.len(), 1);
    }

    #[test]
    fn test_empty_input_is_noop() {
        let mut analyzer = VolumeAnalyzer::new(48000);
        assert!(collect(&mut analyzer, &[]).is_empty());
    }

    #[test]
    fn test_dc_signal_measures_as_low_band() {
        let mut analyzer = VolumeAnalyzer::new(48000);
        // Long constant block: the low-pass converges onto the DC level,
        // so nearly all energy lands in the low band.
        let block = vec![0.5_f32; 4800];
        let reports = collect(&mut analyzer, &block);
        assert_eq!(reports.len(), 6);

        let last = reports.last().unwrap();
        assert!((last.rms - 0.5).abs() < 1e-3, "rms = {}", last.rms);
        assert!((last.low - 0.25).abs() < 1e-2, "low = {}", last.low);
        assert!(last.high < 1e-3, "high = {}", last.high);
    }

    #[test]
    fn test_alternating_signal_measures_as_high_band() {
        let mut analyzer = VolumeAnalyzer::new(48000);
        // Nyquist-rate alternation is far above the 700 Hz split
        let block: Vec<f32> = (0..1600)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let reports = collect(&mut analyzer, &block);
        let last = reports.last().unwrap();
        assert!(last.high > last.low * 10.0, "high={} low={}", last.high, last.low);
    }

    #[test]
    fn test_silence_reports_zero() {
        let mut analyzer = VolumeAnalyzer::new(48000);
        let reports = collect(&mut analyzer, &vec![0.0_f32; 800]);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0], AudioVolumeData::SILENCE);
    }
}
