//! Mouth-state selection
//!
//! Turns smoothed band-energy history into one of five discrete mouth
//! shapes. Two strategies share the state: a fixed-threshold standard mode,
//! and an HQ mode that adapts to the signal's noise floor and dynamic range
//! and walks an explicit per-state transition table with hysteresis bands.
//! Both are gated by a minimum hold time between accepted changes so the
//! overlay never flickers from rapid alternation.

use std::time::{Duration, Instant};

use crate::audio::report::AudioVolumeData;

/// Discrete mouth shape, each backed by an optional sprite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouthState {
    #[default]
    Closed,
    Open,
    Half,
    E,
    U,
}

impl MouthState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::Half => "half",
            Self::E => "e",
            Self::U => "u",
        }
    }
}

/// Which optional sprites the loaded set provides. `closed` and `open` are
/// always present; the selector only reaches for `half`/`e`/`u` when the
/// sprite exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpriteFlags {
    pub has_half: bool,
    pub has_e: bool,
    pub has_u: bool,
}

struct Thresholds {
    closed: f32,
    half: f32,
}

const HOLD_HQ: Duration = Duration::from_millis(45);
const HOLD_STANDARD: Duration = Duration::from_millis(70);

/// Sensitivity-scaled smoothing and threshold state for one mouth.
pub struct MouthTracker {
    /// 0-100, higher reacts to quieter input
    sensitivity: f32,
    hq_audio: bool,
    min_hold: Duration,

    volume: f32,
    smoothed_high_ratio: f32,
    envelope: f32,
    noise_floor: f32,
    level_peak: f32,

    state: MouthState,
    last_change: Option<Instant>,
}

impl MouthTracker {
    pub fn new(sensitivity: f32, hq_audio: bool) -> Self {
        Self {
            sensitivity: sensitivity.clamp(0.0, 100.0),
            hq_audio,
            min_hold: if hq_audio { HOLD_HQ } else { HOLD_STANDARD },
            volume: 0.0,
            smoothed_high_ratio: 0.0,
            envelope: 0.0,
            noise_floor: 0.002,
            level_peak: 0.02,
            state: MouthState::Closed,
            last_change: None,
        }
    }

    pub fn state(&self) -> MouthState {
        self.state
    }

    /// Smoothed (standard) or shaped (HQ) level, for meter display.
    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_sensitivity(&mut self, value: f32) {
        self.sensitivity = value.clamp(0.0, 100.0);
    }

    pub fn set_hq_audio_enabled(&mut self, enabled: bool) {
        self.hq_audio = enabled;
        self.min_hold = if enabled { HOLD_HQ } else { HOLD_STANDARD };
        self.reset_stats();
    }

    pub fn hq_audio_enabled(&self) -> bool {
        self.hq_audio
    }

    /// Drop all smoothing history back to the initial quiet state.
    pub fn reset_stats(&mut self) {
        self.volume = 0.0;
        self.smoothed_high_ratio = 0.0;
        self.envelope = 0.0;
        self.noise_floor = 0.002;
        self.level_peak = 0.02;
    }

    /// Set the state unconditionally, bypassing the hold gate. Used on load,
    /// reset, and stop.
    pub fn force_state(&mut self, state: MouthState) {
        self.try_set(state, Instant::now(), true);
    }

    /// Consume one report and update the mouth state. Returns the meter
    /// level in [0, 1].
    pub fn process(&mut self, data: &AudioVolumeData, flags: SpriteFlags) -> f32 {
        self.process_at(data, flags, Instant::now())
    }

    /// Deterministic variant of [`process`](Self::process) with an explicit
    /// clock, so hold-time behavior can be stepped in tests.
    pub fn process_at(&mut self, data: &AudioVolumeData, flags: SpriteFlags, now: Instant) -> f32 {
        if self.hq_audio {
            return self.process_hq(data, flags, now);
        }

        let smoothing = 0.2;
        let ratio = data.high / (data.low + data.high + 1e-6);
        self.volume = self.volume * (1.0 - smoothing) + data.rms * smoothing;
        self.smoothed_high_ratio =
            self.smoothed_high_ratio * (1.0 - smoothing) + ratio * smoothing;

        let thresholds = self.thresholds();
        let meter = (self.volume / (thresholds.half * 1.8)).min(1.0);

        let next = select_standard(self.volume, self.smoothed_high_ratio, &thresholds, flags);
        self.try_set(next, now, false);
        meter
    }

    fn process_hq(&mut self, data: &AudioVolumeData, flags: SpriteFlags, now: Instant) -> f32 {
        let ratio = data.high / (data.low + data.high + 1e-6);
        let ratio_smoothing = 0.25;
        self.smoothed_high_ratio =
            self.smoothed_high_ratio * (1.0 - ratio_smoothing) + ratio * ratio_smoothing;

        let rms = data.rms;
        let sensitivity = self.sensitivity / 100.0;

        // Asymmetric envelope follower: fast attack, slower release
        let attack = 0.35;
        let release = 0.6;
        let k = if rms > self.envelope { attack } else { release };
        self.envelope = self.envelope * (1.0 - k) + rms * k;

        // Noise floor decays quickly toward a quieter envelope, creeps up
        // slowly when the signal sits above it
        if self.envelope < self.noise_floor {
            let fall = 0.25;
            self.noise_floor = self.noise_floor * (1.0 - fall) + self.envelope * fall;
        } else {
            let rise = 0.01;
            self.noise_floor = self.noise_floor * (1.0 - rise) + self.envelope * rise;
        }

        // Decaying peak normalizes the dynamic range, never allowed to pinch
        // the range below a usable minimum
        let peak_decay = 0.985;
        self.level_peak = self.envelope.max(self.level_peak * peak_decay);
        let min_range = 0.006;
        if self.level_peak < self.noise_floor + min_range {
            self.level_peak = self.noise_floor + min_range;
        }

        let gate_margin = 0.002 + (1.0 - sensitivity) * 0.008;
        let gate_level = self.noise_floor + gate_margin;
        if self.envelope < gate_level {
            self.volume = 0.0;
            self.try_set(MouthState::Closed, now, false);
            return 0.0;
        }

        let raw_level =
            (self.envelope - self.noise_floor) / (self.level_peak - self.noise_floor);
        let level = raw_level.clamp(0.0, 1.0);
        let gain = 0.6 + sensitivity * 0.8;
        let shaped = (level.powf(0.75) * gain).min(1.0);

        self.volume = shaped;

        let thresholds = self.thresholds_hq();
        let next = select_hq(self.state, shaped, self.smoothed_high_ratio, &thresholds, flags);
        self.try_set(next, now, false);
        shaped
    }

    fn thresholds(&self) -> Thresholds {
        let sensitivity = self.sensitivity / 100.0;
        Thresholds {
            closed: 0.008 + (1.0 - sensitivity) * 0.018,
            half: 0.02 + (1.0 - sensitivity) * 0.06,
        }
    }

    fn thresholds_hq(&self) -> Thresholds {
        let sensitivity = self.sensitivity / 100.0;
        Thresholds {
            closed: 0.07 + (1.0 - sensitivity) * 0.08,
            half: 0.22 + (1.0 - sensitivity) * 0.12,
        }
    }

    /// Apply the minimum-hold gate: a change is rejected until `min_hold`
    /// has elapsed since the last accepted change, unless forced.
    fn try_set(&mut self, next: MouthState, now: Instant, force: bool) {
        if !force && next != self.state {
            if let Some(last) = self.last_change {
                if now.duration_since(last) < self.min_hold {
                    return;
                }
            }
        }
        if force || next != self.state {
            self.state = next;
            self.last_change = Some(now);
        }
    }
}

/// Memoryless selection from the two smoothed scalars.
fn select_standard(
    volume: f32,
    high_ratio: f32,
    thresholds: &Thresholds,
    flags: SpriteFlags,
) -> MouthState {
    if volume < thresholds.closed {
        return MouthState::Closed;
    }
    if volume < thresholds.half {
        return if flags.has_half {
            MouthState::Half
        } else {
            MouthState::Open
        };
    }
    if high_ratio > 0.62 && flags.has_e {
        return MouthState::E;
    }
    if high_ratio < 0.38 && flags.has_u {
        return MouthState::U;
    }
    MouthState::Open
}

/// Stateful selection with hysteresis. `e`/`u` are never held across ticks:
/// they demote to `open` before evaluation and are only re-entered from an
/// `open` outcome.
fn select_hq(
    current: MouthState,
    level: f32,
    high_ratio: f32,
    thresholds: &Thresholds,
    flags: SpriteFlags,
) -> MouthState {
    let close_th = (thresholds.closed - 0.03).max(0.02);
    let half_down_th = (thresholds.half - 0.02).max(close_th + 0.02);

    let mut state = current;
    if state == MouthState::E || state == MouthState::U {
        state = MouthState::Open;
    }

    state = match state {
        MouthState::Closed => {
            if level >= thresholds.half {
                MouthState::Open
            } else if level >= thresholds.closed && flags.has_half {
                MouthState::Half
            } else if level >= thresholds.closed {
                MouthState::Open
            } else {
                MouthState::Closed
            }
        }
        MouthState::Half => {
            if level < close_th {
                MouthState::Closed
            } else if level >= thresholds.half {
                MouthState::Open
            } else {
                MouthState::Half
            }
        }
        _ => {
            if level < close_th {
                MouthState::Closed
            } else if level < half_down_th && flags.has_half {
                MouthState::Half
            } else {
                MouthState::Open
            }
        }
    };

    if state == MouthState::Open {
        if high_ratio > 0.62 && flags.has_e {
            return MouthState::E;
        }
        if high_ratio < 0.38 && flags.has_u {
            return MouthState::U;
        }
    }
    state
}
