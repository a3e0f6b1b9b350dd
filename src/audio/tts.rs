//! Synthesized-utterance playback and analysis
//!
//! Offline variant of the live analyzer: the utterance arrives as one fully
//! encoded buffer. The buffer is decoded up front with symphonia, played
//! through a cpal output stream, and measured on a fixed 60 Hz cadence
//! against the playback position. Two estimates are taken per tick - a
//! wideband RMS over a short trailing window and the same window of a
//! ~700 Hz one-pole low-passed copy - and the high band is approximated as
//! `max(0, rms^2 - low)`. The approximation is not a true band split and the
//! bands do not sum to the wideband total; mouth-shape selection downstream
//! is tuned against exactly this formula, so it is kept as is.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use super::report::{AudioVolumeData, ReportBus};

/// Errors raised while decoding a synthesized utterance
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to probe audio format: {0}")]
    ProbeError(String),

    #[error("No audio tracks found")]
    NoTracks,

    #[error("Decoder error: {0}")]
    DecoderError(String),

    #[error("Decoded stream is empty")]
    Empty,
}

/// Errors raised while opening the playback path
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("No output device available")]
    NoOutputDevice,

    #[error("Failed to query output config: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),

    #[error("Failed to build output stream: {0}")]
    Build(#[from] cpal::BuildStreamError),

    #[error("Failed to start output stream: {0}")]
    Start(#[from] cpal::PlayStreamError),
}

#[derive(Error, Debug)]
pub enum TtsError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

/// Trailing window length used by both spectral estimates, in samples.
const ANALYSIS_WINDOW: usize = 2048;

/// Analysis cadence during playback.
const ANALYSIS_TICK: Duration = Duration::from_micros(16_667);

/// Low-pass cutoff matching the live analyzer's band split, in Hz.
const SPLIT_CUTOFF_HZ: f32 = 700.0;

/// Player/analyzer for one fully-buffered synthesized utterance.
pub struct TtsAudioAnalyzer {
    bus: ReportBus,
}

impl TtsAudioAnalyzer {
    pub fn new(bus: ReportBus) -> Self {
        Self { bus }
    }

    /// Decode `encoded`, play it back, and report band energies at 60 Hz
    /// until playback ends or `cancel` is raised.
    ///
    /// Blocks the calling thread for the duration of playback. Exactly one
    /// all-zero report is emitted at the end, on every exit path, so the
    /// mouth never sticks open.
    pub fn play_and_analyze(&self, encoded: &[u8], cancel: &AtomicBool) -> Result<(), TtsError> {
        let (samples, sample_rate) = decode_mono(encoded)?;
        log::info!(
            "TTS utterance decoded: {} samples @ {} Hz",
            samples.len(),
            sample_rate
        );

        let lowpassed = lowpass_copy(&samples, sample_rate);
        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = build_output_stream(
            Arc::clone(&samples),
            Arc::clone(&position),
            Arc::clone(&finished),
        )?;

        // Hosts occasionally refuse to start a fresh output stream right
        // away (suspended output contexts). One retry, then give up.
        if let Err(e) = stream.play() {
            log::warn!("Output stream start failed ({}), retrying once", e);
            std::thread::sleep(Duration::from_millis(50));
            stream.play().map_err(PlaybackError::Start)?;
        }

        while !finished.load(Ordering::Relaxed) && !cancel.load(Ordering::Relaxed) {
            let pos = position.load(Ordering::Relaxed).min(samples.len());
            self.bus.push(band_report(
                window_before(&samples, pos),
                window_before(&lowpassed, pos),
            ));
            std::thread::sleep(ANALYSIS_TICK);
        }

        drop(stream);
        self.bus.push(AudioVolumeData::SILENCE);
        Ok(())
    }
}

/// Trailing analysis window ending at `end`.
fn window_before(samples: &[f32], end: usize) -> &[f32] {
    &samples[end.saturating_sub(ANALYSIS_WINDOW)..end]
}

/// Band-energy report over one analysis window.
///
/// `low` comes from the low-passed copy of the same window; the high band is
/// the lossy `max(0, rms^2 - low)` remainder.
fn band_report(window: &[f32], low_window: &[f32]) -> AudioVolumeData {
    if window.is_empty() {
        return AudioVolumeData::SILENCE;
    }

    let n = window.len() as f64;
    let sum: f64 = window.iter().map(|&x| (x * x) as f64).sum();
    let rms = (sum / n) as f32;
    let rms = rms.sqrt();

    let low_sum: f64 = low_window.iter().map(|&x| (x * x) as f64).sum();
    let low = (low_sum / low_window.len().max(1) as f64) as f32;

    let high = (rms * rms - low).max(0.0);
    AudioVolumeData { rms, low, high }
}

/// One-pole low-passed copy of the whole utterance, filter matched to the
/// live analyzer's split.
fn lowpass_copy(samples: &[f32], sample_rate: u32) -> Vec<f32> {
    let alpha =
        1.0 - (-2.0 * std::f32::consts::PI * SPLIT_CUTOFF_HZ / sample_rate.max(1) as f32).exp();
    let mut state = 0.0_f32;
    samples
        .iter()
        .map(|&x| {
            state += alpha * (x - state);
            state
        })
        .collect()
}

/// Decode an encoded audio buffer to mono f32 samples.
fn decode_mono(encoded: &[u8]) -> Result<(Vec<f32>, u32), DecodeError> {
    let mss = MediaSourceStream::new(
        Box::new(Cursor::new(encoded.to_vec())),
        Default::default(),
    );

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::ProbeError(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTracks)?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::DecoderError(e.to_string()))?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(_) => break,
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => extract_mono(&decoded, &mut samples),
            Err(_) => continue,
        }
    }

    if samples.is_empty() {
        return Err(DecodeError::Empty);
    }

    Ok((samples, sample_rate))
}

/// Downmix a decoded buffer to mono by averaging channels.
fn extract_mono(buffer: &AudioBufferRef<'_>, out: &mut Vec<f32>) {
    match buffer {
        AudioBufferRef::F32(buf) => {
            let channels = buf.spec().channels.count();
            for frame in 0..buf.frames() {
                let mut sum = 0.0;
                for ch in 0..channels {
                    sum += buf.chan(ch)[frame];
                }
                out.push(sum / channels as f32);
            }
        }
        AudioBufferRef::S16(buf) => {
            let channels = buf.spec().channels.count();
            for frame in 0..buf.frames() {
                let mut sum = 0.0;
                for ch in 0..channels {
                    sum += buf.chan(ch)[frame] as f32 / 32768.0;
                }
                out.push(sum / channels as f32);
            }
        }
        AudioBufferRef::S32(buf) => {
            let channels = buf.spec().channels.count();
            for frame in 0..buf.frames() {
                let mut sum = 0.0;
                for ch in 0..channels {
                    sum += buf.chan(ch)[frame] as f32 / 2147483648.0;
                }
                out.push(sum / channels as f32);
            }
        }
        _ => {}
    }
}

/// Open the default output device and stream the decoded samples through it.
fn build_output_stream(
    samples: Arc<Vec<f32>>,
    position: Arc<AtomicUsize>,
    finished: Arc<AtomicBool>,
) -> Result<cpal::Stream, PlaybackError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(PlaybackError::NoOutputDevice)?;
    let config = device.default_output_config()?;
    let channels = config.channels() as usize;

    let stream = device.build_output_stream(
        &config.into(),
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let mut pos = position.load(Ordering::Relaxed);
            for frame in data.chunks_mut(channels) {
                let sample = if pos < samples.len() {
                    let s = samples[pos];
                    pos += 1;
                    s
                } else {
                    finished.store(true, Ordering::Relaxed);
                    0.0
                };
                for ch in frame.iter_mut() {
                    *ch = sample;
                }
            }
            position.store(pos, Ordering::Relaxed);
        },
        |err| log::error!("Audio output error: {}", err),
        None,
    )?;

    Ok(stream)
}
