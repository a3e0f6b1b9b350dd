//! Audio module - report producers feeding the lip-sync engine
//!
//! This module provides:
//! - The band-energy report type and its lock-free channel
//! - The streaming sample analyzer
//! - Live microphone capture
//! - Synthesized-utterance playback and analysis
//! - Text-based fallback animation
//! - The serialized speech queue

mod analyzer;
mod input;
pub(crate) mod report;
mod speech;
mod text;
mod tts;

pub use analyzer::VolumeAnalyzer;
pub use input::{AudioCapture, DeviceError};
pub use report::{AudioReportProducer, AudioVolumeData, ReportBus, ReportConsumer, ReportProducer};
pub use speech::{SpeechQueue, Utterance};
pub use text::TextBasedLipsync;
pub use tts::{DecodeError, PlaybackError, TtsAudioAnalyzer, TtsError};
