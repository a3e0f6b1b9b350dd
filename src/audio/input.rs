//! Live microphone capture
//!
//! Owns an exclusive cpal input stream and runs a [`VolumeAnalyzer`] inside
//! the real-time callback, forwarding its reports through the shared
//! [`ReportBus`]. Interleaved input is reduced to the first channel before
//! analysis.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use super::analyzer::VolumeAnalyzer;
use super::report::{AudioVolumeData, ReportBus};

/// Errors that can occur while acquiring the microphone
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No input device found")]
    NoDevice,

    #[error("Failed to query input config: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),

    #[error("Failed to build input stream: {0}")]
    Build(#[from] cpal::BuildStreamError),

    #[error("Failed to start input stream: {0}")]
    Start(#[from] cpal::PlayStreamError),

    #[error("Unsupported sample format: {0:?}")]
    UnsupportedFormat(cpal::SampleFormat),
}

/// Requested buffer size for the HQ capture path, in frames. Small enough to
/// keep report latency under a frame interval on common devices.
const HQ_BUFFER_FRAMES: u32 = 256;

/// Microphone capture engine
pub struct AudioCapture {
    /// Whether capture is active
    is_capturing: Arc<AtomicBool>,

    /// The audio input stream
    stream: Option<cpal::Stream>,

    /// Shared report channel
    bus: ReportBus,

    /// Available input devices, enumerated once at construction
    pub devices: Vec<String>,

    /// Selected device index
    pub selected_device: usize,

    /// Request the tuned low-latency stream configuration
    hq_audio: bool,

    /// Status message
    pub status: String,
}

impl AudioCapture {
    /// Create a new capture handler and enumerate input devices
    pub fn new(bus: ReportBus) -> Self {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .input_devices()
            .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
            .unwrap_or_default();

        let device_count = devices.len();
        log::info!("Found {} input device(s)", device_count);

        Self {
            is_capturing: Arc::new(AtomicBool::new(false)),
            stream: None,
            bus,
            devices,
            selected_device: 0,
            hq_audio: false,
            status: if device_count > 0 {
                format!("Found {} input device(s)", device_count)
            } else {
                "No input devices found".to_string()
            },
        }
    }

    /// Check if currently capturing
    pub fn is_capturing(&self) -> bool {
        self.is_capturing.load(Ordering::Relaxed)
    }

    pub fn set_hq_audio_enabled(&mut self, enabled: bool) {
        self.hq_audio = enabled;
    }

    /// Start capture on the selected device.
    ///
    /// A no-op while already running. On failure the capture is not started
    /// and the error is returned; whatever producer is already feeding the
    /// bus keeps feeding it.
    pub fn start(&mut self) -> Result<(), DeviceError> {
        if self.stream.is_some() {
            return Ok(());
        }

        log::info!("Starting audio capture...");

        let host = cpal::default_host();

        let device = host
            .input_devices()
            .ok()
            .and_then(|mut devices| devices.nth(self.selected_device))
            .ok_or(DeviceError::NoDevice)?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using input device: {}", device_name);

        let supported = device.default_input_config()?;
        let sample_format = supported.sample_format();
        let channels = supported.channels() as usize;
        let sample_rate = supported.sample_rate().0;
        log::info!("Audio config: {:?}", supported);

        let default_config: cpal::StreamConfig = supported.into();

        let stream = if self.hq_audio {
            // HQ mode asks the device for a small fixed buffer; devices that
            // reject the request fall back to the default configuration.
            let hq_config = cpal::StreamConfig {
                buffer_size: cpal::BufferSize::Fixed(HQ_BUFFER_FRAMES),
                ..default_config.clone()
            };
            match self.build_stream(&device, &hq_config, sample_format, channels, sample_rate) {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("HQ input config rejected ({}), using default", e);
                    self.build_stream(
                        &device,
                        &default_config,
                        sample_format,
                        channels,
                        sample_rate,
                    )?
                }
            }
        } else {
            self.build_stream(&device, &default_config, sample_format, channels, sample_rate)?
        };

        stream.play()?;

        self.is_capturing.store(true, Ordering::Relaxed);
        self.stream = Some(stream);
        self.status = format!("Capturing: {}", device_name);
        log::info!("Capture started");
        Ok(())
    }

    fn build_stream(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        sample_format: cpal::SampleFormat,
        channels: usize,
        sample_rate: u32,
    ) -> Result<cpal::Stream, DeviceError> {
        let is_capturing = Arc::clone(&self.is_capturing);
        let bus = self.bus.clone_ref();
        let mut analyzer = VolumeAnalyzer::new(sample_rate);
        let mut mono = Vec::with_capacity(4096);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_input_stream(
                config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !is_capturing.load(Ordering::Relaxed) || channels == 0 {
                        return;
                    }

                    mono.clear();
                    mono.extend(data.chunks(channels).map(|frame| frame[0]));
                    analyzer.process(&mono, |report| {
                        bus.push(report);
                    });
                },
                |err| log::error!("Audio error: {}", err),
                None,
            )?,
            cpal::SampleFormat::I16 => {
                let is_capturing = Arc::clone(&self.is_capturing);
                let bus = self.bus.clone_ref();
                let mut analyzer = VolumeAnalyzer::new(sample_rate);
                let mut mono = Vec::with_capacity(4096);
                device.build_input_stream(
                    config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        if !is_capturing.load(Ordering::Relaxed) || channels == 0 {
                            return;
                        }

                        mono.clear();
                        mono.extend(
                            data.chunks(channels)
                                .map(|frame| frame[0] as f32 / 32768.0),
                        );
                        analyzer.process(&mono, |report| {
                            bus.push(report);
                        });
                    },
                    |err| log::error!("Audio error: {}", err),
                    None,
                )?
            }
            format => return Err(DeviceError::UnsupportedFormat(format)),
        };

        Ok(stream)
    }

    /// Stop capture, release the device, and force the mouth closed.
    ///
    /// Idempotent: stopping while stopped only re-emits the silence report.
    pub fn stop(&mut self) {
        self.is_capturing.store(false, Ordering::Relaxed);
        self.stream = None;
        self.bus.push(AudioVolumeData::SILENCE);
        self.status = "Stopped".to_string();
        log::info!("Capture stopped");
    }

    /// Toggle capture state
    pub fn toggle(&mut self) -> Result<(), DeviceError> {
        if self.is_capturing() {
            self.stop();
            Ok(())
        } else {
            self.start()
        }
    }
}
