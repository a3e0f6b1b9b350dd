//! Lip-sync engine - mouth-state selection driving a quad-warp renderer
//!
//! The engine owns one loaded asset bundle at a time and reconciles three
//! clocks: band-energy reports arriving from whichever producer is active,
//! the looping playback clock, and the UI's render cadence. It is
//! single-writer by construction: every mutation happens on the thread that
//! owns it, and cross-thread report delivery is marshaled through the
//! report bus.

pub mod assets;
pub mod mouth;
pub mod track;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::audio::report::AudioVolumeData;
use crate::render::compositor::{draw_warped_sprite, PixelSurface, RasterCompositor};
use assets::{AssetBundle, AssetError, Background, SpriteSet};
use mouth::{MouthState, MouthTracker};
use track::TrackData;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No asset bundle loaded")]
    NotLoaded,

    #[error(transparent)]
    Asset(#[from] AssetError),
}

/// Engine lifecycle. Cleanup returns to `Idle` from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
}

/// Looping playback clock decoupled from any particular frame scheduler.
struct LoopClock {
    base: Duration,
    resumed: Option<Instant>,
}

impl LoopClock {
    fn new() -> Self {
        Self {
            base: Duration::ZERO,
            resumed: None,
        }
    }

    fn restart(&mut self) {
        self.base = Duration::ZERO;
        self.resumed = Some(Instant::now());
    }

    fn pause(&mut self) {
        self.base = self.elapsed();
        self.resumed = None;
    }

    fn resume(&mut self) {
        if self.resumed.is_none() {
            self.resumed = Some(Instant::now());
        }
    }

    fn reset(&mut self) {
        self.base = Duration::ZERO;
        self.resumed = None;
    }

    fn elapsed(&self) -> Duration {
        match self.resumed {
            Some(at) => self.base + at.elapsed(),
            None => self.base,
        }
    }

    fn elapsed_seconds(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }
}

/// Observers for engine-side events, all optional.
#[derive(Default)]
pub struct EngineCallbacks {
    /// Meter level in [0, 1] after each processed report
    pub on_volume: Option<Box<dyn FnMut(f32)>>,
    /// Playback started/stopped
    pub on_play_state: Option<Box<dyn FnMut(bool)>>,
    /// Human-readable error, also mirrored into `status`
    pub on_error: Option<Box<dyn FnMut(&str)>>,
}

/// The core: consumes band-energy reports, selects a mouth state, and
/// composites the warped mouth sprite over the background each tick.
pub struct LipsyncEngine {
    state: EngineState,
    track: Option<TrackData>,
    sprites: Option<SpriteSet>,
    background: Background,
    video: Option<PathBuf>,

    surface: PixelSurface,
    mouth: MouthTracker,
    clock: LoopClock,
    last_frame_index: Option<usize>,

    callbacks: EngineCallbacks,
    meter: f32,

    /// Status message
    pub status: String,
}

impl LipsyncEngine {
    pub fn new(sensitivity: f32, hq_audio: bool) -> Self {
        Self::with_callbacks(sensitivity, hq_audio, EngineCallbacks::default())
    }

    pub fn with_callbacks(sensitivity: f32, hq_audio: bool, callbacks: EngineCallbacks) -> Self {
        Self {
            state: EngineState::Idle,
            track: None,
            sprites: None,
            background: Background::None,
            video: None,
            surface: PixelSurface::new(0, 0),
            mouth: MouthTracker::new(sensitivity, hq_audio),
            clock: LoopClock::new(),
            last_frame_index: None,
            callbacks,
            meter: 0.0,
            status: "No assets loaded".to_string(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn mouth_state(&self) -> MouthState {
        self.mouth.state()
    }

    /// Latest meter level, [0, 1].
    pub fn meter(&self) -> f32 {
        self.meter
    }

    /// The composited stage, redrawn on every playing tick.
    pub fn surface(&self) -> &PixelSurface {
        &self.surface
    }

    pub fn is_playing(&self) -> bool {
        self.state == EngineState::Playing
    }

    /// Load a bundle from a user-supplied folder. On failure the engine
    /// keeps whatever was loaded before.
    pub fn load_from_files(&mut self, dir: &Path) -> Result<(), EngineError> {
        let bundle = match AssetBundle::load_dir(dir) {
            Ok(bundle) => bundle,
            Err(e) => {
                self.report_error(&format!("Load error: {}", e));
                return Err(e.into());
            }
        };
        self.load_from_assets(bundle)
    }

    /// Install a loaded bundle, replacing any previous one.
    pub fn load_from_assets(&mut self, bundle: AssetBundle) -> Result<(), EngineError> {
        self.cleanup();
        self.state = EngineState::Loading;

        let (width, height) = bundle.stage_size();
        self.surface.reset(width, height);

        self.status = format!(
            "Load complete: {} frames, {} fps ({}x{})",
            bundle.track.frames.len(),
            bundle.track.fps,
            width,
            height
        );
        log::info!("{}", self.status);

        self.track = Some(bundle.track);
        self.sprites = Some(bundle.sprites);
        self.background = bundle.background;
        self.video = bundle.video;

        self.mouth.force_state(MouthState::Closed);
        self.state = EngineState::Ready;

        // Preview the first frame so the stage is not blank before start
        self.render_frame(0);
        self.last_frame_index = Some(0);
        Ok(())
    }

    /// Start or resume playback.
    pub fn start(&mut self) -> Result<(), EngineError> {
        match self.state {
            EngineState::Playing => Ok(()),
            EngineState::Paused => {
                self.clock.resume();
                self.state = EngineState::Playing;
                self.notify_play_state(true);
                Ok(())
            }
            EngineState::Ready => {
                log::info!("Starting playback");
                self.clock.restart();
                self.state = EngineState::Playing;
                self.notify_play_state(true);
                Ok(())
            }
            EngineState::Idle | EngineState::Loading => {
                self.report_error("Please load an asset bundle first");
                Err(EngineError::NotLoaded)
            }
        }
    }

    /// Freeze the clock, keeping the current frame on the stage.
    pub fn pause(&mut self) {
        if self.state == EngineState::Playing {
            self.clock.pause();
            self.state = EngineState::Paused;
            self.notify_play_state(false);
        }
    }

    /// Stop playback, rewind, and force the mouth closed.
    ///
    /// Idempotent; the forced closed state bypasses the hold gate so the
    /// overlay can never stick open after stop.
    pub fn stop(&mut self) {
        if self.state == EngineState::Playing || self.state == EngineState::Paused {
            self.state = EngineState::Ready;
            self.notify_play_state(false);
        }
        self.clock.reset();
        self.mouth.force_state(MouthState::Closed);
        self.meter = 0.0;
        if let Some(cb) = &mut self.callbacks.on_volume {
            cb(0.0);
        }
        if self.track.is_some() {
            self.render_frame(0);
            self.last_frame_index = Some(0);
        }
    }

    /// Advance one render tick. Called at the display cadence; recomputes
    /// the tracking-frame index from the loop clock and redraws the stage.
    /// Never blocks on audio: without a fresh report the previous mouth
    /// state simply holds.
    pub fn tick(&mut self) {
        if self.state != EngineState::Playing {
            return;
        }
        let Some(track) = &self.track else { return };
        let index = track.frame_index(self.clock.elapsed_seconds());
        self.render_frame(index);
        self.last_frame_index = Some(index);
    }

    /// Redraw using the last known frame index without advancing the
    /// clock. Used after layout changes so the overlay stays aligned
    /// without waiting for the next tick.
    pub fn refresh(&mut self) {
        if let Some(index) = self.last_frame_index {
            self.render_frame(index);
        }
    }

    /// Consume one report from whichever producer is feeding the engine.
    /// `None` means no channel delivered anything this tick; that is the
    /// expected idle condition, not an error.
    pub fn process_audio_data(&mut self, data: Option<&AudioVolumeData>) {
        let Some(data) = data else { return };
        let Some(sprites) = &self.sprites else { return };

        let flags = sprites.flags();
        self.meter = self.mouth.process(data, flags);
        if let Some(cb) = &mut self.callbacks.on_volume {
            cb(self.meter);
        }
    }

    pub fn set_sensitivity(&mut self, value: f32) {
        self.mouth.set_sensitivity(value);
    }

    pub fn set_hq_audio_enabled(&mut self, enabled: bool) {
        self.mouth.set_hq_audio_enabled(enabled);
        self.meter = 0.0;
        log::info!("HQ audio: {}", if enabled { "on" } else { "off" });
    }

    pub fn hq_audio_enabled(&self) -> bool {
        self.mouth.hq_audio_enabled()
    }

    /// Drop smoothing history back to the quiet state.
    pub fn reset_audio_stats(&mut self) {
        self.mouth.reset_stats();
        self.meter = 0.0;
        if let Some(cb) = &mut self.callbacks.on_volume {
            cb(0.0);
        }
    }

    /// Release every owned resource and return to `Idle`. Safe from any
    /// state, any number of times.
    pub fn cleanup(&mut self) {
        self.stop();
        self.track = None;
        self.sprites = None;
        self.background = Background::None;
        self.video = None;
        self.surface.reset(0, 0);
        self.last_frame_index = None;
        self.state = EngineState::Idle;
        self.status = "No assets loaded".to_string();
    }

    fn render_frame(&mut self, index: usize) {
        let Some(track) = &self.track else { return };
        let Some(sprites) = &self.sprites else { return };

        self.surface.clear();
        if let Some(frame) = self.background.frame_at(index) {
            self.surface.blit(frame);
        }

        let frame = track.frame(index);
        if !frame.valid {
            // Mouth occluded: the background's own closed mouth shows
            return;
        }

        let quad = track.adjusted_quad(frame);
        let sprite = sprites.get(self.mouth.state());
        draw_warped_sprite(&mut self.surface, sprite, &quad);
    }

    fn notify_play_state(&mut self, playing: bool) {
        if let Some(cb) = &mut self.callbacks.on_play_state {
            cb(playing);
        }
    }

    fn report_error(&mut self, message: &str) {
        log::error!("{}", message);
        self.status = message.to_string();
        if let Some(cb) = &mut self.callbacks.on_error {
            cb(message);
        }
    }
}
