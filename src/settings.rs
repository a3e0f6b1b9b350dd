use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::TuberApp;

/// Returns the path to the settings file: `~/.config/tuber-rs/settings.json`
fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("tuber-rs");
    path.push("settings.json");
    path
}

/// Persisted application settings.
///
/// Serialized as JSON to the platform config directory.
/// Fields use `#[serde(default)]` so that adding new settings
/// won't break existing config files.
#[derive(Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    // Lip sync
    pub sensitivity: f32,
    pub hq_audio: bool,

    // Audio input
    pub selected_device: usize,

    // Speech
    pub speech_rate: f32,

    // Assets
    pub last_folder: Option<PathBuf>,

    // Window
    pub show_settings: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            sensitivity: 50.0,
            hq_audio: false,

            selected_device: 0,

            speech_rate: 1.0,

            last_folder: None,

            show_settings: false,
        }
    }
}

impl AppSettings {
    /// Load settings from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        let path = settings_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse settings ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::info!("No settings file found ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Save settings to disk as pretty JSON.
    pub fn save(&self) {
        let path = settings_path();
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create config directory: {}", e);
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&path, json) {
                    log::warn!("Failed to write settings: {}", e);
                }
            }
            Err(e) => {
                log::warn!("Failed to serialize settings: {}", e);
            }
        }
    }

    /// Extract current settings from the running application.
    pub fn from_app(app: &TuberApp) -> Self {
        Self {
            sensitivity: app.sensitivity,
            hq_audio: app.hq_audio,

            selected_device: app.capture.selected_device,

            speech_rate: app.speech_rate,

            last_folder: app.last_folder.clone(),

            show_settings: app.show_settings,
        }
    }

    /// Apply loaded settings to the running application.
    pub fn apply(&self, app: &mut TuberApp) {
        app.sensitivity = self.sensitivity;
        app.engine.set_sensitivity(self.sensitivity);

        app.hq_audio = self.hq_audio;
        app.engine.set_hq_audio_enabled(self.hq_audio);
        app.capture.set_hq_audio_enabled(self.hq_audio);

        app.capture.selected_device = self.selected_device;

        app.speech_rate = self.speech_rate;
        app.last_folder = self.last_folder.clone();

        app.show_settings = self.show_settings;
    }
}
