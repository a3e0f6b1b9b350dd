#![allow(dead_code)]

//! tuber-rs - PNG-tuber lip sync
//!
//! Drives a tracked mouth overlay from live microphone input, synthesized
//! speech playback, or text alone, compositing the warped mouth sprite over
//! a looping background at the display refresh rate.

use std::path::PathBuf;

use eframe::egui;

mod audio;
mod engine;
mod render;
mod settings;

use audio::{AudioCapture, ReportBus, SpeechQueue, Utterance};
use engine::{EngineState, LipsyncEngine};
use render::StageView;
use settings::AppSettings;

/// Input source mode
#[derive(Debug, Clone, Copy, PartialEq, Default)]
enum InputMode {
    #[default]
    Live,
    Speech,
}

/// Queued reports between the producer threads and the UI-side engine pump.
const REPORT_CAPACITY: usize = 64;

fn main() -> eframe::Result<()> {
    env_logger::init();
    log::info!("Starting tuber-rs");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 700.0])
            .with_title("tuber-rs"),
        ..Default::default()
    };

    eframe::run_native(
        "tuber-rs",
        options,
        Box::new(|cc| Ok(Box::new(TuberApp::new(cc)))),
    )
}

pub struct TuberApp {
    bus: ReportBus,
    pub capture: AudioCapture,
    speech: SpeechQueue,
    pub engine: LipsyncEngine,
    stage: StageView,

    pub sensitivity: f32,
    pub hq_audio: bool,
    pub speech_rate: f32,
    pub last_folder: Option<PathBuf>,
    pub show_settings: bool,

    input_mode: InputMode,
    speech_text: String,
}

impl TuberApp {
    fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let bus = ReportBus::new(REPORT_CAPACITY);
        let capture = AudioCapture::new(bus.clone_ref());
        let speech = SpeechQueue::new(bus.clone_ref());
        let engine = LipsyncEngine::new(50.0, false);

        let mut app = Self {
            bus,
            capture,
            speech,
            engine,
            stage: StageView::new(),
            sensitivity: 50.0,
            hq_audio: false,
            speech_rate: 1.0,
            last_folder: None,
            show_settings: false,
            input_mode: InputMode::default(),
            speech_text: String::new(),
        };

        AppSettings::load().apply(&mut app);

        if let Some(folder) = app.last_folder.clone() {
            if folder.is_dir() {
                if app.engine.load_from_files(&folder).is_ok() {
                    let _ = app.engine.start();
                }
            }
        }

        app
    }

    fn load_folder(&mut self, folder: PathBuf) {
        match self.engine.load_from_files(&folder) {
            Ok(()) => {
                self.last_folder = Some(folder);
                let _ = self.engine.start();
            }
            Err(e) => log::error!("Failed to load bundle: {}", e),
        }
    }

    fn speak_file(&mut self, path: PathBuf) {
        match std::fs::read(&path) {
            Ok(bytes) => self.speech.enqueue(Utterance::Audio(bytes)),
            Err(e) => log::error!("Failed to read {}: {}", path.display(), e),
        }
    }
}

impl eframe::App for TuberApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        // Pump: newest report (older ones coalesce away), then render tick
        let report = self.bus.latest();
        let had_report = report.is_some();
        self.engine.process_audio_data(report.as_ref());
        self.engine.tick();
        if had_report && !self.engine.is_playing() {
            // Keep the preview frame's mouth in sync while paused
            self.engine.refresh();
        }

        // Top panel
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("tuber-rs");
                ui.separator();

                // Input mode selector
                ui.selectable_value(&mut self.input_mode, InputMode::Live, "Mic");
                ui.selectable_value(&mut self.input_mode, InputMode::Speech, "Speech");
                ui.separator();

                match self.input_mode {
                    InputMode::Live => {
                        // Device selector
                        egui::ComboBox::from_id_salt("device")
                            .selected_text(
                                self.capture
                                    .devices
                                    .get(self.capture.selected_device)
                                    .cloned()
                                    .unwrap_or_else(|| "None".to_string()),
                            )
                            .show_ui(ui, |ui| {
                                for (i, name) in self.capture.devices.iter().enumerate() {
                                    ui.selectable_value(
                                        &mut self.capture.selected_device,
                                        i,
                                        name,
                                    );
                                }
                            });

                        ui.separator();

                        // Capture button
                        let button_text = if self.capture.is_capturing() {
                            "⏹ Stop"
                        } else {
                            "▶ Capture"
                        };

                        let enabled =
                            !self.capture.devices.is_empty() || self.capture.is_capturing();
                        if ui
                            .add_enabled(enabled, egui::Button::new(button_text))
                            .clicked()
                        {
                            if let Err(e) = self.capture.toggle() {
                                self.capture.status = format!("Error: {}", e);
                            }
                        }

                        ui.separator();
                        ui.label(&self.capture.status);
                    }
                    InputMode::Speech => {
                        if ui.button("📂 Speak file").clicked() {
                            if let Some(path) = rfd::FileDialog::new()
                                .add_filter(
                                    "Audio",
                                    &["wav", "mp3", "flac", "ogg", "m4a", "aac", "aiff"],
                                )
                                .pick_file()
                            {
                                self.speak_file(path);
                            }
                        }

                        ui.separator();

                        let text_edit = egui::TextEdit::singleline(&mut self.speech_text)
                            .hint_text("Text to speak…")
                            .desired_width(220.0);
                        let response = ui.add(text_edit);
                        let submitted = response.lost_focus()
                            && ui.input(|i| i.key_pressed(egui::Key::Enter));
                        if (ui.button("Speak").clicked() || submitted)
                            && !self.speech_text.trim().is_empty()
                        {
                            self.speech.enqueue(Utterance::Text(
                                self.speech_text.clone(),
                                self.speech_rate,
                            ));
                        }

                        if ui.button("⏹").clicked() {
                            self.speech.cancel_all();
                        }

                        ui.separator();
                        let status = if self.speech.is_speaking() {
                            format!("Speaking ({} queued)", self.speech.pending())
                        } else if self.speech.pending() > 0 {
                            format!("{} queued", self.speech.pending())
                        } else {
                            "Idle".to_string()
                        };
                        ui.label(status);
                    }
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.toggle_value(&mut self.show_settings, "⚙ Settings");
                    if ui.button("📁 Load folder").clicked() {
                        if let Some(folder) = rfd::FileDialog::new().pick_folder() {
                            self.load_folder(folder);
                        }
                    }
                });
            });
        });

        // Bottom panel: playback controls and the volume meter
        egui::TopBottomPanel::bottom("playback_panel").show(ctx, |ui| {
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                let loaded = self.engine.state() != EngineState::Idle;

                let play_text = if self.engine.is_playing() { "⏸" } else { "▶" };
                if ui
                    .add_enabled(loaded, egui::Button::new(play_text))
                    .clicked()
                {
                    if self.engine.is_playing() {
                        self.engine.pause();
                    } else {
                        let _ = self.engine.start();
                    }
                }

                if ui.add_enabled(loaded, egui::Button::new("⏹")).clicked() {
                    self.engine.stop();
                }

                ui.separator();
                ui.label(format!("Mouth: {}", self.engine.mouth_state().name()));
                ui.separator();

                ui.label("Level:");
                ui.add(
                    egui::ProgressBar::new(self.engine.meter())
                        .desired_width(160.0)
                        .show_percentage(),
                );

                ui.separator();
                ui.label(&self.engine.status);
            });
            ui.add_space(4.0);
        });

        // Settings panel
        if self.show_settings {
            egui::SidePanel::right("settings_panel")
                .min_width(220.0)
                .show(ctx, |ui| {
                    ui.heading("Settings");
                    ui.separator();

                    ui.collapsing("Lip sync", |ui| {
                        ui.horizontal(|ui| {
                            ui.label("Sensitivity:");
                            if ui
                                .add(egui::Slider::new(&mut self.sensitivity, 0.0..=100.0))
                                .changed()
                            {
                                self.engine.set_sensitivity(self.sensitivity);
                            }
                        });

                        if ui.checkbox(&mut self.hq_audio, "HQ audio").changed() {
                            self.engine.set_hq_audio_enabled(self.hq_audio);
                            self.capture.set_hq_audio_enabled(self.hq_audio);
                            if self.capture.is_capturing() {
                                // Re-open the stream with the new constraints
                                self.capture.stop();
                                if let Err(e) = self.capture.start() {
                                    self.capture.status = format!("Error: {}", e);
                                }
                            }
                        }

                        if ui.button("Reset audio stats").clicked() {
                            self.engine.reset_audio_stats();
                        }
                    });

                    ui.separator();

                    ui.collapsing("Speech", |ui| {
                        ui.horizontal(|ui| {
                            ui.label("Rate:");
                            ui.add(egui::Slider::new(&mut self.speech_rate, 0.5..=2.0));
                        });
                    });

                    ui.separator();

                    ui.collapsing("Assets", |ui| {
                        match &self.last_folder {
                            Some(folder) => {
                                ui.small(folder.display().to_string());
                            }
                            None => {
                                ui.small("No folder loaded");
                            }
                        }
                        if ui.button("Unload").clicked() {
                            self.engine.cleanup();
                            self.stage.clear();
                            self.last_folder = None;
                        }
                    });
                });
        }

        // Main stage display
        egui::CentralPanel::default().show(ctx, |ui| {
            self.stage.show(ui, self.engine.surface());
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        AppSettings::from_app(self).save();
        self.speech.cancel_all();
        self.capture.stop();
        self.engine.cleanup();
    }
}
