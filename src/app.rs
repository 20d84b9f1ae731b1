use std::fs::{self, File};
use std::path::PathBuf;

use anyhow::Result;
use eframe::egui;
use serde::{Deserialize, Serialize};

use crate::audio::{self, AudioHost};
use crate::core::pitch;
use crate::messaging::{EngineAlert, EngineCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WarningKind {
    Format,
    Underrun,
    Stall,
}

struct Warning {
    kind: WarningKind,
    title: &'static str,
    text: String,
}

impl Warning {
    fn from_alert(alert: EngineAlert) -> Self {
        match alert {
            EngineAlert::Underrun => Warning {
                kind: WarningKind::Underrun,
                title: "Underrun",
                text: "The audio sink ran out of samples. Playback continues; \
                       consider a larger buffer size."
                    .to_string(),
            },
            EngineAlert::Stall => Warning {
                kind: WarningKind::Stall,
                title: "Pipeline stalled",
                text: "The synthesizer stopped being pulled for audio. Monitoring \
                       is suspended; change the output device or buffer size to \
                       restart."
                    .to_string(),
            },
        }
    }
}

// Main app state
pub struct SynthApp {
    host: Option<AudioHost>,
    devices: Vec<(String, cpal::Device)>,
    selected_device_idx: usize,
    held_key: Option<&'static str>,
    warning: Option<Warning>,
    settings: AppSettings,
}

impl eframe::App for SynthApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_alerts();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("minitone");
            ui.add_space(8.0);
            self.render_keyboard(ui);
            ui.separator();
            self.render_controls(ui);
        });

        self.render_warning(ctx);

        // Keep polling alerts and key state while idle.
        ctx.request_repaint();
    }
}

impl SynthApp {
    pub fn new() -> Result<Self> {
        let settings = AppSettings::load().unwrap_or_default();
        let devices = audio::output_devices();
        log::info!("found {} usable output devices", devices.len());

        let selected_device_idx = settings
            .output_device
            .as_ref()
            .and_then(|wanted| devices.iter().position(|(name, _)| name == wanted))
            .unwrap_or(0);

        let mut app = SynthApp {
            host: None,
            devices,
            selected_device_idx,
            held_key: None,
            warning: None,
            settings,
        };
        app.restart_audio();
        Ok(app)
    }

    /// Tear down the current pipeline (if any) and start a fresh one on the
    /// selected device. Also the only way monitoring resumes after a stall.
    fn restart_audio(&mut self) {
        self.host = None;
        self.held_key = None;

        let Some((name, device)) = self.devices.get(self.selected_device_idx) else {
            self.warning = Some(Warning {
                kind: WarningKind::Format,
                title: "No audio device",
                text: "No output device supports the synth's audio format.".to_string(),
            });
            return;
        };

        match AudioHost::start(device, self.settings.buffer_ms) {
            Ok(host) => {
                host.set_volume(self.settings.volume);
                host.send(EngineCommand::SetOctave(self.settings.octave));
                self.host = Some(host);
            }
            Err(err) => {
                log::warn!("could not start audio on {name}: {err:#}");
                self.warning = Some(Warning {
                    kind: WarningKind::Format,
                    title: "Audio format not supported",
                    text: "The selected audio device does not support the synth's \
                           audio format. Please select another device."
                        .to_string(),
                });
            }
        }
    }

    fn poll_alerts(&mut self) {
        let Some(host) = &self.host else { return };
        let mut incoming = None;
        while let Some(alert) = host.try_alert() {
            log::warn!("engine alert: {alert:?}");
            if incoming.is_none() {
                incoming = Some(alert);
            }
        }
        if let Some(alert) = incoming {
            if self.warning.is_none() {
                // Clear the advisory flag so the watchdog does not count the
                // dialog pause as a stall.
                host.telemetry().set_running(false);
                self.warning = Some(Warning::from_alert(alert));
            }
        }
    }

    fn render_keyboard(&mut self, ui: &mut egui::Ui) {
        let mut pressed: Option<&'static str> = None;
        ui.horizontal(|ui| {
            for name in pitch::note_names() {
                let response = ui.add(egui::Button::new(name).min_size(egui::vec2(30.0, 64.0)));
                if response.is_pointer_button_down_on() {
                    pressed = Some(name);
                }
            }
        });

        if pressed != self.held_key {
            if let Some(host) = &self.host {
                match pressed {
                    Some(name) => host.send(EngineCommand::NoteOn(name.to_string())),
                    None => {
                        host.send(EngineCommand::NoteOff);
                        log::debug!("real latency: {:.1} ms", host.last_latency_ms());
                    }
                }
            }
            self.held_key = pressed;
        }
    }

    fn render_controls(&mut self, ui: &mut egui::Ui) {
        let mut needs_restart = false;
        let mut settings_changed = false;

        ui.horizontal(|ui| {
            ui.label("Octave:");
            if ui
                .add(egui::DragValue::new(&mut self.settings.octave).range(0..=6))
                .changed()
            {
                if let Some(host) = &self.host {
                    host.send(EngineCommand::SetOctave(self.settings.octave));
                }
                settings_changed = true;
            }

            ui.separator();
            ui.label("Buffer:");
            if ui
                .add(
                    egui::DragValue::new(&mut self.settings.buffer_ms)
                        .range(10..=1000)
                        .suffix(" ms"),
                )
                .changed()
            {
                needs_restart = true;
                settings_changed = true;
            }
        });

        ui.horizontal(|ui| {
            ui.label("Volume:");
            if ui
                .add(egui::Slider::new(&mut self.settings.volume, 0.0..=1.0))
                .changed()
            {
                if let Some(host) = &self.host {
                    host.set_volume(self.settings.volume);
                }
                settings_changed = true;
            }
        });

        let selected_name = self
            .devices
            .get(self.selected_device_idx)
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| "no device".to_string());
        egui::ComboBox::from_label("Output device")
            .selected_text(selected_name)
            .show_ui(ui, |ui| {
                for (i, (name, _)) in self.devices.iter().enumerate() {
                    if ui
                        .selectable_value(&mut self.selected_device_idx, i, name)
                        .changed()
                    {
                        needs_restart = true;
                        settings_changed = true;
                    }
                }
            });

        if needs_restart {
            if let Some((name, _)) = self.devices.get(self.selected_device_idx) {
                self.settings.output_device = Some(name.clone());
            }
            self.restart_audio();
        }
        if settings_changed {
            if let Err(err) = self.settings.save() {
                log::warn!("could not save settings: {err:#}");
            }
        }
    }

    fn render_warning(&mut self, ctx: &egui::Context) {
        let Some(warning) = &self.warning else { return };
        let kind = warning.kind;
        let title = warning.title;
        let text = warning.text.clone();

        let mut dismissed = false;
        egui::Window::new(title)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(text);
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });

        if dismissed {
            self.dismiss_warning(kind);
        }
    }

    fn dismiss_warning(&mut self, kind: WarningKind) {
        if let Some(host) = &self.host {
            host.telemetry().set_running(true);
            if kind == WarningKind::Underrun {
                // The dialog may have held things up; give the watchdog a
                // fresh warm-up window. After a stall it stays disarmed
                // until the pipeline is restarted.
                host.rearm_watchdog();
            }
        }
        self.warning = None;
    }
}

// Persisted app settings
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AppSettings {
    output_device: Option<String>,
    buffer_ms: u32,
    volume: f32,
    octave: i32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            output_device: None,
            buffer_ms: 50,
            volume: 1.0,
            octave: pitch::REFERENCE_OCTAVE,
        }
    }
}

impl AppSettings {
    fn path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("could not find config directory"))?;
        path.push("minitone");
        Ok(path.join("settings.json"))
    }

    fn load() -> Result<Self> {
        let path = Self::path()?;
        if path.exists() {
            let file = File::open(path)?;
            Ok(serde_json::from_reader(file)?)
        } else {
            Ok(Self::default())
        }
    }

    fn save(&self) -> Result<()> {
        let path = Self::path()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}
