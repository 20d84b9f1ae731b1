//! cpal-backed host layer: owns the output stream, the engine and the
//! watchdog, and bridges control events from the UI onto the real-time path.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, Stream, StreamConfig};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::core::engine::{EngineTelemetry, ToneEngine};
use crate::core::watchdog::WatchdogHandle;
use crate::messaging::{EngineAlert, EngineCommand};

/// The engine's output format is fixed and non-negotiable: mono, f32,
/// 44100 Hz. Devices that cannot take it are refused.
pub const SAMPLE_RATE: u32 = 44100;
pub const CHANNELS: u16 = 1;

/// Requested stream buffer length in frames for a millisecond setting.
pub fn buffer_frames(buffer_ms: u32) -> u32 {
    buffer_ms * SAMPLE_RATE / 1000
}

/// Map the 0..=1 volume slider to a linear gain on a logarithmic taper,
/// so the slider tracks perceived loudness.
pub fn slider_to_gain(volume: f32) -> f32 {
    if volume <= 0.0 {
        return 0.0;
    }
    (100.0_f32.powf(volume.min(1.0)) - 1.0) / 99.0
}

/// Does this device accept the engine's fixed format?
pub fn supports_engine_format(device: &cpal::Device) -> bool {
    let Ok(configs) = device.supported_output_configs() else {
        return false;
    };
    configs.into_iter().any(|range| {
        range.channels() == CHANNELS
            && range.sample_format() == cpal::SampleFormat::F32
            && range.min_sample_rate().0 <= SAMPLE_RATE
            && range.max_sample_rate().0 >= SAMPLE_RATE
    })
}

/// Output devices offered to the user: the default device first, then every
/// other device that supports the engine format.
pub fn output_devices() -> Vec<(String, cpal::Device)> {
    let host = cpal::default_host();
    let mut devices = Vec::new();
    let default_name = if let Some(device) = host.default_output_device() {
        let name = device.name().unwrap_or_else(|_| "default".to_string());
        devices.push((name.clone(), device));
        Some(name)
    } else {
        None
    };
    if let Ok(available) = host.output_devices() {
        for device in available {
            let Ok(name) = device.name() else { continue };
            if Some(&name) == default_name.as_ref() {
                continue;
            }
            if supports_engine_format(&device) {
                devices.push((name, device));
            }
        }
    }
    devices
}

/// A live audio pipeline: stream, engine (owned by the output callback),
/// watchdog, and the channels connecting them to the UI.
pub struct AudioHost {
    _stream: Stream,
    commands: Sender<EngineCommand>,
    alerts: Receiver<EngineAlert>,
    telemetry: Arc<EngineTelemetry>,
    watchdog: WatchdogHandle,
    gain: Arc<AtomicU32>,
}

impl AudioHost {
    /// Start the engine on `device` with the requested buffer length.
    ///
    /// The engine moves into the output callback; from here on the only way
    /// to reach it is the command channel, drained at the top of every
    /// callback before `produce` runs. Fails if the device rejects the
    /// engine format.
    pub fn start(device: &cpal::Device, buffer_ms: u32) -> Result<Self> {
        if !supports_engine_format(device) {
            return Err(anyhow!(
                "output device does not support mono f32 at {SAMPLE_RATE} Hz"
            ));
        }

        let config = StreamConfig {
            channels: CHANNELS,
            sample_rate: SampleRate(SAMPLE_RATE),
            buffer_size: BufferSize::Fixed(buffer_frames(buffer_ms)),
        };
        log::debug!(
            "requested buffer size: {} frames, {} ms",
            buffer_frames(buffer_ms),
            buffer_ms
        );

        let mut engine = ToneEngine::new(SAMPLE_RATE);
        engine.start();
        let telemetry = engine.telemetry();
        telemetry.set_running(true);

        let (command_tx, command_rx) = unbounded::<EngineCommand>();
        let (alert_tx, alert_rx) = bounded::<EngineAlert>(8);
        let gain = Arc::new(AtomicU32::new(1.0_f32.to_bits()));

        // One buffer period; the underrun heuristic and the watchdog period
        // are both derived from it.
        let buffer_period = Duration::from_millis(buffer_ms as u64);

        let stream = build_stream(
            device,
            &config,
            engine,
            command_rx,
            alert_tx.clone(),
            Arc::clone(&gain),
            buffer_period * 2,
        )?;
        stream.play()?;
        log::info!(
            "audio stream started on {:?} ({buffer_ms} ms buffer)",
            device.name()
        );

        // Poll at twice the buffer duration; skip the first poll so the
        // pipeline gets an equal warm-up window after start.
        let watchdog = WatchdogHandle::spawn(
            Arc::clone(&telemetry),
            buffer_period * 2,
            1,
            move || {
                let _ = alert_tx.try_send(EngineAlert::Stall);
            },
        );

        Ok(Self {
            _stream: stream,
            commands: command_tx,
            alerts: alert_rx,
            telemetry,
            watchdog,
            gain,
        })
    }

    pub fn send(&self, command: EngineCommand) {
        self.commands.send(command).ok();
    }

    /// Next pending fault signal, if any.
    pub fn try_alert(&self) -> Option<EngineAlert> {
        self.alerts.try_recv().ok()
    }

    pub fn telemetry(&self) -> Arc<EngineTelemetry> {
        Arc::clone(&self.telemetry)
    }

    /// Give the watchdog a fresh warm-up window, e.g. after a warning
    /// dialog held up the UI thread for a while.
    pub fn rearm_watchdog(&self) {
        self.watchdog.rearm();
    }

    pub fn set_volume(&self, slider: f32) {
        self.gain
            .store(slider_to_gain(slider).to_bits(), Ordering::Relaxed);
    }

    /// Real latency implied by the last buffer the sink pulled.
    pub fn last_latency_ms(&self) -> f32 {
        self.telemetry.last_produced_frames() as f32 * 1000.0 / SAMPLE_RATE as f32
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut engine: ToneEngine,
    commands: Receiver<EngineCommand>,
    alerts: Sender<EngineAlert>,
    gain: Arc<AtomicU32>,
    underrun_window: Duration,
) -> Result<Stream> {
    let err_alerts = alerts.clone();
    let err_fn = move |err| {
        log::warn!("audio stream error: {err}");
        let _ = err_alerts.try_send(EngineAlert::Underrun);
    };

    let mut last_callback: Option<Instant> = None;
    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            // cpal surfaces no underrun event, so a late callback is the
            // closest observable: the sink must have run dry in between.
            let now = Instant::now();
            if let Some(last) = last_callback {
                if now.duration_since(last) > underrun_window {
                    let _ = alerts.try_send(EngineAlert::Underrun);
                }
            }
            last_callback = Some(now);

            // Single-writer discipline: control events are applied here,
            // between pulls, never concurrently with one.
            while let Ok(command) = commands.try_recv() {
                match command {
                    EngineCommand::NoteOn(note) => engine.note_on(&note),
                    EngineCommand::NoteOff => engine.note_off(),
                    EngineCommand::SetOctave(octave) => engine.set_octave(octave),
                }
            }

            if engine.produce(data).is_err() {
                data.fill(0.0);
                return;
            }
            let gain = f32::from_bits(gain.load(Ordering::Relaxed));
            for sample in data.iter_mut() {
                *sample *= gain;
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}
