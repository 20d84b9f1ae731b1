//! Pull-based tone engine: pitch table + oscillator + envelope.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;

use super::envelope::EnvelopeGenerator;
use super::oscillator::PhaseOscillator;
use super::pitch;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// `produce` was called before `start` (or after `stop`). Mirrors a
    /// closed-device read; the caller gets an error, not degraded output.
    #[error("tone engine is not started")]
    NotStarted,
}

/// Counters shared between the production path, the watchdog and the UI.
///
/// `last_produced_frames` is written by `produce` and cleared by the
/// watchdog each poll. `running` is advisory: the host sets it while the
/// stream is live and clears it around warning dialogs so the watchdog does
/// not raise false positives.
#[derive(Debug, Default)]
pub struct EngineTelemetry {
    last_produced_frames: AtomicUsize,
    running: AtomicBool,
}

impl EngineTelemetry {
    pub fn last_produced_frames(&self) -> usize {
        self.last_produced_frames.load(Ordering::Relaxed)
    }

    pub fn reset_last_produced_frames(&self) {
        self.last_produced_frames.store(0, Ordering::Relaxed);
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn record_produced(&self, frames: usize) {
        self.last_produced_frames.store(frames, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn record_produced_for_test(&self, frames: usize) {
        self.record_produced(frames);
    }
}

/// Monophonic sine engine behind a pull interface.
///
/// The host audio layer calls [`produce`](ToneEngine::produce) once per
/// output buffer; control events (`note_on`, `note_off`, `set_octave`)
/// arrive from the UI between pulls. A new note-on while another note is
/// sounding replaces it.
pub struct ToneEngine {
    sample_rate: f32,
    oscillator: PhaseOscillator,
    envelope: EnvelopeGenerator,
    octave: i32,
    started: bool,
    telemetry: Arc<EngineTelemetry>,
}

impl ToneEngine {
    pub fn new(sample_rate_hz: u32) -> Self {
        let sample_rate = sample_rate_hz as f32;
        Self {
            sample_rate,
            oscillator: PhaseOscillator::new(),
            envelope: EnvelopeGenerator::new(sample_rate),
            octave: pitch::REFERENCE_OCTAVE,
            started: false,
            telemetry: Arc::new(EngineTelemetry::default()),
        }
    }

    /// Shared telemetry handle for the watchdog and the UI.
    pub fn telemetry(&self) -> Arc<EngineTelemetry> {
        Arc::clone(&self.telemetry)
    }

    /// Make the engine ready to be pulled from. Idempotent.
    pub fn start(&mut self) {
        self.started = true;
    }

    /// Release the ready state; `produce` fails until the next `start`.
    pub fn stop(&mut self) {
        self.started = false;
    }

    /// Trigger a note by name. Unknown names are ignored.
    ///
    /// The pitch-table frequency is transposed by `2^(octave - 3)` and the
    /// oscillator restarts from phase zero; the envelope ramps up from its
    /// current volume.
    pub fn note_on(&mut self, note: &str) {
        if let Some(freq) = pitch::lookup(note) {
            let transposed = 2.0_f32.powi(self.octave - pitch::REFERENCE_OCTAVE) * freq;
            self.oscillator.set_frequency(transposed, self.sample_rate);
            self.envelope.note_on();
        }
    }

    /// Release the sounding note. Idempotent when nothing sounds.
    pub fn note_off(&mut self) {
        self.envelope.note_off();
    }

    /// Store the octave; takes effect on the next `note_on` only.
    pub fn set_octave(&mut self, octave: i32) {
        self.octave = octave;
    }

    /// Fill `buffer` completely with the next samples and return the frame
    /// count.
    ///
    /// Never a short read: the pull source treats one as end-of-stream.
    /// Runs on the real-time path, so it takes no locks and allocates
    /// nothing. While the envelope is silent the output is exactly `0.0`
    /// and the oscillator phase is held, not advanced.
    pub fn produce(&mut self, buffer: &mut [f32]) -> Result<usize, EngineError> {
        if !self.started {
            return Err(EngineError::NotStarted);
        }
        for slot in buffer.iter_mut() {
            let level = self.envelope.tick();
            *slot = if self.envelope.is_silent() {
                0.0
            } else {
                self.oscillator.next_sample() * level
            };
        }
        self.telemetry.record_produced(buffer.len());
        Ok(buffer.len())
    }

    #[cfg(test)]
    fn oscillator(&self) -> &PhaseOscillator {
        &self.oscillator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const SAMPLE_RATE: u32 = 44100;
    const RAMP: usize = 882;

    fn started_engine() -> ToneEngine {
        let mut engine = ToneEngine::new(SAMPLE_RATE);
        engine.start();
        engine
    }

    #[test]
    fn produce_before_start_is_an_error() {
        let mut engine = ToneEngine::new(SAMPLE_RATE);
        let mut buf = [0.0_f32; 64];
        assert_eq!(engine.produce(&mut buf), Err(EngineError::NotStarted));
    }

    #[test]
    fn produce_after_stop_is_an_error() {
        let mut engine = started_engine();
        engine.stop();
        let mut buf = [0.0_f32; 64];
        assert_eq!(engine.produce(&mut buf), Err(EngineError::NotStarted));
    }

    #[test]
    fn start_is_idempotent() {
        let mut engine = started_engine();
        engine.start();
        let mut buf = [0.0_f32; 8];
        assert_eq!(engine.produce(&mut buf), Ok(8));
    }

    #[test]
    fn note_on_sets_reference_increment_at_octave_3() {
        let mut engine = started_engine();
        engine.note_on("A");
        let expected = 2.0 * PI * 220.0 / SAMPLE_RATE as f32;
        assert!((engine.oscillator().phase_increment() - expected).abs() < 1e-6);
        assert!((engine.oscillator().phase_increment() - 0.031335).abs() < 1e-5);
    }

    #[test]
    fn octave_transposition_scales_increment() {
        let mut engine = started_engine();
        engine.note_on("A");
        let base = engine.oscillator().phase_increment();

        engine.set_octave(4);
        engine.note_on("A");
        assert!((engine.oscillator().phase_increment() - 2.0 * base).abs() < 1e-6);

        engine.set_octave(2);
        engine.note_on("A");
        assert!((engine.oscillator().phase_increment() - 0.5 * base).abs() < 1e-6);
    }

    #[test]
    fn octave_change_does_not_retune_sounding_note() {
        let mut engine = started_engine();
        engine.note_on("A");
        let before = engine.oscillator().phase_increment();
        engine.set_octave(5);
        let mut buf = [0.0_f32; 64];
        engine.produce(&mut buf).unwrap();
        assert_eq!(engine.oscillator().phase_increment(), before);
    }

    #[test]
    fn unknown_note_is_a_no_op() {
        let mut engine = started_engine();
        engine.note_on("H#");
        let mut buf = [1.0_f32; 32];
        engine.produce(&mut buf).unwrap();
        assert!(buf.iter().all(|&s| s == 0.0), "unmapped key should stay silent");
    }

    #[test]
    fn produce_always_fills_the_whole_buffer() {
        for n in [1_usize, 64, 4096] {
            // Silent state.
            let mut engine = started_engine();
            let mut buf = vec![f32::NAN; n];
            assert_eq!(engine.produce(&mut buf), Ok(n));
            assert!(buf.iter().all(|s| s.is_finite()));

            // Sounding state.
            engine.note_on("C");
            let mut buf = vec![f32::NAN; n];
            assert_eq!(engine.produce(&mut buf), Ok(n));
            assert!(buf.iter().all(|s| s.is_finite()));
        }
    }

    #[test]
    fn produce_updates_telemetry() {
        let mut engine = started_engine();
        let telemetry = engine.telemetry();
        let mut buf = [0.0_f32; 256];
        engine.produce(&mut buf).unwrap();
        assert_eq!(telemetry.last_produced_frames(), 256);
        telemetry.reset_last_produced_frames();
        assert_eq!(telemetry.last_produced_frames(), 0);
    }

    #[test]
    fn full_note_lifecycle() {
        let mut engine = started_engine();
        engine.note_on("A");

        // Attack: after one ramp the envelope sits at 1.0 and the waveform
        // is a 220 Hz sine.
        let mut buf = vec![0.0_f32; RAMP];
        engine.produce(&mut buf).unwrap();
        let expected_angle = (RAMP as f32) * 2.0 * PI * 220.0 / SAMPLE_RATE as f32;
        let last_expected = ((RAMP as f32 - 1.0) * 2.0 * PI * 220.0 / SAMPLE_RATE as f32).sin();
        assert!(
            (buf[RAMP - 1] - last_expected).abs() < 1e-3,
            "last attack sample should be at full envelope"
        );
        assert!((engine.oscillator().phase_angle() - expected_angle).abs() < 1e-2);

        // Release: decays linearly toward zero.
        engine.note_off();
        let mut buf = vec![0.0_f32; RAMP];
        engine.produce(&mut buf).unwrap();
        assert_eq!(buf[RAMP - 1], 0.0);

        // Fully decayed: hard zeros and frozen phase.
        let phase = engine.oscillator().phase_angle();
        let mut buf = vec![f32::NAN; 100];
        engine.produce(&mut buf).unwrap();
        assert!(buf.iter().all(|&s| s == 0.0));
        assert_eq!(engine.oscillator().phase_angle(), phase);
    }

    #[test]
    fn retrigger_replaces_sounding_note() {
        let mut engine = started_engine();
        engine.note_on("A");
        let mut buf = vec![0.0_f32; 2 * RAMP];
        engine.produce(&mut buf).unwrap();

        // New note-on while sustaining: frequency changes, no click.
        engine.note_on("C");
        let expected = 2.0 * PI * 130.813 / SAMPLE_RATE as f32;
        assert!((engine.oscillator().phase_increment() - expected).abs() < 1e-6);
        let mut buf = vec![0.0_f32; 4];
        engine.produce(&mut buf).unwrap();
        assert!(buf[0].abs() <= 1.0);
    }
}
