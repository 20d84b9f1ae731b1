//! Linear attack/sustain/release amplitude envelope.

/// Envelope stages. `Silent` and `Sustain` are stable; `Attack` and
/// `Release` count down a fixed number of per-sample steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Silent,
    Attack,
    Sustain,
    Release,
}

/// Attack and release ramp length in seconds.
const RAMP_SECONDS: f32 = 0.02;

/// Four-state amplitude shaper driven by note events and a per-sample
/// countdown.
///
/// Both ramps are 20 ms of samples at the configured rate, computed once at
/// construction. Ramps always continue from the current volume, so a note-off
/// during attack or a retrigger during release never produces a step larger
/// than `step_delta` between adjacent samples. That is the click-avoidance
/// guarantee.
#[derive(Debug, Clone)]
pub struct EnvelopeGenerator {
    stage: Stage,
    volume: f32,
    remaining_steps: u32,
    step_delta: f32,
    ramp_steps: u32,
}

impl EnvelopeGenerator {
    pub fn new(sample_rate_hz: f32) -> Self {
        let ramp_steps = (RAMP_SECONDS * sample_rate_hz).round() as u32;
        Self {
            stage: Stage::Silent,
            volume: 0.0,
            remaining_steps: 0,
            step_delta: 1.0 / ramp_steps as f32,
            ramp_steps,
        }
    }

    /// Begin (or restart) the attack ramp from the current volume.
    pub fn note_on(&mut self) {
        self.stage = Stage::Attack;
        self.remaining_steps = self.ramp_steps;
    }

    /// Begin the release ramp. No-op when already silent or releasing.
    pub fn note_off(&mut self) {
        match self.stage {
            Stage::Attack | Stage::Sustain => {
                self.stage = Stage::Release;
                self.remaining_steps = self.ramp_steps;
            }
            Stage::Silent | Stage::Release => {}
        }
    }

    /// Advance one sample and return the volume to apply to it.
    pub fn tick(&mut self) -> f32 {
        match self.stage {
            Stage::Attack => {
                self.volume = (self.volume + self.step_delta).min(1.0);
                self.remaining_steps -= 1;
                if self.remaining_steps == 0 {
                    self.stage = Stage::Sustain;
                    self.volume = 1.0;
                }
            }
            Stage::Release => {
                self.volume = (self.volume - self.step_delta).max(0.0);
                self.remaining_steps -= 1;
                if self.remaining_steps == 0 {
                    self.stage = Stage::Silent;
                    self.volume = 0.0;
                }
            }
            Stage::Silent | Stage::Sustain => {}
        }
        self.volume
    }

    /// While silent the oscillator is skipped entirely and output is a hard
    /// `0.0`.
    pub fn is_silent(&self) -> bool {
        self.stage == Stage::Silent
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Per-step volume change, `1 / ramp_steps`.
    pub fn step_delta(&self) -> f32 {
        self.step_delta
    }
}
