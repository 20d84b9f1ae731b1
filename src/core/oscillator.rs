//! Phase-accumulating sine oscillator.

use std::f32::consts::PI;

/// A sine oscillator driven by a running phase angle.
///
/// The increment is fixed when a note starts; the per-sample step is
/// branch-free and allocation-free since it runs on the production path.
#[derive(Debug, Clone, Default)]
pub struct PhaseOscillator {
    phase_angle: f32,
    phase_increment: f32,
}

impl PhaseOscillator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retune the oscillator and restart the cycle from phase zero.
    ///
    /// Called only on note-on; a sounding note is never retuned mid-flight.
    pub fn set_frequency(&mut self, freq_hz: f32, sample_rate_hz: f32) {
        self.phase_increment = 2.0 * PI * freq_hz / sample_rate_hz;
        self.phase_angle = 0.0;
    }

    /// Return `sin(angle)`, then advance the angle by one increment.
    pub fn next_sample(&mut self) -> f32 {
        let sample = self.phase_angle.sin();
        self.phase_angle += self.phase_increment;
        sample
    }

    /// Radians advanced per output sample.
    pub fn phase_increment(&self) -> f32 {
        self.phase_increment
    }

    /// Current phase angle in radians. The engine holds this frozen while
    /// the envelope is silent.
    pub fn phase_angle(&self) -> f32 {
        self.phase_angle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 44100.0;

    #[test]
    fn increment_matches_formula() {
        let mut osc = PhaseOscillator::new();
        osc.set_frequency(220.0, SAMPLE_RATE);
        let expected = 2.0 * PI * 220.0 / SAMPLE_RATE;
        assert!((osc.phase_increment() - expected).abs() < 1e-7);
        // Published reference value from the A-220 case.
        assert!((osc.phase_increment() - 0.031335).abs() < 1e-5);
    }

    #[test]
    fn set_frequency_resets_phase() {
        let mut osc = PhaseOscillator::new();
        osc.set_frequency(440.0, SAMPLE_RATE);
        for _ in 0..100 {
            osc.next_sample();
        }
        osc.set_frequency(220.0, SAMPLE_RATE);
        assert_eq!(osc.phase_angle(), 0.0);
    }

    #[test]
    fn first_sample_is_zero_then_advances() {
        let mut osc = PhaseOscillator::new();
        osc.set_frequency(440.0, SAMPLE_RATE);
        assert_eq!(osc.next_sample(), 0.0);
        assert!(osc.next_sample() > 0.0, "sine should rise from zero");
    }

    #[test]
    fn output_stays_in_range() {
        let mut osc = PhaseOscillator::new();
        osc.set_frequency(880.0, SAMPLE_RATE);
        for _ in 0..44100 {
            let s = osc.next_sample();
            assert!((-1.0..=1.0).contains(&s), "sine out of range: {s}");
        }
    }

    #[test]
    fn completes_one_cycle_per_period() {
        // At 441 Hz and 44100 Hz, one cycle is exactly 100 samples.
        let mut osc = PhaseOscillator::new();
        osc.set_frequency(441.0, SAMPLE_RATE);
        for _ in 0..100 {
            osc.next_sample();
        }
        assert!((osc.phase_angle() - 2.0 * PI).abs() < 1e-4);
    }
}
