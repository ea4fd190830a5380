//! # One-Pole Smoother
//!
//! A one-pole lowpass used on control signals rather than audio. The gate
//! computes a target gain per sample; feeding that target through this
//! filter turns hard steps into short exponential glides, which is what
//! keeps a gate from clicking when it opens and closes.
//!
//! ```text
//! y[n] = (1 - a) * x[n] + a * y[n-1]      a = e^(-2π * cutoff / sample_rate)
//! ```

use std::f32::consts::PI;

/// A one-pole (6 dB/octave) lowpass with a settable resting value.
#[derive(Debug, Clone)]
pub struct OnePoleSmoother {
    /// 0.0 passes input through untouched, values near 1.0 smooth heavily.
    coefficient: f32,

    /// The previous output.
    state: f32,
}

impl OnePoleSmoother {
    /// A passthrough smoother resting at `initial`.
    pub fn new(initial: f32) -> Self {
        Self {
            coefficient: 0.0,
            state: initial,
        }
    }

    /// Sets the cutoff. The cutoff is clamped to 0.1 Hz .. 49% of the
    /// sample rate to keep the coefficient inside (0, 1).
    pub fn set_cutoff(&mut self, cutoff_hz: f32, sample_rate: f32) {
        let safe_cutoff = cutoff_hz.clamp(0.1, sample_rate * 0.49);
        self.coefficient = (-2.0 * PI * safe_cutoff / sample_rate).exp();
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let output = (1.0 - self.coefficient) * input + self.coefficient * self.state;
        self.state = output;
        output
    }

    /// The most recent output.
    pub fn current(&self) -> f32 {
        self.state
    }

    /// Jumps straight to `value`, skipping the glide.
    pub fn reset(&mut self, value: f32) {
        self.state = value;
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_without_cutoff() {
        let mut smoother = OnePoleSmoother::new(0.0);

        assert!((smoother.process(1.0) - 1.0).abs() < 1e-6);
        assert!((smoother.process(-0.3) + 0.3).abs() < 1e-6);
    }

    /// A step in the target becomes a monotonic glide that converges.
    #[test]
    fn test_step_glides_toward_target() {
        let mut smoother = OnePoleSmoother::new(1.0);
        smoother.set_cutoff(40.0, 48_000.0);

        let first = smoother.process(0.0);
        assert!(first < 1.0 && first > 0.99, "first step was {first}");

        let mut previous = first;
        for _ in 0..48_000 {
            let next = smoother.process(0.0);
            assert!(next <= previous);
            previous = next;
        }
        assert!(previous.abs() < 1e-4, "did not settle, got {previous}");
    }

    #[test]
    fn test_reset_jumps_to_value() {
        let mut smoother = OnePoleSmoother::new(0.0);
        smoother.set_cutoff(10.0, 48_000.0);
        smoother.process(1.0);

        smoother.reset(0.25);
        assert_eq!(smoother.current(), 0.25);
    }

    #[test]
    fn test_coefficient_range() {
        let mut smoother = OnePoleSmoother::new(0.0);

        smoother.set_cutoff(20_000.0, 44_100.0);
        assert!(smoother.coefficient < 0.1, "got {}", smoother.coefficient);

        smoother.set_cutoff(1.0, 44_100.0);
        assert!(smoother.coefficient > 0.999, "got {}", smoother.coefficient);
    }
}
