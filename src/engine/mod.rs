//! # The DSP Engine
//!
//! A band-focused spectral gate. The engine isolates the band between the
//! lower and upper corner frequencies, measures its level, and either
//! lifts it (when it is loud enough to count as signal) or pushes it down
//! (when it is not). Everything outside the band is attenuated by a fixed
//! falloff.
//!
//! ## Signal Flow
//!
//! ```text
//! Input ──┬──► [HP @ low] ──► [LP @ high] ──► band ──┬──► [Delay L] ──► × gate gain ──┐
//!         │                                          │                                 │
//!         │                             [RMS window] ─► gate curve ─► [Smoother] ──────┘
//!         │                                                                            ▼
//!         └──► input − band ──► residual ──► [Delay L] ──► × falloff ────────────────►(+)──► Output
//! ```
//!
//! The detector looks at the undelayed band while the gain lands on audio
//! that is `L` samples older, so the gate opens just before a note arrives
//! instead of clipping its attack. `L` is the latency reported to hosts.
//!
//! ## Threading
//!
//! State is split in two. [`EngineControls`] holds atomics written from the
//! control thread (host parameter slots, musical mode). [`AuraEngine`]
//! holds filter and buffer state owned by whichever thread is processing.
//!
//! The musical mode (root note and scale) is carried alongside the host
//! slots so it survives engine swaps and is visible to whatever drives the
//! engine, but the gate itself only listens to band level. Changing the
//! key does not change the output.
//! The two are installed side by side in an
//! [`EngineSlot`](slot::EngineSlot).

pub mod host_params;
pub mod slot;

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz};
use nih_plug::nih_log;
use nih_plug::util::db_to_gain;

use crate::config::{BusSettings, GAIN_SMOOTHING_HZ, MAX_CHANNELS};
use crate::dsp::delayed_buffer::DelayedBuffer;
use crate::dsp::filter::OnePoleSmoother;
use crate::dsp::ring_buffer::RingBuffer;
use crate::scale::{note_index, Scale, NOTE_NAMES};
use host_params::{HostParamTree, HostSlot};

/// Everything the control thread may change while audio is running.
#[derive(Debug)]
pub struct EngineControls {
    host_params: HostParamTree,
    root_note: AtomicUsize,
    scale: AtomicUsize,
}

impl Default for EngineControls {
    fn default() -> Self {
        Self {
            host_params: HostParamTree::default(),
            root_note: AtomicUsize::new(0),
            scale: AtomicUsize::new(Scale::default().index()),
        }
    }
}

impl EngineControls {
    pub fn host_params(&self) -> &HostParamTree {
        &self.host_params
    }

    /// Switches the root note by name. Returns `false` for names outside
    /// [`NOTE_NAMES`], leaving the mode unchanged.
    pub fn update_note(&self, note: &str) -> bool {
        match note_index(note) {
            Some(index) => {
                self.root_note.store(index, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn update_scale(&self, scale: Scale) {
        self.scale.store(scale.index(), Ordering::Relaxed);
    }

    pub fn root_note(&self) -> &'static str {
        NOTE_NAMES[self.root_note.load(Ordering::Relaxed) % NOTE_NAMES.len()]
    }

    pub fn scale(&self) -> Scale {
        Scale::from_index(self.scale.load(Ordering::Relaxed)).unwrap_or_default()
    }
}

/// Per-channel filter and detector state.
struct ChannelState {
    highpass: DirectForm2Transposed<f32>,
    lowpass: DirectForm2Transposed<f32>,
    /// Squared band samples over the detector window.
    window: RingBuffer<f32>,
    /// Running sum of `window`.
    energy: f32,
}

impl ChannelState {
    fn new(window_len: NonZeroUsize, corners: &Corners) -> Self {
        Self {
            highpass: DirectForm2Transposed::<f32>::new(corners.highpass),
            lowpass: DirectForm2Transposed::<f32>::new(corners.lowpass),
            window: RingBuffer::new(window_len),
            energy: 0.0,
        }
    }

    /// Pushes one band sample into the RMS window and returns the
    /// window's RMS level.
    fn detect(&mut self, band: f32, window_len: f32) -> f32 {
        let squared = band * band;
        let evicted = self.window.insert_and_pop(squared);
        // Clamp away the rounding drift of a long-running sum.
        self.energy = (self.energy + squared - evicted).max(0.0);
        (self.energy / window_len).sqrt()
    }
}

/// Corner filter coefficients and the settings they were computed from.
#[derive(Clone, Copy)]
struct Corners {
    low_hz: f32,
    high_hz: f32,
    q: f32,
    highpass: Coefficients<f32>,
    lowpass: Coefficients<f32>,
}

impl Corners {
    fn new(low_hz: f32, high_hz: f32, quality: f32, sample_rate: f32) -> Self {
        let q = (quality / 100.0).max(0.01);
        Self {
            low_hz,
            high_hz,
            q,
            highpass: corner_coefficients(biquad::Type::HighPass, low_hz, q, sample_rate),
            lowpass: corner_coefficients(biquad::Type::LowPass, high_hz, q, sample_rate),
        }
    }

    fn matches(&self, low_hz: f32, high_hz: f32, quality: f32) -> bool {
        self.low_hz == low_hz && self.high_hz == high_hz && self.q == (quality / 100.0).max(0.01)
    }
}

fn corner_coefficients(
    filter: biquad::Type<f32>,
    cutoff_hz: f32,
    q: f32,
    sample_rate: f32,
) -> Coefficients<f32> {
    let cutoff_hz = cutoff_hz.clamp(10.0, sample_rate * 0.45);
    Coefficients::<f32>::from_params(filter, sample_rate.hz(), cutoff_hz.hz(), q).unwrap_or(
        // Identity filter. Only reachable with a degenerate sample rate.
        Coefficients {
            a1: 0.0,
            a2: 0.0,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
        },
    )
}

/// Band gain in dB for a detector level. Below `lower` the band is cut by
/// `reduce_db`, above `upper` it is lifted by `add_db`, and in between
/// the gain moves linearly in dB.
pub fn gate_gain_db(level: f32, lower: f32, upper: f32, add_db: f32, reduce_db: f32) -> f32 {
    if level >= upper && level >= lower {
        return add_db;
    }
    if level <= lower || upper <= lower {
        return -reduce_db;
    }

    let t = (level - lower) / (upper - lower);
    -reduce_db + t * (add_db + reduce_db)
}

/// Filter, detector and delay state of one prepared engine instance.
///
/// Everything is allocated in [`new()`](Self::new); processing and
/// resetting never allocate.
pub struct AuraEngine {
    settings: BusSettings,
    sample_rate: f32,
    window_len: f32,
    corners: Corners,
    channels: [ChannelState; MAX_CHANNELS],
    band_delay: DelayedBuffer,
    residual_delay: DelayedBuffer,
    band_scratch: [Vec<f32>; MAX_CHANNELS],
    residual_scratch: [Vec<f32>; MAX_CHANNELS],
    gain_scratch: Vec<f32>,
    gain_smoother: OnePoleSmoother,
}

impl AuraEngine {
    /// Builds an engine for the given configuration. The corner filters
    /// start from the current values in `controls`.
    pub fn new(settings: BusSettings, controls: &EngineControls) -> Self {
        let block_size = settings.block_size.max(1);
        let sample_rate = settings.sample_rate as f32;
        let lookahead = settings.lookahead_samples();
        let window = NonZeroUsize::new(settings.detector_window_samples())
            .unwrap_or(NonZeroUsize::MIN);

        let params = controls.host_params();
        let corners = Corners::new(
            params.value(HostSlot::LowFreq),
            params.value(HostSlot::HighFreq),
            params.value(HostSlot::FilterQuality),
            sample_rate,
        );

        let mut gain_smoother = OnePoleSmoother::new(1.0);
        gain_smoother.set_cutoff(GAIN_SMOOTHING_HZ, sample_rate);

        nih_log!(
            "Preparing engine: {} Hz, {} samples per block, {} channel(s), {} samples of lookahead",
            settings.sample_rate,
            block_size,
            settings.processed_channels(),
            lookahead
        );

        Self {
            settings: BusSettings {
                block_size,
                ..settings
            },
            sample_rate,
            window_len: window.get() as f32,
            corners,
            channels: std::array::from_fn(|_| ChannelState::new(window, &corners)),
            band_delay: DelayedBuffer::new(MAX_CHANNELS, block_size, lookahead),
            residual_delay: DelayedBuffer::new(MAX_CHANNELS, block_size, lookahead),
            band_scratch: std::array::from_fn(|_| vec![0.0; block_size]),
            residual_scratch: std::array::from_fn(|_| vec![0.0; block_size]),
            gain_scratch: vec![0.0; block_size],
            gain_smoother,
        }
    }

    pub fn settings(&self) -> &BusSettings {
        &self.settings
    }

    /// Delay between input and output, in samples.
    pub fn latency_samples(&self) -> usize {
        self.band_delay.latency_size()
    }

    /// Processes audio in place. Blocks longer than the prepared block
    /// size are split. Channels past [`MAX_CHANNELS`] are left untouched.
    pub fn process_block(&mut self, controls: &EngineControls, channels: &mut [&mut [f32]]) {
        let num_channels = channels.len().min(MAX_CHANNELS);
        let num_samples = channels[..num_channels]
            .iter()
            .map(|c| c.len())
            .min()
            .unwrap_or(0);

        self.update_corners(controls);

        let block_size = self.settings.block_size;
        let mut offset = 0;
        while offset < num_samples {
            let n = block_size.min(num_samples - offset);
            self.process_chunk(controls, &mut channels[..num_channels], offset, n);
            offset += n;
        }
    }

    fn update_corners(&mut self, controls: &EngineControls) {
        let params = controls.host_params();
        let low = params.value(HostSlot::LowFreq);
        let high = params.value(HostSlot::HighFreq);
        let quality = params.value(HostSlot::FilterQuality);
        if self.corners.matches(low, high, quality) {
            return;
        }

        self.corners = Corners::new(low, high, quality, self.sample_rate);
        for channel in &mut self.channels {
            channel.highpass.update_coefficients(self.corners.highpass);
            channel.lowpass.update_coefficients(self.corners.lowpass);
        }
    }

    fn process_chunk(
        &mut self,
        controls: &EngineControls,
        channels: &mut [&mut [f32]],
        offset: usize,
        n: usize,
    ) {
        let params = controls.host_params();
        let lower = params.value(HostSlot::GateLowerThreshold);
        let upper = params.value(HostSlot::GateUpperThreshold);
        let add_db = params.value(HostSlot::AdditionGain);
        let reduce_db = params.value(HostSlot::ReductionGain);
        let falloff = db_to_gain(params.value(HostSlot::GateFalloff));

        // Split into band and residual, and track the loudest channel's
        // band level per sample so both channels share one gate.
        self.gain_scratch[..n].fill(0.0);
        for (c, samples) in channels.iter().enumerate() {
            let state = &mut self.channels[c];
            let band = &mut self.band_scratch[c];
            let residual = &mut self.residual_scratch[c];

            for i in 0..n {
                let input = samples[offset + i];
                let filtered = state.lowpass.run(state.highpass.run(input));
                band[i] = filtered;
                residual[i] = input - filtered;

                let level = state.detect(filtered, self.window_len);
                self.gain_scratch[i] = self.gain_scratch[i].max(level);
            }
        }

        for gain in &mut self.gain_scratch[..n] {
            let target = db_to_gain(gate_gain_db(*gain, lower, upper, add_db, reduce_db));
            *gain = self.gain_smoother.process(target);
        }

        // Line the audio up with the gain computed from its future.
        self.band_delay
            .fill_buffer(&self.band_scratch.each_ref().map(|b| &b[..n]));
        self.band_delay
            .set_buffer_to_delayed_buffer(&mut self.band_scratch.each_mut().map(|b| &mut b[..n]));
        self.residual_delay
            .fill_buffer(&self.residual_scratch.each_ref().map(|r| &r[..n]));
        self.residual_delay.set_buffer_to_delayed_buffer(
            &mut self.residual_scratch.each_mut().map(|r| &mut r[..n]),
        );

        for (c, samples) in channels.iter_mut().enumerate() {
            let band = &self.band_scratch[c];
            let residual = &self.residual_scratch[c];
            for i in 0..n {
                samples[offset + i] = residual[i] * falloff + band[i] * self.gain_scratch[i];
            }
        }
    }

    /// Clears filter memory, detector windows and delay lines.
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.highpass = DirectForm2Transposed::<f32>::new(self.corners.highpass);
            channel.lowpass = DirectForm2Transposed::<f32>::new(self.corners.lowpass);
            channel.window.clear();
            channel.energy = 0.0;
        }
        self.band_delay.clear();
        self.residual_delay.clear();
        self.gain_smoother.reset(1.0);
    }

    /// Called right before the engine is dropped on teardown.
    pub fn release_resources(&mut self) {
        nih_log!(
            "Releasing engine prepared for {} Hz / {} samples",
            self.settings.sample_rate,
            self.settings.block_size
        );
        self.reset();
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(block_size: usize) -> (AuraEngine, EngineControls) {
        let controls = EngineControls::default();
        let settings = BusSettings::new(48_000.0, block_size, 2, 2);
        (AuraEngine::new(settings, &controls), controls)
    }

    fn noise(len: usize, seed: u32) -> Vec<f32> {
        // xorshift, good enough for a test signal
        let mut state = seed.max(1);
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect()
    }

    #[test]
    fn test_silence_in_silence_out() {
        let (mut engine, controls) = engine(64);
        let mut left = vec![0.0; 64];
        let mut right = vec![0.0; 64];

        for _ in 0..10 {
            engine.process_block(&controls, &mut [left.as_mut_slice(), right.as_mut_slice()]);
            assert!(left.iter().chain(right.iter()).all(|&s| s == 0.0));
        }
    }

    /// Nothing comes out before the lookahead has elapsed.
    #[test]
    fn test_output_is_delayed_by_latency() {
        let (mut engine, controls) = engine(256);
        let latency = engine.latency_samples();
        assert_eq!(latency, 96);

        let mut impulse = vec![0.0; 256];
        impulse[0] = 1.0;
        engine.process_block(&controls, &mut [impulse.as_mut_slice()]);

        assert!(impulse[..latency].iter().all(|&s| s == 0.0));
        assert!(impulse[latency].abs() > 0.0);
    }

    /// Splitting a host block into prepared-size chunks gives the same
    /// result as feeding those chunks one call at a time.
    #[test]
    fn test_long_blocks_match_chunked_processing() {
        let input = noise(1024, 7);

        let (mut whole, controls) = engine(256);
        let mut whole_out = input.clone();
        whole.process_block(&controls, &mut [whole_out.as_mut_slice()]);

        let (mut chunked, controls) = engine(256);
        let mut chunked_out = input.clone();
        for chunk in chunked_out.chunks_mut(256) {
            chunked.process_block(&controls, &mut [chunk]);
        }

        assert_eq!(whole_out, chunked_out);
    }

    /// Odd host block sizes keep the delay constant.
    #[test]
    fn test_short_blocks_match_full_blocks() {
        let input = noise(768, 3);

        let (mut full, controls) = engine(256);
        let mut full_out = input.clone();
        full.process_block(&controls, &mut [full_out.as_mut_slice()]);

        let (mut ragged, controls) = engine(256);
        let mut ragged_out = input.clone();
        for chunk in ragged_out.chunks_mut(100) {
            ragged.process_block(&controls, &mut [chunk]);
        }

        for (a, b) in full_out.iter().zip(&ragged_out) {
            assert!((a - b).abs() < 1e-5, "{a} != {b}");
        }
    }

    #[test]
    fn test_reset_clears_state() {
        let (mut engine, controls) = engine(128);
        let mut block = noise(128, 11);
        engine.process_block(&controls, &mut [block.as_mut_slice()]);

        engine.reset();
        let mut silence = vec![0.0; 128];
        engine.process_block(&controls, &mut [silence.as_mut_slice()]);
        assert!(silence.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_gate_curve() {
        // Below the lower threshold: full reduction.
        assert_eq!(gate_gain_db(0.1, 0.3, 0.5, 11.0, 25.0), -25.0);
        // Above the upper threshold: full lift.
        assert_eq!(gate_gain_db(0.9, 0.3, 0.5, 11.0, 25.0), 11.0);
        // Halfway between the thresholds, halfway between the gains.
        assert!((gate_gain_db(0.4, 0.3, 0.5, 11.0, 25.0) - -7.0).abs() < 1e-4);
        // Crossed thresholds act as a hard switch at the lower one.
        assert_eq!(gate_gain_db(0.35, 0.6, 0.2, 11.0, 25.0), -25.0);
        assert_eq!(gate_gain_db(0.65, 0.6, 0.2, 11.0, 25.0), 11.0);
    }

    /// With the gate wide open and no falloff, a loud in-band tone comes
    /// out louder than a quiet one is let through.
    #[test]
    fn test_gate_lifts_loud_band_and_cuts_quiet_band() {
        let rms_of_tail = |amplitude: f32| {
            let (mut engine, controls) = engine(480);
            let len = 48_000;
            let mut tone: Vec<f32> = (0..len)
                .map(|i| amplitude * (2.0 * std::f32::consts::PI * 600.0 * i as f32 / 48_000.0).sin())
                .collect();
            for block in tone.chunks_mut(480) {
                engine.process_block(&controls, &mut [block]);
            }
            let tail = &tone[len / 2..];
            (tail.iter().map(|s| s * s).sum::<f32>() / tail.len() as f32).sqrt()
        };

        let loud_ratio = rms_of_tail(0.9) / (0.9 / 2f32.sqrt());
        let quiet_ratio = rms_of_tail(0.05) / (0.05 / 2f32.sqrt());
        assert!(loud_ratio > 1.5, "loud tone gain {loud_ratio}");
        assert!(quiet_ratio < 0.5, "quiet tone gain {quiet_ratio}");
    }

    #[test]
    fn test_controls_track_musical_mode() {
        let controls = EngineControls::default();
        assert_eq!(controls.root_note(), "A");
        assert_eq!(controls.scale(), Scale::PentatonicMinor);

        assert!(controls.update_note("D#"));
        assert!(!controls.update_note("X"));
        assert_eq!(controls.root_note(), "D#");

        controls.update_scale(Scale::Dorian);
        assert_eq!(controls.scale(), Scale::Dorian);
    }

    #[test]
    fn test_musical_mode_leaves_the_output_alone() {
        let input = noise(1024, 5);

        let (mut default_mode, controls) = engine(256);
        let mut expected = input.clone();
        default_mode.process_block(&controls, &mut [expected.as_mut_slice()]);

        let (mut other_mode, controls) = engine(256);
        controls.update_note("E");
        controls.update_scale(Scale::Chromatic);
        let mut output = input.clone();
        other_mode.process_block(&controls, &mut [output.as_mut_slice()]);

        assert_eq!(output, expected);
    }

    /// Corner changes made on the control side reach the filters.
    #[test]
    fn test_corner_changes_are_picked_up() {
        let (mut engine, controls) = engine(64);
        let before = engine.corners.high_hz;

        controls
            .host_params()
            .slot(HostSlot::HighFreq)
            .set_value_notifying_host(1.0);
        engine.process_block(&controls, &mut [vec![0.0; 64].as_mut_slice()]);

        assert_ne!(engine.corners.high_hz, before);
        assert!((engine.corners.high_hz - 20_000.0).abs() < 1e-2);
    }
}
