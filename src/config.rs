//! # Configuration
//!
//! Sizing information handed to the engine on every prepare, and the
//! constants that shape the engine's behavior. Nothing here is read from
//! disk: hosts tell us the sample rate, block size and channel counts, and
//! everything else is fixed at compile time.

/// Sample rate used when a host calls `process` without ever calling
/// `prepare` first.
pub const FALLBACK_SAMPLE_RATE: f64 = 48_000.0;

/// The façade only supports mono and stereo.
pub const MAX_CHANNELS: usize = 2;

/// How far the gate looks ahead of the audio it attenuates. This is also
/// the latency the plugin reports to the host.
pub const LOOKAHEAD_MS: f32 = 2.0;

/// Length of the RMS window the gate's level detector averages over.
pub const DETECTOR_WINDOW_MS: f32 = 10.0;

/// Cutoff of the one-pole filter that smooths gate gain changes. Low
/// enough to avoid zipper noise, high enough to follow transients.
pub const GAIN_SMOOTHING_HZ: f32 = 40.0;

/// Version stamped into every [`PluginState`](crate::abi::PluginState)
/// snapshot. Snapshots carrying another version are rejected.
pub const STATE_VERSION: u32 = 1;

/// Audio configuration the engine is built for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BusSettings {
    pub sample_rate: f64,
    /// Largest block the host will hand to `process`.
    pub block_size: usize,
    pub input_channels: usize,
    pub output_channels: usize,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            block_size: 512,
            input_channels: 2,
            output_channels: 2,
        }
    }
}

impl BusSettings {
    pub fn new(
        sample_rate: f64,
        block_size: usize,
        input_channels: usize,
        output_channels: usize,
    ) -> Self {
        Self {
            sample_rate,
            block_size,
            input_channels,
            output_channels,
        }
    }

    /// Number of channels the engine processes in place. Output channels
    /// beyond the inputs carry no signal, and the façade never exceeds
    /// [`MAX_CHANNELS`].
    pub fn processed_channels(&self) -> usize {
        self.input_channels
            .min(self.output_channels)
            .clamp(1, MAX_CHANNELS)
    }

    /// Converts a duration in milliseconds to a whole number of samples at
    /// this sample rate. Never returns zero.
    pub fn ms_to_samples(&self, ms: f32) -> usize {
        ((ms as f64 * self.sample_rate / 1000.0).round() as usize).max(1)
    }

    pub fn lookahead_samples(&self) -> usize {
        self.ms_to_samples(LOOKAHEAD_MS)
    }

    pub fn detector_window_samples(&self) -> usize {
        self.ms_to_samples(DETECTOR_WINDOW_MS)
    }
}
