//! # Plugin ABI
//!
//! The host-facing surface of the plugin: a fixed parameter map, a flat
//! [`PluginState`] snapshot, and the [`Plugin`] façade that ties them to
//! the DSP engine. The nih-plug shell in `lib.rs` and the C functions in
//! [`ffi`] both drive the same façade.
//!
//! ## Lifecycle
//!
//! ```text
//!   new() ──► Uninitialized ──prepare()──► Prepared ◄──┐
//!                  │                          │        │ block done
//!                  └──process() (lazy prepare)┴──► Processing
//! ```
//!
//! There is no explicit stop. Dropping the façade retires the engine
//! before the parameter map goes away.
//!
//! ## Threads
//!
//! `prepare()`, `set_parameter()`, `set_state()` and friends take the
//! control lock. `process()` does not: it reaches the engine through the
//! lock-free [`EngineSlot`] and reads the post-gain from an atomic.

pub mod ffi;

use std::sync::atomic::{AtomicBool, Ordering};

use nih_plug::{nih_log, nih_warn};
use parking_lot::Mutex;

use crate::config::{BusSettings, FALLBACK_SAMPLE_RATE, MAX_CHANNELS, STATE_VERSION};
use crate::engine::host_params::{
    HostSlot, ADDITION_GAIN_ID, FILTER_QUALITY_ID, HIGH_FREQ_ID, LOW_FREQ_ID, REDUCTION_GAIN_ID,
    SPECTRAL_GATE_FALLOFF_ID, SPECTRAL_GATE_LOWER_THRESH_ID, SPECTRAL_GATE_UPPER_THRESH_ID,
};
use crate::engine::slot::{EngineEntry, EngineSlot};
use crate::engine::{AuraEngine, EngineControls};
use crate::error::PluginError;
use crate::parameter::Parameter;
use crate::scale::Scale;
use crate::state_tree::PropertyTree;

/// Key of a slot in the parameter map. The discriminants are part of the
/// C ABI.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginParameter {
    GainNormalized = 0,
    RootNote = 1,
    Scale = 2,
    GainAdd = 3,
    GainReduce = 4,
    LowerFreq = 5,
    UpperFreq = 6,
    Quality = 7,
    SpectralGateLower = 8,
    SpectralGateUpper = 9,
    SpectralGateFalloff = 10,
}

impl PluginParameter {
    pub const COUNT: usize = 11;

    /// Every key, in the order `set_state()` applies them.
    pub const ALL: [PluginParameter; Self::COUNT] = [
        PluginParameter::GainNormalized,
        PluginParameter::RootNote,
        PluginParameter::Scale,
        PluginParameter::GainAdd,
        PluginParameter::GainReduce,
        PluginParameter::LowerFreq,
        PluginParameter::UpperFreq,
        PluginParameter::Quality,
        PluginParameter::SpectralGateLower,
        PluginParameter::SpectralGateUpper,
        PluginParameter::SpectralGateFalloff,
    ];

    /// Validates a key coming in over the C ABI.
    pub fn from_raw(raw: u32) -> Option<PluginParameter> {
        Self::ALL.get(raw as usize).copied()
    }

    /// The host slot this key mirrors, if any.
    pub fn host_slot(self) -> Option<HostSlot> {
        match self {
            PluginParameter::GainNormalized
            | PluginParameter::RootNote
            | PluginParameter::Scale => None,
            PluginParameter::GainAdd => Some(HostSlot::AdditionGain),
            PluginParameter::GainReduce => Some(HostSlot::ReductionGain),
            PluginParameter::LowerFreq => Some(HostSlot::LowFreq),
            PluginParameter::UpperFreq => Some(HostSlot::HighFreq),
            PluginParameter::Quality => Some(HostSlot::FilterQuality),
            PluginParameter::SpectralGateLower => Some(HostSlot::GateLowerThreshold),
            PluginParameter::SpectralGateUpper => Some(HostSlot::GateUpperThreshold),
            PluginParameter::SpectralGateFalloff => Some(HostSlot::GateFalloff),
        }
    }

    /// Stable string id, shared by the persisted state tree and the host
    /// parameters. Never change these once released.
    pub fn id(self) -> &'static str {
        match self {
            PluginParameter::GainNormalized => "gain",
            PluginParameter::RootNote => "rootNote",
            PluginParameter::Scale => "scale",
            PluginParameter::GainAdd => ADDITION_GAIN_ID,
            PluginParameter::GainReduce => REDUCTION_GAIN_ID,
            PluginParameter::LowerFreq => LOW_FREQ_ID,
            PluginParameter::UpperFreq => HIGH_FREQ_ID,
            PluginParameter::Quality => FILTER_QUALITY_ID,
            PluginParameter::SpectralGateLower => SPECTRAL_GATE_LOWER_THRESH_ID,
            PluginParameter::SpectralGateUpper => SPECTRAL_GATE_UPPER_THRESH_ID,
            PluginParameter::SpectralGateFalloff => SPECTRAL_GATE_FALLOFF_ID,
        }
    }

    pub fn from_id(id: &str) -> Option<PluginParameter> {
        Self::ALL.into_iter().find(|key| key.id() == id)
    }

    /// A fresh parameter at its default value.
    fn create(self) -> Parameter {
        if let Some(slot) = self.host_slot() {
            return Parameter::host_linked(slot);
        }

        match self {
            PluginParameter::RootNote => Parameter::note(),
            PluginParameter::Scale => Parameter::scale(),
            // GainNormalized
            _ => Parameter::linear(0.0, 1.0, 1.0),
        }
    }
}

/// Flat snapshot of every parameter's ranged value.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PluginState {
    /// Must equal [`STATE_VERSION`].
    pub version: u32,
    /// Linear post-gain, 0 to 1.
    pub gain_normalized: f32,
    /// Index into [`NOTE_NAMES`](crate::scale::NOTE_NAMES).
    pub root_note: f32,
    /// Index into [`Scale::ALL`].
    pub scale: f32,
    /// Hz
    pub lower_freq: f32,
    /// Hz
    pub upper_freq: f32,
    pub gain_add_db: f32,
    pub gain_reduce_db: f32,
    pub quality: f32,
    pub spectral_gate_lower: f32,
    pub spectral_gate_upper: f32,
    pub spectral_gate_falloff: f32,
}

impl Default for PluginState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            gain_normalized: 1.0,
            root_note: 0.0,
            scale: Scale::default().index() as f32,
            lower_freq: 250.0,
            upper_freq: 1_500.0,
            gain_add_db: 11.0,
            gain_reduce_db: 25.0,
            quality: 90.0,
            spectral_gate_lower: 0.3,
            spectral_gate_upper: 0.5,
            spectral_gate_falloff: -16.0,
        }
    }
}

impl PluginState {
    pub fn get(&self, key: PluginParameter) -> f32 {
        match key {
            PluginParameter::GainNormalized => self.gain_normalized,
            PluginParameter::RootNote => self.root_note,
            PluginParameter::Scale => self.scale,
            PluginParameter::GainAdd => self.gain_add_db,
            PluginParameter::GainReduce => self.gain_reduce_db,
            PluginParameter::LowerFreq => self.lower_freq,
            PluginParameter::UpperFreq => self.upper_freq,
            PluginParameter::Quality => self.quality,
            PluginParameter::SpectralGateLower => self.spectral_gate_lower,
            PluginParameter::SpectralGateUpper => self.spectral_gate_upper,
            PluginParameter::SpectralGateFalloff => self.spectral_gate_falloff,
        }
    }

    pub fn set(&mut self, key: PluginParameter, value: f32) {
        let field = match key {
            PluginParameter::GainNormalized => &mut self.gain_normalized,
            PluginParameter::RootNote => &mut self.root_note,
            PluginParameter::Scale => &mut self.scale,
            PluginParameter::GainAdd => &mut self.gain_add_db,
            PluginParameter::GainReduce => &mut self.gain_reduce_db,
            PluginParameter::LowerFreq => &mut self.lower_freq,
            PluginParameter::UpperFreq => &mut self.upper_freq,
            PluginParameter::Quality => &mut self.quality,
            PluginParameter::SpectralGateLower => &mut self.spectral_gate_lower,
            PluginParameter::SpectralGateUpper => &mut self.spectral_gate_upper,
            PluginParameter::SpectralGateFalloff => &mut self.spectral_gate_falloff,
        };
        *field = value;
    }

    /// Rejects snapshots from another version or with non-finite fields.
    pub fn validate(&self) -> Result<(), PluginError> {
        if self.version != STATE_VERSION {
            return Err(PluginError::StateVersionMismatch {
                found: self.version,
                expected: STATE_VERSION,
            });
        }

        match PluginParameter::ALL
            .into_iter()
            .find(|&key| !self.get(key).is_finite())
        {
            Some(key) => Err(PluginError::NonFiniteStateField(key.id())),
            None => Ok(()),
        }
    }
}

/// Everything behind the control lock.
struct ControlState {
    /// The last snapshot handed in or out.
    snapshot: PluginState,
    settings: BusSettings,
}

/// The plugin façade.
pub struct Plugin {
    params: [Parameter; PluginParameter::COUNT],
    slot: EngineSlot,
    control: Mutex<ControlState>,
    prepared: AtomicBool,
}

impl Default for Plugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin {
    /// A façade with every parameter at its default and no engine yet.
    pub fn new() -> Self {
        Self {
            params: PluginParameter::ALL.map(PluginParameter::create),
            slot: EngineSlot::default(),
            control: Mutex::new(ControlState {
                snapshot: PluginState::default(),
                settings: BusSettings::default(),
            }),
            prepared: AtomicBool::new(false),
        }
    }

    pub fn parameter(&self, key: PluginParameter) -> &Parameter {
        &self.params[key as usize]
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.load(Ordering::Acquire)
    }

    /// Sets one parameter by ranged value. The value is clamped to the
    /// parameter's range; NaN and infinities are rejected.
    pub fn set_parameter(&self, key: PluginParameter, value: f32) -> Result<(), PluginError> {
        if !value.is_finite() {
            return Err(PluginError::ParameterTypeDoesntMatch {
                parameter: key.id(),
                value,
            });
        }

        let _control = self.control.lock();
        // SAFETY: the control lock is held until the end of this scope.
        let controls = unsafe { self.slot.controls() };
        self.parameter(key).set(value, controls);
        Ok(())
    }

    /// [`set_parameter()`](Self::set_parameter) with a key from the C ABI.
    pub fn set_parameter_raw(&self, raw: u32, value: f32) -> Result<(), PluginError> {
        let key = PluginParameter::from_raw(raw).ok_or(PluginError::ParameterDoesntExist(raw))?;
        self.set_parameter(key, value)
    }

    /// Applies values from the audio thread. Gives up and returns `false`
    /// if the control path holds the lock, leaving every parameter as it
    /// was. Non-finite values are skipped.
    pub fn try_set_parameters(
        &self,
        values: impl IntoIterator<Item = (PluginParameter, f32)>,
    ) -> bool {
        let Some(_control) = self.control.try_lock() else {
            return false;
        };

        // SAFETY: the control lock is held until the end of this scope.
        let controls = unsafe { self.slot.controls() };
        for (key, value) in values {
            if value.is_finite() {
                self.parameter(key).set(value, controls);
            }
        }
        true
    }

    /// Applies a full snapshot. The snapshot is validated first, so a bad
    /// snapshot changes nothing.
    pub fn set_state(&self, state: &PluginState) -> Result<(), PluginError> {
        state.validate()?;

        let mut control = self.control.lock();
        control.snapshot = *state;

        // SAFETY: the control lock is held until the end of this scope.
        let controls = unsafe { self.slot.controls() };
        for key in PluginParameter::ALL {
            self.parameter(key).set(state.get(key), controls);
        }
        Ok(())
    }

    /// Reads every parameter back into a fresh snapshot.
    pub fn get_state(&self) -> PluginState {
        let mut control = self.control.lock();
        let mut snapshot = PluginState::default();
        for key in PluginParameter::ALL {
            snapshot.set(key, self.parameter(key).get());
        }
        control.snapshot = snapshot;
        snapshot
    }

    /// (Re)builds the engine for `settings` and swaps it in. The old
    /// engine, if any, is released once no block is running on it.
    pub fn prepare(&self, settings: BusSettings) {
        let settings = sanitize(settings);

        let mut control = self.control.lock();
        let controls = EngineControls::default();
        for param in &self.params {
            param.notify(&controls);
        }
        let engine = AuraEngine::new(settings, &controls);

        // SAFETY: the control lock is held.
        let retired = unsafe { self.slot.install(EngineEntry::new(controls, engine)) };
        if let Some(retired) = retired {
            retired.into_engine().release_resources();
        }

        control.settings = settings;
        self.prepared.store(true, Ordering::Release);
        nih_log!(
            "Prepared for {} Hz, {} samples, {} in / {} out",
            settings.sample_rate,
            settings.block_size,
            settings.input_channels,
            settings.output_channels
        );
    }

    /// Copies `input` to `output`, runs the engine over the first
    /// `block_size` samples, then applies the post-gain.
    ///
    /// Nothing is written unless every channel passes validation and the
    /// engine is free. Prepares
    /// at [`FALLBACK_SAMPLE_RATE`] if [`prepare()`](Self::prepare) was
    /// never called.
    pub fn process(
        &self,
        input: &[&[f32]],
        output: &mut [&mut [f32]],
        block_size: usize,
    ) -> Result<(), PluginError> {
        let num_channels = input.len();
        validate_channel_count(num_channels)?;
        if output.len() != num_channels {
            return Err(PluginError::UnsupportedChannelCount(output.len()));
        }
        for (channel, (inp, out)) in input.iter().zip(output.iter()).enumerate() {
            let len = inp.len().min(out.len());
            if len < block_size {
                return Err(PluginError::BufferTooShort {
                    channel,
                    len,
                    needed: block_size,
                });
            }
        }

        self.prepare_lazily(block_size, num_channels);
        self.run_engine(Some(input), output, block_size)
    }

    /// In-place variant of [`process()`](Self::process) for hosts that
    /// hand over a single buffer. The block is as long as the shortest
    /// channel.
    pub fn process_in_place(&self, channels: &mut [&mut [f32]]) -> Result<(), PluginError> {
        validate_channel_count(channels.len())?;
        let block_size = channels.iter().map(|c| c.len()).min().unwrap_or(0);

        self.prepare_lazily(block_size, channels.len());
        self.run_engine(None, channels, block_size)
    }

    fn prepare_lazily(&self, block_size: usize, num_channels: usize) {
        if !self.is_prepared() {
            nih_warn!("process() called before prepare(), preparing at the fallback sample rate");
            self.prepare(BusSettings::new(
                FALLBACK_SAMPLE_RATE,
                block_size,
                num_channels,
                num_channels,
            ));
        }
    }

    /// Runs one block. `input`, if given, is copied into `output` only once
    /// the engine has been claimed.
    fn run_engine(
        &self,
        input: Option<&[&[f32]]>,
        output: &mut [&mut [f32]],
        block_size: usize,
    ) -> Result<(), PluginError> {
        let num_channels = output.len();

        let mut views: [&mut [f32]; MAX_CHANNELS] = Default::default();
        for (view, channel) in views.iter_mut().zip(output.iter_mut()) {
            *view = &mut channel[..block_size];
        }
        self.slot.with_engine(|engine, controls| {
            if let Some(input) = input {
                for (view, inp) in views.iter_mut().zip(input) {
                    view.copy_from_slice(&inp[..block_size]);
                }
            }
            engine.process_block(controls, &mut views[..num_channels]);
        })?;

        let gain = self.parameter(PluginParameter::GainNormalized).get_normalized();
        for channel in &mut views[..num_channels] {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }
        Ok(())
    }

    /// Clears the engine's filter and delay state. Before the first
    /// prepare there is nothing to clear. Fails with
    /// [`PluginError::ProcessBusy`] if a block is running.
    pub fn reset(&self) -> Result<(), PluginError> {
        match self.slot.with_engine(|engine, _| engine.reset()) {
            Err(PluginError::NotPrepared) => Ok(()),
            result => result,
        }
    }

    /// Latency of the prepared engine, zero before the first prepare.
    pub fn latency_samples(&self) -> usize {
        if !self.is_prepared() {
            return 0;
        }
        self.control.lock().settings.lookahead_samples()
    }

    /// The current state as a serialized property tree.
    pub fn save_state(&self) -> Result<Vec<u8>, PluginError> {
        let tree = PropertyTree::from_state(&self.get_state());
        Ok(tree.to_bytes()?)
    }

    /// Restores a serialized property tree. Data that fails to parse falls
    /// back to the default tree instead of failing.
    pub fn load_state(&self, data: &[u8]) -> Result<(), PluginError> {
        let tree = PropertyTree::copy_from_or_default(data);
        self.set_state(&tree.to_state())
    }

    /// The current state as pretty-printed JSON, for debugging.
    pub fn state_as_json(&self) -> Result<String, PluginError> {
        Ok(PropertyTree::from_state(&self.get_state()).to_debug_json()?)
    }
}

impl Drop for Plugin {
    fn drop(&mut self) {
        let _control = self.control.lock();
        // SAFETY: the control lock is held, and `&mut self` rules out a
        // concurrent `process()`.
        if let Some(entry) = unsafe { self.slot.take() } {
            entry.into_engine().release_resources();
        }
    }
}

fn validate_channel_count(num_channels: usize) -> Result<(), PluginError> {
    if num_channels == 0 || num_channels > MAX_CHANNELS {
        return Err(PluginError::UnsupportedChannelCount(num_channels));
    }
    Ok(())
}

/// Replaces settings the engine cannot be built from.
fn sanitize(settings: BusSettings) -> BusSettings {
    let sample_rate = if settings.sample_rate.is_finite() && settings.sample_rate > 0.0 {
        settings.sample_rate
    } else {
        nih_warn!(
            "Invalid sample rate {}, using {FALLBACK_SAMPLE_RATE}",
            settings.sample_rate
        );
        FALLBACK_SAMPLE_RATE
    };

    BusSettings {
        sample_rate,
        block_size: settings.block_size.max(1),
        ..settings
    }
}
