//! # Host Parameters
//!
//! The knobs a DAW sees when Aura runs as a VST3/CLAP/AUv2 plugin. There is
//! one host parameter per [`PluginParameter`], registered under the same
//! string id, so presets saved by the plugin and state saved through the C
//! ABI name their values the same way.
//!
//! - A **unique string ID** (`#[id = "..."]`) that the host uses to save
//!   and recall presets. Once published, never change these IDs or
//!   existing presets will break.
//! - A **range and default** taken from the same table the engine uses,
//!   so the host knob and the engine slot can never disagree.
//!
//! None of these parameters are smoothed here. Values are handed to the
//! engine once per block, and the engine smooths the gain it derives from
//! them itself.

use std::sync::Arc;

use nih_plug::prelude::*;

use crate::abi::PluginParameter;
use crate::engine::host_params::HostSlot;
use crate::scale::{note_index, Scale, NOTE_NAMES};

#[derive(Params)]
pub struct AuraParams {
    /// **Gain**: post-gain applied after the engine, as a linear factor.
    #[id = "gain"]
    pub gain: FloatParam,

    /// **Root Note**: root of the musical mode, A through G#. Saved and
    /// handed to the engine; the gate does not key off it.
    #[id = "rootNote"]
    pub root_note: IntParam,

    /// **Scale**: the scale of the musical mode. Saved and handed to the
    /// engine like the root note.
    #[id = "scale"]
    pub scale: IntParam,

    /// **Boost**: how far the band is lifted when it is loud enough to
    /// count as signal.
    #[id = "additionGain"]
    pub gain_add: FloatParam,

    /// **Cut**: how far the band is pushed down when it is not.
    #[id = "reductionGain"]
    pub gain_reduce: FloatParam,

    /// **Low Corner**: lower edge of the gated band.
    #[id = "lowFreq"]
    pub lower_freq: FloatParam,

    /// **High Corner**: upper edge of the gated band.
    #[id = "highFreq"]
    pub upper_freq: FloatParam,

    /// **Quality**: resonance of both corner filters, in percent of Q.
    #[id = "filterQuality"]
    pub quality: FloatParam,

    /// **Gate Lower**: band level at and below which the band is fully cut.
    #[id = "spectralGateLowerThresh"]
    pub gate_lower: FloatParam,

    /// **Gate Upper**: band level at and above which the band is fully
    /// boosted. Levels between the two thresholds crossfade in dB.
    #[id = "spectralGateUpperThresh"]
    pub gate_upper: FloatParam,

    /// **Falloff**: fixed attenuation of everything outside the band.
    #[id = "spectralGateFalloff"]
    pub gate_falloff: FloatParam,
}

/// A linear float parameter with the range and default of `slot`.
fn host_float(name: &str, slot: HostSlot, unit: &'static str) -> FloatParam {
    let info = slot.info();
    FloatParam::new(
        name,
        info.default,
        FloatRange::Linear {
            min: info.min,
            max: info.max,
        },
    )
    .with_unit(unit)
}

impl Default for AuraParams {
    fn default() -> Self {
        Self {
            gain: FloatParam::new("Gain", 1.0, FloatRange::Linear { min: 0.0, max: 1.0 })
                .with_unit("%")
                // Display as percentage: 0.40 → "40.0%"
                .with_value_to_string(formatters::v2s_f32_percentage(1))
                .with_string_to_value(formatters::s2v_f32_percentage()),

            root_note: IntParam::new(
                "Root Note",
                0,
                IntRange::Linear {
                    min: 0,
                    max: NOTE_NAMES.len() as i32 - 1,
                },
            )
            .with_value_to_string(Arc::new(|index| {
                NOTE_NAMES[index.clamp(0, NOTE_NAMES.len() as i32 - 1) as usize].to_string()
            }))
            .with_string_to_value(Arc::new(|name| {
                note_index(name.trim()).map(|index| index as i32)
            })),

            scale: IntParam::new(
                "Scale",
                Scale::default().index() as i32,
                IntRange::Linear {
                    min: 0,
                    max: Scale::COUNT as i32 - 1,
                },
            )
            .with_value_to_string(Arc::new(|index| {
                Scale::from_index(index.max(0) as usize)
                    .unwrap_or_default()
                    .name()
                    .to_string()
            }))
            .with_string_to_value(Arc::new(|name| {
                Scale::ALL
                    .iter()
                    .find(|scale| scale.name().eq_ignore_ascii_case(name.trim()))
                    .map(|scale| scale.index() as i32)
            })),

            gain_add: host_float("Boost", HostSlot::AdditionGain, " dB").with_step_size(0.1),
            gain_reduce: host_float("Cut", HostSlot::ReductionGain, " dB").with_step_size(0.1),
            // Whole Hz steps are fine
            lower_freq: host_float("Low Corner", HostSlot::LowFreq, " Hz").with_step_size(1.0),
            upper_freq: host_float("High Corner", HostSlot::HighFreq, " Hz").with_step_size(1.0),
            quality: host_float("Quality", HostSlot::FilterQuality, "%").with_step_size(1.0),
            gate_lower: host_float("Gate Lower", HostSlot::GateLowerThreshold, ""),
            gate_upper: host_float("Gate Upper", HostSlot::GateUpperThreshold, ""),
            gate_falloff: host_float("Falloff", HostSlot::GateFalloff, " dB").with_step_size(0.1),
        }
    }
}

impl AuraParams {
    /// Current plain value of every parameter, keyed for the façade.
    pub fn values(&self) -> [(PluginParameter, f32); PluginParameter::COUNT] {
        PluginParameter::ALL.map(|key| (key, self.value(key)))
    }

    fn value(&self, key: PluginParameter) -> f32 {
        match key {
            PluginParameter::GainNormalized => self.gain.value(),
            PluginParameter::RootNote => self.root_note.value() as f32,
            PluginParameter::Scale => self.scale.value() as f32,
            PluginParameter::GainAdd => self.gain_add.value(),
            PluginParameter::GainReduce => self.gain_reduce.value(),
            PluginParameter::LowerFreq => self.lower_freq.value(),
            PluginParameter::UpperFreq => self.upper_freq.value(),
            PluginParameter::Quality => self.quality.value(),
            PluginParameter::SpectralGateLower => self.gate_lower.value(),
            PluginParameter::SpectralGateUpper => self.gate_upper.value(),
            PluginParameter::SpectralGateFalloff => self.gate_falloff.value(),
        }
    }
}
