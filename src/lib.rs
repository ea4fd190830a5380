//! # Aura: A Band-Focused Spectral Gate (AU/VST3/CLAP + C ABI)
//!
//! Aura isolates a frequency band, listens to how loud it is, and lifts or
//! cuts it accordingly while the rest of the spectrum sits at a fixed
//! falloff. It also carries a musical mode (root note and scale) for the
//! host to automate and recall, which the gate does not key off. The same
//! core ships two ways from one codebase:
//!
//! - as a plugin built with [nih-plug](https://github.com/robbert-vdh/nih-plug),
//!   exported as Audio Unit (AUv2), VST3 and CLAP, and
//! - as a C-callable library ([`abi::ffi`]) for hosts that embed the DSP
//!   directly and drive it through an opaque handle.
//!
//! ## Layers
//!
//! ```text
//!   DAW ──► Aura (nih-plug shell) ──┐
//!                                   ├──► abi::Plugin ──► parameter map ──► EngineControls
//!   C host ──► abi::ffi ────────────┘         │                                 │
//!                                             └──► EngineSlot ──► AuraEngine ◄──┘
//!                                                  (lock-free)    (filters, gate, delay)
//! ```
//!
//! Both front ends go through [`abi::Plugin`], so parameter clamping,
//! quantization, state validation and the post-gain behave identically
//! however the plugin is loaded.

pub mod abi;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod parameter;
mod params;
pub mod scale;
pub mod state_tree;

use std::num::NonZeroU32;
use std::sync::Arc;

use config::BusSettings;
use nih_plug::prelude::*;
use params::AuraParams;

/// The nih-plug side of the plugin.
///
/// ## Why wrap the façade instead of driving the engine directly?
///
/// The façade already owns parameter clamping, the quantized note and
/// scale mappings, and the engine handoff. Routing the host parameters
/// through it keeps one source of truth: a value set by DAW automation
/// and the same value set over the C ABI land in the engine the same way.
pub struct Aura {
    /// Shared with the host. The `Arc` lets the host's automation thread
    /// and our audio thread read the same parameter values.
    params: Arc<AuraParams>,

    /// The core everything is forwarded to.
    core: abi::Plugin,
}

impl Default for Aura {
    fn default() -> Self {
        Self {
            params: Arc::new(AuraParams::default()),
            core: abi::Plugin::new(),
        }
    }
}

impl Plugin for Aura {
    const NAME: &'static str = "Aura";
    const VENDOR: &'static str = "Aura Audio";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    // Stereo first: most DAW tracks are stereo. The engine handles at most
    // two channels, so nothing wider is offered.
    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        // Stereo layout
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
        // Mono fallback
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
    ];

    // The root note and scale are parameters, not MIDI input.
    const MIDI_INPUT: MidiConfig = MidiConfig::None;

    // Parameters are handed to the core once per block, so splitting
    // blocks at automation points would only add overhead.
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    /// Called when the plugin is loaded or the audio configuration
    /// changes. Builds a fresh engine for the new sample rate and block
    /// size and reports its lookahead to the host, which delays every
    /// other track by the same amount.
    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        context: &mut impl InitContext<Self>,
    ) -> bool {
        let channels = |count: Option<NonZeroU32>| count.map(|c| c.get() as usize).unwrap_or(2);
        let settings = BusSettings::new(
            buffer_config.sample_rate as f64,
            buffer_config.max_buffer_size as usize,
            channels(audio_io_layout.main_input_channels),
            channels(audio_io_layout.main_output_channels),
        );

        // The engine has to see the host's values, not the defaults.
        self.core.try_set_parameters(self.params.values());
        self.core.prepare(settings);
        context.set_latency_samples(self.core.latency_samples() as u32);

        true
    }

    /// Called when playback stops or the plugin is bypassed. Clears the
    /// filters, detector and lookahead buffers so stale audio doesn't
    /// bleed into the next playback.
    fn reset(&mut self) {
        if let Err(err) = self.core.reset() {
            nih_warn!("Could not reset the engine: {err}");
        }
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        // Never blocks. If a prepare is holding the control lock, this
        // block runs with the previous values.
        self.core.try_set_parameters(self.params.values());

        let result = self.core.process_in_place(buffer.as_slice());
        nih_debug_assert!(result.is_ok());

        ProcessStatus::Normal
    }
}

// ─────────────────────────────────────────────────────────────────────
// Plugin format trait implementations
// ─────────────────────────────────────────────────────────────────────

impl ClapPlugin for Aura {
    const CLAP_ID: &'static str = "com.aura-audio.aura-v1";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("A band-focused spectral gate with lookahead");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Stereo,
        ClapFeature::Mono,
        ClapFeature::Filter,
    ];
}

impl Vst3Plugin for Aura {
    // `*b"..."` turns the 16-character ASCII literal into a `[u8; 16]`.
    const VST3_CLASS_ID: [u8; 16] = *b"AuraSpectralGt01";

    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Filter];
}

// ─────────────────────────────────────────────────────────────────────
// Export macros
// ─────────────────────────────────────────────────────────────────────
//
// nih_export_clap! exports the `clap_entry` symbol for CLAP hosts.
// nih_export_vst3! exports `GetPluginFactory` for VST3 hosts.
// The C ABI functions in `abi::ffi` are exported alongside them from the
// same library.

nih_export_clap!(Aura);
nih_export_vst3!(Aura);

// Wrap the CLAP plugin into AUv2 format for Logic Pro.
// This generates a `GetPluginFactoryAUV2` entry point that macOS uses
// to discover the plugin as an Audio Unit component.
clap_wrapper::export_auv2!();
