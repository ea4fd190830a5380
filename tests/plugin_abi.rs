//! End-to-end tests of the plugin façade and its C entry points.

use std::ptr;

use aura_plugin::abi::ffi::*;
use aura_plugin::abi::{Plugin, PluginParameter, PluginState};
use aura_plugin::config::{BusSettings, STATE_VERSION};
use aura_plugin::error::{PluginError, PluginResult};
use aura_plugin::state_tree::PropertyTree;

const BLOCK: usize = 128;

fn prepared() -> Plugin {
    let plugin = Plugin::new();
    plugin.prepare(BusSettings::new(48_000.0, BLOCK, 2, 2));
    plugin
}

fn sine(len: usize, freq: f32, amplitude: f32) -> Vec<f32> {
    (0..len)
        .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / 48_000.0).sin())
        .collect()
}

// ─────────────────────────────────────────────────────────────────────
// Façade
// ─────────────────────────────────────────────────────────────────────

#[test]
fn rejects_unsupported_channel_counts_without_writing() {
    let plugin = prepared();
    let input = vec![0.5f32; BLOCK];

    let mut a = vec![7.0f32; BLOCK];
    let mut b = vec![7.0f32; BLOCK];
    let mut c = vec![7.0f32; BLOCK];

    let none: [&[f32]; 0] = [];
    let mut no_outputs: [&mut [f32]; 0] = [];
    assert!(matches!(
        plugin.process(&none, &mut no_outputs, BLOCK),
        Err(PluginError::UnsupportedChannelCount(0))
    ));

    let three = [input.as_slice(), input.as_slice(), input.as_slice()];
    let result = plugin.process(
        &three,
        &mut [a.as_mut_slice(), b.as_mut_slice(), c.as_mut_slice()],
        BLOCK,
    );
    assert!(matches!(
        result,
        Err(PluginError::UnsupportedChannelCount(3))
    ));
    assert_eq!(PluginResult::from(result), PluginResult::FailedToProcess);

    for buffer in [&a, &b, &c] {
        assert!(buffer.iter().all(|&s| s == 7.0));
    }
}

#[test]
fn rejects_short_buffers_without_writing() {
    let plugin = prepared();
    let input = vec![0.5f32; BLOCK];
    let mut out = vec![7.0f32; BLOCK / 2];

    let result = plugin.process(&[input.as_slice()], &mut [out.as_mut_slice()], BLOCK);
    assert!(matches!(result, Err(PluginError::BufferTooShort { channel: 0, .. })));
    assert!(out.iter().all(|&s| s == 7.0));
}

#[test]
fn get_state_returns_what_set_state_applied() {
    let plugin = Plugin::new();
    let state = PluginState {
        version: STATE_VERSION,
        gain_normalized: 0.8,
        root_note: 4.0,
        scale: 6.0,
        lower_freq: 180.0,
        upper_freq: 3_200.0,
        gain_add_db: 6.0,
        gain_reduce_db: 30.0,
        quality: 70.7,
        spectral_gate_lower: 0.1,
        spectral_gate_upper: 0.65,
        spectral_gate_falloff: -9.0,
    };

    plugin.set_state(&state).unwrap();
    assert_eq!(plugin.get_state(), state);
}

#[test]
fn set_state_clamps_out_of_range_fields() {
    let plugin = Plugin::new();
    let state = PluginState {
        lower_freq: 5.0,
        gain_reduce_db: 100.0,
        ..PluginState::default()
    };

    plugin.set_state(&state).unwrap();
    let read_back = plugin.get_state();
    assert_eq!(read_back.lower_freq, 20.0);
    assert_eq!(read_back.gain_reduce_db, 48.0);
}

#[test]
fn set_parameter_rejects_unknown_keys_and_non_finite_values() {
    let plugin = Plugin::new();

    assert!(matches!(
        plugin.set_parameter_raw(PluginParameter::COUNT as u32, 1.0),
        Err(PluginError::ParameterDoesntExist(11))
    ));
    assert!(matches!(
        plugin.set_parameter(PluginParameter::Quality, f32::NAN),
        Err(PluginError::ParameterTypeDoesntMatch { parameter: "filterQuality", .. })
    ));
    assert_eq!(plugin.parameter(PluginParameter::Quality).get(), 90.0);

    plugin
        .set_parameter_raw(PluginParameter::Quality as u32, 120.0)
        .unwrap();
    assert_eq!(plugin.parameter(PluginParameter::Quality).get(), 120.0);
}

#[test]
fn process_prepares_lazily() {
    let plugin = Plugin::new();
    assert!(!plugin.is_prepared());
    assert_eq!(plugin.latency_samples(), 0);

    let input = sine(BLOCK, 440.0, 0.5);
    let mut out = vec![0.0f32; BLOCK];
    plugin
        .process(&[input.as_slice()], &mut [out.as_mut_slice()], BLOCK)
        .unwrap();

    assert!(plugin.is_prepared());
    assert_eq!(plugin.latency_samples(), 96);
}

#[test]
fn output_is_delayed_by_the_reported_latency() {
    let plugin = prepared();
    let latency = plugin.latency_samples();

    let input = sine(BLOCK, 440.0, 0.5);
    let mut left = vec![1.0f32; BLOCK];
    let mut right = vec![1.0f32; BLOCK];
    plugin
        .process(
            &[input.as_slice(), input.as_slice()],
            &mut [left.as_mut_slice(), right.as_mut_slice()],
            BLOCK,
        )
        .unwrap();

    assert!(left[..latency].iter().all(|&s| s == 0.0));
    assert!(right[..latency].iter().all(|&s| s == 0.0));
    assert!(left[latency..].iter().any(|&s| s != 0.0));
}

#[test]
fn zero_gain_silences_the_output() {
    let plugin = prepared();
    plugin
        .set_parameter(PluginParameter::GainNormalized, 0.0)
        .unwrap();

    let input = sine(BLOCK, 440.0, 0.5);
    for _ in 0..4 {
        let mut out = vec![1.0f32; BLOCK];
        plugin
            .process(&[input.as_slice()], &mut [out.as_mut_slice()], BLOCK)
            .unwrap();
        assert!(out.iter().all(|&s| s == 0.0));
    }
}

#[test]
fn post_gain_scales_the_engine_output() {
    let full = prepared();
    let half = prepared();
    half.set_parameter(PluginParameter::GainNormalized, 0.5)
        .unwrap();

    let input = sine(BLOCK * 4, 700.0, 0.4);
    let mut full_out = vec![0.0f32; BLOCK];
    let mut half_out = vec![0.0f32; BLOCK];
    for block in input.chunks(BLOCK) {
        full.process(&[block], &mut [full_out.as_mut_slice()], BLOCK)
            .unwrap();
        half.process(&[block], &mut [half_out.as_mut_slice()], BLOCK)
            .unwrap();
    }

    for (f, h) in full_out.iter().zip(&half_out) {
        assert!((f * 0.5 - h).abs() < 1e-6);
    }
}

#[test]
fn saved_state_restores_into_a_new_instance() {
    let source = Plugin::new();
    source.set_parameter(PluginParameter::RootNote, 9.0).unwrap();
    source.set_parameter(PluginParameter::UpperFreq, 4_000.0).unwrap();
    let bytes = source.save_state().unwrap();

    let target = Plugin::new();
    target.load_state(&bytes).unwrap();
    assert_eq!(target.get_state(), source.get_state());

    let json = target.state_as_json().unwrap();
    assert!(json.contains("highFreq"));
}

#[test]
fn corrupt_state_loads_the_defaults() {
    let plugin = Plugin::new();
    plugin.set_parameter(PluginParameter::Scale, 2.0).unwrap();

    plugin.load_state(b"definitely not a state tree").unwrap();
    assert_eq!(plugin.get_state(), PluginState::default());
}

#[test]
fn non_finite_stored_values_load_as_defaults() {
    let plugin = Plugin::new();
    let stored = PluginState {
        quality: f32::NAN,
        gain_add_db: 6.0,
        ..PluginState::default()
    };
    let bytes = PropertyTree::from_state(&stored).to_bytes().unwrap();

    plugin.load_state(&bytes).unwrap();
    let state = plugin.get_state();
    assert_eq!(state.quality, PluginState::default().quality);
    assert_eq!(state.gain_add_db, 6.0);
}

#[test]
fn re_prepare_keeps_parameter_values() {
    let plugin = prepared();
    plugin.set_parameter(PluginParameter::LowerFreq, 90.0).unwrap();

    plugin.prepare(BusSettings::new(44_100.0, 256, 1, 1));
    assert_eq!(plugin.get_state().lower_freq, 90.0);
    assert_eq!(plugin.latency_samples(), 88);
}

// ─────────────────────────────────────────────────────────────────────
// C ABI
// ─────────────────────────────────────────────────────────────────────

#[test]
fn ffi_null_handles_are_reported() {
    let mut state = PluginState::default();
    let samples = [0.0f32; 16];
    let mut out = [0.0f32; 16];
    let inputs = [samples.as_ptr()];
    let outputs = [out.as_mut_ptr()];
    let mut len = 0usize;

    unsafe {
        let results = [
            aura_plugin_set_parameter(ptr::null(), 0, 1.0),
            aura_plugin_set_state(ptr::null(), &state),
            aura_plugin_get_state(ptr::null(), &mut state),
            aura_plugin_prepare(ptr::null(), 48_000.0, 64, 2, 2),
            aura_plugin_process(ptr::null(), inputs.as_ptr(), outputs.as_ptr(), 16, 1),
            aura_plugin_save_state(ptr::null(), ptr::null_mut(), 0, &mut len),
            aura_plugin_load_state(ptr::null(), ptr::null(), 0),
        ];
        assert!(results.iter().all(|&r| r == PluginResult::InvalidHandle));
        assert_eq!(aura_plugin_latency_samples(ptr::null()), 0);
        aura_plugin_destroy(ptr::null_mut());
    }
}

#[test]
fn ffi_process_validates_pointers() {
    let plugin = aura_plugin_create();
    assert!(!plugin.is_null());

    let input = vec![0.25f32; 64];
    let mut output = vec![9.0f32; 64];
    let inputs = [input.as_ptr()];
    let outputs = [output.as_mut_ptr()];
    let null_outputs = [ptr::null_mut::<f32>()];

    unsafe {
        assert_eq!(
            aura_plugin_process(plugin, inputs.as_ptr(), ptr::null(), 64, 1),
            PluginResult::FailedToProcess
        );
        assert_eq!(
            aura_plugin_process(plugin, inputs.as_ptr(), null_outputs.as_ptr(), 64, 1),
            PluginResult::FailedToProcess
        );
        assert_eq!(
            aura_plugin_process(plugin, inputs.as_ptr(), outputs.as_ptr(), 64, 0),
            PluginResult::FailedToProcess
        );
        assert_eq!(
            aura_plugin_process(plugin, inputs.as_ptr(), outputs.as_ptr(), 64, 3),
            PluginResult::FailedToProcess
        );
        assert!(output.iter().all(|&s| s == 9.0));

        assert_eq!(
            aura_plugin_process(plugin, inputs.as_ptr(), outputs.as_ptr(), 64, 1),
            PluginResult::Success
        );
        assert_eq!(aura_plugin_latency_samples(plugin), 96);

        aura_plugin_destroy(plugin);
    }
}

/// Hosts may hand the same buffers in as input and output.
#[test]
fn ffi_process_in_place_matches_separate_buffers() {
    let in_place = aura_plugin_create();
    let separate = aura_plugin_create();
    let left = sine(256, 440.0, 0.6);
    let right = sine(256, 660.0, 0.3);

    let mut shared = [left.clone(), right.clone()];
    let shared_ptrs = [shared[0].as_mut_ptr(), shared[1].as_mut_ptr()];
    let shared_inputs = shared_ptrs.map(|p| p.cast_const());

    let mut out = [vec![0.0f32; 256], vec![0.0f32; 256]];
    let inputs = [left.as_ptr(), right.as_ptr()];
    let outputs = [out[0].as_mut_ptr(), out[1].as_mut_ptr()];

    unsafe {
        aura_plugin_set_parameter(in_place, PluginParameter::GainNormalized as u32, 0.5);
        aura_plugin_set_parameter(separate, PluginParameter::GainNormalized as u32, 0.5);

        assert_eq!(
            aura_plugin_process(in_place, shared_inputs.as_ptr(), shared_ptrs.as_ptr(), 256, 2),
            PluginResult::Success
        );
        assert_eq!(
            aura_plugin_process(separate, inputs.as_ptr(), outputs.as_ptr(), 256, 2),
            PluginResult::Success
        );

        aura_plugin_destroy(in_place);
        aura_plugin_destroy(separate);
    }

    assert_eq!(shared, out);
}

#[test]
fn ffi_process_rejects_overlapping_buffers() {
    let plugin = aura_plugin_create();
    let mut memory = vec![0.25f32; 200];
    let base = memory.as_mut_ptr();

    unsafe {
        // Output starts one sample into the input.
        let inputs = [base.cast_const()];
        let outputs = [base.add(1)];
        assert_eq!(
            aura_plugin_process(plugin, inputs.as_ptr(), outputs.as_ptr(), 64, 1),
            PluginResult::FailedToProcess
        );

        // Two outputs on top of each other.
        let inputs = [base.add(100).cast_const(), base.add(130).cast_const()];
        let outputs = [base, base.add(32)];
        assert_eq!(
            aura_plugin_process(plugin, inputs.as_ptr(), outputs.as_ptr(), 48, 2),
            PluginResult::FailedToProcess
        );

        // Only one channel in place.
        let inputs = [base.cast_const(), base.add(64).cast_const()];
        let outputs = [base, base.add(100)];
        assert_eq!(
            aura_plugin_process(plugin, inputs.as_ptr(), outputs.as_ptr(), 32, 2),
            PluginResult::FailedToProcess
        );

        aura_plugin_destroy(plugin);
    }

    assert!(memory.iter().all(|&s| s == 0.25));
}

#[test]
fn ffi_state_calls() {
    let plugin = aura_plugin_create();

    unsafe {
        assert_eq!(
            aura_plugin_prepare(plugin, 48_000.0, 256, 2, 2),
            PluginResult::Success
        );
        assert_eq!(
            aura_plugin_set_parameter(plugin, 99, 1.0),
            PluginResult::ParameterDoesntExist
        );
        assert_eq!(
            aura_plugin_set_parameter(plugin, PluginParameter::GainAdd as u32, f32::INFINITY),
            PluginResult::ParameterTypeDoesntMatch
        );

        let mut state = PluginState::default();
        assert_eq!(aura_plugin_default_state(&mut state), PluginResult::Success);
        state.gain_add_db = 3.0;
        assert_eq!(aura_plugin_set_state(plugin, &state), PluginResult::Success);

        let mut read_back = PluginState {
            version: 0,
            ..PluginState::default()
        };
        assert_eq!(
            aura_plugin_get_state(plugin, &mut read_back),
            PluginResult::Success
        );
        assert_eq!(read_back, state);

        let stale = PluginState {
            version: STATE_VERSION + 1,
            ..state
        };
        assert_eq!(
            aura_plugin_set_state(plugin, &stale),
            PluginResult::FailedToSetState
        );

        aura_plugin_destroy(plugin);
    }
}

#[test]
fn ffi_save_and_load() {
    let plugin = aura_plugin_create();

    unsafe {
        aura_plugin_set_parameter(plugin, PluginParameter::Quality as u32, 140.0);

        // Size query with no buffer.
        let mut len = 0usize;
        assert_eq!(
            aura_plugin_save_state(plugin, ptr::null_mut(), 0, &mut len),
            PluginResult::FailedToReturnState
        );
        assert!(len > 0);
        assert_eq!(len, aura_plugin_default_state_size());

        let mut bytes = vec![0u8; len];
        assert_eq!(
            aura_plugin_save_state(plugin, bytes.as_mut_ptr(), bytes.len(), &mut len),
            PluginResult::Success
        );

        let restored = aura_plugin_create();
        assert_eq!(
            aura_plugin_load_state(restored, bytes.as_ptr(), bytes.len()),
            PluginResult::Success
        );
        let mut state = PluginState::default();
        aura_plugin_get_state(restored, &mut state);
        assert_eq!(state.quality, 140.0);

        // Null data heals to the defaults.
        assert_eq!(
            aura_plugin_load_state(restored, ptr::null(), 0),
            PluginResult::Success
        );
        aura_plugin_get_state(restored, &mut state);
        assert_eq!(state, PluginState::default());

        aura_plugin_destroy(restored);
        aura_plugin_destroy(plugin);
    }
}
