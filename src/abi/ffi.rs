//! C entry points for embedding hosts.
//!
//! Every function takes the opaque handle returned by
//! [`aura_plugin_create()`] and returns a [`PluginResult`]. A null handle
//! is always [`PluginResult::InvalidHandle`]. Other null pointers and bad
//! channel counts are reported through the operation's own failure code,
//! and no panic unwinds across the boundary.

use std::mem;
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::{ptr, slice};

use crate::abi::{Plugin, PluginState};
use crate::config::{BusSettings, MAX_CHANNELS};
use crate::error::PluginResult;
use crate::state_tree::PropertyTree;

/// Runs `f`, turning a panic into `on_panic`.
fn guard(on_panic: PluginResult, f: impl FnOnce() -> PluginResult) -> PluginResult {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or(on_panic)
}

/// # Safety
///
/// `plugin` must be null or a live handle from [`aura_plugin_create()`].
unsafe fn plugin_ref<'a>(plugin: *const Plugin) -> Option<&'a Plugin> {
    // SAFETY: see above.
    unsafe { plugin.as_ref() }
}

/// Copies `data` into a caller-owned buffer, reporting the needed size
/// through `out_len` even when the buffer is too small.
///
/// # Safety
///
/// `out_data` must be null or valid for `out_capacity` bytes. `out_len`
/// must be null or valid for one write.
unsafe fn copy_out(
    data: &[u8],
    out_data: *mut u8,
    out_capacity: usize,
    out_len: *mut usize,
) -> PluginResult {
    if out_len.is_null() {
        return PluginResult::FailedToReturnState;
    }
    // SAFETY: checked for null above.
    unsafe { *out_len = data.len() };

    if out_data.is_null() || data.len() > out_capacity {
        return PluginResult::FailedToReturnState;
    }
    // SAFETY: `out_data` holds at least `data.len()` bytes.
    unsafe { slice::from_raw_parts_mut(out_data, data.len()) }.copy_from_slice(data);
    PluginResult::Success
}

/// Creates a plugin instance with every parameter at its default. Free it
/// with [`aura_plugin_destroy()`].
#[no_mangle]
pub extern "C" fn aura_plugin_create() -> *mut Plugin {
    catch_unwind(|| Box::into_raw(Box::new(Plugin::new()))).unwrap_or(ptr::null_mut())
}

/// Releases the engine, then the instance. Null is ignored.
///
/// # Safety
///
/// `plugin` must be null or a handle from [`aura_plugin_create()`] that
/// has not been destroyed, and no other call may be using it.
#[no_mangle]
pub unsafe extern "C" fn aura_plugin_destroy(plugin: *mut Plugin) {
    if plugin.is_null() {
        return;
    }
    // SAFETY: see above.
    let plugin = unsafe { Box::from_raw(plugin) };
    let _ = catch_unwind(AssertUnwindSafe(move || drop(plugin)));
}

/// Sets a parameter by [`PluginParameter`](crate::abi::PluginParameter)
/// discriminant and ranged value.
///
/// # Safety
///
/// `plugin` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn aura_plugin_set_parameter(
    plugin: *const Plugin,
    parameter: u32,
    value: f32,
) -> PluginResult {
    // SAFETY: forwarded from the caller.
    let Some(plugin) = (unsafe { plugin_ref(plugin) }) else {
        return PluginResult::InvalidHandle;
    };
    guard(PluginResult::ParameterTypeDoesntMatch, || {
        plugin.set_parameter_raw(parameter, value).into()
    })
}

/// # Safety
///
/// `plugin` must be null or a live handle; `state` must be null or point
/// to a valid [`PluginState`].
#[no_mangle]
pub unsafe extern "C" fn aura_plugin_set_state(
    plugin: *const Plugin,
    state: *const PluginState,
) -> PluginResult {
    // SAFETY: forwarded from the caller.
    let Some(plugin) = (unsafe { plugin_ref(plugin) }) else {
        return PluginResult::InvalidHandle;
    };
    // SAFETY: forwarded from the caller.
    let Some(state) = (unsafe { state.as_ref() }) else {
        return PluginResult::FailedToSetState;
    };
    guard(PluginResult::FailedToSetState, || plugin.set_state(state).into())
}

/// Writes the current values into `*state`.
///
/// # Safety
///
/// `plugin` must be null or a live handle; `state` must be null or valid
/// for one write.
#[no_mangle]
pub unsafe extern "C" fn aura_plugin_get_state(
    plugin: *const Plugin,
    state: *mut PluginState,
) -> PluginResult {
    // SAFETY: forwarded from the caller.
    let Some(plugin) = (unsafe { plugin_ref(plugin) }) else {
        return PluginResult::InvalidHandle;
    };
    if state.is_null() {
        return PluginResult::FailedToReturnState;
    }
    guard(PluginResult::FailedToReturnState, || {
        let snapshot = plugin.get_state();
        // SAFETY: checked for null above.
        unsafe { state.write(snapshot) };
        PluginResult::Success
    })
}

/// Writes the defaults into `*state`. Useful for hosts that build a
/// snapshot field by field.
///
/// # Safety
///
/// `state` must be null or valid for one write.
#[no_mangle]
pub unsafe extern "C" fn aura_plugin_default_state(state: *mut PluginState) -> PluginResult {
    if state.is_null() {
        return PluginResult::FailedToReturnState;
    }
    // SAFETY: checked for null above.
    unsafe { state.write(PluginState::default()) };
    PluginResult::Success
}

/// (Re)builds the engine. Call from a non-real-time thread.
///
/// # Safety
///
/// `plugin` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn aura_plugin_prepare(
    plugin: *const Plugin,
    sample_rate: f64,
    block_size: usize,
    input_channels: usize,
    output_channels: usize,
) -> PluginResult {
    // SAFETY: forwarded from the caller.
    let Some(plugin) = (unsafe { plugin_ref(plugin) }) else {
        return PluginResult::InvalidHandle;
    };
    guard(PluginResult::FailedToProcess, || {
        plugin.prepare(BusSettings::new(
            sample_rate,
            block_size,
            input_channels,
            output_channels,
        ));
        PluginResult::Success
    })
}

/// Processes one block from `input` into `output`.
///
/// Passing the same pointer for a channel's input and output processes
/// that buffer in place, which requires every channel to do so. Any other
/// overlap between buffers fails with [`PluginResult::FailedToProcess`]
/// before anything is written.
///
/// # Safety
///
/// `input` and `output` must be null or arrays of `num_channels`
/// pointers, each null or valid for `block_size` samples.
#[no_mangle]
pub unsafe extern "C" fn aura_plugin_process(
    plugin: *const Plugin,
    input: *const *const f32,
    output: *const *mut f32,
    block_size: usize,
    num_channels: usize,
) -> PluginResult {
    // SAFETY: forwarded from the caller.
    let Some(plugin) = (unsafe { plugin_ref(plugin) }) else {
        return PluginResult::InvalidHandle;
    };
    if num_channels == 0 || num_channels > MAX_CHANNELS || input.is_null() || output.is_null() {
        return PluginResult::FailedToProcess;
    }

    // SAFETY: both arrays hold `num_channels` pointers.
    let (input_ptrs, output_ptrs) = unsafe {
        (
            slice::from_raw_parts(input, num_channels),
            slice::from_raw_parts(output, num_channels),
        )
    };
    if input_ptrs.iter().any(|p| p.is_null()) || output_ptrs.iter().any(|p| p.is_null()) {
        return PluginResult::FailedToProcess;
    }

    let in_place = input_ptrs
        .iter()
        .zip(output_ptrs)
        .all(|(&inp, &out)| ptr::eq(inp, out.cast_const()));
    let separate_inputs = if in_place { &[][..] } else { input_ptrs };
    if buffers_overlap(separate_inputs, output_ptrs, block_size) {
        return PluginResult::FailedToProcess;
    }

    let mut outputs: [&mut [f32]; MAX_CHANNELS] = Default::default();
    for channel in 0..num_channels {
        // SAFETY: non-null, `block_size` long, and no output overlaps
        // another buffer.
        outputs[channel] = unsafe { slice::from_raw_parts_mut(output_ptrs[channel], block_size) };
    }

    if in_place {
        return guard(PluginResult::FailedToProcess, || {
            plugin.process_in_place(&mut outputs[..num_channels]).into()
        });
    }

    let mut inputs: [&[f32]; MAX_CHANNELS] = Default::default();
    for channel in 0..num_channels {
        // SAFETY: non-null, `block_size` long, and disjoint from every
        // output.
        inputs[channel] = unsafe { slice::from_raw_parts(input_ptrs[channel], block_size) };
    }

    guard(PluginResult::FailedToProcess, || {
        plugin
            .process(
                &inputs[..num_channels],
                &mut outputs[..num_channels],
                block_size,
            )
            .into()
    })
}

/// Whether any output shares memory with another output or with any input,
/// each `len` samples long.
fn buffers_overlap(inputs: &[*const f32], outputs: &[*mut f32], len: usize) -> bool {
    let span = |p: *const f32| {
        let start = p as usize;
        start..start + len * mem::size_of::<f32>()
    };
    let intersects = |a: &Range<usize>, b: &Range<usize>| {
        a.start < b.end && b.start < a.end
    };

    outputs.iter().enumerate().any(|(i, &out)| {
        let out = span(out.cast_const());
        let other_outputs = outputs[i + 1..].iter().map(|&p| p.cast_const());
        inputs
            .iter()
            .copied()
            .chain(other_outputs)
            .any(|p| intersects(&out, &span(p)))
    })
}

/// Latency the host should compensate for, in samples. Zero for a null
/// handle or before the first prepare.
///
/// # Safety
///
/// `plugin` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn aura_plugin_latency_samples(plugin: *const Plugin) -> usize {
    // SAFETY: forwarded from the caller.
    match unsafe { plugin_ref(plugin) } {
        Some(plugin) => catch_unwind(AssertUnwindSafe(|| plugin.latency_samples())).unwrap_or(0),
        None => 0,
    }
}

/// Serializes the current state. `*out_len` always receives the needed
/// size, so a host can call once with a null buffer to size it.
///
/// # Safety
///
/// `plugin` must be null or a live handle. `out_data` must be null or
/// valid for `out_capacity` bytes, and `out_len` null or valid for one
/// write.
#[no_mangle]
pub unsafe extern "C" fn aura_plugin_save_state(
    plugin: *const Plugin,
    out_data: *mut u8,
    out_capacity: usize,
    out_len: *mut usize,
) -> PluginResult {
    // SAFETY: forwarded from the caller.
    let Some(plugin) = (unsafe { plugin_ref(plugin) }) else {
        return PluginResult::InvalidHandle;
    };
    guard(PluginResult::FailedToReturnState, || match plugin.save_state() {
        // SAFETY: forwarded from the caller.
        Ok(bytes) => unsafe { copy_out(&bytes, out_data, out_capacity, out_len) },
        Err(err) => PluginResult::from(&err),
    })
}

/// Restores state saved by [`aura_plugin_save_state()`]. Unreadable data
/// restores the defaults.
///
/// # Safety
///
/// `plugin` must be null or a live handle; `data` must be null or valid
/// for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn aura_plugin_load_state(
    plugin: *const Plugin,
    data: *const u8,
    len: usize,
) -> PluginResult {
    // SAFETY: forwarded from the caller.
    let Some(plugin) = (unsafe { plugin_ref(plugin) }) else {
        return PluginResult::InvalidHandle;
    };
    let bytes = if data.is_null() {
        &[][..]
    } else {
        // SAFETY: see above.
        unsafe { slice::from_raw_parts(data, len) }
    };
    guard(PluginResult::FailedToSetState, || {
        plugin.load_state(bytes).into()
    })
}

/// Size of the default state blob. Lets a host allocate before the first
/// save.
#[no_mangle]
pub extern "C" fn aura_plugin_default_state_size() -> usize {
    PropertyTree::create_default()
        .to_bytes()
        .map(|bytes| bytes.len())
        .unwrap_or(0)
}
