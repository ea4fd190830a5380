//! # Parameters
//!
//! A [`Parameter`] is one tunable value with a fixed `[min, max]` range, a
//! normalized view for hosts and UIs, and a change callback. Parameter
//! behavior differs per [`ParameterKind`] in four places:
//!
//! | Hook                     | Linear              | Note / Scale                    | HostLinked                 |
//! |--------------------------|---------------------|---------------------------------|----------------------------|
//! | `normalized_to_ranged`   | `n*(max-min)+min`   | nearest index, clamped          | linear                     |
//! | `ranged_to_normalized`   | `(r-min)/(max-min)` | `r / index`                     | linear                     |
//! | `value_changed`          | nothing             | switches the engine's mode      | writes the host slot       |
//! | `set_if_changed`         | store if different  | store if different              | store if different         |
//!
//! The quantized reverse mapping is not the inverse of the forward one:
//! index 0 maps back to NaN and every other index maps back to 1.0.
//! Automation written through the C ABI has always behaved like that, so
//! it is kept and pinned by tests.
//!
//! Values live in an [`AtomicF32`] so the audio thread can read them while
//! the control thread writes. Writers are serialized by the façade's
//! control lock.

use std::sync::atomic::Ordering;

use atomic_float::AtomicF32;

use crate::engine::host_params::HostSlot;
use crate::engine::EngineControls;
use crate::scale::{Scale, NOTE_NAMES};

/// What a parameter does with its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// Plain linear value with no side effects.
    Linear,
    /// Root note index into [`NOTE_NAMES`].
    Note,
    /// Index into [`Scale::ALL`].
    Scale,
    /// Mirrors its value into a host automation slot of the engine.
    HostLinked(HostSlot),
}

#[derive(Debug)]
pub struct Parameter {
    min: f32,
    max: f32,
    value: AtomicF32,
    kind: ParameterKind,
}

impl Parameter {
    fn new(min: f32, max: f32, default: f32, kind: ParameterKind) -> Self {
        debug_assert!(min < max, "parameter range [{min}, {max}] is empty");

        Self {
            min,
            max,
            value: AtomicF32::new(default.clamp(min, max)),
            kind,
        }
    }

    /// A linear parameter without side effects.
    pub fn linear(min: f32, max: f32, default: f32) -> Self {
        Self::new(min, max, default, ParameterKind::Linear)
    }

    /// The root note, 0 (A) to 11 (G#).
    pub fn note() -> Self {
        Self::new(
            0.0,
            (NOTE_NAMES.len() - 1) as f32,
            0.0,
            ParameterKind::Note,
        )
    }

    /// The scale index, defaulting to [`Scale::default()`].
    pub fn scale() -> Self {
        Self::new(
            0.0,
            (Scale::COUNT - 1) as f32,
            Scale::default().index() as f32,
            ParameterKind::Scale,
        )
    }

    /// A parameter mirroring a host slot, with the slot's range and
    /// default.
    pub fn host_linked(slot: HostSlot) -> Self {
        let info = slot.info();
        Self::new(info.min, info.max, info.default, ParameterKind::HostLinked(slot))
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    /// Stores a ranged value, clamped to `[min, max]`. Fires the change
    /// callback and returns `true` if the stored value changed. NaN is
    /// ignored.
    pub fn set(&self, ranged: f32, controls: Option<&EngineControls>) -> bool {
        if ranged.is_nan() {
            return false;
        }

        let ranged = ranged.clamp(self.min, self.max);
        self.store_and_notify(ranged, controls)
    }

    /// Stores a normalized value. The input is clamped to `[0, 1]` and
    /// mapped through [`normalized_to_ranged()`](Self::normalized_to_ranged).
    pub fn set_normalized(&self, normalized: f32, controls: Option<&EngineControls>) -> bool {
        if normalized.is_nan() {
            return false;
        }

        let ranged = self.normalized_to_ranged(normalized.clamp(0.0, 1.0));
        self.store_and_notify(ranged, controls)
    }

    fn store_and_notify(&self, ranged: f32, controls: Option<&EngineControls>) -> bool {
        let changed = self.set_if_changed(ranged);
        if changed {
            self.value_changed(ranged, controls);
        }
        changed
    }

    pub fn get(&self) -> f32 {
        self.value.load(Ordering::Relaxed)
    }

    /// The stored value mapped through
    /// [`ranged_to_normalized()`](Self::ranged_to_normalized). Recomputed on
    /// every call, never cached from the last `set_normalized()`.
    pub fn get_normalized(&self) -> f32 {
        self.ranged_to_normalized(self.get())
    }

    /// Replays the current value into `controls`. Used after an engine
    /// swap so the fresh engine starts from the live values instead of its
    /// defaults.
    pub fn notify(&self, controls: &EngineControls) {
        self.value_changed(self.get(), Some(controls));
    }

    pub fn normalized_to_ranged(&self, normalized: f32) -> f32 {
        match self.kind {
            ParameterKind::Linear | ParameterKind::HostLinked(_) => {
                normalized * (self.max - self.min) + self.min
            }
            ParameterKind::Note | ParameterKind::Scale => {
                let index = (normalized * self.max + 0.5) as usize;
                index.min(self.max_index()) as f32
            }
        }
    }

    pub fn ranged_to_normalized(&self, ranged: f32) -> f32 {
        match self.kind {
            ParameterKind::Linear | ParameterKind::HostLinked(_) => {
                (ranged - self.min) / (self.max - self.min)
            }
            ParameterKind::Note | ParameterKind::Scale => ranged / self.index_of(ranged) as f32,
        }
    }

    /// Pushes a new ranged value into whatever this parameter drives. A
    /// missing target is skipped.
    pub fn value_changed(&self, ranged: f32, controls: Option<&EngineControls>) {
        let Some(controls) = controls else {
            return;
        };

        match self.kind {
            ParameterKind::Linear => {}
            ParameterKind::Note => {
                controls.update_note(NOTE_NAMES[self.index_of(ranged)]);
            }
            ParameterKind::Scale => {
                if let Some(scale) = Scale::from_index(self.index_of(ranged)) {
                    controls.update_scale(scale);
                }
            }
            ParameterKind::HostLinked(slot) => {
                let normalized = self.ranged_to_normalized(ranged);
                controls
                    .host_params()
                    .slot(slot)
                    .set_value_notifying_host(normalized);
            }
        }
    }

    /// Stores `ranged` and reports whether it differs from what was there.
    /// A plain `!=`: values that differ by one ulp count as changed.
    pub fn set_if_changed(&self, ranged: f32) -> bool {
        let previous = self.value.swap(ranged, Ordering::Relaxed);
        previous != ranged
    }

    fn max_index(&self) -> usize {
        self.max as usize
    }

    fn index_of(&self, ranged: f32) -> usize {
        ((ranged + 0.5) as usize).min(self.max_index())
    }
}
