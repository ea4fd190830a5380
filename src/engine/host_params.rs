//! # Host Parameter Tree
//!
//! The engine's mirror of the host automation slots. Each slot has a
//! string id (the same id the nih-plug shell registers with the host), a
//! linear [`FloatRange`], and an atomic normalized value. The façade's
//! host-linked parameters push into these slots, and the engine reads
//! them back as plain values once per block.
//!
//! Values are stored normalized, the way hosts store automation. Reads
//! and writes are relaxed atomics: each slot is independent, and a block
//! seeing one slot's update before another's is harmless.

use std::sync::atomic::Ordering;

use atomic_float::AtomicF32;
use nih_plug::prelude::FloatRange;

pub const ADDITION_GAIN_ID: &str = "additionGain";
pub const REDUCTION_GAIN_ID: &str = "reductionGain";
pub const LOW_FREQ_ID: &str = "lowFreq";
pub const HIGH_FREQ_ID: &str = "highFreq";
pub const FILTER_QUALITY_ID: &str = "filterQuality";
pub const SPECTRAL_GATE_LOWER_THRESH_ID: &str = "spectralGateLowerThresh";
pub const SPECTRAL_GATE_UPPER_THRESH_ID: &str = "spectralGateUpperThresh";
pub const SPECTRAL_GATE_FALLOFF_ID: &str = "spectralGateFalloff";

/// Range and default of one host slot, in plain units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostParamInfo {
    pub id: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

/// The host-automatable slots of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSlot {
    AdditionGain,
    ReductionGain,
    LowFreq,
    HighFreq,
    FilterQuality,
    GateLowerThreshold,
    GateUpperThreshold,
    GateFalloff,
}

impl HostSlot {
    pub const ALL: [HostSlot; Self::COUNT] = [
        HostSlot::AdditionGain,
        HostSlot::ReductionGain,
        HostSlot::LowFreq,
        HostSlot::HighFreq,
        HostSlot::FilterQuality,
        HostSlot::GateLowerThreshold,
        HostSlot::GateUpperThreshold,
        HostSlot::GateFalloff,
    ];

    pub const COUNT: usize = 8;

    pub fn info(self) -> HostParamInfo {
        let (id, min, max, default) = match self {
            // dB
            HostSlot::AdditionGain => (ADDITION_GAIN_ID, 0.0, 16.0, 11.0),
            HostSlot::ReductionGain => (REDUCTION_GAIN_ID, 0.0, 48.0, 25.0),
            // Hz
            HostSlot::LowFreq => (LOW_FREQ_ID, 20.0, 20_000.0, 250.0),
            HostSlot::HighFreq => (HIGH_FREQ_ID, 20.0, 20_000.0, 1_500.0),
            // Q in percent
            HostSlot::FilterQuality => (FILTER_QUALITY_ID, 10.0, 180.0, 90.0),
            // linear amplitude
            HostSlot::GateLowerThreshold => (SPECTRAL_GATE_LOWER_THRESH_ID, 0.0, 1.0, 0.3),
            HostSlot::GateUpperThreshold => (SPECTRAL_GATE_UPPER_THRESH_ID, 0.0, 1.0, 0.5),
            // dB
            HostSlot::GateFalloff => (SPECTRAL_GATE_FALLOFF_ID, -24.0, 0.0, -16.0),
        };

        HostParamInfo {
            id,
            min,
            max,
            default,
        }
    }

    pub fn id(self) -> &'static str {
        self.info().id
    }

    pub fn from_id(id: &str) -> Option<HostSlot> {
        Self::ALL.into_iter().find(|slot| slot.id() == id)
    }
}

/// One automation slot.
#[derive(Debug)]
pub struct HostParam {
    id: &'static str,
    range: FloatRange,
    normalized: AtomicF32,
}

impl HostParam {
    fn new(info: HostParamInfo) -> Self {
        let range = FloatRange::Linear {
            min: info.min,
            max: info.max,
        };

        Self {
            id: info.id,
            normalized: AtomicF32::new(range.normalize(info.default)),
            range,
        }
    }

    pub fn id(&self) -> &'static str {
        self.id
    }

    /// Stores a new normalized value, clamped to `[0, 1]`.
    pub fn set_value_notifying_host(&self, normalized: f32) {
        if normalized.is_nan() {
            return;
        }
        self.normalized
            .store(normalized.clamp(0.0, 1.0), Ordering::Relaxed);
    }

    pub fn normalized(&self) -> f32 {
        self.normalized.load(Ordering::Relaxed)
    }

    /// The current value in plain units.
    pub fn plain(&self) -> f32 {
        self.range.unnormalize(self.normalized())
    }
}

/// Every [`HostSlot`], indexed by its ordinal.
#[derive(Debug)]
pub struct HostParamTree {
    params: [HostParam; HostSlot::COUNT],
}

impl Default for HostParamTree {
    fn default() -> Self {
        Self {
            params: HostSlot::ALL.map(|slot| HostParam::new(slot.info())),
        }
    }
}

impl HostParamTree {
    /// Looks a slot up by its string id.
    pub fn get_parameter(&self, id: &str) -> Option<&HostParam> {
        self.params.iter().find(|param| param.id == id)
    }

    pub fn slot(&self, slot: HostSlot) -> &HostParam {
        &self.params[slot as usize]
    }

    /// Plain value of a slot.
    pub fn value(&self, slot: HostSlot) -> f32 {
        self.slot(slot).plain()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostParam> {
        self.params.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip_through_the_range() {
        let tree = HostParamTree::default();

        for slot in HostSlot::ALL {
            let expected = slot.info().default;
            let actual = tree.value(slot);
            assert!(
                (actual - expected).abs() <= 1e-4 * expected.abs().max(1.0),
                "{} defaulted to {actual}, expected {expected}",
                slot.id()
            );
        }
    }

    #[test]
    fn test_lookup_by_id() {
        let tree = HostParamTree::default();

        let low = tree.get_parameter(LOW_FREQ_ID).unwrap();
        assert_eq!(low.id(), LOW_FREQ_ID);
        assert!(tree.get_parameter("doesNotExist").is_none());

        assert_eq!(HostSlot::from_id(FILTER_QUALITY_ID), Some(HostSlot::FilterQuality));
        assert_eq!(HostSlot::from_id("gain"), None);
    }

    #[test]
    fn test_set_value_clamps_and_maps() {
        let tree = HostParamTree::default();
        let gain = tree.slot(HostSlot::ReductionGain);

        gain.set_value_notifying_host(0.5);
        assert!((gain.plain() - 24.0).abs() < 1e-4);

        gain.set_value_notifying_host(3.0);
        assert_eq!(gain.normalized(), 1.0);

        gain.set_value_notifying_host(f32::NAN);
        assert_eq!(gain.normalized(), 1.0);

        let falloff = tree.slot(HostSlot::GateFalloff);
        falloff.set_value_notifying_host(0.0);
        assert_eq!(falloff.plain(), -24.0);
    }

    #[test]
    fn test_slots_are_indexed_by_ordinal() {
        let tree = HostParamTree::default();
        for slot in HostSlot::ALL {
            assert_eq!(tree.slot(slot).id(), slot.id());
        }
    }
}
