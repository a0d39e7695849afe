// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Ensemble geometry and array size derivation
//!
//! The model loader hands over an [`EnsembleGeometry`]; every array size of a
//! [`crate::SimulationState`] is a pure function of it. With
//! `N = neurons_per_item * num_items` and `E = identical_ensembles ? neurons_per_item : N`:
//!
//! | array | elements |
//! |---|---|
//! | `input_host`, `input_device`, `output_host`, `output_device` | `dimension` |
//! | `encode_result`, `decoded_values` | `num_items` |
//! | `index_vectors`, `stored_vectors` | `num_items * dimension` |
//! | `decoders`, `gain`, `bias` | `E` |
//! | `voltage`, `reftime`, `spikes` | `N` |
//! | `probes_device`, `probe_map` | `num_probes` |
//! | `probes_host` | `num_steps * num_probes` |
//! | `spikes_device`, `spike_map` | `num_spikes` |
//! | `spikes_host` | `num_steps * num_spikes` |
//!
//! Each item ensemble represents one scalar (the similarity of the input with the
//! item's index vector), so decoders are one value per neuron.

use assoc_gpu_runtime::{GpuDataError, Result};
use serde::{Deserialize, Serialize};
use std::mem::size_of;

/// Scalar model parameters supplied by the loader
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleGeometry {
    /// All item ensembles share gain, bias and decoders
    pub identical_ensembles: bool,
    pub neurons_per_item: usize,
    pub dimension: usize,
    pub num_items: usize,
    /// Probed items (decoded value recorded every step)
    pub num_probes: usize,
    /// Neurons whose spikes are recorded every step
    pub num_spikes: usize,
    pub num_steps: usize,
    /// Step length (s)
    pub dt: f32,
    /// Post-synaptic time constant (s)
    pub pstc: f32,
    /// Refractory period (s)
    pub tau_ref: f32,
    /// Membrane RC time constant (s)
    pub tau_rc: f32,
    pub tau: f32,
    pub radius: f32,
}

impl EnsembleGeometry {
    /// Total neuron count, `None` on overflow
    pub fn num_neurons(&self) -> Option<usize> {
        self.neurons_per_item.checked_mul(self.num_items)
    }

    /// Reject missing or inconsistent scalars
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("neurons_per_item", self.neurons_per_item),
            ("num_items", self.num_items),
            ("dimension", self.dimension),
            ("num_steps", self.num_steps),
        ];
        for (field, value) in required {
            if value == 0 {
                return Err(config_error(format!("'{}' is not set", field)));
            }
        }

        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(config_error(format!("'dt' must be positive, got {}", self.dt)));
        }

        let constants = [
            ("pstc", self.pstc),
            ("tau_ref", self.tau_ref),
            ("tau_rc", self.tau_rc),
            ("tau", self.tau),
            ("radius", self.radius),
        ];
        for (field, value) in constants {
            if !value.is_finite() || value < 0.0 {
                return Err(config_error(format!(
                    "'{}' must be finite and non-negative, got {}",
                    field, value
                )));
            }
        }

        if self.num_probes > self.num_items {
            return Err(config_error(format!(
                "num_probes ({}) exceeds num_items ({})",
                self.num_probes, self.num_items
            )));
        }

        let num_neurons = self
            .num_neurons()
            .ok_or_else(|| config_error("neuron count overflows".to_string()))?;
        if self.num_spikes > num_neurons {
            return Err(config_error(format!(
                "num_spikes ({}) exceeds neuron count ({})",
                self.num_spikes, num_neurons
            )));
        }

        Ok(())
    }
}

/// Element counts of every array, derived from an [`EnsembleGeometry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArraySizes {
    /// `neurons_per_item * num_items`
    pub num_neurons: usize,
    /// Gain / bias / decoder count
    pub ensemble_params: usize,
    pub dimension: usize,
    pub num_items: usize,
    /// `num_items * dimension`
    pub item_vectors: usize,
    pub num_probes: usize,
    /// `num_steps * num_probes`
    pub probe_record: usize,
    pub num_spikes: usize,
    /// `num_steps * num_spikes`
    pub spike_record: usize,
}

impl ArraySizes {
    /// Validate `geometry` and derive every size
    ///
    /// Sizes must stay addressable by 32-bit kernel indices.
    pub fn derive(geometry: &EnsembleGeometry) -> Result<Self> {
        geometry.validate()?;

        let num_neurons = checked(geometry.neurons_per_item, geometry.num_items, "neurons_per_item * num_items")?;
        let ensemble_params = if geometry.identical_ensembles {
            geometry.neurons_per_item
        } else {
            num_neurons
        };

        Ok(Self {
            num_neurons,
            ensemble_params,
            dimension: geometry.dimension,
            num_items: geometry.num_items,
            item_vectors: checked(geometry.num_items, geometry.dimension, "num_items * dimension")?,
            num_probes: geometry.num_probes,
            probe_record: checked(geometry.num_steps, geometry.num_probes, "num_steps * num_probes")?,
            num_spikes: geometry.num_spikes,
            spike_record: checked(geometry.num_steps, geometry.num_spikes, "num_steps * num_spikes")?,
        })
    }

    pub fn float(&self, slot: FloatSlot) -> usize {
        match slot {
            FloatSlot::InputHost
            | FloatSlot::InputDevice
            | FloatSlot::OutputHost
            | FloatSlot::OutputDevice => self.dimension,
            FloatSlot::EncodeResult | FloatSlot::DecodedValues => self.num_items,
            FloatSlot::IndexVectors | FloatSlot::StoredVectors => self.item_vectors,
            FloatSlot::Decoders | FloatSlot::Gain | FloatSlot::Bias => self.ensemble_params,
            FloatSlot::Voltage | FloatSlot::Reftime | FloatSlot::Spikes => self.num_neurons,
            FloatSlot::ProbesHost => self.probe_record,
            FloatSlot::ProbesDevice => self.num_probes,
            FloatSlot::SpikesHost => self.spike_record,
            FloatSlot::SpikesDevice => self.num_spikes,
        }
    }

    pub fn int(&self, slot: IntSlot) -> usize {
        match slot {
            IntSlot::ProbeMap => self.num_probes,
            IntSlot::SpikeMap => self.num_spikes,
        }
    }

    /// Bytes needed to hold every array
    pub fn total_bytes(&self) -> usize {
        let floats: usize = FloatSlot::ALL.iter().map(|&s| self.float(s)).sum();
        let ints: usize = IntSlot::ALL.iter().map(|&s| self.int(s)).sum();
        floats * size_of::<f32>() + ints * size_of::<i32>()
    }
}

fn checked(a: usize, b: usize, what: &str) -> Result<usize> {
    a.checked_mul(b)
        .filter(|&n| n <= i32::MAX as usize)
        .ok_or_else(|| config_error(format!("{} exceeds the 32-bit kernel index range", what)))
}

fn config_error(msg: String) -> GpuDataError {
    GpuDataError::Configuration(msg)
}

/// Floating-point arrays owned by a simulation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatSlot {
    InputHost,
    InputDevice,
    EncodeResult,
    DecodedValues,
    OutputDevice,
    OutputHost,
    IndexVectors,
    StoredVectors,
    Decoders,
    Gain,
    Bias,
    Voltage,
    Reftime,
    Spikes,
    ProbesHost,
    ProbesDevice,
    SpikesHost,
    SpikesDevice,
}

impl FloatSlot {
    pub const COUNT: usize = 18;

    /// Allocation and migration order
    pub const ALL: [FloatSlot; FloatSlot::COUNT] = [
        FloatSlot::InputHost,
        FloatSlot::InputDevice,
        FloatSlot::EncodeResult,
        FloatSlot::DecodedValues,
        FloatSlot::OutputDevice,
        FloatSlot::OutputHost,
        FloatSlot::IndexVectors,
        FloatSlot::StoredVectors,
        FloatSlot::Decoders,
        FloatSlot::Gain,
        FloatSlot::Bias,
        FloatSlot::Voltage,
        FloatSlot::Reftime,
        FloatSlot::Spikes,
        FloatSlot::ProbesHost,
        FloatSlot::ProbesDevice,
        FloatSlot::SpikesHost,
        FloatSlot::SpikesDevice,
    ];

    /// Diagnostic label, also the array's name
    pub fn name(self) -> &'static str {
        match self {
            FloatSlot::InputHost => "input_host",
            FloatSlot::InputDevice => "input_device",
            FloatSlot::EncodeResult => "encode_result",
            FloatSlot::DecodedValues => "decoded_values",
            FloatSlot::OutputDevice => "output_device",
            FloatSlot::OutputHost => "output_host",
            FloatSlot::IndexVectors => "index_vectors",
            FloatSlot::StoredVectors => "stored_vectors",
            FloatSlot::Decoders => "decoders",
            FloatSlot::Gain => "gain",
            FloatSlot::Bias => "bias",
            FloatSlot::Voltage => "voltage",
            FloatSlot::Reftime => "reftime",
            FloatSlot::Spikes => "spikes",
            FloatSlot::ProbesHost => "probes_host",
            FloatSlot::ProbesDevice => "probes_device",
            FloatSlot::SpikesHost => "spikes_host",
            FloatSlot::SpikesDevice => "spikes_device",
        }
    }

    /// True for arrays holding one value per simulated neuron
    pub fn is_per_neuron(self) -> bool {
        matches!(self, FloatSlot::Voltage | FloatSlot::Reftime | FloatSlot::Spikes)
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Integer arrays owned by a simulation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntSlot {
    ProbeMap,
    SpikeMap,
}

impl IntSlot {
    pub const COUNT: usize = 2;

    pub const ALL: [IntSlot; IntSlot::COUNT] = [IntSlot::ProbeMap, IntSlot::SpikeMap];

    pub fn name(self) -> &'static str {
        match self {
            IntSlot::ProbeMap => "probe_map",
            IntSlot::SpikeMap => "spike_map",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Any array owned by a simulation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArraySlot {
    Float(FloatSlot),
    Int(IntSlot),
}

impl ArraySlot {
    /// Every slot, floats first
    pub fn all() -> impl Iterator<Item = ArraySlot> {
        FloatSlot::ALL
            .into_iter()
            .map(ArraySlot::Float)
            .chain(IntSlot::ALL.into_iter().map(ArraySlot::Int))
    }

    pub fn name(self) -> &'static str {
        match self {
            ArraySlot::Float(slot) => slot.name(),
            ArraySlot::Int(slot) => slot.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> EnsembleGeometry {
        EnsembleGeometry {
            neurons_per_item: 50,
            num_items: 4,
            dimension: 16,
            num_probes: 2,
            num_spikes: 2,
            num_steps: 100,
            dt: 0.001,
            ..EnsembleGeometry::default()
        }
    }

    #[test]
    fn test_derive_sizes() {
        let sizes = ArraySizes::derive(&geometry()).unwrap();
        assert_eq!(sizes.num_neurons, 200);
        assert_eq!(sizes.ensemble_params, 200);
        assert_eq!(sizes.float(FloatSlot::Voltage), 200);
        assert_eq!(sizes.float(FloatSlot::IndexVectors), 64);
        assert_eq!(sizes.float(FloatSlot::EncodeResult), 4);
        assert_eq!(sizes.float(FloatSlot::InputHost), 16);
        assert_eq!(sizes.float(FloatSlot::ProbesHost), 200);
        assert_eq!(sizes.float(FloatSlot::ProbesDevice), 2);
        assert_eq!(sizes.int(IntSlot::SpikeMap), 2);
    }

    #[test]
    fn test_identical_ensembles_share_parameters() {
        let mut g = geometry();
        g.identical_ensembles = true;
        let sizes = ArraySizes::derive(&g).unwrap();
        assert_eq!(sizes.float(FloatSlot::Gain), 50);
        assert_eq!(sizes.float(FloatSlot::Decoders), 50);
        assert_eq!(sizes.float(FloatSlot::Voltage), 200);
    }

    #[test]
    fn test_missing_scalar_is_configuration_error() {
        let mut g = geometry();
        g.dimension = 0;
        let err = ArraySizes::derive(&g).unwrap_err();
        assert!(matches!(err, GpuDataError::Configuration(ref m) if m.contains("dimension")));

        let mut g = geometry();
        g.dt = 0.0;
        assert!(ArraySizes::derive(&g).is_err());

        let mut g = geometry();
        g.tau_rc = f32::NAN;
        assert!(ArraySizes::derive(&g).is_err());
    }

    #[test]
    fn test_probe_and_spike_bounds() {
        let mut g = geometry();
        g.num_probes = 5;
        assert!(ArraySizes::derive(&g).is_err());

        let mut g = geometry();
        g.num_spikes = 201;
        assert!(ArraySizes::derive(&g).is_err());

        let mut g = geometry();
        g.num_probes = 0;
        g.num_spikes = 0;
        let sizes = ArraySizes::derive(&g).unwrap();
        assert_eq!(sizes.float(FloatSlot::ProbesHost), 0);
    }

    #[test]
    fn test_oversized_geometry_rejected() {
        let mut g = geometry();
        g.num_items = 1 << 20;
        g.dimension = 1 << 12;
        let err = ArraySizes::derive(&g).unwrap_err();
        assert!(matches!(err, GpuDataError::Configuration(_)));
    }

    #[test]
    fn test_total_bytes() {
        let sizes = ArraySizes::derive(&geometry()).unwrap();
        // 4 * dim + 2 * items + 2 * items*dim + 6 * neurons + probes(200 + 2) + spikes(200 + 2), ints 4
        let floats = 4 * 16 + 2 * 4 + 2 * 64 + 6 * 200 + 202 + 202;
        assert_eq!(sizes.total_bytes(), floats * 4 + 4 * 4);
    }

    #[test]
    fn test_slot_order_matches_index() {
        for (i, slot) in FloatSlot::ALL.iter().enumerate() {
            assert_eq!(slot.index(), i);
        }
        assert_eq!(ArraySlot::all().count(), 20);
    }
}
