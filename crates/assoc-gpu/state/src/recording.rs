// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Probe / spike bookkeeping
//!
//! The loader collects probed item indices and recorded neuron indices into
//! [`IndexQueue`]s; they become `probe_map` / `spike_map`. The kernels append one
//! row per step to `probes_host` / `spikes_host`, which are extracted here as
//! `(num_steps, channels)` matrices.

use crate::geometry::{FloatSlot, IntSlot};
use crate::state::{LifecycleStage, SimulationState};
use assoc_gpu_runtime::{check_bounds, GpuDataError, IndexQueue, Result};
use ndarray::Array2;
use tracing::{debug, error};

impl SimulationState {
    /// Fill `probe_map` with probed item indices, in queue order
    pub fn assign_probe_map(&mut self, queue: IndexQueue) -> Result<()> {
        let bound = self.geometry().num_items;
        self.assign_map(IntSlot::ProbeMap, queue, bound)
    }

    /// Fill `spike_map` with recorded neuron indices, in queue order
    pub fn assign_spike_map(&mut self, queue: IndexQueue) -> Result<()> {
        let bound = self.geometry().num_neurons().unwrap_or(0);
        self.assign_map(IntSlot::SpikeMap, queue, bound)
    }

    fn assign_map(&mut self, slot: IntSlot, queue: IndexQueue, bound: usize) -> Result<()> {
        if self.stage() != LifecycleStage::Initialized {
            error!("Cannot assign '{}' while state is {}", slot.name(), self.stage());
            return Err(GpuDataError::InvalidState(format!(
                "cannot assign '{}' while {}",
                slot.name(),
                self.stage()
            )));
        }

        let indices = queue.as_slice();
        for &index in indices {
            check_bounds("mapping", slot.name(), bound, i64::from(index))?;
        }

        let map = self
            .int_mut(slot)
            .ok_or_else(|| GpuDataError::InvalidState(format!("'{}' is not allocated", slot.name())))?;
        map.set_data(indices)?;
        debug!("Assigned {} entries to '{}'", indices.len(), slot.name());
        Ok(())
    }

    /// Decoded values of every probe, one row per step
    pub fn probe_record(&self) -> Result<Array2<f32>> {
        let g = self.geometry();
        self.record(FloatSlot::ProbesHost, g.num_steps, g.num_probes)
    }

    /// Spike values of every recorded neuron, one row per step
    pub fn spike_record(&self) -> Result<Array2<f32>> {
        let g = self.geometry();
        self.record(FloatSlot::SpikesHost, g.num_steps, g.num_spikes)
    }

    fn record(&self, slot: FloatSlot, steps: usize, channels: usize) -> Result<Array2<f32>> {
        let array = self
            .float(slot)
            .ok_or_else(|| GpuDataError::InvalidState(format!("'{}' is not allocated", slot.name())))?;
        let values = array.read_back()?;
        let actual = values.len();
        Array2::from_shape_vec((steps, channels), values).map_err(|_| GpuDataError::SizeMismatch {
            name: slot.name().to_string(),
            expected: steps * channels,
            actual,
        })
    }
}
