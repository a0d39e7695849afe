// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Text dumps of a simulation state
//!
//! Printers never mutate the state. Device-resident arrays are read back into a
//! temporary host copy; missing or short arrays truncate the table instead of
//! failing.

use crate::geometry::{FloatSlot, IntSlot};
use crate::state::{LifecycleStage, SimulationState};
use assoc_gpu_runtime::{DeviceElement, FloatArray, IntArray, TypedArray};
use std::fmt::Display;
use std::io::{self, Write};
use tracing::{debug, warn};

/// Arrays rewritten every simulation step
const DYNAMIC_ARRAYS: [FloatSlot; 9] = [
    FloatSlot::InputHost,
    FloatSlot::InputDevice,
    FloatSlot::EncodeResult,
    FloatSlot::DecodedValues,
    FloatSlot::OutputDevice,
    FloatSlot::OutputHost,
    FloatSlot::Voltage,
    FloatSlot::Reftime,
    FloatSlot::Spikes,
];

impl SimulationState {
    /// Scalar fields and, with `print_arrays`, every array as an `m × n` table
    pub fn print(&self, out: &mut dyn Write, print_arrays: bool) -> io::Result<()> {
        let g = self.geometry();
        writeln!(out, "state for device {} ({})", self.device().ordinal(), self.device().backend_type())?;
        writeln!(out, "  stage: {}", self.stage())?;
        if self.stage() == LifecycleStage::Poisoned {
            writeln!(out, "  location: mixed")?;
        } else {
            writeln!(out, "  location: {}", self.location())?;
        }
        writeln!(out, "  initialized: {}", self.is_initialized())?;
        writeln!(out, "  handle bound: {}", self.handle().is_some())?;
        writeln!(out, "  do_print: {}", self.do_print)?;
        writeln!(out, "  start_time: {}", self.start_time)?;
        writeln!(out, "  end_time: {}", self.end_time)?;
        writeln!(out, "  identical_ensembles: {}", g.identical_ensembles)?;
        writeln!(out, "  neurons_per_item: {}", g.neurons_per_item)?;
        writeln!(out, "  dimension: {}", g.dimension)?;
        writeln!(out, "  num_items: {}", g.num_items)?;
        writeln!(out, "  num_probes: {}", g.num_probes)?;
        writeln!(out, "  num_spikes: {}", g.num_spikes)?;
        writeln!(out, "  num_steps: {}", g.num_steps)?;
        writeln!(out, "  dt: {}", g.dt)?;
        writeln!(out, "  pstc: {}", g.pstc)?;
        writeln!(out, "  tau_ref: {}", g.tau_ref)?;
        writeln!(out, "  tau_rc: {}", g.tau_rc)?;
        writeln!(out, "  tau: {}", g.tau)?;
        writeln!(out, "  radius: {}", g.radius)?;

        if !print_arrays {
            return Ok(());
        }

        for slot in FloatSlot::ALL {
            let (m, n) = self.float_shape(slot);
            print_float_array(out, self.float(slot), m, n)?;
        }
        for slot in IntSlot::ALL {
            let len = self.int(slot).map_or(0, TypedArray::len);
            print_int_array(out, self.int(slot), 1, len)?;
        }
        Ok(())
    }

    /// Arrays that change every step
    pub fn print_dynamic(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "dynamic state, device {}:", self.device().ordinal())?;
        for slot in DYNAMIC_ARRAYS {
            let (m, n) = self.float_shape(slot);
            print_float_array(out, self.float(slot), m, n)?;
        }
        Ok(())
    }

    /// Index and stored vectors, one item per row
    pub fn print_vecs(&self, out: &mut dyn Write) -> io::Result<()> {
        for slot in [FloatSlot::IndexVectors, FloatSlot::StoredVectors] {
            let (m, n) = self.float_shape(slot);
            print_float_array(out, self.float(slot), m, n)?;
        }
        Ok(())
    }

    /// Route [`SimulationState::log_dynamic`] output to `out`
    ///
    /// Replaces (and flushes) any stream attached before. The stream is flushed and
    /// closed by `free`.
    pub fn attach_diagnostic_output(&mut self, out: Box<dyn Write + Send>) {
        if let Some(mut previous) = self.diagnostic_output.replace(out) {
            if let Err(e) = previous.flush() {
                warn!("Failed to flush replaced diagnostic output: {}", e);
            }
        }
        debug!("Attached diagnostic output to device {}", self.device().ordinal());
    }

    /// Write `print_dynamic` into the attached stream when `do_print` is set
    pub fn log_dynamic(&mut self) -> io::Result<()> {
        if !self.do_print {
            return Ok(());
        }
        let Some(mut out) = self.diagnostic_output.take() else {
            return Ok(());
        };
        let result = self.print_dynamic(out.as_mut());
        self.diagnostic_output = Some(out);
        result
    }

    // Table shape: item-major vectors and per-step records print as matrices
    fn float_shape(&self, slot: FloatSlot) -> (usize, usize) {
        let g = self.geometry();
        match slot {
            FloatSlot::IndexVectors | FloatSlot::StoredVectors => (g.num_items, g.dimension),
            FloatSlot::ProbesHost => (g.num_steps, g.num_probes),
            FloatSlot::SpikesHost => (g.num_steps, g.num_spikes),
            _ => (1, self.float(slot).map_or(0, TypedArray::len)),
        }
    }
}

/// Print `array` as `m` rows of `n` integers
pub fn print_int_array(
    out: &mut dyn Write,
    array: Option<&IntArray>,
    m: usize,
    n: usize,
) -> io::Result<()> {
    print_table(out, array, m, n)
}

/// Print `array` as `m` rows of `n` floats
pub fn print_float_array(
    out: &mut dyn Write,
    array: Option<&FloatArray>,
    m: usize,
    n: usize,
) -> io::Result<()> {
    print_table(out, array, m, n)
}

fn print_table<T: DeviceElement + Display>(
    out: &mut dyn Write,
    array: Option<&TypedArray<T>>,
    m: usize,
    n: usize,
) -> io::Result<()> {
    let Some(array) = array else {
        return writeln!(out, "<unallocated>");
    };

    writeln!(out, "{} ({}, {} elements):", array.name(), array.location(), array.len())?;
    let values = match array.read_back() {
        Ok(values) => values,
        Err(e) => return writeln!(out, "  <unreadable: {}>", e),
    };
    if n == 0 {
        return Ok(());
    }

    for row in values.chunks(n).take(m) {
        let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
        writeln!(out, "  [{}]", cells.join(", "))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::EnsembleGeometry;
    use assoc_gpu_runtime::DeviceContext;
    use std::sync::{Arc, Mutex};

    fn state() -> SimulationState {
        let geometry = EnsembleGeometry {
            neurons_per_item: 2,
            num_items: 2,
            dimension: 3,
            num_probes: 1,
            num_spikes: 1,
            num_steps: 2,
            dt: 0.001,
            ..EnsembleGeometry::default()
        };
        let mut state = SimulationState::with_geometry(DeviceContext::emulated(0), geometry);
        state.initialize().unwrap();
        state
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_print_scalars_only() {
        let state = state();
        let text = render(|out| state.print(out, false));
        assert!(text.contains("neurons_per_item: 2"));
        assert!(text.contains("location: host"));
        assert!(!text.contains("voltage"));
    }

    #[test]
    fn test_print_arrays_includes_every_array() {
        let state = state();
        let text = render(|out| state.print(out, true));
        for slot in FloatSlot::ALL {
            assert!(text.contains(slot.name()), "missing {}", slot.name());
        }
        assert!(text.contains("probe_map"));
    }

    #[test]
    fn test_print_vecs_as_item_rows() {
        let mut state = state();
        state
            .float_mut(FloatSlot::IndexVectors)
            .unwrap()
            .set_data(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .unwrap();
        let text = render(|out| state.print_vecs(out));
        assert!(text.contains("[1, 2, 3]"));
        assert!(text.contains("[4, 5, 6]"));
    }

    #[test]
    fn test_print_reads_back_device_arrays() {
        let mut state = state();
        state.float_mut(FloatSlot::Voltage).unwrap().set(1, 0.5).unwrap();
        state.move_to_device().unwrap();
        let text = render(|out| state.print_dynamic(out));
        assert!(text.contains("voltage (device, 4 elements):"));
        assert!(text.contains("[0, 0.5, 0, 0]"));
        assert_eq!(state.location(), assoc_gpu_runtime::Location::Device);
    }

    #[test]
    fn test_table_truncates() {
        let array = FloatArray::from_slice(&[1.0, 2.0, 3.0], "short").unwrap();
        let text = render(|out| print_float_array(out, Some(&array), 4, 2));
        assert!(text.contains("[1, 2]"));
        assert!(text.contains("[3]"));

        let text = render(|out| print_float_array(out, Some(&array), 1, 2));
        assert!(!text.contains("[3]"));

        let text = render(|out| print_int_array(out, None, 2, 2));
        assert_eq!(text, "<unallocated>\n");
    }

    #[test]
    fn test_log_dynamic_respects_do_print() {
        let mut state = state();
        let sink = SharedBuf::default();
        state.attach_diagnostic_output(Box::new(sink.clone()));

        state.log_dynamic().unwrap();
        assert!(sink.0.lock().unwrap().is_empty());

        state.do_print = true;
        state.log_dynamic().unwrap();
        let text = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("dynamic state, device 0"));

        state.free();
        assert!(state.diagnostic_output.is_none());
    }

    #[test]
    fn test_print_marks_poisoned_state_as_mixed() {
        let mut state = state();
        let device = state.device().as_emulated().unwrap().clone();
        device.fail_transfers_after(3);
        state.move_to_device().unwrap_err();
        assert_eq!(state.stage(), LifecycleStage::Poisoned);

        let text = render(|out| state.print(out, true));
        assert!(text.contains("stage: poisoned"));
        assert!(text.contains("location: mixed"));
        assert!(!text.contains("location: host"));
        assert!(text.contains("(device, 3 elements):"));
        assert!(text.contains("(host, 3 elements):"));
        assert!(text.contains("<unreadable"));
    }
}
