// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-device simulation state
//!
//! One [`SimulationState`] owns every buffer the kernels of one device read and
//! write, plus that device's BLAS handle. It is driven through a fixed lifecycle:
//!
//! ```text
//! Created ──initialize──▶ Initialized ──move_to_device──▶ DeviceResident
//!                              ▲                                 │
//!                              └───────────move_to_host──────────┘
//!
//! any stage ──free──▶ Freed         failed rollback ──▶ Poisoned
//! ```
//!
//! Migrations are transactional: a failed `move_to_device` moves the arrays that
//! already made it back to the host before returning the error. Only when that
//! rollback itself fails is the state `Poisoned`, after which `free` is the only
//! permitted operation.

use crate::geometry::{ArraySizes, ArraySlot, EnsembleGeometry, FloatSlot, IntSlot};
use assoc_gpu_runtime::{
    BlasHandle, DeviceContext, DeviceElement, FloatArray, GpuDataError, IntArray, Location,
    Result, TypedArray,
};
use serde::Serialize;
use std::fmt;
use std::io::Write;
use tracing::{debug, error, info, warn};

/// Where a state is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    /// Scalars may be set, nothing allocated
    Created,
    /// Every array allocated on the host; the handle is bound unless a failed
    /// rebinding could not restore it
    Initialized,
    /// Every array resident on the device
    DeviceResident,
    /// A migration failed and could not be undone; locations are mixed
    Poisoned,
    Freed,
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleStage::Created => "created",
            LifecycleStage::Initialized => "initialized",
            LifecycleStage::DeviceResident => "device-resident",
            LifecycleStage::Poisoned => "poisoned",
            LifecycleStage::Freed => "freed",
        };
        f.write_str(name)
    }
}

/// Summary returned by a successful [`SimulationState::check`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    /// Shared location of every array
    pub location: Location,
    /// Number of arrays verified
    pub arrays: usize,
    pub total_bytes: usize,
    pub handle_bound: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ToDevice,
    ToHost,
}

impl Direction {
    fn reverse(self) -> Self {
        match self {
            Direction::ToDevice => Direction::ToHost,
            Direction::ToHost => Direction::ToDevice,
        }
    }
}

/// All buffers and parameters of one device's simulation
pub struct SimulationState {
    device: DeviceContext,
    geometry: EnsembleGeometry,
    stage: LifecycleStage,
    floats: [Option<FloatArray>; FloatSlot::COUNT],
    ints: [Option<IntArray>; IntSlot::COUNT],
    handle: Option<BlasHandle>,
    pub(crate) diagnostic_output: Option<Box<dyn Write + Send>>,

    /// Enables [`SimulationState::log_dynamic`]
    pub do_print: bool,
    /// Simulation time (s) at which the run started
    pub start_time: f32,
    /// Simulation time (s) at which the run ended
    pub end_time: f32,
}

impl SimulationState {
    /// Empty state for `device`: nothing allocated, scalars zeroed, no handle
    pub fn new(device: DeviceContext) -> Self {
        debug!("Created simulation state for device {}", device.ordinal());
        Self {
            device,
            geometry: EnsembleGeometry::default(),
            stage: LifecycleStage::Created,
            floats: std::array::from_fn(|_| None),
            ints: std::array::from_fn(|_| None),
            handle: None,
            diagnostic_output: None,
            do_print: false,
            start_time: 0.0,
            end_time: 0.0,
        }
    }

    /// Convenience constructor: `new` plus `set_geometry`
    pub fn with_geometry(device: DeviceContext, geometry: EnsembleGeometry) -> Self {
        let mut state = Self::new(device);
        state.geometry = geometry;
        state
    }

    pub fn device(&self) -> &DeviceContext {
        &self.device
    }

    pub fn stage(&self) -> LifecycleStage {
        self.stage
    }

    pub fn is_initialized(&self) -> bool {
        matches!(
            self.stage,
            LifecycleStage::Initialized | LifecycleStage::DeviceResident
        )
    }

    /// Location shared by the arrays; `Host` until a successful `move_to_device`
    ///
    /// A `Poisoned` state has no shared location; this then reports `Host`.
    pub fn location(&self) -> Location {
        match self.stage {
            LifecycleStage::DeviceResident => Location::Device,
            _ => Location::Host,
        }
    }

    pub fn geometry(&self) -> &EnsembleGeometry {
        &self.geometry
    }

    /// Replace the geometry; only allowed before `initialize`
    pub fn set_geometry(&mut self, geometry: EnsembleGeometry) -> Result<()> {
        *self.geometry_mut()? = geometry;
        Ok(())
    }

    /// Mutable geometry for the loader; only allowed before `initialize`
    pub fn geometry_mut(&mut self) -> Result<&mut EnsembleGeometry> {
        if self.stage != LifecycleStage::Created {
            return Err(self.invalid_state("change geometry"));
        }
        Ok(&mut self.geometry)
    }

    pub fn handle(&self) -> Option<&BlasHandle> {
        self.handle.as_ref()
    }

    pub fn float(&self, slot: FloatSlot) -> Option<&FloatArray> {
        self.floats[slot.index()].as_ref()
    }

    pub fn float_mut(&mut self, slot: FloatSlot) -> Option<&mut FloatArray> {
        self.floats[slot.index()].as_mut()
    }

    pub fn int(&self, slot: IntSlot) -> Option<&IntArray> {
        self.ints[slot.index()].as_ref()
    }

    pub fn int_mut(&mut self, slot: IntSlot) -> Option<&mut IntArray> {
        self.ints[slot.index()].as_mut()
    }

    /// `end_time - start_time`
    pub fn elapsed(&self) -> f32 {
        self.end_time - self.start_time
    }

    /// Derive array sizes from the geometry and allocate every array on the host
    ///
    /// Binds a BLAS handle to the state's device. On failure everything allocated
    /// so far is released and the state stays `Created`.
    pub fn initialize(&mut self) -> Result<()> {
        if self.stage != LifecycleStage::Created {
            return Err(self.invalid_state("initialize"));
        }

        let sizes = ArraySizes::derive(&self.geometry).map_err(|e| {
            error!("Cannot initialize state for device {}: {}", self.device.ordinal(), e);
            e
        })?;

        info!(
            "Initializing state for device {}: {} neurons, {} items × {} dims, {} bytes",
            self.device.ordinal(),
            sizes.num_neurons,
            sizes.num_items,
            sizes.dimension,
            sizes.total_bytes()
        );

        if let Err(e) = self.allocate(&sizes) {
            warn!("Initialization failed, releasing partial allocation: {}", e);
            self.release();
            return Err(e);
        }

        self.stage = LifecycleStage::Initialized;
        info!("State for device {} initialized", self.device.ordinal());
        Ok(())
    }

    fn allocate(&mut self, sizes: &ArraySizes) -> Result<()> {
        for slot in FloatSlot::ALL {
            self.floats[slot.index()] = Some(FloatArray::new(sizes.float(slot), slot.name())?);
        }
        for slot in IntSlot::ALL {
            self.ints[slot.index()] = Some(IntArray::new(sizes.int(slot), slot.name())?);
        }
        self.handle = Some(self.device.create_blas_handle()?);
        Ok(())
    }

    /// Verify the structural invariants without mutating anything
    ///
    /// Returns `Validation` naming the first violation found.
    pub fn check(&self) -> Result<CheckReport> {
        if !self.is_initialized() {
            return Err(GpuDataError::Validation(format!(
                "state for device {} is {}",
                self.device.ordinal(),
                self.stage
            )));
        }

        let sizes = ArraySizes::derive(&self.geometry)
            .map_err(|e| GpuDataError::Validation(format!("geometry no longer derives: {}", e)))?;
        let location = self.location();
        let ordinal = self.device.ordinal();

        for slot in FloatSlot::ALL {
            verify(self.float(slot), slot.name(), sizes.float(slot), location, ordinal)?;
        }
        for slot in IntSlot::ALL {
            verify(self.int(slot), slot.name(), sizes.int(slot), location, ordinal)?;
        }

        match &self.handle {
            None if location == Location::Device => {
                return Err(GpuDataError::Validation(
                    "state is device-resident but no BLAS handle is bound".to_string(),
                ));
            }
            Some(handle) if handle.ordinal() != ordinal => {
                return Err(GpuDataError::Validation(format!(
                    "BLAS handle is bound to device {}, state belongs to device {}",
                    handle.ordinal(),
                    ordinal
                )));
            }
            _ => {}
        }

        Ok(CheckReport {
            location,
            arrays: FloatSlot::COUNT + IntSlot::COUNT,
            total_bytes: sizes.total_bytes(),
            handle_bound: self.handle.is_some(),
        })
    }

    /// Migrate every array to the device and rebind the BLAS handle
    ///
    /// Requires an `Initialized` (host-resident) state. The previous handle is
    /// destroyed before the new one is created, so the peak footprint is the
    /// arrays plus one handle. On failure the state is rolled back to the host
    /// with its contents intact.
    pub fn move_to_device(&mut self) -> Result<()> {
        if self.stage != LifecycleStage::Initialized {
            return Err(self.invalid_state("move to device"));
        }

        let device = self.device.clone();
        device.bind_to_thread()?;
        self.migrate_all(Direction::ToDevice)?;

        // At most one handle workspace is live on the device
        self.handle = None;
        match device.create_blas_handle() {
            Ok(handle) => self.handle = Some(handle),
            Err(e) => {
                warn!("BLAS handle rebinding failed on device {}: {}", device.ordinal(), e);
                let moved: Vec<ArraySlot> = ArraySlot::all().collect();
                self.roll_back(&moved, Direction::ToDevice);
                if self.stage == LifecycleStage::Initialized {
                    self.restore_handle();
                }
                return Err(e);
            }
        }

        self.stage = LifecycleStage::DeviceResident;
        info!("State moved to device {}", device.ordinal());
        Ok(())
    }

    /// Migrate every array back to the host
    ///
    /// Requires a `DeviceResident` state. On failure the arrays already on the
    /// host are returned to the device.
    pub fn move_to_host(&mut self) -> Result<()> {
        if self.stage != LifecycleStage::DeviceResident {
            return Err(self.invalid_state("move to host"));
        }

        self.migrate_all(Direction::ToHost)?;
        self.stage = LifecycleStage::Initialized;
        info!("State for device {} moved to host", self.device.ordinal());
        Ok(())
    }

    // Host-resident states keep working without a handle; a later move rebinds one
    fn restore_handle(&mut self) {
        match self.device.create_blas_handle() {
            Ok(handle) => self.handle = Some(handle),
            Err(e) => warn!(
                "State for device {} stays on the host without a BLAS handle: {}",
                self.device.ordinal(),
                e
            ),
        }
    }

    fn migrate_all(&mut self, direction: Direction) -> Result<()> {
        let mut moved = Vec::with_capacity(FloatSlot::COUNT + IntSlot::COUNT);
        for slot in ArraySlot::all() {
            if let Err(e) = self.migrate(slot, direction) {
                warn!(
                    "Migration of '{}' failed after {} arrays, rolling back: {}",
                    slot.name(),
                    moved.len(),
                    e
                );
                self.roll_back(&moved, direction);
                return Err(e);
            }
            moved.push(slot);
        }
        Ok(())
    }

    // Undo a partial migration; poisons the state if that fails too
    fn roll_back(&mut self, moved: &[ArraySlot], direction: Direction) {
        for &slot in moved.iter().rev() {
            if let Err(e) = self.migrate(slot, direction.reverse()) {
                error!(
                    "Rollback of '{}' failed, state for device {} is poisoned: {}",
                    slot.name(),
                    self.device.ordinal(),
                    e
                );
                self.stage = LifecycleStage::Poisoned;
                return;
            }
        }
        debug!("Rolled back {} arrays", moved.len());
    }

    fn migrate(&mut self, slot: ArraySlot, direction: Direction) -> Result<()> {
        let device = &self.device;
        match slot {
            ArraySlot::Float(s) => migrate_array(&mut self.floats[s.index()], s.name(), direction, device),
            ArraySlot::Int(s) => migrate_array(&mut self.ints[s.index()], s.name(), direction, device),
        }
    }

    /// Release every array and the handle, close the diagnostic stream
    ///
    /// Safe to call in any stage, including repeatedly.
    pub fn free(&mut self) {
        if self.stage == LifecycleStage::Freed {
            return;
        }
        self.release();
        if let Some(mut out) = self.diagnostic_output.take() {
            if let Err(e) = out.flush() {
                warn!("Failed to flush diagnostic output: {}", e);
            }
        }
        self.stage = LifecycleStage::Freed;
        info!("Freed state for device {}", self.device.ordinal());
    }

    fn release(&mut self) {
        for array in self.floats.iter_mut() {
            assoc_gpu_runtime::free_array(array.take());
        }
        for array in self.ints.iter_mut() {
            assoc_gpu_runtime::free_array(array.take());
        }
        if self.handle.take().is_some() {
            debug!("Destroyed BLAS handle on device {}", self.device.ordinal());
        }
    }

    fn invalid_state(&self, action: &str) -> GpuDataError {
        error!(
            "Cannot {} state for device {}: stage is {}",
            action,
            self.device.ordinal(),
            self.stage
        );
        GpuDataError::InvalidState(format!("cannot {} while {}", action, self.stage))
    }
}

/// Free an optional state; `None` is a no-op
pub fn free_state(state: Option<SimulationState>) {
    if let Some(mut state) = state {
        state.free();
    }
}

impl Drop for SimulationState {
    fn drop(&mut self) {
        self.free();
    }
}

impl fmt::Debug for SimulationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationState")
            .field("device", &self.device)
            .field("stage", &self.stage)
            .field("geometry", &self.geometry)
            .field("handle_bound", &self.handle.is_some())
            .field("do_print", &self.do_print)
            .finish()
    }
}

fn migrate_array<T: DeviceElement>(
    array: &mut Option<TypedArray<T>>,
    name: &str,
    direction: Direction,
    device: &DeviceContext,
) -> Result<()> {
    let Some(array) = array.as_mut() else {
        return Err(GpuDataError::InvalidState(format!("'{}' is not allocated", name)));
    };
    match direction {
        Direction::ToDevice => array.move_to_device(device),
        Direction::ToHost => array.move_to_host(),
    }
}

fn verify<T: DeviceElement>(
    array: Option<&TypedArray<T>>,
    name: &str,
    expected: usize,
    location: Location,
    ordinal: usize,
) -> Result<()> {
    let Some(array) = array else {
        return Err(GpuDataError::Validation(format!("'{}' is not allocated", name)));
    };
    if array.len() != expected {
        return Err(GpuDataError::Validation(format!(
            "'{}' has {} elements, expected {}",
            name,
            array.len(),
            expected
        )));
    }
    if array.location() != location {
        return Err(GpuDataError::Validation(format!(
            "'{}' is on the {}, state is on the {}",
            name,
            array.location(),
            location
        )));
    }
    if let Some(buffer) = array.device_buffer() {
        if buffer.ordinal() != ordinal {
            return Err(GpuDataError::Validation(format!(
                "'{}' lives on device {}, state belongs to device {}",
                name,
                buffer.ordinal(),
                ordinal
            )));
        }
    }
    Ok(())
}
