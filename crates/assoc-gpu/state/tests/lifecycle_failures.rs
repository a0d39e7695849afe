// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Lifecycle Failure Tests
//!
//! Resource exhaustion on a capacity-limited emulated device must never leave a
//! half-allocated or mixed-location state behind.

use assoc_gpu_runtime::{
    DeviceContext, GpuDataError, Location, MemoryLedger, BLAS_WORKSPACE_BYTES,
};
use assoc_gpu_state::{ArraySizes, EnsembleGeometry, FloatSlot, LifecycleStage, SimulationState};

fn geometry() -> EnsembleGeometry {
    EnsembleGeometry {
        neurons_per_item: 8,
        num_items: 3,
        dimension: 4,
        num_probes: 2,
        num_spikes: 2,
        num_steps: 10,
        dt: 0.001,
        tau_rc: 0.02,
        tau_ref: 0.002,
        ..EnsembleGeometry::default()
    }
}

fn array_bytes() -> usize {
    ArraySizes::derive(&geometry()).unwrap().total_bytes()
}

fn assert_nothing_live(ledger: MemoryLedger) {
    assert_eq!(ledger.live_bytes, 0);
    assert_eq!(ledger.live_allocations, 0);
    assert_eq!(ledger.live_handles, 0);
}

#[test]
fn test_initialize_failure_releases_everything() {
    // Too small for the BLAS workspace, so binding the handle fails
    let device = DeviceContext::emulated_with_capacity(0, BLAS_WORKSPACE_BYTES / 2);
    let mut state = SimulationState::with_geometry(device.clone(), geometry());

    let err = state.initialize().unwrap_err();
    assert!(matches!(err, GpuDataError::Allocation { .. }));
    assert!(err.is_resource_error());
    assert_eq!(state.stage(), LifecycleStage::Created);
    assert!(state.float(FloatSlot::InputHost).is_none());
    assert!(state.handle().is_none());
    assert_nothing_live(device.ledger().unwrap());

    // Geometry still editable; a retry on a bigger device would start from scratch
    state.geometry_mut().unwrap().num_steps = 5;
}

#[test]
fn test_device_exhaustion_rolls_back_to_host() {
    // Handle fits, roughly half of the arrays fit
    let capacity = BLAS_WORKSPACE_BYTES + array_bytes() / 2;
    let device = DeviceContext::emulated_with_capacity(0, capacity);
    let mut state = SimulationState::with_geometry(device.clone(), geometry());
    state.initialize().unwrap();

    let pattern: Vec<f32> = (0..24).map(|i| i as f32 * 0.25 - 1.0).collect();
    state.float_mut(FloatSlot::Voltage).unwrap().set_data(&pattern).unwrap();
    state.float_mut(FloatSlot::InputHost).unwrap().set(3, -7.5).unwrap();

    let err = state.move_to_device().unwrap_err();
    assert!(matches!(err, GpuDataError::Allocation { .. }));

    assert_eq!(state.stage(), LifecycleStage::Initialized);
    let report = state.check().unwrap();
    assert_eq!(report.location, Location::Host);

    assert_eq!(state.float(FloatSlot::Voltage).unwrap().host_slice().unwrap(), pattern.as_slice());
    assert_eq!(state.float(FloatSlot::InputHost).unwrap().get(3).unwrap(), -7.5);

    // Only the handle workspace stays charged
    let ledger = device.ledger().unwrap();
    assert_eq!(ledger.live_bytes, BLAS_WORKSPACE_BYTES);
    assert_eq!(ledger.live_handles, 1);

    state.free();
    assert_nothing_live(device.ledger().unwrap());
}

#[test]
fn test_move_fits_steady_state_footprint() {
    // Arrays plus a single handle; the old handle is gone before the new one binds
    let capacity = BLAS_WORKSPACE_BYTES + array_bytes();
    let device = DeviceContext::emulated_with_capacity(0, capacity);
    let mut state = SimulationState::with_geometry(device.clone(), geometry());
    state.initialize().unwrap();

    state.move_to_device().unwrap();
    let report = state.check().unwrap();
    assert_eq!(report.location, Location::Device);
    assert!(report.handle_bound);
    let ledger = device.ledger().unwrap();
    assert_eq!(ledger.live_bytes, capacity);
    assert_eq!(ledger.peak_bytes, capacity);
    assert_eq!(ledger.live_handles, 1);

    state.move_to_host().unwrap();
    assert_eq!(device.ledger().unwrap().live_bytes, BLAS_WORKSPACE_BYTES);
    state.move_to_device().unwrap();
    assert_eq!(device.ledger().unwrap().live_bytes, capacity);
}

#[test]
fn test_handle_rebinding_failure_rolls_back() {
    let device = DeviceContext::emulated(0);
    let mut state = SimulationState::with_geometry(device.clone(), geometry());
    state.initialize().unwrap();
    state.float_mut(FloatSlot::Gain).unwrap().set(5, 2.5).unwrap();

    device.as_emulated().unwrap().fail_next_handles(1);
    let err = state.move_to_device().unwrap_err();
    assert!(matches!(err, GpuDataError::Device(_)));

    assert_eq!(state.stage(), LifecycleStage::Initialized);
    let report = state.check().unwrap();
    assert_eq!(report.location, Location::Host);
    assert!(report.handle_bound);
    assert_eq!(state.float(FloatSlot::Gain).unwrap().get(5).unwrap(), 2.5);

    let ledger = device.ledger().unwrap();
    assert_eq!(ledger.live_bytes, BLAS_WORKSPACE_BYTES);
    assert_eq!(ledger.live_handles, 1);

    state.move_to_device().unwrap();
    assert_eq!(state.check().unwrap().location, Location::Device);
}

#[test]
fn test_host_state_survives_without_handle() {
    let device = DeviceContext::emulated(0);
    let mut state = SimulationState::with_geometry(device.clone(), geometry());
    state.initialize().unwrap();

    // Rebinding and the restore attempt both fail
    device.as_emulated().unwrap().fail_next_handles(2);
    state.move_to_device().unwrap_err();

    assert_eq!(state.stage(), LifecycleStage::Initialized);
    assert!(state.handle().is_none());
    let report = state.check().unwrap();
    assert_eq!(report.location, Location::Host);
    assert!(!report.handle_bound);
    assert_eq!(device.ledger().unwrap().live_bytes, 0);

    state.move_to_device().unwrap();
    assert!(state.check().unwrap().handle_bound);
}

fn assert_only_free_allowed(state: &mut SimulationState) {
    assert_eq!(state.stage(), LifecycleStage::Poisoned);
    assert!(!state.is_initialized());
    assert!(matches!(state.check(), Err(GpuDataError::Validation(_))));
    assert!(matches!(state.initialize(), Err(GpuDataError::InvalidState(_))));
    assert!(matches!(state.move_to_device(), Err(GpuDataError::InvalidState(_))));
    assert!(matches!(state.move_to_host(), Err(GpuDataError::InvalidState(_))));
    assert!(matches!(
        state.assign_probe_map([0].into_iter().collect()),
        Err(GpuDataError::InvalidState(_))
    ));
    assert!(matches!(
        state.assign_spike_map([0].into_iter().collect()),
        Err(GpuDataError::InvalidState(_))
    ));
    assert!(matches!(state.geometry_mut(), Err(GpuDataError::InvalidState(_))));
    assert_eq!(state.stage(), LifecycleStage::Poisoned);
}

#[test]
fn test_failed_rollback_to_host_poisons_state() {
    let device = DeviceContext::emulated(0);
    let mut state = SimulationState::with_geometry(device.clone(), geometry());
    state.initialize().unwrap();

    // Five uploads succeed, the sixth fails, and the first rollback download fails too
    device.as_emulated().unwrap().fail_transfers_after(5);
    let err = state.move_to_device().unwrap_err();
    assert!(matches!(err, GpuDataError::Device(_)));

    let locations: Vec<Location> = FloatSlot::ALL
        .into_iter()
        .map(|slot| state.float(slot).unwrap().location())
        .collect();
    assert!(locations.contains(&Location::Device));
    assert!(locations.contains(&Location::Host));
    assert_only_free_allowed(&mut state);

    state.free();
    assert_eq!(state.stage(), LifecycleStage::Freed);
    assert_nothing_live(device.ledger().unwrap());
}

#[test]
fn test_failed_rollback_to_device_poisons_state() {
    let device = DeviceContext::emulated(0);
    let mut state = SimulationState::with_geometry(device.clone(), geometry());
    state.initialize().unwrap();
    state.move_to_device().unwrap();

    device.as_emulated().unwrap().fail_transfers_after(3);
    let err = state.move_to_host().unwrap_err();
    assert!(matches!(err, GpuDataError::Device(_)));
    assert_only_free_allowed(&mut state);

    // Faults cleared, the state is still only freeable
    device.as_emulated().unwrap().clear_faults();
    assert!(matches!(state.move_to_host(), Err(GpuDataError::InvalidState(_))));

    state.free();
    assert_nothing_live(device.ledger().unwrap());
}

#[test]
fn test_poisoned_state_released_on_drop() {
    let device = DeviceContext::emulated(0);
    {
        let mut state = SimulationState::with_geometry(device.clone(), geometry());
        state.initialize().unwrap();
        device.as_emulated().unwrap().fail_transfers_after(1);
        state.move_to_device().unwrap_err();
        assert_eq!(state.stage(), LifecycleStage::Poisoned);
    }
    assert_nothing_live(device.ledger().unwrap());
}

#[test]
fn test_drop_releases_device_memory() {
    let device = DeviceContext::emulated(0);
    {
        let mut state = SimulationState::with_geometry(device.clone(), geometry());
        state.initialize().unwrap();
        state.move_to_device().unwrap();
        assert!(device.ledger().unwrap().live_bytes > 0);
    }
    assert_nothing_live(device.ledger().unwrap());
}
