// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Host ↔ Device Migration Tests
//!
//! Round-trips through the emulated device must be bit-exact and must not leak
//! device memory.

use assoc_gpu_runtime::{DeviceContext, FloatArray, GpuDataError, IntArray, Location};

#[test]
fn test_float_round_trip_is_bit_exact() {
    let device = DeviceContext::emulated(0);
    let original = vec![
        0.0f32,
        -0.0,
        1.0e-38,
        f32::MIN_POSITIVE,
        f32::MAX,
        f32::INFINITY,
        f32::NEG_INFINITY,
        f32::from_bits(0x7fc0_1234), // NaN with payload
        -3.25,
    ];
    let mut array = FloatArray::from_slice(&original, "stored_vectors").unwrap();

    array.move_to_device(&device).unwrap();
    assert_eq!(array.location(), Location::Device);
    array.move_to_host().unwrap();
    assert_eq!(array.location(), Location::Host);

    let before: Vec<u32> = original.iter().map(|v| v.to_bits()).collect();
    let after: Vec<u32> = array.host_slice().unwrap().iter().map(|v| v.to_bits()).collect();
    assert_eq!(before, after);
}

#[test]
fn test_int_round_trip() {
    let device = DeviceContext::emulated(0);
    let original: Vec<i32> = (0..257).map(|i| i * 7919 - 1_000_000).chain([i32::MIN, i32::MAX]).collect();
    let mut array = IntArray::from_slice(&original, "spike_map").unwrap();

    array.move_to_device(&device).unwrap();
    array.move_to_host().unwrap();

    assert_eq!(array.host_slice().unwrap(), original.as_slice());
    assert_eq!(device.ledger().unwrap().live_bytes, 0);
}

#[test]
fn test_device_contents_visible_to_kernels() {
    let device = DeviceContext::emulated(0);
    let mut array = FloatArray::new(4, "decoded_values").unwrap();
    array.move_to_device(&device).unwrap();

    // Kernel stand-in writes through the device view
    let view = array
        .device_buffer_mut()
        .and_then(|b| b.as_emulated_mut())
        .unwrap();
    view.as_mut_slice().copy_from_slice(&[0.5, 1.5, 2.5, 3.5]);

    assert_eq!(array.read_back().unwrap(), vec![0.5, 1.5, 2.5, 3.5]);
    assert_eq!(array.location(), Location::Device);

    array.move_to_host().unwrap();
    assert_eq!(array.get(3).unwrap(), 3.5);
}

#[test]
fn test_get_after_migration_requires_host() {
    let device = DeviceContext::emulated(0);
    let mut array = FloatArray::new(2, "input_device").unwrap();
    array.set(1, 4.0).unwrap();
    array.move_to_device(&device).unwrap();

    match array.get(1) {
        Err(GpuDataError::WrongLocation { name, location, .. }) => {
            assert_eq!(name, "input_device");
            assert_eq!(location, Location::Device);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn test_empty_array_migrates() {
    let device = DeviceContext::emulated(0);
    let mut array = FloatArray::new(0, "probes_device").unwrap();
    array.move_to_device(&device).unwrap();
    assert!(array.is_empty());
    array.move_to_host().unwrap();
    assert!(array.host_slice().unwrap().is_empty());
}
