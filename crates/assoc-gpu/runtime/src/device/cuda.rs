// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! CUDA device backend
//!
//! Thin wrappers over the cudarc driver API: device open, zeroed allocation,
//! synchronous host↔device copies and cuBLAS handle creation. All calls block
//! until the transfer has completed.
//!
//! # Minimum Requirements
//! - NVIDIA GPU with a CUDA 11.8+ driver

use super::DeviceElement;
use crate::error::{GpuDataError, Result};
use crate::Location;
use cudarc::cublas::CudaBlas;
use cudarc::driver::{CudaDevice, CudaSlice, DriverError};
use std::mem::size_of;
use std::sync::Arc;
use tracing::{debug, info};

pub(super) fn open_device(ordinal: usize) -> Result<Arc<CudaDevice>> {
    info!("🔧 Opening CUDA device {}...", ordinal);
    let device = CudaDevice::new(ordinal)
        .map_err(|e| GpuDataError::Device(format!("Failed to create CUDA device {}: {}", ordinal, e)))?;
    info!("✅ CUDA device {} ready", ordinal);
    Ok(device)
}

pub(super) fn bind_to_thread(device: &Arc<CudaDevice>) -> Result<()> {
    device
        .bind_to_thread()
        .map_err(|e| GpuDataError::Device(format!("Failed to bind CUDA device {}: {}", device.ordinal(), e)))
}

fn allocation_error<T>(name: &str, len: usize, e: DriverError) -> GpuDataError {
    GpuDataError::Allocation {
        name: name.to_string(),
        location: Location::Device,
        requested_bytes: len.saturating_mul(size_of::<T>()),
        reason: e.to_string(),
    }
}

pub(super) fn alloc_zeros<T: DeviceElement>(
    device: &Arc<CudaDevice>,
    name: &str,
    len: usize,
) -> Result<CudaSlice<T>> {
    device
        .alloc_zeros::<T>(len)
        .map_err(|e| allocation_error::<T>(name, len, e))
}

pub(super) fn upload<T: DeviceElement>(
    device: &Arc<CudaDevice>,
    name: &str,
    host: &[T],
) -> Result<CudaSlice<T>> {
    debug!("📤 Uploading {} elements of '{}' to GPU {}", host.len(), name, device.ordinal());
    device
        .htod_sync_copy(host)
        .map_err(|e| allocation_error::<T>(name, host.len(), e))
}

pub(super) fn download<T: DeviceElement>(slice: &CudaSlice<T>, name: &str) -> Result<Vec<T>> {
    let device = slice.device();
    debug!("📥 Downloading {} elements of '{}' from GPU {}", slice.len(), name, device.ordinal());
    device
        .dtoh_sync_copy(slice)
        .map_err(|e| GpuDataError::Device(format!("Failed to download '{}': {}", name, e)))
}

pub(super) fn create_blas(device: &Arc<CudaDevice>) -> Result<CudaBlas> {
    CudaBlas::new(Arc::clone(device))
        .map_err(|e| GpuDataError::Device(format!("Failed to create cuBLAS handle on GPU {}: {:?}", device.ordinal(), e)))
}

/// Check if CUDA is available on this system
pub fn is_cuda_available() -> bool {
    CudaDevice::new(0).is_ok()
}

/// Enumerate CUDA devices as `(ordinal, name, total_memory_bytes)`
pub fn enumerate_cuda_devices() -> Vec<(usize, String, u64)> {
    let mut devices = Vec::new();

    for ordinal in 0..16 {
        match CudaDevice::new(ordinal) {
            Ok(device) => {
                let name = device
                    .name()
                    .unwrap_or_else(|_| format!("NVIDIA GPU {}", ordinal));
                // Driver does not expose total memory through cudarc's safe API
                devices.push((ordinal, name, 0));
            }
            Err(_) => break,
        }
    }

    devices
}
