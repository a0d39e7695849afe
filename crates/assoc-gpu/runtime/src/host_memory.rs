// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Fallible host allocation
//!
//! `Vec::with_capacity` aborts the process on exhaustion; every host buffer in this
//! crate goes through `try_reserve_exact` instead so callers get `Allocation` back.

use crate::device::DeviceElement;
use crate::error::{GpuDataError, Result};
use crate::Location;
use std::mem::size_of;

/// Bytes needed for `len` elements of `T`, or an allocation error on overflow
pub(crate) fn byte_size<T: DeviceElement>(name: &str, location: Location, len: usize) -> Result<usize> {
    len.checked_mul(size_of::<T>())
        .ok_or_else(|| GpuDataError::Allocation {
            name: name.to_string(),
            location,
            requested_bytes: usize::MAX,
            reason: format!("{} elements overflow the address space", len),
        })
}

/// Zero-initialised host buffer of `len` elements
pub(crate) fn alloc_zeroed<T: DeviceElement>(name: &str, len: usize) -> Result<Vec<T>> {
    let mut data = try_with_capacity::<T>(name, len)?;
    data.resize(len, T::default());
    Ok(data)
}

/// Host copy of `src`
pub(crate) fn copy_from<T: DeviceElement>(name: &str, src: &[T]) -> Result<Vec<T>> {
    let mut data = try_with_capacity::<T>(name, src.len())?;
    data.extend_from_slice(src);
    Ok(data)
}

fn try_with_capacity<T: DeviceElement>(name: &str, len: usize) -> Result<Vec<T>> {
    let requested_bytes = byte_size::<T>(name, Location::Host, len)?;
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|e| GpuDataError::Allocation {
            name: name.to_string(),
            location: Location::Host,
            requested_bytes,
            reason: e.to_string(),
        })?;
    Ok(data)
}
