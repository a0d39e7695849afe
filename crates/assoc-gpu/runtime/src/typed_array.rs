// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! Named, sized arrays that live either on the host or on a device
//!
//! The storage variant is the location: a `TypedArray` holds either a host `Vec`
//! or a [`DeviceBuffer`], never both. Element access is only possible while the
//! array is host-resident.

use crate::device::{DeviceBuffer, DeviceContext, DeviceElement};
use crate::error::{GpuDataError, Result};
use crate::host_memory;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::mem::size_of;
use tracing::{debug, error};

/// Address space an array's buffer is valid in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    Host,
    Device,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Host => write!(f, "host"),
            Location::Device => write!(f, "device"),
        }
    }
}

/// Backing storage of a [`TypedArray`]
pub enum Storage<T: DeviceElement> {
    Host(Vec<T>),
    Device(DeviceBuffer<T>),
}

/// Integer array (probe and spike maps)
pub type IntArray = TypedArray<i32>;

/// Floating-point array (everything else)
pub type FloatArray = TypedArray<f32>;

/// Named buffer of `i32` or `f32` elements
pub struct TypedArray<T: DeviceElement> {
    storage: Storage<T>,
    name: String,
}

impl<T: DeviceElement> TypedArray<T> {
    /// Zero-initialised host array of `size` elements
    pub fn new(size: usize, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let data = host_memory::alloc_zeroed(&name, size)?;
        Ok(Self {
            storage: Storage::Host(data),
            name,
        })
    }

    /// Zero-initialised array allocated directly on `device`
    pub fn new_on_device(size: usize, name: impl Into<String>, device: &DeviceContext) -> Result<Self> {
        let name = name.into();
        let buffer = device.alloc_zeros(&name, size)?;
        Ok(Self {
            storage: Storage::Device(buffer),
            name,
        })
    }

    /// Host array holding a copy of `data`
    pub fn from_slice(data: &[T], name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let data = host_memory::copy_from(&name, data)?;
        Ok(Self {
            storage: Storage::Host(data),
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element count
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Host(data) => data.len(),
            Storage::Device(buffer) => buffer.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size_in_bytes(&self) -> usize {
        self.len() * size_of::<T>()
    }

    pub fn location(&self) -> Location {
        match &self.storage {
            Storage::Host(_) => Location::Host,
            Storage::Device(_) => Location::Device,
        }
    }

    pub fn storage(&self) -> &Storage<T> {
        &self.storage
    }

    /// Upload to `device` and drop the host buffer
    ///
    /// On failure the array is left host-resident and unchanged.
    pub fn move_to_device(&mut self, device: &DeviceContext) -> Result<()> {
        let buffer = match &self.storage {
            Storage::Device(_) => {
                error!("'{}' is already resident on the device", self.name);
                return Err(GpuDataError::InvalidState(format!(
                    "cannot move '{}' to device: already device-resident",
                    self.name
                )));
            }
            Storage::Host(data) => device.upload(&self.name, data)?,
        };
        debug!("Moved '{}' ({} elements) to device {}", self.name, buffer.len(), device.ordinal());
        self.storage = Storage::Device(buffer);
        Ok(())
    }

    /// Download to a host buffer and release the device buffer
    ///
    /// On failure the array is left device-resident and unchanged.
    pub fn move_to_host(&mut self) -> Result<()> {
        let data = match &self.storage {
            Storage::Host(_) => {
                error!("'{}' is already resident on the host", self.name);
                return Err(GpuDataError::InvalidState(format!(
                    "cannot move '{}' to host: already host-resident",
                    self.name
                )));
            }
            Storage::Device(buffer) => buffer.to_host_vec(&self.name)?,
        };
        debug!("Moved '{}' ({} elements) to host", self.name, data.len());
        self.storage = Storage::Host(data);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Result<T> {
        let data = self.checked_host("getting", index)?;
        Ok(data[index])
    }

    pub fn set(&mut self, index: usize, value: T) -> Result<()> {
        let size = self.len();
        let location = self.location();
        check_bounds("setting", &self.name, size, index as i64)?;
        match &mut self.storage {
            Storage::Host(data) => {
                data[index] = value;
                Ok(())
            }
            Storage::Device(_) => Err(location_error("setting", &self.name, location, index as i64)),
        }
    }

    /// `get` for callers holding signed indices; negative indices are out of range
    pub fn get_signed(&self, index: i64) -> Result<T> {
        check_bounds("getting", &self.name, self.len(), index)?;
        self.get(index as usize)
    }

    pub fn set_signed(&mut self, index: i64, value: T) -> Result<()> {
        check_bounds("setting", &self.name, self.len(), index)?;
        self.set(index as usize, value)
    }

    /// Overwrite the whole buffer; `data.len()` must equal the array size
    pub fn set_data(&mut self, data: &[T]) -> Result<()> {
        if data.len() != self.len() {
            error!(
                "Size mismatch writing '{}': array holds {}, data holds {}",
                self.name,
                self.len(),
                data.len()
            );
            return Err(GpuDataError::SizeMismatch {
                name: self.name.clone(),
                expected: self.len(),
                actual: data.len(),
            });
        }
        let location = self.location();
        match &mut self.storage {
            Storage::Host(buffer) => {
                buffer.copy_from_slice(data);
                Ok(())
            }
            Storage::Device(_) => Err(location_error("writing", &self.name, location, 0)),
        }
    }

    /// Host contents, `None` while device-resident
    pub fn host_slice(&self) -> Option<&[T]> {
        match &self.storage {
            Storage::Host(data) => Some(data),
            Storage::Device(_) => None,
        }
    }

    pub fn host_slice_mut(&mut self) -> Option<&mut [T]> {
        match &mut self.storage {
            Storage::Host(data) => Some(data),
            Storage::Device(_) => None,
        }
    }

    /// Device buffer for kernel access, `None` while host-resident
    pub fn device_buffer(&self) -> Option<&DeviceBuffer<T>> {
        match &self.storage {
            Storage::Device(buffer) => Some(buffer),
            Storage::Host(_) => None,
        }
    }

    pub fn device_buffer_mut(&mut self) -> Option<&mut DeviceBuffer<T>> {
        match &mut self.storage {
            Storage::Device(buffer) => Some(buffer),
            Storage::Host(_) => None,
        }
    }

    /// Host copy of the contents wherever they live; does not migrate
    pub fn read_back(&self) -> Result<Vec<T>> {
        match &self.storage {
            Storage::Host(data) => host_memory::copy_from(&self.name, data),
            Storage::Device(buffer) => buffer.to_host_vec(&self.name),
        }
    }

    /// Release the buffer with the allocator matching its location
    pub fn free(self) {
        debug!("Freeing '{}' ({} elements, {})", self.name, self.len(), self.location());
        drop(self);
    }

    fn checked_host(&self, verb: &'static str, index: usize) -> Result<&[T]> {
        check_location(verb, &self.name, self.location(), self.len(), index as i64)?;
        match &self.storage {
            Storage::Host(data) => Ok(data),
            Storage::Device(_) => Err(location_error(verb, &self.name, Location::Device, index as i64)),
        }
    }
}

impl<T: DeviceElement> fmt::Debug for TypedArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedArray")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("location", &self.location())
            .finish()
    }
}

/// Free an optional array; `None` is a no-op
pub fn free_array<T: DeviceElement>(array: Option<TypedArray<T>>) {
    if let Some(array) = array {
        array.free();
    }
}

/// Fail with `IndexOutOfRange` unless `0 <= index < size`
pub fn check_bounds(verb: &'static str, name: &str, size: usize, index: i64) -> Result<()> {
    if index < 0 || index as u64 >= size as u64 {
        error!("Index {} out of range while {} '{}' (size {})", index, verb, name, size);
        return Err(GpuDataError::IndexOutOfRange {
            verb,
            name: name.to_string(),
            index,
            size,
        });
    }
    Ok(())
}

/// Bounds check, then fail with `WrongLocation` unless host-resident
pub fn check_location(
    verb: &'static str,
    name: &str,
    location: Location,
    size: usize,
    index: i64,
) -> Result<()> {
    check_bounds(verb, name, size, index)?;
    if location != Location::Host {
        return Err(location_error(verb, name, location, index));
    }
    Ok(())
}

fn location_error(verb: &'static str, name: &str, location: Location, index: i64) -> GpuDataError {
    error!("Cannot access '{}' while {}: array is on the {}", name, verb, location);
    GpuDataError::WrongLocation {
        verb,
        name: name.to_string(),
        index,
        location,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed_host() {
        let a = FloatArray::new(4, "gain").unwrap();
        assert_eq!(a.len(), 4);
        assert_eq!(a.location(), Location::Host);
        assert_eq!(a.host_slice().unwrap(), &[0.0; 4]);
        assert_eq!(a.name(), "gain");
    }

    #[test]
    fn test_zero_size_is_legal() {
        let a = IntArray::new(0, "probe_map").unwrap();
        assert!(a.is_empty());
        assert!(matches!(a.get(0), Err(GpuDataError::IndexOutOfRange { .. })));
    }

    #[test]
    fn test_set_get() {
        let mut a = IntArray::new(3, "spike_map").unwrap();
        a.set(2, 42).unwrap();
        assert_eq!(a.get(2).unwrap(), 42);
        assert_eq!(a.get(0).unwrap(), 0);
    }

    #[test]
    fn test_out_of_range_names_array_and_index() {
        let mut a = FloatArray::new(3, "bias").unwrap();
        match a.set(3, 1.0) {
            Err(GpuDataError::IndexOutOfRange { name, index, size, .. }) => {
                assert_eq!(name, "bias");
                assert_eq!(index, 3);
                assert_eq!(size, 3);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(a.get_signed(-1), Err(GpuDataError::IndexOutOfRange { index: -1, .. })));
        assert!(matches!(a.set_signed(-5, 0.0), Err(GpuDataError::IndexOutOfRange { .. })));
    }

    #[test]
    fn test_device_resident_access_is_rejected() {
        let device = DeviceContext::emulated(0);
        let mut a = FloatArray::new(3, "voltage").unwrap();
        a.move_to_device(&device).unwrap();

        assert!(matches!(a.get(0), Err(GpuDataError::WrongLocation { .. })));
        assert!(matches!(a.set(1, 2.0), Err(GpuDataError::WrongLocation { .. })));
        assert!(matches!(a.set_data(&[1.0, 2.0, 3.0]), Err(GpuDataError::WrongLocation { .. })));
        // Bounds are checked before location
        assert!(matches!(a.get(9), Err(GpuDataError::IndexOutOfRange { .. })));
        assert!(a.host_slice().is_none());
        assert!(a.device_buffer().is_some());
    }

    #[test]
    fn test_set_data_size_mismatch() {
        let mut a = FloatArray::new(2, "decoders").unwrap();
        let err = a.set_data(&[1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(
            err,
            GpuDataError::SizeMismatch {
                name: "decoders".into(),
                expected: 2,
                actual: 3
            }
        );
        a.set_data(&[5.0, 6.0]).unwrap();
        assert_eq!(a.host_slice().unwrap(), &[5.0, 6.0]);
    }

    #[test]
    fn test_double_migration_is_invalid_state() {
        let device = DeviceContext::emulated(0);
        let mut a = IntArray::from_slice(&[1, 2], "probe_map").unwrap();
        assert!(matches!(a.move_to_host(), Err(GpuDataError::InvalidState(_))));
        a.move_to_device(&device).unwrap();
        assert!(matches!(a.move_to_device(&device), Err(GpuDataError::InvalidState(_))));
        a.move_to_host().unwrap();
        assert_eq!(a.host_slice().unwrap(), &[1, 2]);
    }

    #[test]
    fn test_new_on_device() {
        let device = DeviceContext::emulated(0);
        let a = FloatArray::new_on_device(8, "probes_device", &device).unwrap();
        assert_eq!(a.location(), Location::Device);
        assert_eq!(a.len(), 8);
        assert_eq!(a.read_back().unwrap(), vec![0.0; 8]);
    }

    #[test]
    fn test_failed_upload_leaves_array_on_host() {
        let device = DeviceContext::emulated_with_capacity(0, 8);
        let mut a = FloatArray::from_slice(&[1.0, 2.0, 3.0], "encode_result").unwrap();
        let err = a.move_to_device(&device).unwrap_err();
        assert!(err.is_resource_error());
        assert_eq!(a.location(), Location::Host);
        assert_eq!(a.host_slice().unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_free_releases_device_memory() {
        let device = DeviceContext::emulated(0);
        let a = FloatArray::new_on_device(16, "reftime", &device).unwrap();
        assert_eq!(device.ledger().unwrap().live_bytes, 64);
        a.free();
        assert_eq!(device.ledger().unwrap().live_bytes, 0);
        free_array::<f32>(None);
    }
}
