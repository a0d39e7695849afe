// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Emulated device
//!
//! Device memory is a heap buffer owned by an [`EmulatedSlice`]. Every allocation is
//! charged against the device ledger and released on drop, so tests can observe
//! leaks and exhaust the device deliberately. Transfer and handle failures can be
//! injected to drive the recovery paths of callers.

use super::DeviceElement;
use crate::error::{GpuDataError, Result};
use crate::host_memory;
use crate::Location;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{trace, warn};

/// Device memory charged for every open BLAS handle, like cuBLAS's workspace
pub const BLAS_WORKSPACE_BYTES: usize = 1024;

/// Snapshot of an emulated device's allocation ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryLedger {
    /// Bytes currently held by live buffers
    pub live_bytes: usize,
    /// Number of live buffers (zero-length buffers included)
    pub live_allocations: usize,
    /// Highest `live_bytes` observed
    pub peak_bytes: usize,
    /// Live BLAS handles
    pub live_handles: usize,
    /// Allocation cap, `None` = unlimited
    pub capacity_bytes: Option<usize>,
}

#[derive(Debug, Default)]
struct FaultPlan {
    /// Transfers still allowed before every further one fails
    transfers_left: Option<usize>,
    /// Handle creations that fail before they succeed again
    failing_handles: usize,
}

/// Heap-backed stand-in for a GPU
pub struct EmulatedDevice {
    ordinal: usize,
    ledger: Mutex<MemoryLedger>,
    faults: Mutex<FaultPlan>,
}

impl EmulatedDevice {
    pub fn new(ordinal: usize, capacity_bytes: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            ordinal,
            ledger: Mutex::new(MemoryLedger {
                capacity_bytes,
                ..MemoryLedger::default()
            }),
            faults: Mutex::new(FaultPlan::default()),
        })
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn ledger(&self) -> MemoryLedger {
        *self.ledger.lock()
    }

    /// Let `successful` more host↔device transfers through, then fail every one
    /// until [`EmulatedDevice::clear_faults`]
    pub fn fail_transfers_after(&self, successful: usize) {
        self.faults.lock().transfers_left = Some(successful);
    }

    /// Fail the next `count` BLAS handle creations
    pub fn fail_next_handles(&self, count: usize) {
        self.faults.lock().failing_handles = count;
    }

    pub fn clear_faults(&self) {
        *self.faults.lock() = FaultPlan::default();
    }

    fn start_transfer(&self, name: &str) -> Result<()> {
        let mut faults = self.faults.lock();
        match faults.transfers_left {
            Some(0) => {
                warn!("Injected transfer failure for '{}' on emulated device {}", name, self.ordinal);
                Err(GpuDataError::Device(format!(
                    "transfer of '{}' failed on emulated device {}",
                    name, self.ordinal
                )))
            }
            Some(ref mut left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Charge `bytes` against the device, failing when the cap would be exceeded
    fn reserve(&self, name: &str, bytes: usize) -> Result<()> {
        let mut ledger = self.ledger.lock();
        if let Some(capacity) = ledger.capacity_bytes {
            let available = capacity.saturating_sub(ledger.live_bytes);
            if bytes > available {
                warn!(
                    "Emulated device {} out of memory: '{}' needs {} bytes, {} available",
                    self.ordinal, name, bytes, available
                );
                return Err(GpuDataError::Allocation {
                    name: name.to_string(),
                    location: Location::Device,
                    requested_bytes: bytes,
                    reason: format!(
                        "device {} has {} of {} bytes free",
                        self.ordinal, available, capacity
                    ),
                });
            }
        }
        ledger.live_bytes += bytes;
        ledger.live_allocations += 1;
        ledger.peak_bytes = ledger.peak_bytes.max(ledger.live_bytes);
        Ok(())
    }

    fn release(&self, bytes: usize) {
        let mut ledger = self.ledger.lock();
        ledger.live_bytes = ledger.live_bytes.saturating_sub(bytes);
        ledger.live_allocations = ledger.live_allocations.saturating_sub(1);
    }

    pub(super) fn alloc_zeros<T: DeviceElement>(
        self: &Arc<Self>,
        name: &str,
        len: usize,
    ) -> Result<EmulatedSlice<T>> {
        let bytes = host_memory::byte_size::<T>(name, Location::Device, len)?;
        self.reserve(name, bytes)?;
        match host_memory::alloc_zeroed(name, len) {
            Ok(data) => Ok(EmulatedSlice::adopt(Arc::clone(self), data, bytes)),
            Err(e) => {
                self.release(bytes);
                Err(e)
            }
        }
    }

    pub(super) fn upload<T: DeviceElement>(
        self: &Arc<Self>,
        name: &str,
        host: &[T],
    ) -> Result<EmulatedSlice<T>> {
        let bytes = host_memory::byte_size::<T>(name, Location::Device, host.len())?;
        self.start_transfer(name)?;
        self.reserve(name, bytes)?;
        match host_memory::copy_from(name, host) {
            Ok(data) => {
                trace!("Uploaded {} bytes for '{}' to emulated device {}", bytes, name, self.ordinal);
                Ok(EmulatedSlice::adopt(Arc::clone(self), data, bytes))
            }
            Err(e) => {
                self.release(bytes);
                Err(e)
            }
        }
    }

    pub(super) fn open_handle(self: &Arc<Self>) -> Result<EmulatedBlas> {
        {
            let mut faults = self.faults.lock();
            if faults.failing_handles > 0 {
                faults.failing_handles -= 1;
                warn!("Injected BLAS handle failure on emulated device {}", self.ordinal);
                return Err(GpuDataError::Device(format!(
                    "BLAS handle creation failed on emulated device {}",
                    self.ordinal
                )));
            }
        }
        self.reserve("blas workspace", BLAS_WORKSPACE_BYTES)?;
        self.ledger.lock().live_handles += 1;
        Ok(EmulatedBlas {
            device: Arc::clone(self),
        })
    }
}

impl fmt::Debug for EmulatedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmulatedDevice")
            .field("ordinal", &self.ordinal)
            .field("ledger", &self.ledger())
            .finish()
    }
}

/// Buffer resident on an emulated device
pub struct EmulatedSlice<T: DeviceElement> {
    data: Vec<T>,
    bytes: usize,
    device: Arc<EmulatedDevice>,
}

impl<T: DeviceElement> EmulatedSlice<T> {
    fn adopt(device: Arc<EmulatedDevice>, data: Vec<T>, bytes: usize) -> Self {
        Self { data, bytes, device }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn ordinal(&self) -> usize {
        self.device.ordinal
    }

    /// Device view for kernel stand-ins
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Mutable device view; the length is fixed
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub(super) fn to_host_vec(&self, name: &str) -> Result<Vec<T>> {
        self.device.start_transfer(name)?;
        host_memory::copy_from(name, &self.data)
    }
}

impl<T: DeviceElement> fmt::Debug for EmulatedSlice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmulatedSlice")
            .field("len", &self.data.len())
            .field("bytes", &self.bytes)
            .field("ordinal", &self.device.ordinal)
            .finish()
    }
}

impl<T: DeviceElement> Drop for EmulatedSlice<T> {
    fn drop(&mut self) {
        self.device.release(self.bytes);
    }
}

/// BLAS handle on an emulated device
pub struct EmulatedBlas {
    device: Arc<EmulatedDevice>,
}

impl fmt::Debug for EmulatedBlas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EmulatedBlas(device {})", self.device.ordinal)
    }
}

impl EmulatedBlas {
    pub fn ordinal(&self) -> usize {
        self.device.ordinal
    }
}

impl Drop for EmulatedBlas {
    fn drop(&mut self) {
        self.device.ledger.lock().live_handles -= 1;
        self.device.release(BLAS_WORKSPACE_BYTES);
    }
}
