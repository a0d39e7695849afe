// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # Device Abstraction
//!
//! One `DeviceContext` per compute device. It owns the allocator used for device
//! buffers and creates the per-state BLAS handle. Two backends:
//!
//! - **Emulated**: device memory is an ordinary heap buffer behind an allocation
//!   ledger with an optional byte capacity. Used in tests and on machines without
//!   an NVIDIA driver; exhaustion behaves like a real out-of-memory.
//! - **CUDA** (feature `cuda`): cudarc driver API + cuBLAS.
//!
//! Device buffers are never addressable from host code through `TypedArray`; the
//! kernel layer reaches them through [`DeviceBuffer`].

mod emulated;
#[cfg(feature = "cuda")]
mod cuda;

pub use emulated::{EmulatedBlas, BLAS_WORKSPACE_BYTES, EmulatedDevice, EmulatedSlice, MemoryLedger};
#[cfg(feature = "cuda")]
pub use cuda::{enumerate_cuda_devices, is_cuda_available};
#[cfg(not(feature = "cuda"))]
pub use stub::{enumerate_cuda_devices, is_cuda_available};

use crate::error::{GpuDataError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

#[cfg(feature = "cuda")]
use cudarc::driver::{CudaDevice, CudaSlice};

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for i32 {}
}

/// Element kinds a device buffer can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Int,
    Float,
}

/// Element types that can live in a [`crate::TypedArray`] (`i32` and `f32`)
#[cfg(not(feature = "cuda"))]
pub trait DeviceElement:
    sealed::Sealed + Copy + Default + PartialEq + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    const KIND: ElementKind;
}

/// Element types that can live in a [`crate::TypedArray`] (`i32` and `f32`)
#[cfg(feature = "cuda")]
pub trait DeviceElement:
    sealed::Sealed
    + Copy
    + Default
    + PartialEq
    + fmt::Debug
    + fmt::Display
    + Send
    + Sync
    + Unpin
    + 'static
    + cudarc::driver::DeviceRepr
    + cudarc::driver::ValidAsZeroBits
{
    const KIND: ElementKind;
}

impl DeviceElement for f32 {
    const KIND: ElementKind = ElementKind::Float;
}

impl DeviceElement for i32 {
    const KIND: ElementKind = ElementKind::Int;
}

/// Backend type enum for construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Heap-backed device with an allocation ledger
    Emulated,

    /// NVIDIA GPU via CUDA driver + cuBLAS
    #[cfg(feature = "cuda")]
    Cuda,

    /// CUDA when compiled in and a device answers, otherwise emulated
    Auto,
}

impl Default for BackendType {
    fn default() -> Self {
        Self::Auto
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendType::Emulated => write!(f, "Emulated"),
            #[cfg(feature = "cuda")]
            BackendType::Cuda => write!(f, "CUDA"),
            BackendType::Auto => write!(f, "Auto"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = GpuDataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "emulated" | "host" => Ok(BackendType::Emulated),
            #[cfg(feature = "cuda")]
            "cuda" | "gpu" => Ok(BackendType::Cuda),
            "auto" => Ok(BackendType::Auto),
            _ => Err(GpuDataError::Configuration(format!(
                "Unknown device backend '{}'",
                s
            ))),
        }
    }
}

/// Handle to one compute device
///
/// Cheap to clone; clones refer to the same device and allocation ledger.
#[derive(Clone)]
pub enum DeviceContext {
    Emulated(Arc<EmulatedDevice>),
    #[cfg(feature = "cuda")]
    Cuda(Arc<CudaDevice>),
}

impl DeviceContext {
    /// Emulated device without a memory cap
    pub fn emulated(ordinal: usize) -> Self {
        DeviceContext::Emulated(EmulatedDevice::new(ordinal, None))
    }

    /// Emulated device that refuses allocations beyond `capacity_bytes`
    pub fn emulated_with_capacity(ordinal: usize, capacity_bytes: usize) -> Self {
        DeviceContext::Emulated(EmulatedDevice::new(ordinal, Some(capacity_bytes)))
    }

    /// Open CUDA device `ordinal`
    #[cfg(feature = "cuda")]
    pub fn cuda(ordinal: usize) -> Result<Self> {
        cuda::open_device(ordinal).map(DeviceContext::Cuda)
    }

    /// Build a context for the requested backend
    ///
    /// `emulated_capacity` only applies when the emulated backend is chosen.
    pub fn select(
        backend: BackendType,
        ordinal: usize,
        emulated_capacity: Option<usize>,
    ) -> Result<Self> {
        let context = match backend {
            BackendType::Emulated => DeviceContext::Emulated(EmulatedDevice::new(ordinal, emulated_capacity)),
            #[cfg(feature = "cuda")]
            BackendType::Cuda => DeviceContext::cuda(ordinal)?,
            BackendType::Auto => {
                #[cfg(feature = "cuda")]
                {
                    if is_cuda_available() {
                        DeviceContext::cuda(ordinal)?
                    } else {
                        DeviceContext::Emulated(EmulatedDevice::new(ordinal, emulated_capacity))
                    }
                }
                #[cfg(not(feature = "cuda"))]
                {
                    DeviceContext::Emulated(EmulatedDevice::new(ordinal, emulated_capacity))
                }
            }
        };
        info!("Selected {} device {}", context.backend_type(), context.ordinal());
        Ok(context)
    }

    /// Device ordinal this context is bound to
    pub fn ordinal(&self) -> usize {
        match self {
            DeviceContext::Emulated(dev) => dev.ordinal(),
            #[cfg(feature = "cuda")]
            DeviceContext::Cuda(dev) => dev.ordinal(),
        }
    }

    pub fn backend_type(&self) -> BackendType {
        match self {
            DeviceContext::Emulated(_) => BackendType::Emulated,
            #[cfg(feature = "cuda")]
            DeviceContext::Cuda(_) => BackendType::Cuda,
        }
    }

    /// Make this device current for the calling thread
    pub fn bind_to_thread(&self) -> Result<()> {
        match self {
            DeviceContext::Emulated(_) => Ok(()),
            #[cfg(feature = "cuda")]
            DeviceContext::Cuda(dev) => cuda::bind_to_thread(dev),
        }
    }

    /// Zero-initialised device buffer of `len` elements
    pub fn alloc_zeros<T: DeviceElement>(&self, name: &str, len: usize) -> Result<DeviceBuffer<T>> {
        debug!("Allocating {} elements for '{}' on device {}", len, name, self.ordinal());
        match self {
            DeviceContext::Emulated(dev) => dev.alloc_zeros(name, len).map(DeviceBuffer::Emulated),
            #[cfg(feature = "cuda")]
            DeviceContext::Cuda(dev) => cuda::alloc_zeros(dev, name, len).map(DeviceBuffer::Cuda),
        }
    }

    /// Copy `host` into a fresh device buffer; `host` is left untouched
    pub fn upload<T: DeviceElement>(&self, name: &str, host: &[T]) -> Result<DeviceBuffer<T>> {
        match self {
            DeviceContext::Emulated(dev) => dev.upload(name, host).map(DeviceBuffer::Emulated),
            #[cfg(feature = "cuda")]
            DeviceContext::Cuda(dev) => cuda::upload(dev, name, host).map(DeviceBuffer::Cuda),
        }
    }

    /// Create a BLAS handle bound to this device
    pub fn create_blas_handle(&self) -> Result<BlasHandle> {
        self.bind_to_thread()?;
        let handle = match self {
            DeviceContext::Emulated(dev) => BlasHandle::Emulated(dev.open_handle()?),
            #[cfg(feature = "cuda")]
            DeviceContext::Cuda(dev) => BlasHandle::Cuda {
                ordinal: dev.ordinal(),
                blas: cuda::create_blas(dev)?,
            },
        };
        debug!("Created BLAS handle on device {}", handle.ordinal());
        Ok(handle)
    }

    /// Emulated device behind this context, for ledger and fault control
    pub fn as_emulated(&self) -> Option<&Arc<EmulatedDevice>> {
        match self {
            DeviceContext::Emulated(dev) => Some(dev),
            #[cfg(feature = "cuda")]
            DeviceContext::Cuda(_) => None,
        }
    }

    /// Live allocation ledger, emulated devices only
    pub fn ledger(&self) -> Option<MemoryLedger> {
        match self {
            DeviceContext::Emulated(dev) => Some(dev.ledger()),
            #[cfg(feature = "cuda")]
            DeviceContext::Cuda(_) => None,
        }
    }
}

impl fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("backend", &self.backend_type())
            .field("ordinal", &self.ordinal())
            .finish()
    }
}

/// Device-resident storage handed to the kernel layer
pub enum DeviceBuffer<T: DeviceElement> {
    Emulated(EmulatedSlice<T>),
    #[cfg(feature = "cuda")]
    Cuda(CudaSlice<T>),
}

impl<T: DeviceElement> DeviceBuffer<T> {
    pub fn len(&self) -> usize {
        match self {
            DeviceBuffer::Emulated(slice) => slice.len(),
            #[cfg(feature = "cuda")]
            DeviceBuffer::Cuda(slice) => slice.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ordinal of the device that owns this buffer
    pub fn ordinal(&self) -> usize {
        match self {
            DeviceBuffer::Emulated(slice) => slice.ordinal(),
            #[cfg(feature = "cuda")]
            DeviceBuffer::Cuda(slice) => slice.device().ordinal(),
        }
    }

    /// Synchronous device→host copy; the buffer itself is untouched
    pub fn to_host_vec(&self, name: &str) -> Result<Vec<T>> {
        match self {
            DeviceBuffer::Emulated(slice) => slice.to_host_vec(name),
            #[cfg(feature = "cuda")]
            DeviceBuffer::Cuda(slice) => cuda::download(slice, name),
        }
    }

    /// Emulated storage, for host-side kernel stand-ins
    pub fn as_emulated(&self) -> Option<&EmulatedSlice<T>> {
        match self {
            DeviceBuffer::Emulated(slice) => Some(slice),
            #[cfg(feature = "cuda")]
            DeviceBuffer::Cuda(_) => None,
        }
    }

    pub fn as_emulated_mut(&mut self) -> Option<&mut EmulatedSlice<T>> {
        match self {
            DeviceBuffer::Emulated(slice) => Some(slice),
            #[cfg(feature = "cuda")]
            DeviceBuffer::Cuda(_) => None,
        }
    }
}

impl<T: DeviceElement> fmt::Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("len", &self.len())
            .field("ordinal", &self.ordinal())
            .finish()
    }
}

/// Dense linear algebra handle owned by one simulation state
///
/// Dropping the handle destroys it (cuBLAS: `cublasDestroy`).
pub enum BlasHandle {
    Emulated(EmulatedBlas),
    #[cfg(feature = "cuda")]
    Cuda {
        ordinal: usize,
        blas: cudarc::cublas::CudaBlas,
    },
}

impl BlasHandle {
    /// Device ordinal the handle is bound to
    pub fn ordinal(&self) -> usize {
        match self {
            BlasHandle::Emulated(handle) => handle.ordinal(),
            #[cfg(feature = "cuda")]
            BlasHandle::Cuda { ordinal, .. } => *ordinal,
        }
    }

    /// cuBLAS handle for kernel launches
    #[cfg(feature = "cuda")]
    pub fn cublas(&self) -> Option<&cudarc::cublas::CudaBlas> {
        match self {
            BlasHandle::Cuda { blas, .. } => Some(blas),
            BlasHandle::Emulated(_) => None,
        }
    }
}

impl fmt::Debug for BlasHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlasHandle::Emulated(_) => write!(f, "BlasHandle::Emulated(device {})", self.ordinal()),
            #[cfg(feature = "cuda")]
            BlasHandle::Cuda { ordinal, .. } => write!(f, "BlasHandle::Cuda(device {})", ordinal),
        }
    }
}

#[cfg(not(feature = "cuda"))]
mod stub {
    /// Check if CUDA is available on this system
    pub fn is_cuda_available() -> bool {
        false
    }

    /// Enumerate CUDA devices as `(ordinal, name, total_memory_bytes)`
    pub fn enumerate_cuda_devices() -> Vec<(usize, String, u64)> {
        Vec::new()
    }
}
