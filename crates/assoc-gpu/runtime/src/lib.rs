// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! # assoc-gpu runtime
//!
//! Memory building blocks for the per-device simulator state:
//! - **`TypedArray<T>`** (`IntArray`, `FloatArray`): named buffers that are either
//!   host- or device-resident, with bounds- and location-checked access
//! - **`DeviceContext`**: emulated or CUDA device, allocator and BLAS handle factory
//! - **`IndexList` / `IndexQueue`**: index accumulation ahead of materialisation
//!
//! ## Features
//!
//! - `default` = `[]` (emulated device only)
//! - `cuda` = NVIDIA devices through cudarc (driver + cuBLAS)
//!
//! ## Usage
//!
//! ```rust
//! use assoc_gpu_runtime::{DeviceContext, FloatArray, Location};
//!
//! let device = DeviceContext::emulated(0);
//! let mut gain = FloatArray::new(4, "gain")?;
//! gain.set(0, 1.5)?;
//! gain.move_to_device(&device)?;
//! assert_eq!(gain.location(), Location::Device);
//! gain.move_to_host()?;
//! assert_eq!(gain.get(0)?, 1.5);
//! # Ok::<(), assoc_gpu_runtime::GpuDataError>(())
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod device;
pub mod error;
mod host_memory;
pub mod index_queue;
pub mod typed_array;

pub use device::{
    enumerate_cuda_devices, is_cuda_available, BackendType, BlasHandle, DeviceBuffer,
    DeviceContext, DeviceElement, ElementKind, EmulatedBlas, EmulatedDevice, EmulatedSlice,
    MemoryLedger, BLAS_WORKSPACE_BYTES,
};
pub use error::{GpuDataError, Result};
pub use index_queue::{IndexCursor, IndexList, IndexQueue};
pub use typed_array::{
    check_bounds, check_location, free_array, FloatArray, IntArray, Location, Storage, TypedArray,
};
