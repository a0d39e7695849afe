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

//! # assoc-gpu state
//!
//! The per-device state of the spiking associative memory: every array the
//! simulation kernels use, the scalars they were sized from, and the BLAS handle.
//!
//! ## Architecture
//!
//! ```text
//! EnsembleGeometry ──derive──▶ ArraySizes
//!        │                         │
//!        ▼                         ▼
//! SimulationState ── 18 × FloatArray, 2 × IntArray, BlasHandle
//!        │
//!        ├── initialize / check / move_to_device / move_to_host / free
//!        ├── print / print_dynamic / print_vecs
//!        └── assign_probe_map / probe_record / spike_record
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use assoc_gpu_runtime::{DeviceContext, Location};
//! use assoc_gpu_state::{EnsembleGeometry, SimulationState};
//!
//! let geometry = EnsembleGeometry {
//!     neurons_per_item: 50,
//!     num_items: 4,
//!     dimension: 16,
//!     num_steps: 100,
//!     dt: 0.001,
//!     ..Default::default()
//! };
//! let mut state = SimulationState::with_geometry(DeviceContext::emulated(0), geometry);
//! state.initialize()?;
//! state.move_to_device()?;
//! assert_eq!(state.check()?.location, Location::Device);
//! state.free();
//! # Ok::<(), assoc_gpu_runtime::GpuDataError>(())
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod diagnostics;
pub mod geometry;
pub mod recording;
pub mod state;

pub use diagnostics::{print_float_array, print_int_array};
pub use geometry::{ArraySizes, ArraySlot, EnsembleGeometry, FloatSlot, IntSlot};
pub use state::{free_state, CheckReport, LifecycleStage, SimulationState};
