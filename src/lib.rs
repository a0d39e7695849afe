// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # assoc-gpu
//!
//! State core of a GPU-resident, time-stepped spiking associative memory. Each
//! item of the memory is one ensemble of leaky integrate-and-fire neurons; this
//! crate owns the buffers those ensembles are simulated in and moves them
//! between host and device. The kernels themselves live elsewhere.
//!
//! ## Feature Flags
//!
//! - **`cuda`**: NVIDIA devices through cudarc (driver + cuBLAS)
//! - **`file-logging`**: per-run JSON log folders
//!
//! Without `cuda` only the emulated device is available; it behaves like a GPU
//! with separate memory and an allocation ledger.
//!
//! ## Usage
//!
//! ```rust
//! use assoc_gpu::prelude::*;
//!
//! let geometry = EnsembleGeometry {
//!     neurons_per_item: 50,
//!     num_items: 4,
//!     dimension: 16,
//!     num_probes: 2,
//!     num_spikes: 2,
//!     num_steps: 100,
//!     dt: 0.001,
//!     ..Default::default()
//! };
//!
//! let mut state = SimulationState::with_geometry(DeviceContext::emulated(0), geometry);
//! state.initialize()?;
//! state.assign_probe_map([0, 3].into_iter().collect())?;
//! state.move_to_device()?;
//!
//! let report = state.check()?;
//! assert_eq!(report.location, Location::Device);
//! assert!(report.handle_bound);
//!
//! let probes = state.probe_record()?;
//! assert_eq!(probes.dim(), (100, 2));
//! state.free();
//! # Ok::<(), GpuDataError>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: assoc-gpu-config, assoc-gpu-observability  │
//! │  (TOML + overrides, tracing setup)                      │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Memory: assoc-gpu-runtime                              │
//! │  (TypedArray, DeviceContext, IndexQueue)                │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  State: assoc-gpu-state                                 │
//! │  (SimulationState lifecycle, diagnostics, records)      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## License
//!
//! Apache-2.0

pub mod bootstrap;

pub use assoc_gpu_config as config;
pub use assoc_gpu_observability as observability;
pub use assoc_gpu_runtime as runtime;
pub use assoc_gpu_state as state;

pub use bootstrap::{
    device_from_config, geometry_from_config, logging_from_config, state_from_config,
    BootstrapError,
};

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::runtime::{
        BackendType, DeviceContext, FloatArray, GpuDataError, IndexList, IndexQueue, IntArray,
        Location, TypedArray,
    };
    pub use crate::state::{
        ArraySizes, CheckReport, EnsembleGeometry, FloatSlot, IntSlot, LifecycleStage,
        SimulationState,
    };
}
