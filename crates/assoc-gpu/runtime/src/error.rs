// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for array, device and lifecycle operations

use crate::Location;
use thiserror::Error;

/// Errors raised by the simulator state core.
///
/// Two families share this enum:
/// - **Contract violations** (`InvalidState`, `IndexOutOfRange`, `WrongLocation`,
///   `SizeMismatch`, `EmptyQueue`): caller bugs. They are logged at `error!` where
///   raised and callers are expected to propagate them to the top and stop.
/// - **Resource errors** (`Allocation`, `Device`): recoverable, e.g. retry with a
///   smaller geometry.
///
/// `Configuration` and `Validation` report bad geometry and failed `check` runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GpuDataError {
    /// Host or device memory could not be obtained
    #[error("Failed to allocate {requested_bytes} bytes for '{name}' on {location}: {reason}")]
    Allocation {
        name: String,
        location: Location,
        requested_bytes: usize,
        reason: String,
    },

    /// Operation not permitted in the current location or lifecycle stage
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Index {index} out of range while {verb} '{name}' (size {size})")]
    IndexOutOfRange {
        verb: &'static str,
        name: String,
        index: i64,
        size: usize,
    },

    /// Host-side element access on a device-resident array
    #[error("Cannot {verb} '{name}' at index {index}: array is resident on {location}")]
    WrongLocation {
        verb: &'static str,
        name: String,
        index: i64,
        location: Location,
    },

    #[error("Size mismatch for '{name}': expected {expected}, got {actual}")]
    SizeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Cannot pop from an empty index queue")]
    EmptyQueue,

    /// Geometry scalars missing or inconsistent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// First violation found by a consistency check
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Driver-level failure other than allocation (context creation, copy, BLAS init)
    #[error("Device error: {0}")]
    Device(String),
}

impl GpuDataError {
    /// True for errors that indicate a caller bug rather than a transient condition
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            GpuDataError::InvalidState(_)
                | GpuDataError::IndexOutOfRange { .. }
                | GpuDataError::WrongLocation { .. }
                | GpuDataError::SizeMismatch { .. }
                | GpuDataError::EmptyQueue
        )
    }

    /// True for host/device resource exhaustion and driver failures
    pub fn is_resource_error(&self) -> bool {
        matches!(
            self,
            GpuDataError::Allocation { .. } | GpuDataError::Device(_)
        )
    }
}

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, GpuDataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(GpuDataError::EmptyQueue.is_contract_violation());
        assert!(GpuDataError::InvalidState("x".into()).is_contract_violation());
        assert!(!GpuDataError::Validation("x".into()).is_contract_violation());

        let alloc = GpuDataError::Allocation {
            name: "voltage".into(),
            location: Location::Device,
            requested_bytes: 800,
            reason: "pool exhausted".into(),
        };
        assert!(alloc.is_resource_error());
        assert!(!alloc.is_contract_violation());
    }

    #[test]
    fn test_index_error_names_array_and_index() {
        let err = GpuDataError::IndexOutOfRange {
            verb: "getting",
            name: "gain".into(),
            index: -1,
            size: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("gain"));
        assert!(msg.contains("-1"));
    }
}
