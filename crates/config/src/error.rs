// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the config crate.

/// Errors raised while validating FlashQ configuration.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The calibrated device model was selected but no calibration points
    /// were provided.
    #[error("device model requires at least one calibration point")]
    EmptyCalibrationTable,

    /// The calibration table must be strictly increasing in p95 latency so
    /// that interpolation is well defined.
    #[error("calibration table is not strictly increasing in p95 latency at index {index}")]
    UnsortedCalibrationTable {
        /// Index of the first point that is not strictly above its
        /// predecessor.
        index: usize,
    },

    /// The read/write ratio of an SLO is expressed in percent and must not
    /// exceed 100.
    #[error("read/write ratio must be within 0..=100, got {value}")]
    InvalidRwRatio {
        /// The rejected ratio.
        value: u8,
    },

    /// A latency-critical SLO must reserve a nonzero IOPS rate.
    #[error("latency-critical SLO declares {latency_us}us latency but zero IOPS")]
    ZeroIopsReservation {
        /// The latency target that was paired with an empty reservation.
        latency_us: u32,
    },
}
