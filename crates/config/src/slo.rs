// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Per-tenant service-level objectives.

use crate::error::Error;
use serde::{Deserialize, Serialize};

/// The SLO a tenant registers with the scheduler.
///
/// A zero latency target marks the tenant best-effort: it holds no
/// reservation and shares whatever capacity latency-critical tenants leave
/// unused. A nonzero latency target makes the tenant latency-critical and
/// reserves `scaled_iops(iops, rw_ratio_pct)` tokens per second, subject to
/// admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSlo {
    /// p95 latency target in microseconds; 0 means best-effort.
    pub latency_us: u32,

    /// IOPS target, stated at the 4 KiB reference request size.
    pub iops: u64,

    /// Percentage of the workload that is reads, 0..=100.
    pub rw_ratio_pct: u8,
}

impl FlowSlo {
    /// An SLO with no reservation at all.
    #[must_use]
    pub fn best_effort() -> Self {
        Self {
            latency_us: 0,
            iops: 0,
            rw_ratio_pct: 100,
        }
    }

    /// True when this SLO makes the tenant latency-critical.
    #[must_use]
    pub fn is_latency_critical(&self) -> bool {
        self.latency_us > 0
    }

    /// Validates the SLO parameters.
    pub fn validate(&self) -> Result<(), Error> {
        if self.rw_ratio_pct > 100 {
            return Err(Error::InvalidRwRatio {
                value: self.rw_ratio_pct,
            });
        }
        if self.is_latency_critical() && self.iops == 0 {
            return Err(Error::ZeroIopsReservation {
                latency_us: self.latency_us,
            });
        }
        Ok(())
    }
}
