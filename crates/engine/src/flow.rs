// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Flow groups (tenants) and their shared rate cells.
//!
//! A flow group is identified by `(flow_id, owning_core)`: the same logical
//! flow id registered from two cores is two tenants. All of a tenant's
//! queue state lives on its owning core; the only piece shared with the
//! admission controller is the per-microsecond rate cell, which admission
//! rewrites under its lock and the owning core reads lock-free each round.

use flashq_config::slo::FlowSlo;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle of a registered flow group: its slot in the global table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowHandle(pub u32);

impl fmt::Display for FlowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lock-free cell carrying a tenant's token rate in tokens per microsecond.
///
/// Stored as `f64` bits in an `AtomicU64`. Writers hold the admission
/// lock; the owning core reads with relaxed ordering. A stale read is a
/// fraction of one round's increment and corrects itself next round.
#[derive(Debug)]
pub struct RatePerUs(AtomicU64);

impl RatePerUs {
    /// A cell holding the given rate.
    #[must_use]
    pub fn new(rate: f64) -> Self {
        Self(AtomicU64::new(rate.to_bits()))
    }

    /// Replaces the rate.
    pub fn store(&self, rate: f64) {
        self.0.store(rate.to_bits(), Ordering::Relaxed);
    }

    /// Reads the current rate.
    #[must_use]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// A registered tenant in the global flow table.
#[derive(Debug)]
pub struct FlowEntry {
    /// User-chosen flow id; identity is `(flow_id, owning_core)`.
    pub flow_id: u64,

    /// Core whose event loop owns this tenant's queues.
    pub owning_core: usize,

    /// The registered SLO.
    pub slo: FlowSlo,

    /// Token-rate reservation at the 4 KiB reference size (tokens/s).
    pub scaled_iops_limit: u64,

    /// True when the tenant holds a latency reservation.
    pub latency_critical: bool,

    /// Connections registered against this tenant; the tenant is destroyed
    /// when this drops to zero.
    pub conn_refcount: u32,

    /// Rate cell read by the owning core every scheduling round.
    pub rate_per_us: Arc<RatePerUs>,
}
