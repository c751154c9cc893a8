// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Device cost constants and engine capacity limits.
//!
//! Token costs are per-operation at the 4 KiB reference size and scale
//! linearly with request length above it. The defaults reflect a flash
//! device where one 4 KiB write displaces roughly ten 4 KiB reads; adjust
//! them if they do not match the calibrated device.

/// Token cost of a 4 KiB read.
pub const NVME_READ_COST: u64 = 100;

/// Token cost of a 4 KiB write.
pub const NVME_WRITE_COST: u64 = 1000;

/// Reference request size (bytes) at which IOPS SLOs are stated.
///
/// A tenant whose application issues 8 KiB requests at 100K IOPS should
/// register a 200K IOPS SLO.
pub const SLO_REQ_SIZE: u64 = 4096;

/// Capacity of the global flow-group table. Slot 0 is never handed out.
pub const MAX_NVME_FLOW_GROUPS: usize = 128;

/// Number of hardware IO queue slots. Slot 0 is reserved.
pub const MAX_NUM_IO_QUEUES: usize = 64;

/// Maximum `opened` upcalls that may be pending delivery on one core.
pub const MAX_OPEN_BATCH: usize = 32;

/// Per-core request-context pool capacity.
pub const NUM_NVME_REQUESTS: usize = 4096 * 256;

/// Depth of each per-tenant software queue.
pub const SW_QUEUE_DEPTH: usize = 4096;

/// Fraction of excess LC credit donated to the leftover pool once credit
/// exceeds the positive cap.
pub const TOKEN_FRAC_GIVEAWAY: f64 = 0.9;

/// Upper bound on event-loop cores tracked by the scheduled barrier.
pub const MAX_ENGINE_CORES: usize = 64;

/// Completions drained per poll invocation.
pub const COMPLETION_BUDGET: usize = 4096;

/// Maximum negative credit a latency-critical tenant may accumulate before
/// its queue is blocked. Sized in writes so the burst allowance does not
/// shrink when the device model makes writes expensive.
pub const TOKEN_DEFICIT_LIMIT: i64 = 100 * NVME_WRITE_COST as i64;
