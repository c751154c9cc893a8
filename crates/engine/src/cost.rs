// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Request cost computation.
//!
//! A token is an abstract unit of device work. Cost scales linearly with
//! request size above the 4 KiB reference; writes are weighted against
//! reads by the device constants in `flashq-config`.

use flashq_config::limits::{NVME_READ_COST, NVME_WRITE_COST, SLO_REQ_SIZE};

/// NVMe operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// A read command.
    Read,
    /// A write command.
    Write,
}

/// Token cost of one request.
///
/// `cost = base[op] * max(1, ceil(bytes / 4096))`. A zero-length request is
/// a caller bug; it is logged and costs nothing.
#[must_use]
pub fn request_cost(op: Op, bytes: u64) -> u64 {
    if bytes == 0 {
        log::error!("request size of zero bytes");
        return 0;
    }
    let scale = bytes.div_ceil(SLO_REQ_SIZE).max(1);
    match op {
        Op::Read => NVME_READ_COST * scale,
        Op::Write => NVME_WRITE_COST * scale,
    }
}

/// Converts an IOPS SLO into a token-rate reservation (tokens/s).
///
/// The SLO is taken to be stated at the 4 KiB reference request size: an
/// application doing 100K IOPS of 8 KiB requests should register 200K.
#[must_use]
pub fn scaled_iops(iops: u64, rw_ratio_pct: u8) -> u64 {
    let rw_ratio = f64::from(rw_ratio_pct) / 100.0;
    let read_part = iops as f64 * rw_ratio * request_cost(Op::Read, SLO_REQ_SIZE) as f64;
    let write_part = iops as f64 * (1.0 - rw_ratio) * request_cost(Op::Write, SLO_REQ_SIZE) as f64;
    (read_part + write_part + 0.5) as u64
}
