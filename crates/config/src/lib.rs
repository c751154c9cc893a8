// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Configuration types for the FlashQ scheduler.
//!
//! This crate holds everything an embedder tunes before the engine starts:
//! the flash device model (how a tail-latency target maps onto an admissible
//! token rate), the per-tenant SLO parameters, and the compile-time cost and
//! capacity limits shared by every core.
//!
//! All types are serde-deserializable so they can be loaded from whatever
//! configuration transport the host system uses; validation is explicit and
//! returns typed errors rather than panicking at first use.

pub mod device;
pub mod error;
pub mod limits;
pub mod slo;
