// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the raw driver boundary.

/// Errors returned by an [`crate::driver::NvmeDevice`] implementation.
#[derive(thiserror::Error, Debug)]
pub enum DriverError {
    /// The submission queue has no free command slot. The engine sizes its
    /// request pool so this cannot happen in steady state; hitting it
    /// indicates a configuration bug.
    #[error("device has no free command slots")]
    OutOfCommandSlots,

    /// The namespace id is not known to the controller.
    #[error("unknown namespace id {ns_id}")]
    UnknownNamespace {
        /// The rejected namespace id.
        ns_id: u32,
    },

    /// The namespace exists but is not active.
    #[error("namespace id {ns_id} is inactive")]
    InactiveNamespace {
        /// The inactive namespace id.
        ns_id: u32,
    },

    /// The controller has no free IO queue pairs.
    #[error("no free IO queue pairs")]
    QpairsExhausted,

    /// The controller dropped off the bus (surprise removal or a failed
    /// reset). No further commands will complete.
    #[error("device is gone")]
    DeviceGone,
}
