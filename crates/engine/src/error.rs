// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the scheduler engine.

use crate::event::Status;
use crate::flow::FlowHandle;
use flashq_nvme::error::DriverError;
use flashq_nvme::mem::VirtAddr;

/// All errors surfaced synchronously by the engine entry points.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Admitting the tenant would push the LC reservation sum past what the
    /// device sustains under the new strictest latency SLO.
    #[error("cannot meet SLO: reservations need {required} tokens/s, device admits {available}")]
    CantMeetSlo {
        /// Reservation sum the admission would require.
        required: u64,
        /// Aggregate rate the device model admits.
        available: u64,
    },

    /// The global flow-group table has no free slot.
    #[error("flow-group table is full")]
    FlowTableFull,

    /// All hardware IO queue slots are allocated.
    #[error("no free IO queues")]
    IoQueuesExhausted,

    /// Too many `opened` upcalls are already waiting for delivery.
    #[error("open-event batch is full")]
    OpenBatchFull,

    /// The per-core request-context pool is exhausted.
    #[error("request-context pool is exhausted")]
    RequestPoolExhausted,

    /// The tenant's software queue is full.
    #[error("software queue for flow {handle} is full")]
    QueueFull {
        /// The tenant whose queue rejected the request.
        handle: FlowHandle,
    },

    /// No physical mapping exists for the user buffer.
    #[error("no physical mapping for address {vaddr}")]
    TranslationFault {
        /// The unmapped virtual address.
        vaddr: VirtAddr,
    },

    /// The flow handle does not name a registered tenant on this core.
    #[error("unknown flow handle {handle}")]
    UnknownFlow {
        /// The rejected handle.
        handle: FlowHandle,
    },

    /// The namespace id is unsupported or inactive.
    #[error("unsupported namespace id {ns_id}")]
    InvalidNamespace {
        /// The rejected namespace id.
        ns_id: u32,
    },

    /// The SLO parameters failed validation.
    #[error("invalid SLO: {0}")]
    InvalidSlo(#[from] flashq_config::error::Error),

    /// The raw driver rejected an operation.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
}

impl Error {
    /// The wire status code this error maps to.
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Error::CantMeetSlo { .. } => Status::CantMeetSlo,
            Error::FlowTableFull
            | Error::RequestPoolExhausted
            | Error::QueueFull { .. } => Status::NoMem,
            Error::IoQueuesExhausted | Error::OpenBatchFull => Status::NoBufs,
            Error::TranslationFault { .. } | Error::Driver(_) => Status::Fault,
            Error::UnknownFlow { .. }
            | Error::InvalidNamespace { .. }
            | Error::InvalidSlo(_) => Status::Inval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_wire_statuses() {
        assert_eq!(
            Error::CantMeetSlo {
                required: 2,
                available: 1
            }
            .status(),
            Status::CantMeetSlo
        );
        assert_eq!(Error::FlowTableFull.status(), Status::NoMem);
        assert_eq!(Error::IoQueuesExhausted.status(), Status::NoBufs);
        assert_eq!(
            Error::TranslationFault {
                vaddr: VirtAddr(0xdead)
            }
            .status(),
            Status::Fault
        );
        assert_eq!(
            Error::UnknownFlow {
                handle: FlowHandle(7)
            }
            .status(),
            Status::Inval
        );
    }
}
