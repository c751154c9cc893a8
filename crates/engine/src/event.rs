// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Status codes and the user-space upcall surface.

use crate::flow::FlowHandle;
use crate::ioq::IoQueueHandle;
use flashq_nvme::mem::VirtAddr;
use std::fmt;

/// Status delivered with completions and registration upcalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The operation succeeded.
    Ok,
    /// An argument was invalid.
    Inval,
    /// A bounded buffer (IO queue slots, open batch) is exhausted.
    NoBufs,
    /// A memory pool or queue is exhausted.
    NoMem,
    /// The buffer could not be translated or the device reported an error.
    Fault,
    /// Admitting the tenant would violate an existing latency SLO.
    CantMeetSlo,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::Ok => "ok",
            Status::Inval => "invalid argument",
            Status::NoBufs => "no buffer space",
            Status::NoMem => "out of memory",
            Status::Fault => "fault",
            Status::CantMeetSlo => "cannot meet SLO",
        };
        write!(f, "{label}")
    }
}

/// Upcalls delivered to user space.
///
/// All upcalls fire on the core that accepted the corresponding downcall;
/// the engine never moves a completion across cores. Implementations are
/// expected to be cheap; they run inside the event loop.
pub trait EngineEvents {
    /// A namespace was opened; reports its geometry.
    fn opened(&mut self, handle: IoQueueHandle, ns_size: u64, sector_size: u32);

    /// A namespace handle was closed.
    fn closed(&mut self, handle: IoQueueHandle, status: Status);

    /// A flow registration completed.
    fn registered_flow(&mut self, handle: FlowHandle, cookie: u64, status: Status);

    /// A flow unregistration completed.
    fn unregistered_flow(&mut self, handle: FlowHandle, status: Status);

    /// A read finished; `buf` is the user buffer the data landed in.
    fn response(&mut self, cookie: u64, buf: VirtAddr, status: Status);

    /// A write finished.
    fn written(&mut self, cookie: u64, status: Status);
}
