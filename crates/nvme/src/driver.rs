// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! The opaque raw-driver contract.
//!
//! Completions are pulled, not pushed: the owning core polls its queue pair
//! with a budget and receives completions through a sink closure, so every
//! completion is handled on the core that submitted the command.

use crate::error::DriverError;
use crate::mem::PhysAddr;
use smallvec::SmallVec;

/// Identifier of an allocated IO queue pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QpairId(pub u32);

/// Opaque per-command token chosen by the submitter and echoed back in the
/// matching completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompletionToken(pub u64);

/// Geometry and state of one namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceInfo {
    /// Namespace id.
    pub id: u32,

    /// Capacity in bytes.
    pub size_bytes: u64,

    /// Logical sector size in bytes.
    pub sector_size: u32,

    /// Whether the namespace is active on the controller.
    pub active: bool,
}

/// The DMA buffer of one command: either one contiguous physical range or
/// a scatter/gather list with one entry per 4 KiB page.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(variant_size_differences)] // the inline SGL capacity dwarfs the contiguous form
pub enum IoBuf {
    /// A single physically contiguous buffer.
    Contig(PhysAddr),

    /// Scatter/gather pages, in transfer order.
    Sgl(SmallVec<[PhysAddr; 8]>),
}

/// Outcome of one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// The command completed successfully.
    Success,

    /// The device reported an error with the given status code.
    Error(u32),
}

/// One polled completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// The token the command was submitted with.
    pub token: CompletionToken,

    /// The command outcome.
    pub status: CompletionStatus,
}

/// The raw NVMe device as the scheduler sees it.
///
/// Implementations wrap a real user-space driver; [`crate::fake::FakeNvme`]
/// provides an in-memory stand-in. Submission never blocks: a command
/// either lands in the device submission queue or fails immediately.
pub trait NvmeDevice {
    /// Returns the namespace with the given id, if the controller has one.
    fn namespace(&self, ns_id: u32) -> Option<NamespaceInfo>;

    /// Allocates an IO queue pair for the calling core.
    fn alloc_qpair(&mut self) -> Result<QpairId, DriverError>;

    /// Submits a read of `lba_count` sectors starting at `lba`.
    fn submit_read(
        &mut self,
        qpair: QpairId,
        buf: &IoBuf,
        lba: u64,
        lba_count: u32,
        token: CompletionToken,
    ) -> Result<(), DriverError>;

    /// Submits a write of `lba_count` sectors starting at `lba`.
    fn submit_write(
        &mut self,
        qpair: QpairId,
        buf: &IoBuf,
        lba: u64,
        lba_count: u32,
        token: CompletionToken,
    ) -> Result<(), DriverError>;

    /// Drains up to `budget` completions from the queue pair into `sink`,
    /// returning how many were delivered.
    fn poll_completions(
        &mut self,
        qpair: QpairId,
        budget: usize,
        sink: &mut dyn FnMut(Completion),
    ) -> usize;
}
