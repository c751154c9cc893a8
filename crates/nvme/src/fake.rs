// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! An in-memory NVMe device for exercising the scheduler without hardware.

use crate::driver::{
    Completion, CompletionStatus, CompletionToken, IoBuf, NamespaceInfo, NvmeDevice, QpairId,
};
use crate::error::DriverError;
use std::collections::VecDeque;

/// In-memory device: every submitted command completes successfully on the
/// next poll. Geometry is configurable, and an optional command-slot cap
/// lets tests exercise the fatal out-of-slots path.
#[derive(Debug)]
pub struct FakeNvme {
    namespace: NamespaceInfo,
    pending: VecDeque<Completion>,
    command_slots: Option<usize>,
    gone: bool,
    qpairs_allocated: u32,
    reads_submitted: u64,
    writes_submitted: u64,
}

impl FakeNvme {
    /// A device with one active namespace of the given geometry.
    #[must_use]
    pub fn new(size_bytes: u64, sector_size: u32) -> Self {
        Self {
            namespace: NamespaceInfo {
                id: 1,
                size_bytes,
                sector_size,
                active: true,
            },
            pending: VecDeque::new(),
            command_slots: None,
            gone: false,
            qpairs_allocated: 0,
            reads_submitted: 0,
            writes_submitted: 0,
        }
    }

    /// Caps in-flight commands; further submissions fail with
    /// [`DriverError::OutOfCommandSlots`].
    #[must_use]
    pub fn with_command_slots(mut self, slots: usize) -> Self {
        self.command_slots = Some(slots);
        self
    }

    /// Marks the namespace inactive.
    #[must_use]
    pub fn with_inactive_namespace(mut self) -> Self {
        self.namespace.active = false;
        self
    }

    /// Simulates surprise removal: every further submission fails with
    /// [`DriverError::DeviceGone`]. Completions already posted still drain.
    pub fn fail_device(&mut self) {
        self.gone = true;
    }

    /// Number of reads submitted so far.
    #[must_use]
    pub fn reads_submitted(&self) -> u64 {
        self.reads_submitted
    }

    /// Number of writes submitted so far.
    #[must_use]
    pub fn writes_submitted(&self) -> u64 {
        self.writes_submitted
    }

    /// Completions waiting to be polled.
    #[must_use]
    pub fn pending_completions(&self) -> usize {
        self.pending.len()
    }

    fn admit(&mut self, token: CompletionToken) -> Result<(), DriverError> {
        if self.gone {
            return Err(DriverError::DeviceGone);
        }
        if self
            .command_slots
            .is_some_and(|cap| self.pending.len() >= cap)
        {
            return Err(DriverError::OutOfCommandSlots);
        }
        self.pending.push_back(Completion {
            token,
            status: CompletionStatus::Success,
        });
        Ok(())
    }
}

impl NvmeDevice for FakeNvme {
    fn namespace(&self, ns_id: u32) -> Option<NamespaceInfo> {
        (ns_id == self.namespace.id).then_some(self.namespace)
    }

    fn alloc_qpair(&mut self) -> Result<QpairId, DriverError> {
        let id = self.qpairs_allocated;
        self.qpairs_allocated += 1;
        Ok(QpairId(id))
    }

    fn submit_read(
        &mut self,
        _qpair: QpairId,
        _buf: &IoBuf,
        _lba: u64,
        _lba_count: u32,
        token: CompletionToken,
    ) -> Result<(), DriverError> {
        self.admit(token)?;
        self.reads_submitted += 1;
        Ok(())
    }

    fn submit_write(
        &mut self,
        _qpair: QpairId,
        _buf: &IoBuf,
        _lba: u64,
        _lba_count: u32,
        token: CompletionToken,
    ) -> Result<(), DriverError> {
        self.admit(token)?;
        self.writes_submitted += 1;
        Ok(())
    }

    fn poll_completions(
        &mut self,
        _qpair: QpairId,
        budget: usize,
        sink: &mut dyn FnMut(Completion),
    ) -> usize {
        let mut drained = 0;
        while drained < budget {
            let Some(completion) = self.pending.pop_front() else {
                break;
            };
            sink(completion);
            drained += 1;
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::PhysAddr;

    fn submit_one(dev: &mut FakeNvme, token: u64) {
        dev.submit_read(
            QpairId(0),
            &IoBuf::Contig(PhysAddr(0x1000)),
            0,
            8,
            CompletionToken(token),
        )
        .expect("submit");
    }

    #[test]
    fn completes_submitted_commands_in_order() {
        let mut dev = FakeNvme::new(1 << 30, 512);
        submit_one(&mut dev, 1);
        submit_one(&mut dev, 2);

        let mut seen = Vec::new();
        let drained = dev.poll_completions(QpairId(0), 16, &mut |c| seen.push(c.token.0));
        assert_eq!(drained, 2);
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(dev.reads_submitted(), 2);
    }

    #[test]
    fn poll_respects_budget() {
        let mut dev = FakeNvme::new(1 << 30, 512);
        for token in 0..5 {
            submit_one(&mut dev, token);
        }
        let mut seen = 0;
        assert_eq!(dev.poll_completions(QpairId(0), 3, &mut |_| seen += 1), 3);
        assert_eq!(dev.pending_completions(), 2);
    }

    #[test]
    fn command_slot_cap_rejects_submission() {
        let mut dev = FakeNvme::new(1 << 30, 512).with_command_slots(1);
        submit_one(&mut dev, 1);
        let err = dev.submit_write(
            QpairId(0),
            &IoBuf::Contig(PhysAddr(0x2000)),
            0,
            8,
            CompletionToken(2),
        );
        assert!(matches!(err, Err(DriverError::OutOfCommandSlots)));
    }

    #[test]
    fn gone_device_rejects_submissions_but_drains_pending() {
        let mut dev = FakeNvme::new(1 << 30, 512);
        submit_one(&mut dev, 1);
        dev.fail_device();

        let err = dev.submit_write(
            QpairId(0),
            &IoBuf::Contig(PhysAddr(0x2000)),
            0,
            8,
            CompletionToken(2),
        );
        assert!(matches!(err, Err(DriverError::DeviceGone)));

        // The command accepted before removal still completes.
        let mut seen = Vec::new();
        let drained = dev.poll_completions(QpairId(0), 16, &mut |c| seen.push(c.token.0));
        assert_eq!(drained, 1);
        assert_eq!(seen, vec![1]);
    }

    #[test]
    fn unknown_namespace_is_none() {
        let dev = FakeNvme::new(1 << 30, 512);
        assert!(dev.namespace(2).is_none());
        assert!(dev.namespace(1).is_some());
    }
}
