// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: a recording upcall sink.

use crate::event::{EngineEvents, Status};
use crate::flow::FlowHandle;
use crate::ioq::IoQueueHandle;
use flashq_nvme::mem::VirtAddr;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Everything a [`RecordingEvents`] sink has observed, in upcall order per
/// category.
#[derive(Debug, Default)]
pub struct EventLog {
    /// `opened` upcalls: handle, namespace size, sector size.
    pub opened: Vec<(IoQueueHandle, u64, u32)>,

    /// `closed` upcalls.
    pub closed: Vec<(IoQueueHandle, Status)>,

    /// `registered_flow` upcalls.
    pub registered: Vec<(FlowHandle, u64, Status)>,

    /// `unregistered_flow` upcalls.
    pub unregistered: Vec<(FlowHandle, Status)>,

    /// `response` upcalls (reads).
    pub responses: Vec<(u64, VirtAddr, Status)>,

    /// `written` upcalls (writes).
    pub written: Vec<(u64, Status)>,
}

/// An upcall sink recording every event. Clones share the log, so a test
/// can keep one handle while the engine owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingEvents {
    log: Arc<Mutex<EventLog>>,
}

impl RecordingEvents {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks and returns the recorded log.
    #[must_use]
    pub fn log(&self) -> MutexGuard<'_, EventLog> {
        self.log.lock()
    }

    /// Total read and write completions observed.
    #[must_use]
    pub fn completed_ops(&self) -> usize {
        let log = self.log.lock();
        log.responses.len() + log.written.len()
    }
}

impl EngineEvents for RecordingEvents {
    fn opened(&mut self, handle: IoQueueHandle, ns_size: u64, sector_size: u32) {
        self.log.lock().opened.push((handle, ns_size, sector_size));
    }

    fn closed(&mut self, handle: IoQueueHandle, status: Status) {
        self.log.lock().closed.push((handle, status));
    }

    fn registered_flow(&mut self, handle: FlowHandle, cookie: u64, status: Status) {
        self.log.lock().registered.push((handle, cookie, status));
    }

    fn unregistered_flow(&mut self, handle: FlowHandle, status: Status) {
        self.log.lock().unregistered.push((handle, status));
    }

    fn response(&mut self, cookie: u64, buf: VirtAddr, status: Status) {
        self.log.lock().responses.push((cookie, buf, status));
    }

    fn written(&mut self, cookie: u64, status: Status) {
        self.log.lock().written.push((cookie, status));
    }
}
