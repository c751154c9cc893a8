// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! The submission/completion adapter over the raw driver.
//!
//! Dequeued requests are dispatched to the device by operation and buffer
//! kind; completions are polled with a budget and turned into user upcalls
//! on the core that submitted them. Under the fake-flash model nothing
//! reaches the device: requests complete successfully the moment they are
//! issued, which exercises the scheduler in isolation.

use crate::cost::Op;
use crate::error::Error;
use crate::event::{EngineEvents, Status};
use crate::request::{RequestKey, RequestPool, key_of, token_of};
use flashq_nvme::driver::{CompletionStatus, NamespaceInfo, NvmeDevice, QpairId};
use flashq_nvme::error::DriverError;

/// Per-core adapter binding a device, its IO queue pair and the namespace
/// geometry.
#[derive(Debug)]
pub struct NvmeAdapter<D: NvmeDevice> {
    device: D,
    qpair: QpairId,
    namespace: NamespaceInfo,
    fake: bool,
    completions: u64,
}

impl<D: NvmeDevice> NvmeAdapter<D> {
    /// Binds the adapter to namespace `ns_id`, allocating a queue pair.
    pub fn new(mut device: D, ns_id: u32, fake: bool) -> Result<Self, Error> {
        let namespace = device
            .namespace(ns_id)
            .ok_or(Error::InvalidNamespace { ns_id })?;
        if !namespace.active {
            return Err(Error::InvalidNamespace { ns_id });
        }
        let qpair = device.alloc_qpair()?;
        Ok(Self {
            device,
            qpair,
            namespace,
            fake,
            completions: 0,
        })
    }

    /// The namespace this adapter submits against.
    #[must_use]
    pub fn namespace(&self) -> NamespaceInfo {
        self.namespace
    }

    /// Completions (including short-circuited and batched-open upcalls)
    /// observed on this core.
    #[must_use]
    pub fn completions_received(&self) -> u64 {
        self.completions
    }

    /// Counts upcalls delivered outside the poll path (batched opens).
    pub fn note_upcalls(&mut self, count: u64) {
        self.completions += count;
    }

    /// The wrapped device, for tests.
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Mutable access to the wrapped device, for fault-injection tests.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Issues one request to the device, or completes it inline under the
    /// fake-flash model.
    ///
    /// # Panics
    /// When the device runs out of command slots. The request pool is
    /// sized so that this cannot happen in steady state; hitting it is a
    /// configuration bug and the process aborts rather than silently
    /// dropping a request the tokens were already charged for.
    pub fn issue<E: EngineEvents>(
        &mut self,
        key: RequestKey,
        pool: &mut RequestPool,
        events: &mut E,
    ) {
        if self.fake {
            let Some(request) = pool.remove(key) else {
                log::error!("issue of unknown request context");
                return;
            };
            match request.op {
                Op::Read => events.response(request.cookie, request.user_buf, Status::Ok),
                Op::Write => events.written(request.cookie, Status::Ok),
            }
            self.completions += 1;
            return;
        }

        let Some(request) = pool.get(key) else {
            log::error!("issue of unknown request context");
            return;
        };
        let result = match request.op {
            Op::Read => self.device.submit_read(
                self.qpair,
                &request.buf,
                request.lba,
                request.lba_count,
                token_of(key),
            ),
            Op::Write => self.device.submit_write(
                self.qpair,
                &request.buf,
                request.lba,
                request.lba_count,
                token_of(key),
            ),
        };

        match result {
            Ok(()) => {}
            Err(DriverError::OutOfCommandSlots) => {
                log::error!("ran out of NVMe command slots");
                panic!("ran out of NVMe command slots; request pool is misconfigured");
            }
            Err(DriverError::DeviceGone) => {
                // Surprise removal; the command cannot be retried here,
                // retries are a tenant policy.
                log::error!("NVMe device is gone, failing the request");
                self.complete_with_fault(key, pool, events);
            }
            Err(err) => {
                // Post-open submission errors are not expected; fail the
                // request rather than wedging its context.
                log::error!("NVMe submission failed: {err}");
                self.complete_with_fault(key, pool, events);
            }
        }
    }

    /// Completes a request with `Fault` and releases its context.
    fn complete_with_fault<E: EngineEvents>(
        &mut self,
        key: RequestKey,
        pool: &mut RequestPool,
        events: &mut E,
    ) {
        let Some(request) = pool.remove(key) else {
            return;
        };
        match request.op {
            Op::Read => events.response(request.cookie, request.user_buf, Status::Fault),
            Op::Write => events.written(request.cookie, Status::Fault),
        }
        self.completions += 1;
    }

    /// Drains up to `budget` completions, firing the user upcall and
    /// releasing each request context. Returns how many completions were
    /// processed.
    pub fn poll<E: EngineEvents>(
        &mut self,
        budget: usize,
        pool: &mut RequestPool,
        events: &mut E,
    ) -> usize {
        if self.fake {
            return 0;
        }
        let device = &mut self.device;
        let qpair = self.qpair;
        let mut handled = 0;
        let _ = device.poll_completions(qpair, budget, &mut |completion| {
            let Some(request) = pool.remove(key_of(completion.token)) else {
                log::warn!("completion for unknown request context");
                return;
            };
            let status = match completion.status {
                CompletionStatus::Success => Status::Ok,
                CompletionStatus::Error(code) => {
                    log::info!(
                        "NVMe {} failed with status {code:#x}",
                        match request.op {
                            Op::Read => "read",
                            Op::Write => "write",
                        }
                    );
                    Status::Fault
                }
            };
            match request.op {
                Op::Read => events.response(request.cookie, request.user_buf, status),
                Op::Write => events.written(request.cookie, status),
            }
            handled += 1;
        });
        self.completions += handled as u64;
        handled
    }
}
