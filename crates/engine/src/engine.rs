// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! The per-core engine facade.
//!
//! One [`CoreEngine`] lives on each event-loop core and carries every
//! downcall of the user-facing API: namespace open/close, flow
//! registration, request submission, the scheduling round and the
//! completion poll. Tenant queues, request contexts and completions never
//! leave the core; [`EngineShared`] holds the few pieces all cores share.

use crate::admission::AdmissionController;
use crate::clock::SchedClock;
use crate::cost::{Op, request_cost};
use crate::device_model::DeviceModel;
use crate::error::Error;
use crate::event::{EngineEvents, Status};
use crate::flow::FlowHandle;
use crate::ioq::{IoQueueAllocator, IoQueueHandle};
use crate::queue::QueuedRequest;
use crate::request::{Request, RequestPool};
use crate::scheduler::CoreScheduler;
use crate::submit::NvmeAdapter;
use crate::token_pool::GlobalTokenPool;
use flashq_config::limits::{COMPLETION_BUDGET, MAX_OPEN_BATCH, NUM_NVME_REQUESTS};
use flashq_config::slo::FlowSlo;
use flashq_nvme::driver::{IoBuf, NvmeDevice};
use flashq_nvme::mem::{MemoryTranslator, VirtAddr};
use smallvec::SmallVec;
use std::sync::Arc;

/// The single supported namespace id.
const GLOBAL_NS_ID: u32 = 1;

/// State shared by every core's engine.
#[derive(Debug)]
pub struct EngineShared {
    /// Global admission controller and flow table.
    pub admission: AdmissionController,

    /// Hardware IO-queue slot allocator.
    pub ioqs: IoQueueAllocator,

    /// Cross-core leftover-token pool.
    pub pool: GlobalTokenPool,
}

impl EngineShared {
    /// Shared state for `active_cores` event loops against the given
    /// device model.
    #[must_use]
    pub fn new(model: DeviceModel, active_cores: usize) -> Arc<Self> {
        Arc::new(Self {
            admission: AdmissionController::new(model),
            ioqs: IoQueueAllocator::new(),
            pool: GlobalTokenPool::new(active_cores),
        })
    }
}

/// The per-core scheduler engine.
#[derive(Debug)]
pub struct CoreEngine<D, T, E, C>
where
    D: NvmeDevice,
    T: MemoryTranslator,
    E: EngineEvents,
    C: SchedClock,
{
    core: usize,
    shared: Arc<EngineShared>,
    scheduler: CoreScheduler<C>,
    requests: RequestPool,
    adapter: NvmeAdapter<D>,
    translator: T,
    events: E,
    open_batch: Vec<IoQueueHandle>,
    sched_enabled: bool,
}

impl<D, T, E, C> CoreEngine<D, T, E, C>
where
    D: NvmeDevice,
    T: MemoryTranslator,
    E: EngineEvents,
    C: SchedClock,
{
    /// Builds the engine for `core`, allocating its device queue pair.
    pub fn new(
        core: usize,
        shared: Arc<EngineShared>,
        device: D,
        translator: T,
        events: E,
        clock: C,
    ) -> Result<Self, Error> {
        let fake = shared.admission.model().is_fake();
        let adapter = NvmeAdapter::new(device, GLOBAL_NS_ID, fake)?;
        Ok(Self {
            core,
            shared,
            scheduler: CoreScheduler::new(clock),
            requests: RequestPool::with_capacity(NUM_NVME_REQUESTS),
            adapter,
            translator,
            events,
            open_batch: Vec::new(),
            sched_enabled: true,
        })
    }

    /// Disables the scheduler: submissions bypass the software queues and
    /// go straight to the device.
    pub fn set_sched_enabled(&mut self, enabled: bool) {
        self.sched_enabled = enabled;
    }

    /// The core this engine runs on.
    #[must_use]
    pub fn core(&self) -> usize {
        self.core
    }

    /// The upcall sink, for inspection.
    #[must_use]
    pub fn events(&self) -> &E {
        &self.events
    }

    /// Completions (including batched-open upcalls) observed on this core.
    #[must_use]
    pub fn completions_received(&self) -> u64 {
        self.adapter.completions_received()
    }

    /// Opens the namespace: allocates an IO queue slot and batches the
    /// `opened` upcall for the next poll.
    pub fn open(&mut self, ns_id: u32) -> Result<IoQueueHandle, Error> {
        if ns_id != GLOBAL_NS_ID {
            return Err(Error::InvalidNamespace { ns_id });
        }
        if self.open_batch.len() >= MAX_OPEN_BATCH {
            return Err(Error::OpenBatchFull);
        }
        let handle = self.shared.ioqs.allocate()?;
        self.open_batch.push(handle);
        Ok(handle)
    }

    /// Closes a namespace handle, releasing its IO queue slot.
    pub fn close(&mut self, handle: IoQueueHandle) {
        self.shared.ioqs.release(handle);
        self.events.closed(handle, Status::Ok);
    }

    /// Registers a connection of flow `flow_id` with the given SLO on this
    /// core, creating the tenant on first registration.
    pub fn register_flow(
        &mut self,
        flow_id: u64,
        cookie: u64,
        slo: FlowSlo,
    ) -> Result<FlowHandle, Error> {
        slo.validate()?;
        let registration = self.shared.admission.register(flow_id, self.core, slo)?;
        if registration.created {
            self.scheduler.add_tenant(
                registration.handle,
                registration.latency_critical,
                registration.rate_per_us,
            );
        }
        self.events
            .registered_flow(registration.handle, cookie, Status::Ok);
        Ok(registration.handle)
    }

    /// Drops one connection of a tenant; the last drop destroys the tenant
    /// and releases anything still queued.
    pub fn unregister_flow(&mut self, handle: FlowHandle) -> Result<(), Error> {
        let unregistration = self.shared.admission.unregister(handle)?;
        if unregistration.removed {
            if let Some(mut queue) = self.scheduler.remove_tenant(handle) {
                if !queue.is_empty() {
                    log::warn!(
                        "destroying flow {handle} with {} requests still queued",
                        queue.len()
                    );
                }
                while let Some(entry) = queue.pop_front() {
                    let _ = self.requests.remove(entry.key);
                }
            }
        }
        self.events.unregistered_flow(handle, Status::Ok);
        Ok(())
    }

    /// Submits a read of `lba_count` sectors into a contiguous buffer.
    pub fn read(
        &mut self,
        handle: FlowHandle,
        vaddr: VirtAddr,
        lba: u64,
        lba_count: u32,
        cookie: u64,
    ) -> Result<(), Error> {
        self.submit_contig(Op::Read, handle, vaddr, lba, lba_count, cookie)
    }

    /// Submits a write of `lba_count` sectors from a contiguous buffer.
    pub fn write(
        &mut self,
        handle: FlowHandle,
        vaddr: VirtAddr,
        lba: u64,
        lba_count: u32,
        cookie: u64,
    ) -> Result<(), Error> {
        self.submit_contig(Op::Write, handle, vaddr, lba, lba_count, cookie)
    }

    /// Submits a read gathering into one 4 KiB page per entry of `bufs`.
    pub fn readv(
        &mut self,
        handle: FlowHandle,
        bufs: &[VirtAddr],
        lba: u64,
        lba_count: u32,
        cookie: u64,
    ) -> Result<(), Error> {
        self.submit_sgl(Op::Read, handle, bufs, lba, lba_count, cookie)
    }

    /// Submits a write scattering from one 4 KiB page per entry of `bufs`.
    pub fn writev(
        &mut self,
        handle: FlowHandle,
        bufs: &[VirtAddr],
        lba: u64,
        lba_count: u32,
        cookie: u64,
    ) -> Result<(), Error> {
        self.submit_sgl(Op::Write, handle, bufs, lba, lba_count, cookie)
    }

    fn submit_contig(
        &mut self,
        op: Op,
        handle: FlowHandle,
        vaddr: VirtAddr,
        lba: u64,
        lba_count: u32,
        cookie: u64,
    ) -> Result<(), Error> {
        let phys = self
            .translator
            .phys_of(vaddr)
            .ok_or(Error::TranslationFault { vaddr })?;
        self.dispatch(op, handle, IoBuf::Contig(phys), vaddr, lba, lba_count, cookie)
    }

    fn submit_sgl(
        &mut self,
        op: Op,
        handle: FlowHandle,
        bufs: &[VirtAddr],
        lba: u64,
        lba_count: u32,
        cookie: u64,
    ) -> Result<(), Error> {
        let mut pages = SmallVec::new();
        for &vaddr in bufs {
            let phys = self
                .translator
                .phys_of(vaddr)
                .ok_or(Error::TranslationFault { vaddr })?;
            pages.push(phys);
        }
        let user_buf = bufs.first().copied().unwrap_or(VirtAddr(0));
        self.dispatch(op, handle, IoBuf::Sgl(pages), user_buf, lba, lba_count, cookie)
    }

    fn dispatch(
        &mut self,
        op: Op,
        handle: FlowHandle,
        buf: IoBuf,
        user_buf: VirtAddr,
        lba: u64,
        lba_count: u32,
        cookie: u64,
    ) -> Result<(), Error> {
        let bytes = u64::from(lba_count) * u64::from(self.adapter.namespace().sector_size);
        let cost = request_cost(op, bytes);
        let request = Request {
            op,
            lba,
            lba_count,
            buf,
            cost,
            cookie,
            flow: handle,
            owning_core: self.core,
            user_buf,
        };
        let key = self.requests.insert(request)?;

        if !self.sched_enabled {
            self.adapter.issue(key, &mut self.requests, &mut self.events);
            return Ok(());
        }

        match self.scheduler.enqueue(handle, QueuedRequest { key, cost }) {
            Ok(()) => Ok(()),
            Err(rejected) => {
                let _ = self.requests.remove(rejected.key);
                if self.scheduler.queued_demand(handle).is_none() {
                    Err(Error::UnknownFlow { handle })
                } else {
                    Err(Error::QueueFull { handle })
                }
            }
        }
    }

    /// Runs one scheduling round and marks it on the reset barrier.
    pub fn sched(&mut self) {
        let core = self.core;
        let Self {
            scheduler,
            shared,
            adapter,
            requests,
            events,
            ..
        } = self;
        scheduler.sched(&shared.admission, &shared.pool, &mut |entry| {
            adapter.issue(entry.key, requests, events);
        });
        shared.pool.mark_scheduled(core);
    }

    /// Delivers batched `opened` upcalls, then drains device completions.
    /// Returns how many upcalls fired.
    pub fn poll_completions(&mut self) -> usize {
        let namespace = self.adapter.namespace();
        let opens = self.open_batch.len();
        for handle in self.open_batch.drain(..) {
            self.events
                .opened(handle, namespace.size_bytes, namespace.sector_size);
        }
        self.adapter.note_upcalls(opens as u64);

        opens + self.adapter.poll(COMPLETION_BUDGET, &mut self.requests, &mut self.events)
    }
}
