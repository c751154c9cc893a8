// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! The per-core two-subround scheduling loop.
//!
//! Each call to [`CoreScheduler::sched`] runs two subrounds over the
//! tenants owned by this core:
//!
//! 1. **Latency-critical.** Every LC tenant's credit is replenished from
//!    its rate cell and the elapsed wall time, its queue drained while the
//!    credit stays above the deficit floor, and credit beyond the positive
//!    cap is mostly spilled into a core-local leftover. BE demand is
//!    tallied on the side.
//! 2. **Best-effort.** The core-local leftover is reconciled against BE
//!    demand through the global pool (donate the surplus, or withdraw the
//!    shortfall), then BE tenants are served round-robin: saved tokens
//!    first, a fresh per-tenant increment, drain while the head fits, and
//!    the remainder is parked with the tenant if it still has demand.
//!    Whatever survives the loop is donated back to the pool.
//!
//! Everything here is single-threaded on the owning core; the only shared
//! accesses are atomic reads of the BE share and the rate cells, and the
//! pool traffic.

use crate::admission::AdmissionController;
use crate::clock::SchedClock;
use crate::flow::{FlowHandle, RatePerUs};
use crate::queue::{QueuedRequest, SwQueue};
use crate::token_pool::GlobalTokenPool;
use ahash::AHashMap;
use flashq_config::limits::{SW_QUEUE_DEPTH, TOKEN_DEFICIT_LIMIT, TOKEN_FRAC_GIVEAWAY};
use std::sync::Arc;

/// A tenant as the owning core sees it. Whether it is latency-critical is
/// encoded by which order list its handle sits on.
#[derive(Debug)]
struct TenantQueue {
    rate_per_us: Arc<RatePerUs>,
    queue: SwQueue,
}

/// Per-core scheduler state. Owned by exactly one event loop.
#[derive(Debug)]
pub struct CoreScheduler<C: SchedClock> {
    clock: C,
    tenants: AHashMap<FlowHandle, TenantQueue>,
    lc_order: Vec<FlowHandle>,
    be_order: Vec<FlowHandle>,
    rr_start: usize,
    last_sched_us: u64,
    last_sched_cycles: u64,
    local_leftover: u64,
    local_extra_demand: u64,
}

impl<C: SchedClock> CoreScheduler<C> {
    /// A scheduler with no tenants.
    #[must_use]
    pub fn new(clock: C) -> Self {
        let last_sched_us = clock.now_us();
        let last_sched_cycles = clock.now_cycles();
        Self {
            clock,
            tenants: AHashMap::new(),
            lc_order: Vec::new(),
            be_order: Vec::new(),
            rr_start: 0,
            last_sched_us,
            last_sched_cycles,
            local_leftover: 0,
            local_extra_demand: 0,
        }
    }

    /// Adds a tenant to this core. Resets the round-robin cursor.
    pub fn add_tenant(
        &mut self,
        handle: FlowHandle,
        latency_critical: bool,
        rate_per_us: Arc<RatePerUs>,
    ) {
        let _ = self.tenants.insert(
            handle,
            TenantQueue {
                rate_per_us,
                queue: SwQueue::with_capacity(SW_QUEUE_DEPTH),
            },
        );
        if latency_critical {
            self.lc_order.push(handle);
        } else {
            self.be_order.push(handle);
        }
        self.rr_start = 0;
    }

    /// Removes a tenant, returning its queue (possibly non-empty) so the
    /// caller can release any still-queued contexts.
    pub fn remove_tenant(&mut self, handle: FlowHandle) -> Option<SwQueue> {
        let tenant = self.tenants.remove(&handle)?;
        self.lc_order.retain(|h| *h != handle);
        self.be_order.retain(|h| *h != handle);
        if self.rr_start >= self.be_order.len() {
            self.rr_start = 0;
        }
        Some(tenant.queue)
    }

    /// True when this core owns at least one tenant.
    #[must_use]
    pub fn has_tenants(&self) -> bool {
        !self.tenants.is_empty()
    }

    /// Queues a request with its owning tenant. On failure the request is
    /// handed back so the caller can release its context.
    pub fn enqueue(&mut self, handle: FlowHandle, entry: QueuedRequest) -> Result<(), QueuedRequest> {
        match self.tenants.get_mut(&handle) {
            Some(tenant) => tenant.queue.push_back(entry),
            None => Err(entry),
        }
    }

    /// Queued demand of one tenant, for tests and diagnostics.
    #[must_use]
    pub fn queued_demand(&self, handle: FlowHandle) -> Option<u64> {
        self.tenants
            .get(&handle)
            .map(|t| t.queue.total_token_demand())
    }

    /// Token credit of one tenant, for tests and diagnostics.
    #[must_use]
    pub fn token_credit(&self, handle: FlowHandle) -> Option<i64> {
        self.tenants.get(&handle).map(|t| t.queue.token_credit())
    }

    /// Runs one scheduling round, issuing dequeued requests through
    /// `issue`. The caller marks the round on the pool barrier afterwards.
    pub fn sched(
        &mut self,
        admission: &AdmissionController,
        pool: &GlobalTokenPool,
        issue: &mut dyn FnMut(QueuedRequest),
    ) {
        if self.tenants.is_empty() {
            self.last_sched_us = self.clock.now_us();
            self.last_sched_cycles = self.clock.now_cycles();
            return;
        }

        self.subround_latency_critical(issue);
        self.subround_best_effort(admission, pool, issue);

        self.local_leftover = 0;
        self.local_extra_demand = 0;
    }

    /// Subround 1: serve LC tenants, tally BE demand.
    fn subround_latency_critical(&mut self, issue: &mut dyn FnMut(QueuedRequest)) {
        let now = self.clock.now_us();
        let time_delta = now - self.last_sched_us;
        self.last_sched_us = now;

        let mut local_leftover: u64 = 0;
        let mut local_demand: u64 = 0;

        for handle in &self.lc_order {
            let Some(tenant) = self.tenants.get_mut(handle) else {
                continue;
            };
            let token_increment = tenant.rate_per_us.load() * time_delta as f64 + 0.5;
            tenant.queue.add_credit(token_increment as i64);

            if tenant.queue.token_credit() < -TOKEN_DEFICIT_LIMIT {
                // The control plane may need to renegotiate this SLO; the
                // queue simply waits for credit to recover.
                log::debug!(
                    "flow {handle} is {} tokens past its deficit limit",
                    -(tenant.queue.token_credit() + TOKEN_DEFICIT_LIMIT)
                );
            }

            while !tenant.queue.is_empty() && tenant.queue.token_credit() > -TOKEN_DEFICIT_LIMIT {
                let Some(entry) = tenant.queue.pop_front() else {
                    break;
                };
                issue(entry);
                tenant.queue.charge_credit(entry.cost);
            }

            // An LC tenant idle for ~3 rounds donates most of its unused
            // credit; the cap balances burst headroom against
            // work-conservation.
            let pos_limit = (3.0 * token_increment) as i64;
            if tenant.queue.token_credit() > pos_limit {
                let giveaway = (tenant.queue.token_credit() as f64 * TOKEN_FRAC_GIVEAWAY) as i64;
                local_leftover += giveaway as u64;
                tenant.queue.add_credit(-giveaway);
            }
        }

        for handle in &self.be_order {
            if let Some(tenant) = self.tenants.get(handle) {
                local_demand += tenant
                    .queue
                    .total_token_demand()
                    .saturating_sub(tenant.queue.saved_tokens());
            }
        }

        self.local_leftover = local_leftover;
        self.local_extra_demand = local_demand;
    }

    /// Subround 2: reconcile with the global pool, serve BE tenants.
    fn subround_best_effort(
        &mut self,
        admission: &AdmissionController,
        pool: &GlobalTokenPool,
        issue: &mut dyn FnMut(QueuedRequest),
    ) {
        let local_leftover = self.local_leftover;
        let local_demand = self.local_extra_demand;

        let mut be_tokens: u64;
        if local_leftover > 0 && local_demand == 0 {
            // Nothing to spend them on here; the BE timestamp is left
            // alone so the elapsed cycles carry into the next round.
            pool.donate(local_leftover);
            return;
        } else if local_leftover < local_demand {
            let acquired = pool.try_acquire(local_demand - local_leftover);
            be_tokens = local_leftover + acquired;
        } else {
            be_tokens = local_leftover;
        }

        let now = self.clock.now_cycles();
        let delta_cycles = now - self.last_sched_cycles;
        self.last_sched_cycles = now;

        let be_rate = admission.be_rate_per_tenant() as f64;
        let cycles_per_us = self.clock.cycles_per_us() as f64;
        let token_increment = (be_rate * delta_cycles as f64) / (cycles_per_us * 1e6);

        let num_be = self.be_order.len();
        for i in 0..num_be {
            let handle = self.be_order[(self.rr_start + i) % num_be];
            let Some(tenant) = self.tenants.get_mut(&handle) else {
                continue;
            };

            be_tokens += tenant.queue.take_saved_tokens();
            be_tokens += (token_increment + 0.5) as u64;

            while tenant.queue.peek_head_cost().is_some_and(|cost| cost <= be_tokens) {
                let Some(entry) = tenant.queue.pop_front() else {
                    break;
                };
                issue(entry);
                be_tokens -= entry.cost;
            }

            be_tokens -= tenant.queue.save_tokens(be_tokens);
        }

        if num_be > 0 {
            self.rr_start = (self.rr_start + 1) % num_be;
        }

        if be_tokens > 0 {
            pool.donate(be_tokens);
        }
    }
}
