// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! The global leftover-token pool and its reset barrier.
//!
//! Cores donate tokens their LC tenants did not use and withdraw them for
//! BE demand they cannot cover locally. The pool is a single atomic
//! counter; all traffic goes through fetch-add donation and a CAS
//! withdrawal loop.
//!
//! Without a bound, a quiet system would accumulate stale donations and a
//! later BE burst could exceed the device limit, so the pool is zeroed by a
//! barrier: each core bumps its slot after every scheduling round, and any
//! core that observes every slot nonzero resets the pool and the slots.
//! Slot updates are relaxed; exact reset timing is not correctness
//! critical, it only needs to happen roughly once per all-cores round.

use flashq_config::limits::MAX_ENGINE_CORES;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Cross-core bank of leftover tokens.
#[derive(Debug)]
pub struct GlobalTokenPool {
    leftover: AtomicU64,
    sched_rounds: Box<[AtomicU32]>,
}

impl GlobalTokenPool {
    /// A pool coordinating `active_cores` event loops.
    ///
    /// # Panics
    /// When `active_cores` is zero or above
    /// [`MAX_ENGINE_CORES`].
    #[must_use]
    pub fn new(active_cores: usize) -> Self {
        assert!(active_cores > 0 && active_cores <= MAX_ENGINE_CORES);
        let sched_rounds = (0..active_cores).map(|_| AtomicU32::new(0)).collect();
        Self {
            leftover: AtomicU64::new(0),
            sched_rounds,
        }
    }

    /// Tokens currently available.
    #[must_use]
    pub fn available(&self) -> u64 {
        self.leftover.load(Ordering::Relaxed)
    }

    /// Donates tokens to the pool.
    pub fn donate(&self, tokens: u64) {
        if tokens > 0 {
            let _ = self.leftover.fetch_add(tokens, Ordering::Relaxed);
        }
    }

    /// Withdraws up to `demand` tokens, returning how many were obtained.
    ///
    /// When the pool holds less than the demand, everything available is
    /// taken; concurrent withdrawals never hand out the same token twice.
    pub fn try_acquire(&self, demand: u64) -> u64 {
        if demand == 0 {
            return 0;
        }
        loop {
            let available = self.leftover.load(Ordering::Relaxed);
            let (claim, rest) = if demand > available {
                (available, 0)
            } else {
                (demand, available - demand)
            };
            if claim == 0 {
                return 0;
            }
            if self
                .leftover
                .compare_exchange(available, rest, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return claim;
            }
        }
    }

    /// Marks the end of a scheduling round on `core` and, when every core
    /// has completed at least one round since the last reset, zeroes the
    /// pool and the round counters.
    pub fn mark_scheduled(&self, core: usize) {
        let _ = self.sched_rounds[core].fetch_add(1, Ordering::Relaxed);

        let all_scheduled = self
            .sched_rounds
            .iter()
            .all(|slot| slot.load(Ordering::Relaxed) != 0);
        if all_scheduled {
            self.leftover.store(0, Ordering::Relaxed);
            for slot in &self.sched_rounds {
                slot.store(0, Ordering::Relaxed);
            }
        }
    }
}
