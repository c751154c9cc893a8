// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Tenant admission and global weight recomputation.
//!
//! The admission controller owns the global flow table and every aggregate
//! the schedulers consume: the device-wide token rate (set by the
//! strictest LC latency SLO), the LC reservation sum, the per-tenant BE
//! share, and the LC boost that applies only while no BE tenant exists.
//! Membership changes are rare, so everything sits behind one mutex; the
//! two values schedulers read every round (the BE share and each LC
//! tenant's per-microsecond rate) are mirrored into atomics so the hot
//! path never takes the lock.

use crate::bitmap::SlotBitmap;
use crate::cost::scaled_iops;
use crate::device_model::DeviceModel;
use crate::error::Error;
use crate::flow::{FlowEntry, FlowHandle, RatePerUs};
use flashq_config::limits::MAX_NVME_FLOW_GROUPS;
use flashq_config::slo::FlowSlo;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Result of a successful registration.
#[derive(Debug)]
pub struct Registration {
    /// Slot handle of the tenant.
    pub handle: FlowHandle,

    /// True when this call created the tenant; false when it only bumped
    /// the connection refcount of an existing `(flow_id, core)` tenant.
    pub created: bool,

    /// Whether the tenant is latency-critical.
    pub latency_critical: bool,

    /// The tenant's rate cell, read by its owning core every round.
    pub rate_per_us: Arc<RatePerUs>,
}

/// Result of an unregistration.
#[derive(Debug)]
pub struct Unregistration {
    /// True when the last connection dropped and the tenant was destroyed.
    pub removed: bool,
}

/// Aggregates recomputed on every membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionSnapshot {
    /// Device-wide aggregate token rate (tokens/s).
    pub global_token_rate: u64,

    /// Sum of LC reservations (tokens/s).
    pub lc_reservation_sum: u64,

    /// Registered LC tenants.
    pub num_lc: u32,

    /// Registered BE tenants.
    pub num_be: u32,

    /// Extra tokens/s granted to each LC tenant while no BE tenant exists.
    pub lc_no_be_boost: u64,

    /// True while every LC tenant is read-only and no BE tenant exists.
    pub readonly: bool,
}

#[derive(Debug)]
struct AdmissionState {
    slots: Box<[Option<FlowEntry>]>,
    occupied: SlotBitmap,
    global_token_rate: u64,
    lc_reservation_sum: u64,
    num_lc: u32,
    num_be: u32,
    lc_no_be_boost: u64,
    readonly: bool,
}

/// The global admission controller.
#[derive(Debug)]
pub struct AdmissionController {
    state: Mutex<AdmissionState>,
    be_rate_per_tenant: AtomicU64,
    model: DeviceModel,
}

impl AdmissionController {
    /// A controller with an empty flow table.
    #[must_use]
    pub fn new(model: DeviceModel) -> Self {
        let unlimited = model.lookup(u32::MAX, true);
        Self {
            state: Mutex::new(AdmissionState {
                slots: (0..MAX_NVME_FLOW_GROUPS).map(|_| None).collect(),
                occupied: SlotBitmap::new(MAX_NVME_FLOW_GROUPS),
                global_token_rate: unlimited,
                lc_reservation_sum: 0,
                num_lc: 0,
                num_be: 0,
                lc_no_be_boost: 0,
                readonly: true,
            }),
            be_rate_per_tenant: AtomicU64::new(0),
            model,
        }
    }

    /// The device model admissions are computed against.
    #[must_use]
    pub fn model(&self) -> &DeviceModel {
        &self.model
    }

    /// Per-tenant BE token rate (tokens/s); read lock-free by schedulers
    /// every round.
    #[must_use]
    pub fn be_rate_per_tenant(&self) -> u64 {
        self.be_rate_per_tenant.load(Ordering::Relaxed)
    }

    /// A copy of the current aggregates.
    #[must_use]
    pub fn snapshot(&self) -> AdmissionSnapshot {
        let state = self.state.lock();
        AdmissionSnapshot {
            global_token_rate: state.global_token_rate,
            lc_reservation_sum: state.lc_reservation_sum,
            num_lc: state.num_lc,
            num_be: state.num_be,
            lc_no_be_boost: state.lc_no_be_boost,
            readonly: state.readonly,
        }
    }

    /// Registers a connection of tenant `(flow_id, core)`.
    ///
    /// A repeat registration bumps the refcount; changed SLO parameters
    /// overwrite the stored SLO with a warning (one SLO per tenant is
    /// contract). A new latency-critical tenant is admitted only if its
    /// reservation fits under the aggregate rate implied by the new
    /// strictest latency SLO; rejection leaves every aggregate untouched.
    pub fn register(
        &self,
        flow_id: u64,
        core: usize,
        slo: FlowSlo,
    ) -> Result<Registration, Error> {
        let mut state = self.state.lock();

        if let Some(handle) = state.find(flow_id, core) {
            return Ok(state.reregister(handle, slo));
        }

        let slot = state
            .occupied
            .first_clear_from(1)
            .ok_or(Error::FlowTableFull)?;

        let scaled_limit = scaled_iops(slo.iops, slo.rw_ratio_pct);
        let latency_critical = slo.is_latency_critical();

        if latency_critical {
            // Tentative aggregates; nothing is committed before the check.
            let new_sum = state.lc_reservation_sum + scaled_limit;
            let readonly = state.readonly && slo.rw_ratio_pct == 100 && state.num_be == 0;
            let new_rate = self
                .model
                .lookup(slo.latency_us, readonly)
                .min(state.global_token_rate);
            if new_sum > new_rate {
                log::error!(
                    "cannot satisfy SLO of flow {flow_id} on core {core}: \
                     {new_sum} > {new_rate} tokens/s"
                );
                return Err(Error::CantMeetSlo {
                    required: new_sum,
                    available: new_rate,
                });
            }
            state.global_token_rate = new_rate;
            state.lc_reservation_sum = new_sum;
            state.readonly = readonly;
            state.num_lc += 1;
            log::info!(
                "registered LC tenant {slot} (flow id {flow_id}, core {core}): \
                 {} IOPS, {}% reads, {scaled_limit} tokens/s, {}us; \
                 global rate {new_rate} tokens/s",
                slo.iops,
                slo.rw_ratio_pct,
                slo.latency_us,
            );
        } else {
            state.num_be += 1;
            state.readonly = false;
            log::info!(
                "registered best-effort tenant {slot} (flow id {flow_id}, core {core})"
            );
        }

        let rate_per_us = Arc::new(RatePerUs::new(scaled_limit as f64 / 1e6));
        state.occupied.set(slot);
        state.slots[slot] = Some(FlowEntry {
            flow_id,
            owning_core: core,
            slo,
            scaled_iops_limit: scaled_limit,
            latency_critical,
            conn_refcount: 1,
            rate_per_us: Arc::clone(&rate_per_us),
        });

        self.recompute_shares(&mut state);

        Ok(Registration {
            handle: FlowHandle(slot as u32),
            created: true,
            latency_critical,
            rate_per_us,
        })
    }

    /// Drops one connection of the tenant; the tenant is destroyed and the
    /// aggregates recomputed when the last connection goes.
    pub fn unregister(&self, handle: FlowHandle) -> Result<Unregistration, Error> {
        let mut state = self.state.lock();
        let slot = handle.0 as usize;

        let entry = state
            .slots
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(Error::UnknownFlow { handle })?;

        entry.conn_refcount -= 1;
        if entry.conn_refcount > 0 {
            return Ok(Unregistration { removed: false });
        }

        let entry = state.slots[slot].take().unwrap_or_else(|| unreachable!());
        state.occupied.clear(slot);

        if entry.latency_critical {
            // The strictest latency SLO may have left with this tenant.
            let mut strictest = u32::MAX;
            let mut readonly = true;
            for other in state.slots.iter().flatten() {
                if other.latency_critical {
                    strictest = strictest.min(other.slo.latency_us);
                    if other.slo.rw_ratio_pct < 100 {
                        readonly = false;
                    }
                }
            }
            state.lc_reservation_sum -= entry.scaled_iops_limit;
            state.global_token_rate = self.model.lookup(strictest, readonly);
            state.num_lc -= 1;
            state.readonly = if state.num_be > 0 { false } else { readonly };
            log::info!(
                "unregistered LC tenant {handle}; global rate {} tokens/s",
                state.global_token_rate
            );
        } else {
            state.num_be -= 1;
            if state.num_be == 0 {
                state.readonly = state
                    .slots
                    .iter()
                    .flatten()
                    .filter(|e| e.latency_critical)
                    .all(|e| e.slo.rw_ratio_pct == 100);
            }
        }

        self.recompute_shares(&mut state);

        Ok(Unregistration { removed: true })
    }

    /// Recomputes the BE share and the LC no-BE boost, rescanning LC rate
    /// cells when the boost toggled.
    fn recompute_shares(&self, state: &mut AdmissionState) {
        let residual = state.global_token_rate - state.lc_reservation_sum;
        let (be_rate, boost) = if state.num_be > 0 {
            (residual / u64::from(state.num_be), 0)
        } else if state.num_lc > 0 {
            (0, residual / u64::from(state.num_lc))
        } else {
            (0, 0)
        };
        self.be_rate_per_tenant.store(be_rate, Ordering::Relaxed);

        if boost != state.lc_no_be_boost {
            state.lc_no_be_boost = boost;
            for entry in state.slots.iter().flatten() {
                if entry.latency_critical {
                    entry
                        .rate_per_us
                        .store((entry.scaled_iops_limit + boost) as f64 / 1e6);
                }
            }
        }
    }
}

impl AdmissionState {
    fn find(&self, flow_id: u64, core: usize) -> Option<usize> {
        (1..MAX_NVME_FLOW_GROUPS).find(|&i| {
            self.occupied.test(i)
                && self.slots[i]
                    .as_ref()
                    .is_some_and(|e| e.flow_id == flow_id && e.owning_core == core)
        })
    }

    fn reregister(&mut self, slot: usize, slo: FlowSlo) -> Registration {
        let boost = self.lc_no_be_boost;
        let entry = self.slots[slot]
            .as_mut()
            .unwrap_or_else(|| unreachable!("occupied slot holds an entry"));
        entry.conn_refcount += 1;

        let scaled_limit = scaled_iops(slo.iops, slo.rw_ratio_pct);
        if scaled_limit != entry.scaled_iops_limit || slo != entry.slo {
            // A tenant groups connections wanting the *same* SLO; differing
            // parameters overwrite the previous SLO for all of them.
            log::warn!(
                "tenant connection registered a different SLO; overwriting the \
                 previous SLO for all of this tenant's connections"
            );
            entry.slo = slo;
            entry.scaled_iops_limit = scaled_limit;
            let effective_boost = if entry.latency_critical { boost } else { 0 };
            entry
                .rate_per_us
                .store((scaled_limit + effective_boost) as f64 / 1e6);
        }

        Registration {
            handle: FlowHandle(slot as u32),
            created: false,
            latency_critical: entry.latency_critical,
            rate_per_us: Arc::clone(&entry.rate_per_us),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashq_config::device::{CalibrationPoint, DeviceConfig};
    use flashq_config::limits::NVME_READ_COST;

    fn lc(latency_us: u32, iops: u64, rw: u8) -> FlowSlo {
        FlowSlo {
            latency_us,
            iops,
            rw_ratio_pct: rw,
        }
    }

    /// 500K tokens/s flat at every latency, both columns.
    fn flat_controller() -> AdmissionController {
        let config = DeviceConfig::calibrated(vec![
            CalibrationPoint {
                p95_latency_us: 100,
                token_rate: 500_000,
                token_rate_rdonly: 500_000,
            },
            CalibrationPoint {
                p95_latency_us: 10_000,
                token_rate: 500_000,
                token_rate_rdonly: 500_000,
            },
        ]);
        AdmissionController::new(DeviceModel::new(&config).expect("valid model"))
    }

    #[test]
    fn admission_rejects_overcommitted_reservations() {
        // A 400K tokens/s reservation fits under the 500K device; adding
        // another 200K would not, and must not disturb the committed state.
        let controller = flat_controller();
        let first = controller
            .register(1, 0, lc(200, 4_000, 100))
            .expect("first tenant fits");
        assert!(first.created);

        let before = controller.snapshot();
        assert_eq!(before.lc_reservation_sum, 4_000 * NVME_READ_COST);
        assert_eq!(before.global_token_rate, 500_000);

        let err = controller.register(2, 0, lc(200, 2_000, 100));
        assert!(matches!(err, Err(Error::CantMeetSlo { .. })));
        assert_eq!(controller.snapshot(), before, "rejection leaves state unchanged");
    }

    #[test]
    fn reservation_sum_never_exceeds_global_rate() {
        // Holds over an arbitrary admission history, including rejections.
        let controller = flat_controller();
        let mut handles = Vec::new();
        for i in 0..20 {
            let slo = lc(200 + i * 37, 400 + (i as u64 * 131) % 2_000, 100);
            if let Ok(reg) = controller.register(u64::from(i), 0, slo) {
                handles.push(reg.handle);
            }
            let snap = controller.snapshot();
            assert!(snap.lc_reservation_sum <= snap.global_token_rate);
        }
        for handle in handles {
            let _ = controller.unregister(handle).expect("registered");
            let snap = controller.snapshot();
            assert!(snap.lc_reservation_sum <= snap.global_token_rate);
        }
    }

    #[test]
    fn be_share_and_lc_boost_are_mutually_exclusive() {
        // One LC tenant reserving 300K of a 500K device.
        let controller = flat_controller();
        let reg = controller
            .register(1, 0, lc(200, 3_000, 100))
            .expect("lc tenant");

        let snap = controller.snapshot();
        assert_eq!(snap.lc_no_be_boost, 200_000);
        assert_eq!(controller.be_rate_per_tenant(), 0);
        assert_eq!(reg.rate_per_us.load(), 0.5, "300K reservation + 200K boost");

        // Registering a BE tenant kills the boost and moves the residual
        // to the BE share.
        let be = controller
            .register(2, 0, FlowSlo::best_effort())
            .expect("be tenant");
        assert!(be.created);
        let snap = controller.snapshot();
        assert_eq!(snap.lc_no_be_boost, 0);
        assert_eq!(controller.be_rate_per_tenant(), 200_000);
        assert_eq!(reg.rate_per_us.load(), 0.3);

        // Unregistering it restores the boost.
        let gone = controller.unregister(be.handle).expect("be handle");
        assert!(gone.removed);
        assert_eq!(controller.snapshot().lc_no_be_boost, 200_000);
        assert_eq!(controller.be_rate_per_tenant(), 0);
        assert_eq!(reg.rate_per_us.load(), 0.5);
    }

    #[test]
    fn be_distribution_stays_within_device_rate() {
        // The distributed shares never add up past the device rate.
        let controller = flat_controller();
        let _ = controller.register(1, 0, lc(300, 2_500, 100)).expect("lc");
        for flow in 10..15 {
            let _ = controller
                .register(flow, 0, FlowSlo::best_effort())
                .expect("be");
        }
        let snap = controller.snapshot();
        let distributed =
            controller.be_rate_per_tenant() * u64::from(snap.num_be) + snap.lc_reservation_sum;
        assert!(distributed <= snap.global_token_rate);
        assert!(snap.global_token_rate - distributed < u64::from(snap.num_be));
    }

    #[test]
    fn reregistration_bumps_refcount_and_keeps_one_slot() {
        let controller = flat_controller();
        let first = controller.register(7, 3, lc(200, 1_000, 100)).expect("first");
        let second = controller.register(7, 3, lc(200, 1_000, 100)).expect("second");
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.handle, second.handle);
        assert_eq!(controller.snapshot().num_lc, 1);

        // Same flow id on a different core is a different tenant.
        let other = controller.register(7, 4, lc(200, 1_000, 100)).expect("other core");
        assert!(other.created);
        assert_ne!(other.handle, first.handle);

        // First unregister only drops a connection.
        let gone = controller.unregister(first.handle).expect("known");
        assert!(!gone.removed);
        let gone = controller.unregister(first.handle).expect("known");
        assert!(gone.removed);
    }

    #[test]
    fn reregistration_with_new_slo_overwrites_and_rerates() {
        let controller = flat_controller();
        let first = controller.register(7, 0, lc(200, 1_000, 100)).expect("first");
        // No BE tenants: boost = (500K - 100K) / 1 = 400K on top.
        assert_eq!(first.rate_per_us.load(), 0.5);

        let second = controller.register(7, 0, lc(200, 2_000, 100)).expect("second");
        assert!(!second.created);
        // Overwritten reservation, boost unchanged until next membership
        // change (matches the reference behavior).
        assert_eq!(second.rate_per_us.load(), (200_000.0 + 400_000.0) / 1e6);
    }

    #[test]
    fn readonly_flag_tracks_membership() {
        let controller = flat_controller();
        assert!(controller.snapshot().readonly);

        let lc_mixed = controller.register(1, 0, lc(200, 1_000, 50)).expect("mixed");
        assert!(!controller.snapshot().readonly);

        let gone = controller.unregister(lc_mixed.handle).expect("handle");
        assert!(gone.removed);
        assert!(controller.snapshot().readonly, "empty table is read-only again");

        let _ = controller.register(2, 0, lc(200, 1_000, 100)).expect("ronly");
        assert!(controller.snapshot().readonly);
        let be = controller.register(3, 0, FlowSlo::best_effort()).expect("be");
        assert!(!controller.snapshot().readonly);
        let _ = controller.unregister(be.handle).expect("be");
        assert!(controller.snapshot().readonly);
    }

    #[test]
    fn unknown_handle_is_rejected() {
        let controller = flat_controller();
        assert!(matches!(
            controller.unregister(FlowHandle(42)),
            Err(Error::UnknownFlow { .. })
        ));
    }

    #[test]
    fn table_exhaustion_is_reported() {
        let controller = flat_controller();
        for flow in 0..(MAX_NVME_FLOW_GROUPS as u64 - 1) {
            let _ = controller
                .register(flow, 0, FlowSlo::best_effort())
                .expect("slot");
        }
        assert!(matches!(
            controller.register(9999, 0, FlowSlo::best_effort()),
            Err(Error::FlowTableFull)
        ));
    }
}
