// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Thread-per-core event loops.
//!
//! Each configured core gets one dedicated thread, pinned with
//! `core_affinity`, running the cooperative loop the scheduler expects:
//! one `sched()` round, one completion poll, repeat. Engines are built
//! inside their own thread so nothing per-core ever crosses threads; only
//! the stop flag and [`crate::engine::EngineShared`] are shared.

use crate::clock::SchedClock;
use crate::engine::CoreEngine;
use crate::event::EngineEvents;
use flashq_nvme::driver::NvmeDevice;
use flashq_nvme::mem::MemoryTranslator;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

/// Spawns one pinned event-loop thread per entry of `cores`.
///
/// `build` runs on each new thread with `(slot, core_id)`: the slot is
/// the dense index used for the pool barrier, the core id is the CPU the
/// thread is pinned to. The loops run until `stop` flips to true.
pub fn spawn_event_loops<B, D, T, E, C>(
    cores: &[usize],
    stop: &Arc<AtomicBool>,
    build: B,
) -> io::Result<Vec<JoinHandle<()>>>
where
    B: Fn(usize, usize) -> CoreEngine<D, T, E, C> + Send + Sync + 'static,
    D: NvmeDevice + 'static,
    T: MemoryTranslator + 'static,
    E: EngineEvents + 'static,
    C: SchedClock + 'static,
{
    let build = Arc::new(build);
    let mut handles = Vec::with_capacity(cores.len());

    for (slot, &core_id) in cores.iter().enumerate() {
        let build = Arc::clone(&build);
        let stop = Arc::clone(stop);
        let handle = std::thread::Builder::new()
            .name(format!("flashq-core-{core_id}"))
            .spawn(move || {
                if !core_affinity::set_for_current(core_affinity::CoreId { id: core_id }) {
                    log::warn!("could not pin event loop to core {core_id}");
                }
                let mut engine = build(slot, core_id);
                log::info!("event loop running on core {core_id}");
                while !stop.load(Ordering::Relaxed) {
                    engine.sched();
                    let _ = engine.poll_completions();
                }
                log::info!("event loop on core {core_id} stopped");
            })?;
        handles.push(handle);
    }

    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_model::DeviceModel;
    use crate::engine::EngineShared;
    use crate::testing::RecordingEvents;
    use flashq_config::device::DeviceConfig;
    use flashq_config::slo::FlowSlo;
    use flashq_nvme::fake::FakeNvme;
    use flashq_nvme::mem::{IdentityTranslator, VirtAddr};

    #[test]
    fn event_loops_run_and_stop() {
        let model = DeviceModel::new(&DeviceConfig::fake()).expect("valid model");
        let shared = EngineShared::new(model, 2);
        let events = RecordingEvents::new();
        let stop = Arc::new(AtomicBool::new(false));

        let handles = {
            let shared = Arc::clone(&shared);
            let events = events.clone();
            spawn_event_loops(&[0, 1], &stop, move |slot, _core_id| {
                let mut engine = CoreEngine::new(
                    slot,
                    Arc::clone(&shared),
                    FakeNvme::new(1 << 30, 512),
                    IdentityTranslator,
                    events.clone(),
                    crate::clock::MonotonicClock::new(),
                )
                .expect("engine");
                let flow = engine
                    .register_flow(slot as u64, 0, FlowSlo::best_effort())
                    .expect("registered");
                for cookie in 0..8 {
                    engine
                        .write(flow, VirtAddr(0x1000), 0, 8, cookie)
                        .expect("queued");
                }
                engine
            })
            .expect("spawned")
        };

        // Both loops drain their queues through the fake device.
        while events.completed_ops() < 16 {
            std::thread::yield_now();
        }
        stop.store(true, Ordering::Relaxed);
        for handle in handles {
            handle.join().expect("clean shutdown");
        }
        assert_eq!(events.completed_ops(), 16);
    }
}
