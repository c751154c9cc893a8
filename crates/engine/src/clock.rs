// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Time sources for the scheduling loop.
//!
//! Subround 1 replenishes LC credit from wall microseconds; subround 2
//! meters BE increments from a cheap cycle counter. Both go through one
//! trait so tests and simulations can drive the scheduler with a manual
//! clock.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Time source consulted once per subround.
pub trait SchedClock {
    /// Monotonic microseconds.
    fn now_us(&self) -> u64;

    /// Monotonic cycle counter.
    fn now_cycles(&self) -> u64;

    /// Cycle-counter frequency, in cycles per microsecond.
    fn cycles_per_us(&self) -> u64;
}

/// Wall-clock implementation; nanoseconds stand in for cycles.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// A clock starting at zero now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedClock for MonotonicClock {
    fn now_us(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    fn now_cycles(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn cycles_per_us(&self) -> u64 {
        1000
    }
}

/// Manually advanced clock for tests and simulation. Clones share the same
/// time so a test can hold one handle while the scheduler owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Rc<Cell<u64>>,
}

impl ManualClock {
    /// A clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock by `us` microseconds.
    pub fn advance_us(&self, us: u64) {
        self.micros.set(self.micros.get() + us);
    }
}

impl SchedClock for ManualClock {
    fn now_us(&self) -> u64 {
        self.micros.get()
    }

    fn now_cycles(&self) -> u64 {
        self.micros.get() * self.cycles_per_us()
    }

    fn cycles_per_us(&self) -> u64 {
        1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        handle.advance_us(250);
        assert_eq!(clock.now_us(), 250);
        assert_eq!(clock.now_cycles(), 250_000);
    }

    #[test]
    fn monotonic_clock_advances() {
        let clock = MonotonicClock::new();
        let a = clock.now_cycles();
        let b = clock.now_cycles();
        assert!(b >= a);
    }
}
