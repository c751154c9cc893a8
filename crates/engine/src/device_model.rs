// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! The device latency model: maps a tail-latency SLO onto the aggregate
//! token rate the device sustains while meeting it.

use flashq_config::device::{CalibrationPoint, DeviceConfig, DeviceModelKind};
use flashq_config::error::Error as ConfigError;

/// Token rate used when the model imposes no limit.
pub const UNLIMITED_TOKEN_RATE: u64 = u32::MAX as u64;

/// A validated device model.
#[derive(Debug, Clone)]
pub struct DeviceModel {
    kind: DeviceModelKind,
    points: Vec<CalibrationPoint>,
}

impl DeviceModel {
    /// Builds a model from configuration, validating the calibration table.
    pub fn new(config: &DeviceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            kind: config.kind,
            points: config.calibration.clone(),
        })
    }

    /// The configured model kind.
    #[must_use]
    pub fn kind(&self) -> DeviceModelKind {
        self.kind
    }

    /// True when submissions should be short-circuited instead of reaching
    /// the raw driver.
    #[must_use]
    pub fn is_fake(&self) -> bool {
        self.kind == DeviceModelKind::FakeFlash
    }

    /// Token rate (tokens/s) admissible under a p95 latency target.
    ///
    /// `readonly` selects the read-only calibration column, valid only when
    /// every LC tenant is 100% reads and no BE tenant exists.
    #[must_use]
    pub fn lookup(&self, slo_us: u32, readonly: bool) -> u64 {
        match self.kind {
            DeviceModelKind::DefaultFlash | DeviceModelKind::FakeFlash => UNLIMITED_TOKEN_RATE,
            DeviceModelKind::FlashDevModel => self.interpolate(slo_us, readonly),
        }
    }

    fn interpolate(&self, slo_us: u32, readonly: bool) -> u64 {
        let rate = |p: &CalibrationPoint| {
            if readonly {
                p.token_rate_rdonly
            } else {
                p.token_rate
            }
        };

        // First calibrated point whose latency exceeds the target.
        let split = self
            .points
            .iter()
            .position(|p| slo_us < p.p95_latency_us)
            .unwrap_or(self.points.len());

        if split == 0 {
            log::warn!("no calibration below {slo_us}us, using the strictest point");
            return rate(&self.points[0]);
        }
        if split == self.points.len() {
            return rate(&self.points[split - 1]);
        }

        let lo = &self.points[split - 1];
        let hi = &self.points[split];
        let y0 = rate(lo) as f64;
        let y1 = rate(hi) as f64;
        let x0 = f64::from(lo.p95_latency_us);
        let x1 = f64::from(hi.p95_latency_us);
        (y0 + (y1 - y0) * (f64::from(slo_us) - x0) / (x1 - x0)) as u64
    }
}
