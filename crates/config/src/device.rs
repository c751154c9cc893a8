// Copyright The FlashQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Flash device model selection and calibration.

use crate::error::Error;
use serde::{Deserialize, Serialize};

/// Selects how the engine models the flash device when turning a latency
/// SLO into an admissible token rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceModelKind {
    /// No rate limiting; every SLO maps to an unlimited token rate.
    #[default]
    DefaultFlash,

    /// Like [`DeviceModelKind::DefaultFlash`], but requests are completed
    /// by the engine itself without ever reaching the raw driver. Used to
    /// test the scheduler in isolation.
    FakeFlash,

    /// Interpolate the token rate from a measured calibration table.
    FlashDevModel,
}

/// One calibrated operating point of the device: the throughput it sustains
/// while keeping p95 read latency under the given target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    /// p95 tail latency of the operating point, in microseconds.
    pub p95_latency_us: u32,

    /// Admissible token rate (tokens/s) for mixed read/write workloads.
    pub token_rate: u64,

    /// Admissible token rate (tokens/s) when the device serves only reads.
    pub token_rate_rdonly: u64,
}

/// Device model configuration: the model kind plus, for
/// [`DeviceModelKind::FlashDevModel`], its calibration table ordered by
/// increasing p95 latency.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// The selected model kind.
    #[serde(default)]
    pub kind: DeviceModelKind,

    /// Calibration points, strictly increasing in `p95_latency_us`.
    /// Ignored unless `kind` is [`DeviceModelKind::FlashDevModel`].
    #[serde(default)]
    pub calibration: Vec<CalibrationPoint>,
}

impl DeviceConfig {
    /// A config with no rate limiting at all.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            kind: DeviceModelKind::DefaultFlash,
            calibration: Vec::new(),
        }
    }

    /// A config that short-circuits submission for scheduler testing.
    #[must_use]
    pub fn fake() -> Self {
        Self {
            kind: DeviceModelKind::FakeFlash,
            calibration: Vec::new(),
        }
    }

    /// A calibrated model built from the given points.
    #[must_use]
    pub fn calibrated(points: Vec<CalibrationPoint>) -> Self {
        Self {
            kind: DeviceModelKind::FlashDevModel,
            calibration: points,
        }
    }

    /// Validates the configuration.
    ///
    /// A calibrated model needs a non-empty table strictly increasing in
    /// p95 latency; the interpolation between neighboring points divides by
    /// the latency delta.
    pub fn validate(&self) -> Result<(), Error> {
        if self.kind != DeviceModelKind::FlashDevModel {
            return Ok(());
        }
        if self.calibration.is_empty() {
            return Err(Error::EmptyCalibrationTable);
        }
        for (i, pair) in self.calibration.windows(2).enumerate() {
            if pair[1].p95_latency_us <= pair[0].p95_latency_us {
                return Err(Error::UnsortedCalibrationTable { index: i + 1 });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: u32, rate: u64, rdonly: u64) -> CalibrationPoint {
        CalibrationPoint {
            p95_latency_us: lat,
            token_rate: rate,
            token_rate_rdonly: rdonly,
        }
    }

    #[test]
    fn unlimited_models_need_no_table() {
        assert!(DeviceConfig::unlimited().validate().is_ok());
        assert!(DeviceConfig::fake().validate().is_ok());
    }

    #[test]
    fn calibrated_model_rejects_empty_table() {
        let config = DeviceConfig::calibrated(Vec::new());
        assert!(matches!(
            config.validate(),
            Err(Error::EmptyCalibrationTable)
        ));
    }

    #[test]
    fn calibrated_model_rejects_unsorted_table() {
        let config = DeviceConfig::calibrated(vec![
            point(200, 500_000, 820_000),
            point(200, 600_000, 900_000),
        ]);
        assert!(matches!(
            config.validate(),
            Err(Error::UnsortedCalibrationTable { index: 1 })
        ));
    }

    #[test]
    fn calibrated_model_accepts_sorted_table() {
        let config = DeviceConfig::calibrated(vec![
            point(200, 500_000, 820_000),
            point(500, 600_000, 900_000),
            point(1000, 750_000, 1_000_000),
        ]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn device_config_round_trips_through_json() {
        let config = DeviceConfig::calibrated(vec![point(200, 500_000, 820_000)]);
        let json = serde_json::to_string(&config).expect("serialize");
        let back: DeviceConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(config, back);
    }
}
