//! Sensor snapshot and the shared measurement record.
//!
//! The acquisition task fills a [`SensorSnapshot`], derives drift against
//! the current setpoints, and publishes a [`ClimateMeasurement`] into the
//! [`MeasurementCell`].  Readers always receive a complete copy.

use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::lock_within;

/// Paired temperature/humidity reading from one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TempHumidity {
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

/// BME280 reading (adds barometric pressure).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bme280Reading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub pressure_hpa: f32,
}

/// Unified snapshot of every climate sensor.  `None` means the sensor was
/// absent or failed on this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// Filtered temperature aggregate (EMA over the direct sensors).
    pub temp_filtered_c: Option<f32>,
    /// Filtered humidity aggregate.
    pub humidity_filtered_pct: Option<f32>,
    pub sht31: Option<TempHumidity>,
    pub sht21: Option<TempHumidity>,
    pub bme280: Option<Bme280Reading>,
    /// DS18B20 probes, temperature only.
    pub probes_c: [Option<f32>; 2],
    /// [`SensorFault`](crate::error::SensorFault) bits.
    pub fault_mask: u8,
}

fn usable(v: Option<f32>) -> Option<f32> {
    v.filter(|x| x.is_finite())
}

impl SensorSnapshot {
    /// Best temperature by priority: filtered aggregate, SHT31, SHT21,
    /// BME280, probe 1, probe 2.
    pub fn best_temperature(&self) -> Option<f32> {
        usable(self.temp_filtered_c)
            .or_else(|| usable(self.sht31.map(|r| r.temperature_c)))
            .or_else(|| usable(self.sht21.map(|r| r.temperature_c)))
            .or_else(|| usable(self.bme280.map(|r| r.temperature_c)))
            .or_else(|| usable(self.probes_c[0]))
            .or_else(|| usable(self.probes_c[1]))
    }

    /// Best humidity by priority: filtered aggregate, SHT31, SHT21, BME280.
    pub fn best_humidity(&self) -> Option<f32> {
        usable(self.humidity_filtered_pct)
            .or_else(|| usable(self.sht31.map(|r| r.humidity_pct)))
            .or_else(|| usable(self.sht21.map(|r| r.humidity_pct)))
            .or_else(|| usable(self.bme280.map(|r| r.humidity_pct)))
    }
}

/// Snapshot plus drift from the setpoints in force when it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClimateMeasurement {
    pub sensors: SensorSnapshot,
    pub temp_drift_c: Option<f32>,
    pub humidity_drift_pct: Option<f32>,
    pub fault_mask: u8,
    pub timestamp_ms: u64,
}

impl ClimateMeasurement {
    pub fn derive(
        sensors: SensorSnapshot,
        temp_setpoint_c: f32,
        humidity_setpoint_pct: f32,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            temp_drift_c: sensors.best_temperature().map(|t| t - temp_setpoint_c),
            humidity_drift_pct: sensors.best_humidity().map(|h| h - humidity_setpoint_pct),
            fault_mask: sensors.fault_mask,
            sensors,
            timestamp_ms,
        }
    }
}

/// Missed acquisition cycles after which a measurement is treated as absent.
pub const STALE_AFTER_READS: u64 = 3;

/// Single shared measurement record guarded by a bounded-wait mutex.
pub struct MeasurementCell {
    latest: Mutex<Option<ClimateMeasurement>>,
    timeout: Duration,
}

impl MeasurementCell {
    pub fn new(timeout: Duration) -> Self {
        Self {
            latest: Mutex::new(None),
            timeout,
        }
    }

    /// Replace the published measurement.
    pub fn publish(&self, measurement: ClimateMeasurement) -> Result<()> {
        let mut slot = lock_within(&self.latest, self.timeout).ok_or(Error::Timeout)?;
        *slot = Some(measurement);
        Ok(())
    }

    /// Copy of the latest measurement; `NotFound` before the first publish.
    pub fn get(&self) -> Result<ClimateMeasurement> {
        let slot = lock_within(&self.latest, self.timeout).ok_or(Error::Timeout)?;
        slot.ok_or(Error::NotFound)
    }

    /// Like [`get`](Self::get), but a measurement taken more than
    /// `max_age_ms` before `now_ms` is refused with `InvalidState`.
    pub fn get_fresh(&self, now_ms: u64, max_age_ms: u64) -> Result<ClimateMeasurement> {
        let m = self.get()?;
        if now_ms.saturating_sub(m.timestamp_ms) > max_age_ms {
            return Err(Error::InvalidState("measurement is stale"));
        }
        Ok(m)
    }

    /// Sensor input for one control tick.  A missing, contended or stale
    /// measurement yields an empty snapshot, which the engine counts toward
    /// its fail-safe streak.
    pub fn snapshot_for_tick(&self, now_ms: u64, max_age_ms: u64) -> SensorSnapshot {
        self.get_fresh(now_ms, max_age_ms)
            .map(|m| m.sensors)
            .unwrap_or_default()
    }
}
