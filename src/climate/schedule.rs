//! Climate schedule value types and their validation.
//!
//! A [`ClimateSchedule`] is an immutable value: two schedules with equal
//! fields are the same schedule.  Its canonical byte encoding feeds both
//! the content hash used for pool deduplication and the TLV wire format.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Minutes in a day; valid minute-of-day values are `0..MINUTES_PER_DAY`.
pub const MINUTES_PER_DAY: u16 = 1440;

/// Size of [`ClimateSchedule::to_bytes`] output.
pub const SCHEDULE_ENCODED_LEN: usize = 2 + 2 + 4 * 4 + 4 * 4 + 4 + 4;

const TEMP_RANGE_C: (f32, f32) = (5.0, 45.0);
const HUMIDITY_RANGE_PCT: (f32, f32) = (5.0, 100.0);
const TEMP_HYSTERESIS_RANGE_C: (f32, f32) = (0.1, 10.0);
const HUMIDITY_HYSTERESIS_RANGE_PCT: (f32, f32) = (0.1, 20.0);
const UVI_RANGE: (f32, f32) = (0.0, 20.0);

/// Setpoints for one half of the day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimateProfile {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub temp_hysteresis_c: f32,
    pub humidity_hysteresis_pct: f32,
}

/// Day/night setpoints plus the UV ceiling for each period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimateSchedule {
    pub day_start_minute: u16,
    pub night_start_minute: u16,
    pub day: ClimateProfile,
    pub night: ClimateProfile,
    pub day_uvi_max: f32,
    pub night_uvi_max: f32,
}

impl Default for ClimateSchedule {
    fn default() -> Self {
        Self {
            day_start_minute: 8 * 60,
            night_start_minute: 20 * 60,
            day: ClimateProfile {
                temperature_c: 32.0,
                humidity_pct: 55.0,
                temp_hysteresis_c: 1.5,
                humidity_hysteresis_pct: 6.0,
            },
            night: ClimateProfile {
                temperature_c: 24.0,
                humidity_pct: 70.0,
                temp_hysteresis_c: 2.0,
                humidity_hysteresis_pct: 8.0,
            },
            day_uvi_max: 3.0,
            night_uvi_max: 0.4,
        }
    }
}

fn in_range(value: f32, (lo, hi): (f32, f32)) -> bool {
    value.is_finite() && (lo..=hi).contains(&value)
}

impl ClimateProfile {
    pub fn validate(&self) -> Result<()> {
        if !in_range(self.temperature_c, TEMP_RANGE_C) {
            return Err(Error::InvalidArgument("temperature_c must be 5–45"));
        }
        if !in_range(self.humidity_pct, HUMIDITY_RANGE_PCT) {
            return Err(Error::InvalidArgument("humidity_pct must be 5–100"));
        }
        if !in_range(self.temp_hysteresis_c, TEMP_HYSTERESIS_RANGE_C) {
            return Err(Error::InvalidArgument("temp_hysteresis_c must be 0.1–10"));
        }
        if !in_range(self.humidity_hysteresis_pct, HUMIDITY_HYSTERESIS_RANGE_PCT) {
            return Err(Error::InvalidArgument(
                "humidity_hysteresis_pct must be 0.1–20",
            ));
        }
        Ok(())
    }
}

impl ClimateSchedule {
    /// Range-check every field.  Called before a schedule is accepted into
    /// the engine, the pool, or persistent storage.
    pub fn validate(&self) -> Result<()> {
        if self.day_start_minute >= MINUTES_PER_DAY {
            return Err(Error::InvalidArgument("day_start_minute must be 0–1439"));
        }
        if self.night_start_minute >= MINUTES_PER_DAY {
            return Err(Error::InvalidArgument("night_start_minute must be 0–1439"));
        }
        self.day.validate()?;
        self.night.validate()?;
        if !in_range(self.day_uvi_max, UVI_RANGE) {
            return Err(Error::InvalidArgument("day_uvi_max must be 0–20"));
        }
        if !in_range(self.night_uvi_max, UVI_RANGE) {
            return Err(Error::InvalidArgument("night_uvi_max must be 0–20"));
        }
        Ok(())
    }

    /// Whether `minute_of_day` falls in the day window.
    ///
    /// The window is `[day_start, night_start)`, wrapping past midnight
    /// when `night_start < day_start`.  Equal bounds mean permanent day.
    pub fn is_day(&self, minute_of_day: u16) -> bool {
        let minute = minute_of_day % MINUTES_PER_DAY;
        let (start, end) = (self.day_start_minute, self.night_start_minute);
        if start == end {
            true
        } else if start < end {
            minute >= start && minute < end
        } else {
            minute >= start || minute < end
        }
    }

    /// Profile and UV ceiling for the given half of the day.
    pub fn period(&self, is_day: bool) -> (&ClimateProfile, f32) {
        if is_day {
            (&self.day, self.day_uvi_max)
        } else {
            (&self.night, self.night_uvi_max)
        }
    }

    /// Canonical big-endian encoding.
    pub fn to_bytes(&self) -> [u8; SCHEDULE_ENCODED_LEN] {
        let mut out = [0u8; SCHEDULE_ENCODED_LEN];
        out[0..2].copy_from_slice(&self.day_start_minute.to_be_bytes());
        out[2..4].copy_from_slice(&self.night_start_minute.to_be_bytes());
        let floats = [
            self.day.temperature_c,
            self.day.humidity_pct,
            self.day.temp_hysteresis_c,
            self.day.humidity_hysteresis_pct,
            self.night.temperature_c,
            self.night.humidity_pct,
            self.night.temp_hysteresis_c,
            self.night.humidity_hysteresis_pct,
            self.day_uvi_max,
            self.night_uvi_max,
        ];
        for (i, v) in floats.iter().enumerate() {
            let at = 4 + i * 4;
            out[at..at + 4].copy_from_slice(&v.to_be_bytes());
        }
        out
    }

    /// Inverse of [`to_bytes`](Self::to_bytes).  Does not validate ranges.
    pub fn from_bytes(bytes: &[u8; SCHEDULE_ENCODED_LEN]) -> Self {
        let f = |i: usize| {
            let at = 4 + i * 4;
            f32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        Self {
            day_start_minute: u16::from_be_bytes([bytes[0], bytes[1]]),
            night_start_minute: u16::from_be_bytes([bytes[2], bytes[3]]),
            day: ClimateProfile {
                temperature_c: f(0),
                humidity_pct: f(1),
                temp_hysteresis_c: f(2),
                humidity_hysteresis_pct: f(3),
            },
            night: ClimateProfile {
                temperature_c: f(4),
                humidity_pct: f(5),
                temp_hysteresis_c: f(6),
                humidity_hysteresis_pct: f(7),
            },
            day_uvi_max: f(8),
            night_uvi_max: f(9),
        }
    }

    /// 32-bit content hash: the leading bytes of SHA-256 over
    /// [`to_bytes`](Self::to_bytes).
    pub fn content_hash(&self) -> u32 {
        let digest = hmac_sha256::Hash::hash(&self.to_bytes());
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
    }
}
