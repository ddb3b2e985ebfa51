//! Climate regulation step.
//!
//! [`ClimateEngine::tick`] maps `(schedule, snapshot, minute-of-day)` to a
//! fresh [`ClimateState`].  The only carry-over between ticks is the heater
//! latch and the two sensor-loss streaks, so the engine is a plain owned
//! value: one instance per control loop, no I/O.
//!
//! ```text
//!  temp ▲
//!       │        heater OFF above upper
//! upper ┼──────────────────────────────
//!       │        hold previous state
//! lower ┼──────────────────────────────
//!       │        heater ON below lower
//! ```

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::measurement::SensorSnapshot;
use super::schedule::ClimateSchedule;

/// Ticks without a temperature reading before the heater is forced off.
pub const FAIL_SAFE_TICKS: u8 = 3;
const STREAK_CAP: u8 = 10;

const FAN_MAX_PCT: u8 = 100;
const FAN_HIGH_PCT: u8 = 65;
const FAN_BASE_DAY_PCT: u8 = 25;
const FAN_BASE_NIGHT_PCT: u8 = 15;
const FAN_FLOOR_DAY_PCT: u8 = 20;
const FAN_FLOOR_NIGHT_PCT: u8 = 10;

/// Actuator decisions and echoed setpoints for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimateState {
    pub is_day: bool,
    pub temp_setpoint_c: f32,
    pub humidity_setpoint_pct: f32,
    pub temp_hysteresis_c: f32,
    pub humidity_hysteresis_pct: f32,
    pub uvi_target: f32,
    pub heater_on: bool,
    pub lights_on: bool,
    pub fan_pwm_percent: u8,
    /// Reading minus setpoint; `None` when no reading was available.
    pub temp_error_c: Option<f32>,
    pub humidity_error_pct: Option<f32>,
}

impl ClimateState {
    fn initial(schedule: &ClimateSchedule) -> Self {
        Self {
            is_day: true,
            temp_setpoint_c: schedule.day.temperature_c,
            humidity_setpoint_pct: schedule.day.humidity_pct,
            temp_hysteresis_c: schedule.day.temp_hysteresis_c,
            humidity_hysteresis_pct: schedule.day.humidity_hysteresis_pct,
            uvi_target: schedule.day_uvi_max,
            heater_on: false,
            lights_on: true,
            fan_pwm_percent: 0,
            temp_error_c: None,
            humidity_error_pct: None,
        }
    }
}

pub struct ClimateEngine {
    state: ClimateState,
    temp_invalid_streak: u8,
    humidity_invalid_streak: u8,
}

impl ClimateEngine {
    pub fn new(schedule: &ClimateSchedule) -> Self {
        Self {
            state: ClimateState::initial(schedule),
            temp_invalid_streak: 0,
            humidity_invalid_streak: 0,
        }
    }

    /// Run one regulation step.
    pub fn tick(
        &mut self,
        schedule: &ClimateSchedule,
        sensors: &SensorSnapshot,
        minute_of_day: u16,
    ) -> ClimateState {
        let is_day = schedule.is_day(minute_of_day);
        if is_day != self.state.is_day {
            info!("Climate: switching to {}", if is_day { "day" } else { "night" });
        }
        let (profile, uvi_max) = schedule.period(is_day);

        let mut next = ClimateState {
            is_day,
            temp_setpoint_c: profile.temperature_c,
            humidity_setpoint_pct: profile.humidity_pct,
            temp_hysteresis_c: profile.temp_hysteresis_c,
            humidity_hysteresis_pct: profile.humidity_hysteresis_pct,
            uvi_target: uvi_max,
            heater_on: self.state.heater_on,
            lights_on: is_day,
            fan_pwm_percent: 0,
            temp_error_c: None,
            humidity_error_pct: None,
        };

        // ── Heater ───────────────────────────────────────────
        if let Some(temp) = sensors.best_temperature() {
            self.temp_invalid_streak = 0;
            let half = profile.temp_hysteresis_c / 2.0;
            if temp < profile.temperature_c - half {
                next.heater_on = true;
            } else if temp > profile.temperature_c + half {
                next.heater_on = false;
            }
            next.temp_error_c = Some(temp - profile.temperature_c);
        } else {
            self.temp_invalid_streak = (self.temp_invalid_streak + 1).min(STREAK_CAP);
            if self.temp_invalid_streak >= FAIL_SAFE_TICKS {
                if next.heater_on {
                    warn!(
                        "Climate: no temperature for {} ticks, heater forced off",
                        self.temp_invalid_streak
                    );
                }
                next.heater_on = false;
            }
        }

        // ── Fan ──────────────────────────────────────────────
        let (base, floor) = if is_day {
            (FAN_BASE_DAY_PCT, FAN_FLOOR_DAY_PCT)
        } else {
            (FAN_BASE_NIGHT_PCT, FAN_FLOOR_NIGHT_PCT)
        };
        next.fan_pwm_percent = base;
        if let Some(rh) = sensors.best_humidity() {
            self.humidity_invalid_streak = 0;
            let target = profile.humidity_pct;
            let band = profile.humidity_hysteresis_pct;
            next.fan_pwm_percent = if rh > target + band {
                FAN_MAX_PCT
            } else if rh > target + band / 2.0 {
                FAN_HIGH_PCT
            } else if rh < target - band {
                floor
            } else {
                base
            };
            next.humidity_error_pct = Some(rh - target);
        } else {
            self.humidity_invalid_streak = (self.humidity_invalid_streak + 1).min(STREAK_CAP);
        }

        self.state = next;
        next
    }

    /// Copy of the state produced by the last tick.
    pub fn state(&self) -> ClimateState {
        self.state
    }

    pub fn temp_invalid_streak(&self) -> u8 {
        self.temp_invalid_streak
    }

    pub fn humidity_invalid_streak(&self) -> u8 {
        self.humidity_invalid_streak
    }

    /// Whether the temperature fail-safe currently holds the heater off.
    pub fn fail_safe_active(&self) -> bool {
        self.temp_invalid_streak >= FAIL_SAFE_TICKS
    }
}
