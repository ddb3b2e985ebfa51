//! Climate service: the hexagonal core.
//!
//! [`ClimateService`] owns the regulation engine and the active schedule.
//! It exposes the operations the network layer calls (`get_schedule`,
//! `update_targets`, `apply_profile`, `get_state`) and the per-tick step
//! the actuator task runs.  All I/O flows through port traits injected at
//! call sites, so the whole service runs against mocks.
//!
//! ```text
//!  SensorSnapshot ──▶ ┌────────────────────────┐ ──▶ EventSink
//!                     │     ClimateService     │
//!   ActuatorPort ◀────│  schedule · engine     │◀── SchedulePort
//!                     └────────────────────────┘
//! ```

use log::{info, warn};

use crate::app::ports::StoragePort;
use crate::climate::engine::{ClimateEngine, ClimateState};
use crate::climate::measurement::{ClimateMeasurement, SensorSnapshot};
use crate::climate::schedule::ClimateSchedule;
use crate::error::{Error, Result};
use crate::species::SpeciesStore;

use super::events::{AppEvent, TelemetryData};
use super::ports::{ActuatorPort, EventSink, SchedulePort};

// ───────────────────────────────────────────────────────────────
// ClimateService
// ───────────────────────────────────────────────────────────────

pub struct ClimateService {
    engine: ClimateEngine,
    schedule: ClimateSchedule,
    /// State of the previous tick; `None` before the first one.
    last_state: Option<ClimateState>,
    /// Last `(on, uvi)` the dome accepted.  Cleared on a failed write so
    /// the next tick retries.
    lights_applied: Option<(bool, f32)>,
    fail_safe_reported: bool,
    tick_count: u64,
}

impl ClimateService {
    pub fn new(schedule: ClimateSchedule) -> Self {
        Self {
            engine: ClimateEngine::new(&schedule),
            schedule,
            last_state: None,
            lights_applied: None,
            fail_safe_reported: false,
            tick_count: 0,
        }
    }

    /// Build the service from the persisted schedule, falling back to the
    /// default when nothing usable is stored.
    pub fn init(store: &impl SchedulePort) -> Self {
        let schedule = match store.load_schedule() {
            Ok(Some(s)) => {
                info!("Climate: loaded stored schedule");
                s
            }
            Ok(None) => {
                info!("Climate: no stored schedule, using defaults");
                ClimateSchedule::default()
            }
            Err(e) => {
                warn!("Climate: stored schedule unusable ({}), using defaults", e);
                ClimateSchedule::default()
            }
        };
        Self::new(schedule)
    }

    // ── Lifecycle ─────────────────────────────────────────────

    pub fn start(&mut self, sink: &mut impl EventSink) {
        let state = self.engine.state();
        sink.emit(&AppEvent::Started(state));
        info!(
            "ClimateService started: day {:02}:{:02}, night {:02}:{:02}",
            self.schedule.day_start_minute / 60,
            self.schedule.day_start_minute % 60,
            self.schedule.night_start_minute / 60,
            self.schedule.night_start_minute % 60
        );
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one regulation step and drive the loads.
    ///
    /// Heater and fan are written every tick.  The dome sits on the shared
    /// bus, so it is only written when its target changes or the previous
    /// write failed.
    pub fn tick(
        &mut self,
        sensors: &SensorSnapshot,
        minute_of_day: u16,
        hw: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) -> ClimateState {
        self.tick_count += 1;
        let state = self.engine.tick(&self.schedule, sensors, minute_of_day);

        // 1. Loads
        hw.set_heater(state.heater_on);
        hw.set_fan_pwm(state.fan_pwm_percent);

        let wanted = (state.lights_on, state.uvi_target);
        if self.lights_applied != Some(wanted) {
            match hw.set_lights(wanted.0, wanted.1) {
                Ok(()) => self.lights_applied = Some(wanted),
                Err(e) => {
                    self.lights_applied = None;
                    warn!("Climate: dome write failed: {}", e);
                    sink.emit(&AppEvent::LightsFailed(e));
                }
            }
        }

        // 2. Events
        match self.last_state {
            Some(prev) => {
                if prev.is_day != state.is_day {
                    sink.emit(&AppEvent::PeriodChanged { is_day: state.is_day });
                }
                if prev.heater_on != state.heater_on {
                    sink.emit(&AppEvent::HeaterChanged { on: state.heater_on });
                }
            }
            None => sink.emit(&AppEvent::HeaterChanged { on: state.heater_on }),
        }

        let fail_safe = self.engine.fail_safe_active();
        if fail_safe && !self.fail_safe_reported {
            sink.emit(&AppEvent::HeaterFailSafe {
                streak: self.engine.temp_invalid_streak(),
            });
        }
        self.fail_safe_reported = fail_safe;

        self.last_state = Some(state);
        state
    }

    // ── Schedule operations ───────────────────────────────────

    pub fn get_schedule(&self) -> ClimateSchedule {
        self.schedule
    }

    /// Replace the active schedule with a directly supplied one.
    ///
    /// Invalid schedules are rejected untouched.  A failed commit is
    /// reported, but the new schedule stays in effect.
    pub fn update_targets(
        &mut self,
        schedule: ClimateSchedule,
        store: &impl SchedulePort,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        schedule.validate()?;
        self.schedule = schedule;
        sink.emit(&AppEvent::TargetsUpdated);
        info!("Climate: targets updated");
        store.save_schedule(&schedule).map_err(|e| {
            warn!("Climate: failed to persist schedule: {}", e);
            Error::from(e)
        })
    }

    /// Switch to a species profile.  The profile's schedule also becomes
    /// the stored direct schedule so a reboot resumes it even if the
    /// species store is unavailable.
    pub fn apply_profile<S: StoragePort>(
        &mut self,
        species: &SpeciesStore<S>,
        key: &str,
        store: &impl SchedulePort,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        let schedule = species.apply(key)?;
        self.schedule = schedule;
        let profile_key = crate::species::profile::profile_key(key)?;
        sink.emit(&AppEvent::ProfileApplied(profile_key));
        if let Err(e) = store.save_schedule(&schedule) {
            warn!("Climate: failed to persist profile schedule: {}", e);
        }
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    /// Copy of the state produced by the last tick.
    pub fn get_state(&self) -> ClimateState {
        self.engine.state()
    }

    /// Attach drift against the current setpoints to a fresh snapshot.
    pub fn measurement(&self, sensors: SensorSnapshot, timestamp_ms: u64) -> ClimateMeasurement {
        let state = self.engine.state();
        ClimateMeasurement::derive(
            sensors,
            state.temp_setpoint_c,
            state.humidity_setpoint_pct,
            timestamp_ms,
        )
    }

    pub fn build_telemetry(&self, bus_degraded: bool, sensor_fault_mask: u8, uptime_secs: u64) -> TelemetryData {
        TelemetryData {
            state: self.engine.state(),
            temp_invalid_streak: self.engine.temp_invalid_streak(),
            humidity_invalid_streak: self.engine.humidity_invalid_streak(),
            bus_degraded,
            sensor_fault_mask,
            uptime_secs,
        }
    }

    /// Total control ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}
