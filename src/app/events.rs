//! Outbound application events.
//!
//! The [`ClimateService`](super::service::ClimateService) emits these
//! through the [`EventSink`](super::ports::EventSink) port.  Adapters on
//! the other side decide what to do with them: log to serial, push to a
//! web socket, etc.

use crate::climate::ClimateState;
use crate::species::ProfileKey;

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Periodic telemetry snapshot.
    Telemetry(TelemetryData),

    /// The schedule crossed a day/night boundary.
    PeriodChanged { is_day: bool },

    /// Heater relay changed state.
    HeaterChanged { on: bool },

    /// No temperature reading for the fail-safe window; heater held off.
    HeaterFailSafe { streak: u8 },

    /// A species profile became the active schedule.
    ProfileApplied(ProfileKey),

    /// The directly configured schedule changed.
    TargetsUpdated,

    /// The dome could not be driven this tick.
    LightsFailed(crate::error::BusError),

    /// The service has started (carries the initial state).
    Started(ClimateState),
}

/// A point-in-time telemetry snapshot suitable for logging or transmission.
#[derive(Debug, Clone)]
pub struct TelemetryData {
    pub state: ClimateState,
    pub temp_invalid_streak: u8,
    pub humidity_invalid_streak: u8,
    pub bus_degraded: bool,
    pub sensor_fault_mask: u8,
    pub uptime_secs: u64,
}
