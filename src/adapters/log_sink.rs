//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).
//! A web-socket or MQTT adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

fn fmt_opt(v: Option<f32>) -> String {
    v.map_or_else(|| "--".into(), |x| format!("{:+.1}", x))
}

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Telemetry(t) => {
                let s = &t.state;
                info!(
                    "TELEM | {} | T={:.1}\u{00b0}C ({}) | RH={:.0}% ({}) | \
                     heater={} fan={}% lights={} uvi={:.1} | streaks={}/{} | \
                     bus={} | faults=0b{:05b} | up={}s",
                    if s.is_day { "day" } else { "night" },
                    s.temp_setpoint_c,
                    fmt_opt(s.temp_error_c),
                    s.humidity_setpoint_pct,
                    fmt_opt(s.humidity_error_pct),
                    if s.heater_on { "ON" } else { "off" },
                    s.fan_pwm_percent,
                    if s.lights_on { "ON" } else { "off" },
                    s.uvi_target,
                    t.temp_invalid_streak,
                    t.humidity_invalid_streak,
                    if t.bus_degraded { "DEGRADED" } else { "ok" },
                    t.sensor_fault_mask,
                    t.uptime_secs,
                );
            }
            AppEvent::PeriodChanged { is_day } => {
                info!("PERIOD | -> {}", if *is_day { "day" } else { "night" });
            }
            AppEvent::HeaterChanged { on } => {
                info!("HEATER | {}", if *on { "ON" } else { "off" });
            }
            AppEvent::HeaterFailSafe { streak } => {
                warn!("HEATER | fail-safe, no temperature for {} ticks", streak);
            }
            AppEvent::ProfileApplied(key) => {
                info!("PROFILE | applied {}", key);
            }
            AppEvent::TargetsUpdated => {
                info!("PROFILE | targets updated");
            }
            AppEvent::LightsFailed(e) => {
                warn!("BUS | dome write failed: {}", e);
            }
            AppEvent::Started(state) => {
                info!(
                    "START | {} | T={:.1}\u{00b0}C RH={:.0}%",
                    if state.is_day { "day" } else { "night" },
                    state.temp_setpoint_c,
                    state.humidity_setpoint_pct
                );
            }
        }
    }
}
