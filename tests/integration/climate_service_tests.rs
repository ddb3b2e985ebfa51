//! Integration tests for the ClimateService → ClimateEngine → actuators
//! pipeline, run against mock ports.

use std::sync::Arc;
use std::time::Duration;

use terrarium::app::events::AppEvent;
use terrarium::app::service::ClimateService;
use terrarium::climate::{ClimateMeasurement, ClimateSchedule, MeasurementCell, SensorSnapshot};
use terrarium::climate::engine::FAIL_SAFE_TICKS;
use terrarium::climate::measurement::STALE_AFTER_READS;
use terrarium::error::{BusError, Error};
use terrarium::species::{SpeciesStore, find_builtin};

use crate::mocks::{MockActuators, MockNvs, RecordingSink};

const NOON: u16 = 12 * 60;
const MIDNIGHT: u16 = 0;

fn reading(temp: f32, rh: f32) -> SensorSnapshot {
    SensorSnapshot {
        temp_filtered_c: Some(temp),
        humidity_filtered_pct: Some(rh),
        ..SensorSnapshot::default()
    }
}

fn started() -> (ClimateService, MockActuators, RecordingSink) {
    let mut svc = ClimateService::new(ClimateSchedule::default());
    let mut sink = RecordingSink::new();
    svc.start(&mut sink);
    (svc, MockActuators::new(), sink)
}

// ── Regulation ────────────────────────────────────────────────

#[test]
fn heater_follows_hysteresis_band() {
    // Day: 32 °C with a 1.5 °C band → on below 31.25, off above 32.75.
    let (mut svc, mut hw, mut sink) = started();

    svc.tick(&reading(31.0, 55.0), NOON, &mut hw, &mut sink);
    assert!(hw.heater_on());

    svc.tick(&reading(32.5, 55.0), NOON, &mut hw, &mut sink);
    assert!(hw.heater_on(), "inside the band the heater holds");

    svc.tick(&reading(33.0, 55.0), NOON, &mut hw, &mut sink);
    assert!(!hw.heater_on());

    svc.tick(&reading(31.5, 55.0), NOON, &mut hw, &mut sink);
    assert!(!hw.heater_on(), "inside the band the heater stays off");

    let changes = sink.count(|e| matches!(e, AppEvent::HeaterChanged { .. }));
    assert_eq!(changes, 2);
}

#[test]
fn missing_temperature_forces_heater_off_after_grace_ticks() {
    let (mut svc, mut hw, mut sink) = started();
    svc.tick(&reading(25.0, 55.0), NOON, &mut hw, &mut sink);
    assert!(hw.heater_on());

    let blind = SensorSnapshot::default();
    for _ in 1..FAIL_SAFE_TICKS {
        svc.tick(&blind, NOON, &mut hw, &mut sink);
        assert!(hw.heater_on(), "heater holds during the grace window");
    }
    svc.tick(&blind, NOON, &mut hw, &mut sink);
    assert!(!hw.heater_on());

    // Staying blind does not repeat the fail-safe event.
    svc.tick(&blind, NOON, &mut hw, &mut sink);
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::HeaterFailSafe { .. })),
        1
    );

    // A reading rearms regulation.
    svc.tick(&reading(25.0, 55.0), NOON, &mut hw, &mut sink);
    assert!(hw.heater_on());
    assert_eq!(svc.build_telemetry(false, 0, 0).temp_invalid_streak, 0);
}

#[test]
fn humidity_above_band_runs_fan_flat_out() {
    let (mut svc, mut hw, mut sink) = started();
    // Day humidity 55 % with a 6 % band.
    svc.tick(&reading(32.0, 62.0), NOON, &mut hw, &mut sink);
    assert_eq!(hw.fan(), Some(100));

    svc.tick(&reading(32.0, 55.0), NOON, &mut hw, &mut sink);
    let base = hw.fan().unwrap();
    assert!(base > 0 && base < 100);
}

#[test]
fn overnight_day_window_wraps_midnight() {
    let schedule = ClimateSchedule {
        day_start_minute: 20 * 60,
        night_start_minute: 6 * 60,
        ..ClimateSchedule::default()
    };
    let mut svc = ClimateService::new(schedule);
    let (mut hw, mut sink) = (MockActuators::new(), RecordingSink::new());

    assert!(svc.tick(&reading(30.0, 60.0), MIDNIGHT, &mut hw, &mut sink).is_day);
    assert!(!svc.tick(&reading(30.0, 60.0), NOON, &mut hw, &mut sink).is_day);
    assert!(svc.tick(&reading(30.0, 60.0), 23 * 60, &mut hw, &mut sink).is_day);
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::PeriodChanged { .. })),
        2
    );
}

#[test]
fn night_uses_night_setpoints_and_lights_off() {
    let (mut svc, mut hw, mut sink) = started();
    let state = svc.tick(&reading(23.0, 70.0), MIDNIGHT, &mut hw, &mut sink);
    assert!(!state.is_day);
    assert!(!state.lights_on);
    assert_eq!(state.temp_setpoint_c, 24.0);
    assert_eq!(state.uvi_target, ClimateSchedule::default().night_uvi_max);
    assert!(hw.calls.contains(&crate::mocks::ActuatorCall::Lights {
        on: false,
        uvi: state.uvi_target
    }));
}

// ── Dome writes ───────────────────────────────────────────────

#[test]
fn lights_are_written_only_on_change() {
    let (mut svc, mut hw, mut sink) = started();
    for _ in 0..5 {
        svc.tick(&reading(32.0, 55.0), NOON, &mut hw, &mut sink);
    }
    assert_eq!(hw.light_writes(), 1);

    svc.tick(&reading(24.0, 70.0), MIDNIGHT, &mut hw, &mut sink);
    assert_eq!(hw.light_writes(), 2);
}

#[test]
fn failed_dome_write_is_retried_next_tick() {
    let (mut svc, mut hw, mut sink) = started();
    hw.lights_error = Some(BusError::Degraded);

    svc.tick(&reading(32.0, 55.0), NOON, &mut hw, &mut sink);
    svc.tick(&reading(32.0, 55.0), NOON, &mut hw, &mut sink);
    assert_eq!(hw.light_writes(), 2);
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::LightsFailed(BusError::Degraded))),
        2
    );

    hw.lights_error = None;
    svc.tick(&reading(32.0, 55.0), NOON, &mut hw, &mut sink);
    svc.tick(&reading(32.0, 55.0), NOON, &mut hw, &mut sink);
    assert_eq!(hw.light_writes(), 3);
    // Heater and fan are driven regardless of the dome.
    assert_eq!(svc.tick_count(), 4);
}

// ── Schedule operations ───────────────────────────────────────

#[test]
fn update_targets_validates_and_persists() {
    let (mut svc, _hw, mut sink) = started();
    let nvs = MockNvs::new();

    let mut bad = ClimateSchedule::default();
    bad.day.temp_hysteresis_c = 0.0;
    assert!(matches!(
        svc.update_targets(bad, &nvs, &mut sink),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(svc.get_schedule(), ClimateSchedule::default());
    assert_eq!(*nvs.schedule.lock().unwrap(), None);

    let mut good = ClimateSchedule::default();
    good.day.temperature_c = 34.0;
    svc.update_targets(good, &nvs, &mut sink).unwrap();
    assert_eq!(svc.get_schedule(), good);
    assert_eq!(*nvs.schedule.lock().unwrap(), Some(good));
    assert_eq!(sink.count(|e| matches!(e, AppEvent::TargetsUpdated)), 1);
}

#[test]
fn update_targets_keeps_new_schedule_when_commit_fails() {
    let (mut svc, _hw, mut sink) = started();
    let nvs = MockNvs::new();
    nvs.set_fail_writes(true);

    let mut s = ClimateSchedule::default();
    s.night.temperature_c = 20.0;
    assert!(matches!(
        svc.update_targets(s, &nvs, &mut sink),
        Err(Error::Storage(_))
    ));
    assert_eq!(svc.get_schedule(), s);
}

#[test]
fn apply_profile_switches_schedule_and_persists_it() {
    let (mut svc, mut hw, mut sink) = started();
    let nvs = MockNvs::new();
    let species = SpeciesStore::new(nvs.clone());
    species.load().unwrap();

    let gecko = find_builtin("builtin:eublepharis_macularius").unwrap();
    svc.apply_profile(&species, gecko.key, &nvs, &mut sink).unwrap();

    assert_eq!(svc.get_schedule(), gecko.schedule);
    assert_eq!(*nvs.schedule.lock().unwrap(), Some(gecko.schedule));
    assert_eq!(species.active_key().unwrap().as_deref(), Some(gecko.key));
    assert!(sink
        .events
        .iter()
        .any(|e| matches!(e, AppEvent::ProfileApplied(k) if k.as_str() == gecko.key)));

    let state = svc.tick(&reading(20.0, 40.0), NOON, &mut hw, &mut sink);
    assert_eq!(state.temp_setpoint_c, gecko.schedule.day.temperature_c);

    assert_eq!(
        svc.apply_profile(&species, "custom:nope", &nvs, &mut sink),
        Err(Error::NotFound)
    );
    assert_eq!(svc.get_schedule(), gecko.schedule);
}

#[test]
fn init_resumes_the_stored_schedule() {
    let nvs = MockNvs::new();
    let mut stored = ClimateSchedule::default();
    stored.day.temperature_c = 27.5;
    *nvs.schedule.lock().unwrap() = Some(stored);

    let svc = ClimateService::init(&nvs);
    assert_eq!(svc.get_schedule(), stored);
    assert_eq!(
        ClimateService::init(&MockNvs::new()).get_schedule(),
        ClimateSchedule::default()
    );
}

// ── Measurement record ────────────────────────────────────────

#[test]
fn measurement_cell_hands_out_whole_copies() {
    let cell = Arc::new(MeasurementCell::new(Duration::from_millis(50)));
    assert_eq!(cell.get(), Err(Error::NotFound));

    let svc = ClimateService::new(ClimateSchedule::default());
    let writer = {
        let cell = Arc::clone(&cell);
        std::thread::spawn(move || {
            for i in 0..200u64 {
                let t = 20.0 + (i % 10) as f32;
                let m = svc.measurement(reading(t, t * 2.0), i);
                cell.publish(m).unwrap();
            }
        })
    };

    let mut seen = 0;
    while seen < 200 {
        if let Ok(m) = cell.get() {
            let ClimateMeasurement { sensors, .. } = m;
            let t = sensors.temp_filtered_c.unwrap();
            // Temperature and humidity always come from the same publish.
            assert_eq!(sensors.humidity_filtered_pct, Some(t * 2.0));
            assert_eq!(m.temp_drift_c, Some(t - 32.0));
        }
        seen += 1;
    }
    writer.join().unwrap();
    assert_eq!(cell.get().unwrap().timestamp_ms, 199);
}

#[test]
fn frozen_measurement_trips_the_fail_safe() {
    const READ_INTERVAL_MS: u64 = 2_000;
    let max_age = READ_INTERVAL_MS * STALE_AFTER_READS;
    let (mut svc, mut hw, mut sink) = started();
    let cell = MeasurementCell::new(Duration::from_millis(10));

    // The acquisition task publishes once, then stops.
    cell.publish(svc.measurement(reading(25.0, 55.0), 0)).unwrap();

    let mut now = 0;
    let snap = cell.snapshot_for_tick(now, max_age);
    svc.tick(&snap, NOON, &mut hw, &mut sink);
    assert!(hw.heater_on());

    // Still fresh: regulation continues on the last reading.
    now = max_age;
    let snap = cell.snapshot_for_tick(now, max_age);
    assert_eq!(snap.temp_filtered_c, Some(25.0));
    svc.tick(&snap, NOON, &mut hw, &mut sink);
    assert!(hw.heater_on());

    for _ in 0..FAIL_SAFE_TICKS {
        now += 1_000;
        let snap = cell.snapshot_for_tick(now, max_age);
        assert_eq!(snap, SensorSnapshot::default());
        svc.tick(&snap, NOON, &mut hw, &mut sink);
    }
    assert!(!hw.heater_on());
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::HeaterFailSafe { .. })),
        1
    );
}
