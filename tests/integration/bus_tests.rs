//! Integration tests for the shared bus: arbitration between the dome and
//! the sensors, the circuit breaker, and the bounded lock wait.

use std::sync::{Arc, Barrier};
use std::time::Duration;

use terrarium::adapters::hardware::HardwareAdapter;
use terrarium::app::ports::{ActuatorPort, SensorPort};
use terrarium::bus::{BusArbiter, BusConfig, health::TRIP_AFTER_ERRORS};
use terrarium::drivers::dome::LightingDome;
use terrarium::error::BusError;
use terrarium::sensors::SensorHub;
use terrarium::sensors::sht31::{self, Sht31, crc8};

use crate::mocks::MockI2c;

const MUX: u8 = 0x70;
const DOME: u8 = 0x3A;
const DOME_CH: u8 = 0x01;
const SENSOR_CH: u8 = 0x02;

fn config(lock_ms: u64) -> BusConfig {
    BusConfig {
        mux_address: MUX,
        device_address: DOME,
        device_channel_mask: DOME_CH,
        lock_timeout: Duration::from_millis(lock_ms),
    }
}

/// SHT31 frame for roughly 25 °C / 50 %RH.
fn sht_frame() -> [u8; 6] {
    let t = [0x66, 0x66];
    let rh = [0x80, 0x00];
    [t[0], t[1], crc8(&t), rh[0], rh[1], crc8(&rh)]
}

#[test]
fn concurrent_dome_and_sensor_traffic_never_lands_on_the_wrong_channel() {
    let i2c = MockI2c::with_read_frame(&sht_frame());
    let wire = i2c.clone();
    // Generous wait: this test is about ordering, not timeouts.
    let bus = Arc::new(BusArbiter::new(i2c, config(1_000)));

    let dome_task = {
        let dome = LightingDome::new(Arc::clone(&bus));
        std::thread::spawn(move || {
            for i in 0..50 {
                dome.set_lights(i % 2 == 0, 2.0).unwrap();
            }
        })
    };
    let sensor_task = {
        let bus = Arc::clone(&bus);
        std::thread::spawn(move || {
            let sht = Sht31::new(sht31::DEFAULT_ADDRESS, SENSOR_CH)
                .with_conversion_time(Duration::ZERO);
            let mut hub = SensorHub::new(bus, sht, 0.5);
            for _ in 0..50 {
                let snap = hub.read_all();
                assert_eq!(snap.fault_mask, 0);
                assert!(snap.temp_filtered_c.is_some());
            }
        })
    };
    dome_task.join().unwrap();
    sensor_task.join().unwrap();

    let mut channel = 0u8;
    let mut dome_frames = 0;
    for (address, bytes) in wire.frames() {
        match address {
            MUX => channel = bytes[0],
            DOME => {
                assert_eq!(channel, DOME_CH, "dome frame on channel {channel:#04x}");
                dome_frames += 1;
            }
            a if a == sht31::DEFAULT_ADDRESS => {
                assert_eq!(channel, SENSOR_CH, "sensor frame on channel {channel:#04x}");
            }
            other => panic!("unexpected address {other:#04x}"),
        }
    }
    assert_eq!(dome_frames, 100, "two register blocks per set_lights");
}

#[test]
fn breaker_trips_blocks_dome_writes_and_recovers() {
    let i2c = MockI2c::new();
    let wire = i2c.clone();
    let bus = Arc::new(BusArbiter::new(i2c, config(50)));
    let dome = LightingDome::new(Arc::clone(&bus));

    wire.set_fail(true);
    for _ in 0..=TRIP_AFTER_ERRORS {
        assert!(matches!(
            dome.set_lights(true, 3.0),
            Err(BusError::Transaction(_))
        ));
    }
    assert!(bus.is_degraded());

    // Degraded writes never reach the wire.
    wire.set_fail(false);
    let frames_before = wire.frames().len();
    assert_eq!(dome.set_lights(true, 3.0), Err(BusError::Degraded));
    assert_eq!(wire.frames().len(), frames_before);

    // Status reads keep probing and close the breaker.
    for _ in 0..3 {
        dome.status().unwrap();
    }
    assert!(!bus.is_degraded());
    dome.set_lights(true, 3.0).unwrap();
}

#[test]
fn operator_rearm_clears_degraded_mode() {
    let i2c = MockI2c::new();
    let wire = i2c.clone();
    let bus = Arc::new(BusArbiter::new(i2c, config(50)));
    let dome = LightingDome::new(Arc::clone(&bus));

    wire.set_fail(true);
    for _ in 0..10 {
        let _ = dome.set_lights(false, 0.0);
    }
    assert!(bus.is_degraded());

    wire.set_fail(false);
    bus.clear_degraded().unwrap();
    assert!(!bus.is_degraded());
    dome.set_lights(false, 0.0).unwrap();
}

#[test]
fn held_bus_times_out_other_callers() {
    let bus = Arc::new(BusArbiter::new(MockI2c::new(), config(10)));
    let entered = Arc::new(Barrier::new(2));

    let holder = {
        let bus = Arc::clone(&bus);
        let entered = Arc::clone(&entered);
        std::thread::spawn(move || {
            bus.exclusive(SENSOR_CH, |_i2c| {
                entered.wait();
                std::thread::sleep(Duration::from_millis(150));
                Ok(())
            })
            .unwrap();
        })
    };

    entered.wait();
    assert_eq!(bus.write(0x02, &[0; 4]), Err(BusError::Timeout));
    holder.join().unwrap();

    // A timeout is not a transaction failure.
    assert_eq!(bus.health().unwrap().consecutive_errors, 0);
    bus.write(0x02, &[0; 4]).unwrap();
}

#[test]
fn hardware_adapter_surfaces_dome_errors() {
    let i2c = MockI2c::new();
    let wire = i2c.clone();
    let bus = Arc::new(BusArbiter::new(i2c, config(50)));
    let mut hw = HardwareAdapter::new(LightingDome::new(bus));

    hw.set_heater(true);
    hw.set_fan_pwm(40);
    assert!(hw.heater_on());
    assert_eq!(hw.fan_percent(), 40);
    hw.set_lights(true, 2.0).unwrap();

    wire.set_fail(true);
    assert!(hw.set_lights(true, 2.0).is_err());

    hw.all_off();
    assert!(!hw.heater_on());
    assert_eq!(hw.fan_percent(), 0);
}

#[test]
fn sensor_port_reads_through_the_mux() {
    let i2c = MockI2c::with_read_frame(&sht_frame());
    let wire = i2c.clone();
    let bus = Arc::new(BusArbiter::new(i2c, config(50)));
    let sht = Sht31::new(sht31::DEFAULT_ADDRESS, SENSOR_CH).with_conversion_time(Duration::ZERO);
    let mut sensors = SensorHub::new(bus, sht, 1.0);

    let snap = sensors.read_snapshot();
    assert_eq!(snap.fault_mask, 0);
    let t = snap.temp_filtered_c.unwrap();
    assert!((t - 25.0).abs() < 0.5, "temperature {t}");
    assert_eq!(wire.frames()[0], (MUX, vec![SENSOR_CH]));

    wire.set_fail(true);
    let snap = sensors.read_snapshot();
    assert_ne!(snap.fault_mask, 0);
    assert!(snap.sht31.is_none());
}
