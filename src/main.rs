//! Terrarium Controller Firmware: Main Entry Point
//!
//! Hexagonal architecture with three cooperating periodic tasks.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter   LogEventSink   NvsAdapter     Esp32Time     │
//! │  (ActuatorPort)    (EventSink)    (Config+Sched) (ClockPort)   │
//! │  SensorHub         SpeciesStore<NvsAdapter>                    │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │           ClimateService (pure logic)                  │    │
//! │  │  schedule · ClimateEngine                              │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  BusArbiter (shared I2C, bounded wait, circuit breaker)        │
//! └────────────────────────────────────────────────────────────────┘
//!
//!  sensor task ──▶ MeasurementCell ──▶ actuator task ──▶ loads / dome
//!  button task ──▶ BusArbiter::clear_degraded (long press)
//! ```
#![deny(unused_must_use)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::units::Hertz;
use log::{error, info, warn};

use terrarium::adapters::hardware::HardwareAdapter;
use terrarium::adapters::log_sink::LogEventSink;
use terrarium::adapters::nvs::NvsAdapter;
use terrarium::adapters::time::Esp32TimeAdapter;
use terrarium::app::events::AppEvent;
use terrarium::app::ports::{ActuatorPort, ClockPort, ConfigPort, EventSink, SensorPort};
use terrarium::app::service::ClimateService;
use terrarium::bus::{BusArbiter, BusConfig};
use terrarium::climate::MeasurementCell;
use terrarium::climate::measurement::STALE_AFTER_READS;
use terrarium::drivers::button::{ButtonDriver, ButtonEvent};
use terrarium::drivers::dome::LightingDome;
use terrarium::drivers::hw_init;
use terrarium::pins;
use terrarium::sensors::SensorHub;
use terrarium::sensors::sht31::{self, Sht31};
use terrarium::species::{self, LoadOutcome, SpeciesStore};

const TASK_STACK_BYTES: usize = 8 * 1024;
const BUTTON_POLL_MS: u64 = 10;

type Bus = BusArbiter<I2cDriver<'static>>;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Terrarium v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    if let Err(e) = hw_init::init_peripherals() {
        // Loads cannot be driven safely without GPIO/LEDC; the task
        // watchdog resets the chip.
        error!("HAL init failed: {}, halting", e);
        #[allow(clippy::empty_loop)]
        loop {}
    }

    // ── 2. Configuration ──────────────────────────────────────
    let nvs = NvsAdapter::new().map_err(|e| anyhow!("NVS init: {}", e))?;
    let config = nvs.load().map_err(|e| anyhow!("config load: {}", e))?;
    info!("Config: {:?}", config);

    // ── 3. Shared bus ─────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let i2c_config = I2cConfig::new().baudrate(Hertz(pins::I2C_FREQ_HZ));
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio8,
        peripherals.pins.gpio9,
        &i2c_config,
    )?;
    let bus: Arc<Bus> = Arc::new(BusArbiter::new(i2c, BusConfig::from(&config)));

    // ── 4. Species catalog + climate service ──────────────────
    // NVS is already initialised; this opens a second handle for the
    // species namespace.
    let species_nvs = NvsAdapter::new().map_err(|e| anyhow!("NVS init: {}", e))?;
    let species = SpeciesStore::new(species_nvs);
    match species.load() {
        Ok(LoadOutcome::MigrationUncommitted(e)) => {
            warn!("Species: legacy profiles in use but not yet committed: {}", e);
        }
        Ok(_) => {}
        Err(e) => {
            warn!("Species: catalog unusable ({}), starting empty", e);
            species.recover_empty()?;
        }
    }

    let mut log_sink = LogEventSink::new();
    let mut service = ClimateService::init(&nvs);
    if species.active_key()?.is_none() {
        let key = species::default_builtin().key;
        if let Err(e) = service.apply_profile(&species, key, &nvs, &mut log_sink) {
            warn!("Species: default profile '{}' not applied: {}", key, e);
        }
    }
    service.start(&mut log_sink);
    let service = Arc::new(Mutex::new(service));

    let measurements = Arc::new(MeasurementCell::new(Duration::from_millis(u64::from(
        config.measurement_lock_timeout_ms,
    ))));

    // ── 5. Sensor task ────────────────────────────────────────
    {
        let bus = Arc::clone(&bus);
        let service = Arc::clone(&service);
        let measurements = Arc::clone(&measurements);
        let interval = Duration::from_millis(u64::from(config.sensor_read_interval_ms));
        let sht = Sht31::new(sht31::DEFAULT_ADDRESS, config.sensor_channel_mask);
        let alpha = config.sensor_filter_alpha;

        std::thread::Builder::new()
            .name("sensors".into())
            .stack_size(TASK_STACK_BYTES)
            .spawn(move || {
                let clock = Esp32TimeAdapter::new();
                let mut hub = SensorHub::new(bus, sht, alpha);
                loop {
                    let snapshot = hub.read_snapshot();
                    let measurement = match service.lock() {
                        Ok(svc) => svc.measurement(snapshot, clock.uptime_ms()),
                        Err(poisoned) => poisoned.into_inner().measurement(snapshot, clock.uptime_ms()),
                    };
                    if let Err(e) = measurements.publish(measurement) {
                        warn!("Sensors: measurement not published: {}", e);
                    }
                    std::thread::sleep(interval);
                }
            })?;
    }

    // ── 6. Button task ────────────────────────────────────────
    {
        let bus = Arc::clone(&bus);
        std::thread::Builder::new()
            .name("button".into())
            .stack_size(TASK_STACK_BYTES / 2)
            .spawn(move || {
                let clock = Esp32TimeAdapter::new();
                let mut button = ButtonDriver::new(pins::BUTTON_GPIO);
                loop {
                    match button.poll(clock.uptime_ms() as u32) {
                        Some(ButtonEvent::LongPress) => {
                            info!("Button: long press → rearm bus");
                            if let Err(e) = bus.clear_degraded() {
                                warn!("Button: bus rearm failed: {}", e);
                            }
                        }
                        Some(ButtonEvent::ShortPress) => info!("Button: short press"),
                        None => {}
                    }
                    std::thread::sleep(Duration::from_millis(BUTTON_POLL_MS));
                }
            })?;
    }

    // ── 7. Actuator loop (main task) ──────────────────────────
    let clock = Esp32TimeAdapter::new();
    let mut hw = HardwareAdapter::new(LightingDome::new(Arc::clone(&bus)));
    // Loads stay de-energised until the first tick decides otherwise.
    hw.all_off();
    let tick = Duration::from_millis(u64::from(config.control_loop_interval_ms));
    let max_measurement_age_ms = u64::from(config.sensor_read_interval_ms) * STALE_AFTER_READS;
    let telemetry_every_ms = u64::from(config.telemetry_interval_secs) * 1000;
    let mut last_telemetry_ms = 0u64;

    info!("System ready. Entering control loop.");

    loop {
        // A missing, contended or stale measurement counts as "no reading"
        // and feeds the engine's fail-safe streak.
        let snapshot = measurements.snapshot_for_tick(clock.uptime_ms(), max_measurement_age_ms);

        let mut svc = match service.lock() {
            Ok(svc) => svc,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Until SNTP sets the wall clock the schedule holds its day period.
        let minute = clock
            .minute_of_day()
            .unwrap_or_else(|| svc.get_schedule().day_start_minute);
        svc.tick(&snapshot, minute, &mut hw, &mut log_sink);

        let now_ms = clock.uptime_ms();
        if now_ms.saturating_sub(last_telemetry_ms) >= telemetry_every_ms {
            last_telemetry_ms = now_ms;
            let t = svc.build_telemetry(bus.is_degraded(), snapshot.fault_mask, clock.uptime_secs());
            log_sink.emit(&AppEvent::Telemetry(t));
        }
        drop(svc);

        std::thread::sleep(tick);
    }
}
