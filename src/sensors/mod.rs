//! Sensor subsystem: individual drivers and the aggregating [`SensorHub`].
//!
//! The hub owns the sensor drivers and produces a [`SensorSnapshot`] on
//! every acquisition cycle.  Failed reads clear the sensor's slot and set
//! its fault bit; the filtered aggregate follows whichever direct reading
//! is best this cycle.

pub mod sht31;

use std::sync::Arc;

use embedded_hal::i2c::I2c;
use log::warn;

use crate::app::ports::SensorPort;
use crate::bus::BusArbiter;
use crate::climate::measurement::SensorSnapshot;
use crate::error::SensorFault;
use sht31::Sht31;

/// Exponential moving average; `None` until the first sample.
#[derive(Debug, Clone, Copy)]
pub struct Ema {
    alpha: f32,
    value: Option<f32>,
}

impl Ema {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(f32::EPSILON, 1.0),
            value: None,
        }
    }

    pub fn update(&mut self, sample: f32) -> f32 {
        let next = match self.value {
            Some(prev) => prev + self.alpha * (sample - prev),
            None => sample,
        };
        self.value = Some(next);
        next
    }
}

/// Aggregates the bus-attached climate sensors.
pub struct SensorHub<I> {
    bus: Arc<BusArbiter<I>>,
    sht31: Sht31,
    temp_filter: Ema,
    humidity_filter: Ema,
    consecutive_failures: u32,
}

impl<I: I2c> SensorHub<I> {
    pub fn new(bus: Arc<BusArbiter<I>>, sht31: Sht31, filter_alpha: f32) -> Self {
        Self {
            bus,
            sht31,
            temp_filter: Ema::new(filter_alpha),
            humidity_filter: Ema::new(filter_alpha),
            consecutive_failures: 0,
        }
    }

    /// Read every sensor and return a unified snapshot.
    pub fn read_all(&mut self) -> SensorSnapshot {
        let mut snap = SensorSnapshot::default();

        match self.sht31.measure(&self.bus) {
            Ok(reading) => {
                self.consecutive_failures = 0;
                snap.sht31 = Some(reading);
            }
            Err(e) => {
                self.consecutive_failures += 1;
                // Log the first failure and then every 60th to keep the console usable.
                if self.consecutive_failures % 60 == 1 {
                    warn!("SensorHub: {} (x{})", e, self.consecutive_failures);
                }
                snap.fault_mask |= SensorFault::Sht31.mask();
            }
        }

        if let Some(t) = snap.best_temperature() {
            snap.temp_filtered_c = Some(self.temp_filter.update(t));
        }
        if let Some(rh) = snap.best_humidity() {
            snap.humidity_filtered_pct = Some(self.humidity_filter.update(rh));
        }
        snap
    }
}

impl<I: I2c> SensorPort for SensorHub<I> {
    fn read_snapshot(&mut self) -> SensorSnapshot {
        self.read_all()
    }
}
