//! Hardware adapter: bridges real loads to the [`ActuatorPort`].
//!
//! Heater and fan are driven straight from GPIO / LEDC; the lighting dome
//! goes through the shared bus via [`LightingDome`].  On non-espidf
//! targets the GPIO and LEDC helpers are no-ops, so the adapter can be
//! exercised against a mock bus.

use embedded_hal::i2c::I2c;
use log::warn;

use crate::app::ports::ActuatorPort;
use crate::drivers::dome::LightingDome;
use crate::drivers::hw_init::{gpio_write, ledc_set, percent_to_duty};
use crate::error::BusError;
use crate::pins;

/// Concrete adapter that combines all loads behind the port trait.
pub struct HardwareAdapter<I> {
    dome: LightingDome<I>,
    heater_on: bool,
    fan_percent: u8,
}

impl<I: I2c> HardwareAdapter<I> {
    pub fn new(dome: LightingDome<I>) -> Self {
        Self {
            dome,
            heater_on: false,
            fan_percent: 0,
        }
    }

    pub fn heater_on(&self) -> bool {
        self.heater_on
    }

    pub fn fan_percent(&self) -> u8 {
        self.fan_percent
    }

    pub fn dome(&self) -> &LightingDome<I> {
        &self.dome
    }
}

// ── ActuatorPort implementation ───────────────────────────────

impl<I: I2c> ActuatorPort for HardwareAdapter<I> {
    fn set_heater(&mut self, on: bool) {
        gpio_write(pins::HEATER_SSR_GPIO, on);
        self.heater_on = on;
    }

    fn set_fan_pwm(&mut self, percent: u8) {
        let percent = percent.min(100);
        ledc_set(pins::FAN_LEDC_CHANNEL, percent_to_duty(percent));
        self.fan_percent = percent;
    }

    fn set_lights(&mut self, on: bool, uvi_target: f32) -> Result<(), BusError> {
        self.dome.set_lights(on, uvi_target)
    }

    fn all_off(&mut self) {
        self.set_heater(false);
        self.set_fan_pwm(0);
        if let Err(e) = self.dome.set_lights(false, 0.0) {
            warn!("HardwareAdapter: dome off failed: {}", e);
        }
    }
}
