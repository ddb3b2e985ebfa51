//! Shared I2C bus arbiter.
//!
//! One mutex serializes every transaction on the multiplexed bus (TCA9548A
//! in front of the lighting dome and the climate sensors).  Dome reads and
//! writes feed a [`BusHealth`] circuit breaker; once tripped, writes fail
//! immediately until three reads succeed or an operator rearms the bus.
//!
//! ```text
//!  actuator task ─┐
//!  sensor task   ─┼─▶ Mutex<BusInner> ─▶ mux ─┬─▶ ch0: dome (health tracked)
//!  request task  ─┘   (bounded wait)          └─▶ ch1: sensors (exclusive)
//! ```

pub mod health;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use embedded_hal::i2c::{Error as _, I2c};
use log::{error, info, warn};

use crate::config::SystemConfig;
use crate::error::BusError;
use crate::sync::lock_within;

pub use health::{BusHealth, HealthTransition};

/// Largest single register transfer, in bytes.
pub const MAX_TRANSFER: usize = 32;

/// Bus topology and lock budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    pub mux_address: u8,
    pub device_address: u8,
    /// Mux channel the health-tracked device sits on.
    pub device_channel_mask: u8,
    pub lock_timeout: Duration,
}

impl From<&SystemConfig> for BusConfig {
    fn from(cfg: &SystemConfig) -> Self {
        Self {
            mux_address: cfg.mux_address,
            device_address: cfg.dome_address,
            device_channel_mask: cfg.dome_channel_mask,
            lock_timeout: Duration::from_millis(u64::from(cfg.bus_lock_timeout_ms)),
        }
    }
}

struct BusInner<I> {
    i2c: I,
    health: BusHealth,
}

impl<I: I2c> BusInner<I> {
    /// Route the mux to `mask` unless it is already there.
    fn ensure_channel(&mut self, mux_address: u8, mask: u8) -> Result<(), I::Error> {
        if self.health.active_channel_mask == mask {
            return Ok(());
        }
        self.select(mux_address, mask)
    }

    fn select(&mut self, mux_address: u8, mask: u8) -> Result<(), I::Error> {
        match self.i2c.write(mux_address, &[mask]) {
            Ok(()) => {
                self.health.active_channel_mask = mask;
                Ok(())
            }
            Err(e) => {
                // Mux state is unknown after a failed select.
                self.health.active_channel_mask = 0;
                Err(e)
            }
        }
    }
}

pub struct BusArbiter<I> {
    inner: Mutex<BusInner<I>>,
    /// Mirror of `health.degraded`, written only under the mutex.
    degraded: AtomicBool,
    config: BusConfig,
}

impl<I: I2c> BusArbiter<I> {
    pub fn new(i2c: I, config: BusConfig) -> Self {
        Self {
            inner: Mutex::new(BusInner {
                i2c,
                health: BusHealth::default(),
            }),
            degraded: AtomicBool::new(false),
            config,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BusInner<I>>, BusError> {
        lock_within(&self.inner, self.config.lock_timeout).ok_or_else(|| {
            warn!("Bus: lock not acquired within {:?}", self.config.lock_timeout);
            BusError::Timeout
        })
    }

    /// Route the mux to `channel_mask`.
    pub fn select(&self, channel_mask: u8) -> Result<(), BusError> {
        let mut bus = self.lock()?;
        bus.select(self.config.mux_address, channel_mask)
            .map_err(|e| BusError::Transaction(e.kind()))
    }

    /// Read `len` bytes starting at `register` on the dome.
    pub fn read(&self, register: u8, len: usize) -> Result<heapless::Vec<u8, MAX_TRANSFER>, BusError> {
        if len > MAX_TRANSFER {
            return Err(BusError::TransferTooLarge);
        }
        let mut buf = [0u8; MAX_TRANSFER];
        self.read_into(register, &mut buf[..len])?;
        heapless::Vec::from_slice(&buf[..len]).map_err(|()| BusError::TransferTooLarge)
    }

    /// Read into a caller buffer starting at `register` on the dome.
    pub fn read_into(&self, register: u8, buf: &mut [u8]) -> Result<(), BusError> {
        if buf.len() > MAX_TRANSFER {
            return Err(BusError::TransferTooLarge);
        }
        let mut bus = self.lock()?;
        let BusConfig {
            mux_address,
            device_address,
            device_channel_mask,
            ..
        } = self.config;
        let result = bus
            .ensure_channel(mux_address, device_channel_mask)
            .and_then(|()| bus.i2c.write_read(device_address, &[register], buf));
        self.record(&mut bus, result)
    }

    /// Write `bytes` starting at `register` on the dome.
    ///
    /// Fails with [`BusError::Degraded`] without touching the wire while
    /// the breaker is open.
    pub fn write(&self, register: u8, bytes: &[u8]) -> Result<(), BusError> {
        if bytes.len() > MAX_TRANSFER {
            return Err(BusError::TransferTooLarge);
        }
        if self.is_degraded() {
            return Err(BusError::Degraded);
        }
        let mut bus = self.lock()?;
        if bus.health.degraded {
            return Err(BusError::Degraded);
        }
        let mut frame = [0u8; MAX_TRANSFER + 1];
        frame[0] = register;
        frame[1..=bytes.len()].copy_from_slice(bytes);

        let BusConfig {
            mux_address,
            device_address,
            device_channel_mask,
            ..
        } = self.config;
        let result = bus
            .ensure_channel(mux_address, device_channel_mask)
            .and_then(|()| bus.i2c.write(device_address, &frame[..=bytes.len()]));
        self.record(&mut bus, result)
    }

    /// Run `f` with exclusive access to the raw bus on `channel_mask`.
    ///
    /// Used by the sensor drivers.  Outcomes do not touch the dome's health
    /// streak.
    pub fn exclusive<R>(
        &self,
        channel_mask: u8,
        f: impl FnOnce(&mut I) -> Result<R, I::Error>,
    ) -> Result<R, BusError> {
        let mut bus = self.lock()?;
        bus.ensure_channel(self.config.mux_address, channel_mask)
            .map_err(|e| BusError::Transaction(e.kind()))?;
        f(&mut bus.i2c).map_err(|e| BusError::Transaction(e.kind()))
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Operator rearm: reset both streaks and leave degraded mode.
    pub fn clear_degraded(&self) -> Result<(), BusError> {
        let mut bus = self.lock()?;
        let was_degraded = bus.health.degraded;
        bus.health.clear();
        self.degraded.store(false, Ordering::Release);
        if was_degraded {
            info!("Bus: degraded mode cleared by operator");
        }
        Ok(())
    }

    /// Copy of the current health record.
    pub fn health(&self) -> Result<BusHealth, BusError> {
        Ok(self.lock()?.health)
    }

    /// Tear down the arbiter and hand back the bus driver.
    pub fn into_inner(self) -> I {
        match self.inner.into_inner() {
            Ok(inner) => inner.i2c,
            Err(poisoned) => poisoned.into_inner().i2c,
        }
    }

    fn record(
        &self,
        bus: &mut BusInner<I>,
        result: Result<(), I::Error>,
    ) -> Result<(), BusError> {
        match result {
            Ok(()) => {
                if bus.health.record_ok() == HealthTransition::Recovered {
                    self.degraded.store(false, Ordering::Release);
                    info!("Bus: recovered after {} good transactions", bus.health.consecutive_oks);
                }
                Ok(())
            }
            Err(e) => {
                let kind = e.kind();
                if bus.health.record_err() == HealthTransition::Tripped {
                    self.degraded.store(true, Ordering::Release);
                    error!(
                        "Bus: degraded after {} consecutive errors (last: {})",
                        bus.health.consecutive_errors, kind
                    );
                }
                Err(BusError::Transaction(kind))
            }
        }
    }
}
