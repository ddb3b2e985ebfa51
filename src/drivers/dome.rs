//! Lighting dome register protocol.
//!
//! The dome is a register-mapped I2C peripheral behind the mux.  All
//! multi-byte fields are little-endian u16.  Every access goes through the
//! [`BusArbiter`], so dome traffic feeds the bus health breaker.

use std::sync::Arc;

use embedded_hal::i2c::I2c;

use crate::bus::BusArbiter;
use crate::error::BusError;

// ── Register map ─────────────────────────────────────────────

pub const REG_STATUS: u8 = 0x00;
pub const REG_MODE: u8 = 0x01;
/// `[day_lo, day_hi, warm_lo, warm_hi]`, permille.
pub const REG_BLOCK_CCT: u8 = 0x02;
pub const BLOCK_CCT_LEN: usize = 4;
/// `[set_lo, set_hi, clamp_lo, clamp_hi]`, permille.
pub const REG_BLOCK_UVA: u8 = 0x06;
pub const BLOCK_UVA_LEN: usize = 4;
/// `[irradiance_lo, irradiance_hi, index_lo, index_hi]`, Q8.8.
pub const REG_BLOCK_UVI: u8 = 0x12;
pub const BLOCK_UVI_LEN: usize = 4;

// STATUS bits
pub const ST_OVER_TEMP: u8 = 1 << 0;
pub const ST_UVA_LIMIT: u8 = 1 << 1;
pub const ST_UVB_LIMIT: u8 = 1 << 2;
pub const ST_FAN_FAIL: u8 = 1 << 3;
pub const ST_BUS_LOSS: u8 = 1 << 4;
pub const ST_INTERLOCK: u8 = 1 << 5;
pub const ST_THERM_HARD: u8 = 1 << 6;
pub const ST_UVI_FAULT: u8 = 1 << 7;

/// Daylight channel level while lights are on.
const CCT_DAY_PERMILLE: u16 = 1000;
/// Warm channel level while lights are on.
const CCT_WARM_PERMILLE: u16 = 250;
/// UV index produced by the UVA channel at full drive.
const UVA_FULL_SCALE_UVI: f32 = 10.0;

/// Decoded STATUS register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomeStatus(pub u8);

impl DomeStatus {
    pub fn over_temperature(self) -> bool {
        self.0 & (ST_OVER_TEMP | ST_THERM_HARD) != 0
    }

    pub fn interlock_open(self) -> bool {
        self.0 & ST_INTERLOCK != 0
    }

    pub fn uvi_fault(self) -> bool {
        self.0 & ST_UVI_FAULT != 0
    }

    pub fn any_fault(self) -> bool {
        self.0 != 0
    }
}

/// Permille UVA drive that yields `uvi` on the dome's calibration.
pub fn uva_permille_for(uvi: f32) -> u16 {
    if !uvi.is_finite() || uvi <= 0.0 {
        return 0;
    }
    ((uvi / UVA_FULL_SCALE_UVI).min(1.0) * 1000.0).round() as u16
}

fn block(a: u16, b: u16) -> [u8; 4] {
    let [a0, a1] = a.to_le_bytes();
    let [b0, b1] = b.to_le_bytes();
    [a0, a1, b0, b1]
}

pub struct LightingDome<I> {
    bus: Arc<BusArbiter<I>>,
}

impl<I: I2c> LightingDome<I> {
    pub fn new(bus: Arc<BusArbiter<I>>) -> Self {
        Self { bus }
    }

    /// Drive the white channels and the UVA channel.  Off writes zeros.
    pub fn set_lights(&self, on: bool, uvi_target: f32) -> Result<(), BusError> {
        let cct = if on {
            block(CCT_DAY_PERMILLE, CCT_WARM_PERMILLE)
        } else {
            block(0, 0)
        };
        self.bus.write(REG_BLOCK_CCT, &cct)?;

        let uva = if on { uva_permille_for(uvi_target) } else { 0 };
        self.bus.write(REG_BLOCK_UVA, &block(uva, uva))
    }

    pub fn status(&self) -> Result<DomeStatus, BusError> {
        let mut buf = [0u8; 1];
        self.bus.read_into(REG_STATUS, &mut buf)?;
        Ok(DomeStatus(buf[0]))
    }

    /// UV index measured by the dome's sensor.
    pub fn measured_uvi(&self) -> Result<f32, BusError> {
        let mut buf = [0u8; BLOCK_UVI_LEN];
        self.bus.read_into(REG_BLOCK_UVI, &mut buf)?;
        let q8 = u16::from_le_bytes([buf[2], buf[3]]);
        Ok(f32::from(q8) / 256.0)
    }

    pub fn bus(&self) -> &Arc<BusArbiter<I>> {
        &self.bus
    }
}
