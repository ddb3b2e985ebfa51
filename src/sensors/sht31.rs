//! Sensirion SHT31 temperature/humidity sensor.
//!
//! Single-shot, high repeatability, no clock stretching (command 0x2400).
//! The trigger and the read-out are two separate bus transactions so the
//! conversion wait does not hold the shared bus.
//!
//! ```text
//!  write [0x24, 0x00]   ── wait ≥ 15 ms ──   read [T_hi T_lo CRC RH_hi RH_lo CRC]
//! ```

use std::time::Duration;

use embedded_hal::i2c::I2c;

use crate::bus::BusArbiter;
use crate::climate::measurement::TempHumidity;
use crate::error::BusError;

pub const DEFAULT_ADDRESS: u8 = 0x44;
const CMD_SINGLE_SHOT_HIGH: [u8; 2] = [0x24, 0x00];
const CONVERSION_TIME: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sht31Error {
    Bus(BusError),
    /// A word failed its CRC-8 check.
    Crc,
}

impl core::fmt::Display for Sht31Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "SHT31 bus error: {}", e),
            Self::Crc => write!(f, "SHT31 CRC mismatch"),
        }
    }
}

impl From<BusError> for Sht31Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

/// CRC-8, polynomial 0x31, init 0xFF.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Decode a 6-byte measurement frame.
pub fn decode_frame(frame: &[u8; 6]) -> Result<TempHumidity, Sht31Error> {
    if crc8(&frame[0..2]) != frame[2] || crc8(&frame[3..5]) != frame[5] {
        return Err(Sht31Error::Crc);
    }
    let raw_t = f32::from(u16::from_be_bytes([frame[0], frame[1]]));
    let raw_rh = f32::from(u16::from_be_bytes([frame[3], frame[4]]));
    Ok(TempHumidity {
        temperature_c: -45.0 + 175.0 * raw_t / 65535.0,
        humidity_pct: (100.0 * raw_rh / 65535.0).clamp(0.0, 100.0),
    })
}

pub struct Sht31 {
    address: u8,
    channel_mask: u8,
    conversion_time: Duration,
}

impl Sht31 {
    pub fn new(address: u8, channel_mask: u8) -> Self {
        Self {
            address,
            channel_mask,
            conversion_time: CONVERSION_TIME,
        }
    }

    /// Override the conversion wait (tests use zero).
    pub fn with_conversion_time(mut self, wait: Duration) -> Self {
        self.conversion_time = wait;
        self
    }

    pub fn measure<I: I2c>(&self, bus: &BusArbiter<I>) -> Result<TempHumidity, Sht31Error> {
        let address = self.address;
        bus.exclusive(self.channel_mask, |i2c| i2c.write(address, &CMD_SINGLE_SHOT_HIGH))?;
        if !self.conversion_time.is_zero() {
            std::thread::sleep(self.conversion_time);
        }
        let mut frame = [0u8; 6];
        bus.exclusive(self.channel_mask, |i2c| i2c.read(address, &mut frame))?;
        decode_frame(&frame)
    }
}
