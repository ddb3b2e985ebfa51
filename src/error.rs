//! Unified error types for the terrarium firmware.
//!
//! Every public operation returns [`Result`], whose error side is a single
//! `Copy` enum.  Subsystem errors (bus, storage) keep their own enums and
//! convert via `From`, so `?` works across module boundaries without
//! allocation.

use core::fmt;

use crate::app::ports::StorageError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A schedule or profile field is outside its configured bounds.
    /// Nothing was mutated or persisted.
    InvalidArgument(&'static str),
    /// The operation needs initialisation that has not happened, or a
    /// stored/imported blob failed to parse.
    InvalidState(&'static str),
    /// Unknown profile key, or no value published yet.
    NotFound,
    /// A bounded lock wait (bus or measurement) elapsed.
    Timeout,
    /// Pool or profile table is full.
    ResourceExhausted,
    /// Import signature did not verify.
    AuthenticationFailed,
    /// A bus transaction was attempted and failed, or the bus is degraded.
    Bus(BusError),
    /// Persistent storage rejected a read or commit.
    Storage(StorageError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::NotFound => write!(f, "not found"),
            Self::Timeout => write!(f, "timed out"),
            Self::ResourceExhausted => write!(f, "resource exhausted"),
            Self::AuthenticationFailed => write!(f, "authentication failed"),
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Bus errors
// ---------------------------------------------------------------------------

/// Outcome of a failed [`BusArbiter`](crate::bus::BusArbiter) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The bus mutex was not acquired within the configured wait.
    Timeout,
    /// Writes are suspended until the health streak recovers or an
    /// operator rearms the bus.
    Degraded,
    /// The transaction reached the wire and failed.
    Transaction(embedded_hal::i2c::ErrorKind),
    /// Requested transfer is larger than the arbiter's scratch buffer.
    TransferTooLarge,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "bus lock timeout"),
            Self::Degraded => write!(f, "bus degraded"),
            Self::Transaction(kind) => write!(f, "transaction failed: {kind}"),
            Self::TransferTooLarge => write!(f, "transfer too large"),
        }
    }
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        match e {
            BusError::Timeout => Self::Timeout,
            BusError::TransferTooLarge => Self::InvalidArgument("bus transfer too large"),
            other => Self::Bus(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Sensor faults
// ---------------------------------------------------------------------------

/// Per-sensor fault bits carried in a snapshot's `fault_mask`.
///
/// Bits are set by the acquisition task when a sensor that is expected to
/// be present fails to answer; the climate engine itself only looks at
/// presence, never at this mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SensorFault {
    /// First DS18B20 probe.
    Probe1 = 0b0000_0001,
    /// Second DS18B20 probe.
    Probe2 = 0b0000_0010,
    Sht31 = 0b0000_0100,
    Sht21 = 0b0000_1000,
    Bme280 = 0b0001_0000,
}

impl SensorFault {
    /// Return the bitmask for this fault.
    pub const fn mask(self) -> u8 {
        self as u8
    }

    /// Whether this fault's bit is set in `mask`.
    pub const fn is_set(self, mask: u8) -> bool {
        mask & self.mask() != 0
    }
}

impl fmt::Display for SensorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Probe1 => write!(f, "probe 1"),
            Self::Probe2 => write!(f, "probe 2"),
            Self::Sht31 => write!(f, "SHT31"),
            Self::Sht21 => write!(f, "SHT21"),
            Self::Bme280 => write!(f, "BME280"),
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
