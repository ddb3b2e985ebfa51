//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ClimateService / SpeciesStore (domain)
//! ```
//!
//! Driven adapters (sensors, actuators, event sinks, storage, clock)
//! implement these traits.  The domain consumes them via generics, so it
//! never touches hardware directly.
//!
//! ## Contract notes
//!
//! - **ConfigPort** and **SchedulePort** implementations MUST validate
//!   before persisting.
//! - All port errors are typed; callers must handle every variant explicitly.

use crate::climate::measurement::SensorSnapshot;
use crate::climate::schedule::ClimateSchedule;
use crate::config::SystemConfig;
use crate::error::BusError;

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port used by the acquisition task.
pub trait SensorPort {
    /// Read every sensor and return a unified snapshot.
    fn read_snapshot(&mut self) -> SensorSnapshot;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port: the control loop commands loads through this.
pub trait ActuatorPort {
    /// Energise or release the heater relay.
    fn set_heater(&mut self, on: bool);

    /// Set the ventilation fan duty (0–100).
    fn set_fan_pwm(&mut self, percent: u8);

    /// Switch the lighting dome; `uvi_target` drives the UVA channel.
    /// Goes over the shared bus and can fail.
    fn set_lights(&mut self, on: bool, uvi_target: f32) -> Result<(), BusError>;

    /// Kill every load (safe shutdown).
    fn all_off(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

pub trait ClockPort {
    /// Local wall-clock minute of day (0–1439); `None` until the clock is set.
    fn minute_of_day(&self) -> Option<u16>;

    /// Monotonic milliseconds since boot.
    fn uptime_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Configuration ports (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

/// Persists the directly configured climate schedule (`climate_schedule`),
/// independent of species profile selection.
pub trait SchedulePort {
    /// `Ok(None)` when nothing has been stored yet.
    fn load_schedule(&self) -> Result<Option<ClimateSchedule>, ConfigError>;

    /// Validate and persist.
    fn save_schedule(&self, schedule: &ClimateSchedule) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for profile blobs, secrets, etc.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic: no partial writes on power loss.
///   The ESP-IDF NVS API guarantees this natively; in-memory simulation
///   achieves it trivially.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;

    /// Read a whole value into an owned buffer, rejecting anything larger
    /// than `max_len`.
    fn read_blob(&self, namespace: &str, key: &str, max_len: usize) -> Result<Vec<u8>, StorageError> {
        let mut buf = vec![0u8; max_len + 1];
        let len = self.read(namespace, key, &mut buf)?;
        if len > max_len {
            return Err(StorageError::TooLarge);
        }
        buf.truncate(len);
        Ok(buf)
    }
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] and [`SchedulePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored record failed deserialization.
    Corrupted,
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Stored value exceeds the caller's limit.
    TooLarge,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::TooLarge => write!(f, "value too large"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::ValidationFailed(msg) => Self::InvalidArgument(msg),
            ConfigError::Corrupted => Self::InvalidState("stored config corrupted"),
            ConfigError::StorageFull => Self::Storage(StorageError::Full),
            ConfigError::IoError => Self::Storage(StorageError::IoError),
        }
    }
}
