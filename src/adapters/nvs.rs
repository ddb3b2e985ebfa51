//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`ConfigPort`], [`SchedulePort`] and [`StoragePort`] for the
//! terrarium controller.
//!
//! - Validation: config and schedule records are range-checked before
//!   persistence.
//! - Namespace isolation: each subsystem uses its own namespace
//!   (`terrarium`, `climate`, `species`).
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.
//! - NVS keys are limited to 15 bytes.  Longer logical keys are mapped to a
//!   stable short form (see [`nvs_key_name`]) on the device; the host
//!   simulation keeps them verbatim.

use crate::app::ports::{ConfigError, ConfigPort, SchedulePort, StorageError, StoragePort};
use crate::climate::schedule::ClimateSchedule;
use crate::config::SystemConfig;
use crate::error::Error;
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "terrarium";
const CONFIG_KEY: &str = "syscfg";

pub const SCHEDULE_NAMESPACE: &str = "climate";
pub const SCHEDULE_KEY: &str = "climate_schedule";

const MAX_BLOB_SIZE: usize = 4000;

/// Longest key ESP-IDF NVS accepts (excluding the NUL).
pub const NVS_KEY_MAX: usize = 15;

/// Map a logical key to one NVS accepts.  Keys that fit are unchanged;
/// longer ones become `<first 6 bytes>~<8 hex digits of SHA-256>`, so
/// `custom_profiles_v1` and `custom_profiles_v2` stay distinct.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
pub fn nvs_key_name(key: &str) -> heapless::String<NVS_KEY_MAX> {
    let mut out = heapless::String::new();
    if key.len() <= NVS_KEY_MAX {
        // Cannot fail: the length was just checked.
        let _ = out.push_str(key);
        return out;
    }
    for c in key.chars() {
        if out.len() + c.len_utf8() > 6 {
            break;
        }
        let _ = out.push(c);
    }
    let digest = hmac_sha256::Hash::hash(key.as_bytes());
    let _ = out.push('~');
    for b in &digest[..4] {
        for nibble in [b >> 4, b & 0x0F] {
            let _ = out.push(char::from_digit(u32::from(nibble), 16).unwrap_or('0'));
        }
    }
    out
}

#[cfg(target_os = "espidf")]
fn c_name(name: &str) -> [u8; NVS_KEY_MAX + 1] {
    let mut buf = [0u8; NVS_KEY_MAX + 1];
    let bytes = name.as_bytes();
    let len = bytes.len().min(NVS_KEY_MAX);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// Returns `Err(ConfigError::IoError)` if flash initialisation fails
    /// unrecoverably. On first boot or after a version mismatch the NVS
    /// partition is erased and re-initialised automatically.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                let ret2 = unsafe { nvs_flash_erase() };
                if ret2 != ESP_OK {
                    return Err(ConfigError::IoError);
                }
                let ret3 = unsafe { nvs_flash_init() };
                if ret3 != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns_buf = c_name(namespace);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    // ── Backend primitives (shared by every port) ───────────────

    /// Copy a blob into `buf`.  A stored value longer than `buf` is
    /// reported with its full length on the host and as `TooLarge` on the
    /// device.
    fn get(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            match self.store.borrow().get(&composite) {
                Some(data) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(data.len())
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let key_buf = c_name(&nvs_key_name(key));
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(e) if e == ESP_ERR_NVS_INVALID_LENGTH => Err(StorageError::TooLarge),
                Err(e) => {
                    warn!("NvsAdapter: read {}/{} failed ({})", namespace, key, e);
                    Err(StorageError::IoError)
                }
            }
        }
    }

    fn put(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if data.len() > MAX_BLOB_SIZE {
            return Err(StorageError::TooLarge);
        }

        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().insert(composite, data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key_buf = c_name(&nvs_key_name(key));
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        data.as_ptr() as *const _,
                        data.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|e| {
                warn!("NvsAdapter: write {}/{} failed ({})", namespace, key, e);
                if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                    StorageError::Full
                } else {
                    StorageError::IoError
                }
            })
        }
    }

    fn erase(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().remove(&composite);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key_buf = c_name(&nvs_key_name(key));
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let ret = unsafe { nvs_erase_key(handle, key_buf.as_ptr() as *const _) };
                if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => Ok(()),
                // A namespace that was never written has nothing to erase.
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Ok(()),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn load_record(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, ConfigError> {
        match StoragePort::read_blob(self, namespace, key, MAX_BLOB_SIZE) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(StorageError::NotFound) => Ok(None),
            Err(StorageError::TooLarge) => Err(ConfigError::Corrupted),
            Err(StorageError::Full) => Err(ConfigError::StorageFull),
            Err(StorageError::IoError) => Err(ConfigError::IoError),
        }
    }

    fn save_record(&self, namespace: &str, key: &str, bytes: &[u8]) -> Result<(), ConfigError> {
        self.put(namespace, key, bytes).map_err(|e| match e {
            StorageError::Full | StorageError::TooLarge => ConfigError::StorageFull,
            _ => ConfigError::IoError,
        })
    }
}

fn validate_config(cfg: &SystemConfig) -> Result<(), ConfigError> {
    if !(50..=10_000).contains(&cfg.sensor_read_interval_ms) {
        return Err(ConfigError::ValidationFailed(
            "sensor_read_interval_ms must be 50–10000",
        ));
    }
    if !(100..=5000).contains(&cfg.control_loop_interval_ms) {
        return Err(ConfigError::ValidationFailed(
            "control_loop_interval_ms must be 100–5000",
        ));
    }
    if !(5..=3600).contains(&cfg.telemetry_interval_secs) {
        return Err(ConfigError::ValidationFailed(
            "telemetry_interval_secs must be 5–3600",
        ));
    }
    if !(1..=1000).contains(&cfg.bus_lock_timeout_ms) {
        return Err(ConfigError::ValidationFailed(
            "bus_lock_timeout_ms must be 1–1000",
        ));
    }
    if !(1..=1000).contains(&cfg.measurement_lock_timeout_ms) {
        return Err(ConfigError::ValidationFailed(
            "measurement_lock_timeout_ms must be 1–1000",
        ));
    }
    for addr in [cfg.mux_address, cfg.dome_address] {
        if !(0x08..=0x77).contains(&addr) {
            return Err(ConfigError::ValidationFailed(
                "I2C addresses must be 0x08–0x77",
            ));
        }
    }
    if cfg.mux_address == cfg.dome_address {
        return Err(ConfigError::ValidationFailed(
            "dome_address must differ from mux_address",
        ));
    }
    if cfg.dome_channel_mask == 0 || cfg.sensor_channel_mask == 0 {
        return Err(ConfigError::ValidationFailed(
            "channel masks must select at least one channel",
        ));
    }
    if !(cfg.sensor_filter_alpha > 0.0 && cfg.sensor_filter_alpha <= 1.0) {
        return Err(ConfigError::ValidationFailed(
            "sensor_filter_alpha must be in (0, 1]",
        ));
    }
    Ok(())
}

fn validate_schedule(schedule: &ClimateSchedule) -> Result<(), ConfigError> {
    schedule.validate().map_err(|e| match e {
        Error::InvalidArgument(msg) => ConfigError::ValidationFailed(msg),
        _ => ConfigError::ValidationFailed("schedule rejected"),
    })
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        match self.load_record(CONFIG_NAMESPACE, CONFIG_KEY) {
            Ok(Some(bytes)) => {
                let cfg: SystemConfig =
                    postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                info!("NvsAdapter: loaded config ({} bytes)", bytes.len());
                Ok(cfg)
            }
            Ok(None) => {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(SystemConfig::default())
            }
            Err(e) => {
                warn!("NvsAdapter: config read error {}, using defaults", e);
                Ok(SystemConfig::default())
            }
        }
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        self.save_record(CONFIG_NAMESPACE, CONFIG_KEY, &bytes)?;
        info!("NvsAdapter: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

impl SchedulePort for NvsAdapter {
    fn load_schedule(&self) -> Result<Option<ClimateSchedule>, ConfigError> {
        let Some(bytes) = self.load_record(SCHEDULE_NAMESPACE, SCHEDULE_KEY)? else {
            return Ok(None);
        };
        let schedule: ClimateSchedule =
            postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
        if schedule.validate().is_err() {
            warn!("NvsAdapter: stored schedule out of range");
            return Err(ConfigError::Corrupted);
        }
        Ok(Some(schedule))
    }

    fn save_schedule(&self, schedule: &ClimateSchedule) -> Result<(), ConfigError> {
        validate_schedule(schedule)?;
        let bytes = postcard::to_allocvec(schedule).map_err(|_| ConfigError::IoError)?;
        self.save_record(SCHEDULE_NAMESPACE, SCHEDULE_KEY, &bytes)
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.get(namespace, key, buf)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.put(namespace, key, data)
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.erase(namespace, key)
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow().contains_key(&composite)
        }

        #[cfg(target_os = "espidf")]
        {
            let key_buf = c_name(&nvs_key_name(key));
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let ret = unsafe {
                    nvs_find_key(handle, key_buf.as_ptr() as *const _, core::ptr::null_mut())
                };
                Ok(ret == ESP_OK)
            });
            result.unwrap_or(false)
        }
    }
}

impl Default for NvsAdapter {
    fn default() -> Self {
        // Falls back to an uninitialised handle if NVS is unavailable.
        Self::new().unwrap_or_else(|_| Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }
}
