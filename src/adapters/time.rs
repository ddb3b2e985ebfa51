//! ESP32 time adapter.
//!
//! Implements [`ClockPort`] for the terrarium controller.
//!
//! - **`target_os = "espidf"`**: wraps `esp_timer_get_time()` for uptime
//!   and `gettimeofday` + `localtime_r` for the wall clock (set by SNTP or
//!   the RTC elsewhere; the TZ environment decides local time).
//! - **`not(target_os = "espidf")`**: uses `std::time::Instant` for
//!   host-side testing and simulation; the wall clock is never synced.

use crate::app::ports::ClockPort;

/// Wall-clock readings before this are treated as "never set".
#[cfg(target_os = "espidf")]
const EPOCH_2020: i64 = 1_577_836_800;

/// Time adapter for the ESP32-S3 platform.
pub struct Esp32TimeAdapter {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Esp32TimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32TimeAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Seconds since boot (monotonic).
    pub fn uptime_secs(&self) -> u64 {
        self.uptime_ms() / 1000
    }

    #[cfg(target_os = "espidf")]
    fn local_minute(&self) -> Option<u16> {
        use core::ptr;
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, ptr::null_mut()) } != 0 {
            return None;
        }
        if (tv.tv_sec as i64) < EPOCH_2020 {
            return None;
        }
        let secs = tv.tv_sec as esp_idf_svc::sys::time_t;
        let mut tm: esp_idf_svc::sys::tm = unsafe { core::mem::zeroed() };
        if unsafe { esp_idf_svc::sys::localtime_r(&secs, &mut tm) }.is_null() {
            return None;
        }
        if !(0..=23).contains(&tm.tm_hour) || !(0..=59).contains(&tm.tm_min) {
            return None;
        }
        Some((tm.tm_hour * 60 + tm.tm_min) as u16)
    }
}

impl ClockPort for Esp32TimeAdapter {
    /// Local minute-of-day; `None` until the wall clock has been set.
    #[cfg(target_os = "espidf")]
    fn minute_of_day(&self) -> Option<u16> {
        self.local_minute()
    }

    /// On non-ESP targets (simulation) the wall clock is never set.
    #[cfg(not(target_os = "espidf"))]
    fn minute_of_day(&self) -> Option<u16> {
        None
    }

    #[cfg(target_os = "espidf")]
    fn uptime_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1000
    }

    #[cfg(not(target_os = "espidf"))]
    fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
