//! System configuration parameters
//!
//! Timing, lock budgets and bus topology for the terrarium controller.
//! Values can be overridden via NVS (non-volatile storage).

use serde::{Deserialize, Serialize};

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Timing ---
    /// Sensor acquisition interval (milliseconds)
    pub sensor_read_interval_ms: u32,
    /// Control loop interval (milliseconds)
    pub control_loop_interval_ms: u32,
    /// Telemetry report interval (seconds)
    pub telemetry_interval_secs: u32,

    // --- Lock budgets ---
    /// Longest wait for the shared bus before an attempt counts as failed
    pub bus_lock_timeout_ms: u32,
    /// Longest wait for the measurement record
    pub measurement_lock_timeout_ms: u32,

    // --- Bus topology ---
    /// I2C address of the channel multiplexer
    pub mux_address: u8,
    /// I2C address of the lighting dome
    pub dome_address: u8,
    /// Multiplexer channel(s) the dome sits on
    pub dome_channel_mask: u8,
    /// Multiplexer channel(s) the climate sensors sit on
    pub sensor_channel_mask: u8,

    // --- Filtering ---
    /// EMA weight of a new sample (0 < α ≤ 1)
    pub sensor_filter_alpha: f32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Timing
            sensor_read_interval_ms: 500,   // 2 Hz
            control_loop_interval_ms: 1000, // 1 Hz
            telemetry_interval_secs: 60,    // 1/min

            // Lock budgets
            bus_lock_timeout_ms: 50,
            measurement_lock_timeout_ms: 10,

            // Bus topology
            mux_address: 0x70,
            dome_address: 0x3A,
            dome_channel_mask: 0x01,
            sensor_channel_mask: 0x02,

            // Filtering
            sensor_filter_alpha: 0.3,
        }
    }
}
