//! GPIO / peripheral pin assignments for the terrarium controller board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Solid-state relays (mains loads)
// ---------------------------------------------------------------------------

/// SSR1 drives the heat source (ceramic emitter / heat mat).
pub const HEATER_SSR_GPIO: i32 = 10;
pub const SSR2_GPIO: i32 = 11;
pub const SSR3_GPIO: i32 = 12;
pub const SSR4_GPIO: i32 = 13;

// ---------------------------------------------------------------------------
// Ventilation
// ---------------------------------------------------------------------------

/// 4-wire PC fan, PWM input.
pub const FAN_PWM_GPIO: i32 = 4;
/// LEDC base frequency for the fan (25 kHz, per the 4-wire fan standard).
pub const FAN_PWM_FREQ_HZ: u32 = 25_000;
/// LEDC channel carrying the fan duty.
pub const FAN_LEDC_CHANNEL: u32 = 0;

// ---------------------------------------------------------------------------
// I²C bus (TCA9548A mux → lighting dome, climate sensors)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 8;
pub const I2C_SCL_GPIO: i32 = 9;
pub const I2C_FREQ_HZ: u32 = 100_000;

// ---------------------------------------------------------------------------
// User interface
// ---------------------------------------------------------------------------

pub const STATUS_LED_GPIO: i32 = 7;
/// Active-low user button; a long press rearms the bus.
pub const BUTTON_GPIO: i32 = 1;
