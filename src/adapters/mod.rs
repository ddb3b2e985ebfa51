//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements         | Connects to              |
//! |----------------|--------------------|--------------------------|
//! | `hardware`     | ActuatorPort       | SSR GPIO, fan PWM, dome  |
//! | `log_sink`     | EventSink          | Serial log output        |
//! | `nvs`          | ConfigPort         | NVS / in-memory store    |
//! |                | SchedulePort       |                          |
//! |                | StoragePort        |                          |
//! | `time`         | ClockPort          | ESP32 timer + wall clock |
//!
//! The sensor side ([`SensorPort`](crate::app::ports::SensorPort)) is
//! implemented directly by [`SensorHub`](crate::sensors::SensorHub).

pub mod hardware;
pub mod log_sink;
pub mod nvs;
pub mod time;
