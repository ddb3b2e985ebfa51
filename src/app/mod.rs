//! Application core: domain orchestration, zero direct I/O.
//!
//! Ties the climate engine and the species store to the outside world.
//! All interaction with hardware and storage happens through **port
//! traits** defined in [`ports`], keeping this layer testable without
//! real peripherals.

pub mod events;
pub mod ports;
pub mod service;
