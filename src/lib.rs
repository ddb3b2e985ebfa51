//! Terrarium climate controller library.
//!
//! Exposes the regulation core, the shared-bus arbiter and the species
//! catalog for integration testing.  All ESP-IDF-specific code is guarded
//! by `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod bus;
pub mod climate;
pub mod config;
pub mod drivers;
pub mod error;
pub mod pins;
pub mod sensors;
pub mod species;
pub mod sync;

pub use error::{Error, Result};
