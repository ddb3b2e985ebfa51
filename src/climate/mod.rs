//! Climate regulation: schedules, sensor snapshots, and the per-tick engine.

pub mod engine;
pub mod measurement;
pub mod schedule;

pub use engine::{ClimateEngine, ClimateState};
pub use measurement::{ClimateMeasurement, MeasurementCell, SensorSnapshot};
pub use schedule::{ClimateProfile, ClimateSchedule};
