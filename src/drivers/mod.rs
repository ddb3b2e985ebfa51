//! Load drivers, hardware initialisation, and the user button.

pub mod button;
pub mod dome;
pub mod hw_init;
