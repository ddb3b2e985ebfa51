//! Circuit-breaker bookkeeping for the dome bus.
//!
//! Two bounded counters with asymmetric thresholds: more than
//! [`TRIP_AFTER_ERRORS`] consecutive failures set `degraded`,
//! [`RECOVER_AFTER_OKS`] consecutive successes clear it.

use serde::{Deserialize, Serialize};

pub const TRIP_AFTER_ERRORS: u8 = 5;
pub const RECOVER_AFTER_OKS: u8 = 3;

/// Transition caused by recording one transaction outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    None,
    Tripped,
    Recovered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BusHealth {
    pub active_channel_mask: u8,
    pub consecutive_errors: u8,
    pub consecutive_oks: u8,
    pub degraded: bool,
}

impl BusHealth {
    pub fn record_ok(&mut self) -> HealthTransition {
        self.consecutive_errors = 0;
        self.consecutive_oks = self.consecutive_oks.saturating_add(1);
        if self.degraded && self.consecutive_oks >= RECOVER_AFTER_OKS {
            self.degraded = false;
            return HealthTransition::Recovered;
        }
        HealthTransition::None
    }

    pub fn record_err(&mut self) -> HealthTransition {
        self.consecutive_oks = 0;
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        if !self.degraded && self.consecutive_errors > TRIP_AFTER_ERRORS {
            self.degraded = true;
            return HealthTransition::Tripped;
        }
        HealthTransition::None
    }

    /// Operator override: forget both streaks and leave degraded mode.
    pub fn clear(&mut self) {
        self.consecutive_errors = 0;
        self.consecutive_oks = 0;
        self.degraded = false;
    }
}
