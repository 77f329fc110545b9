//! Per-tick time budget.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Rough device class, used to pick a default budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceTier {
    #[default]
    Desktop,
    Mobile,
}

/// Wall-clock ceiling on simulation work inside one tick.
///
/// Advisory only: the scheduler checks it between droplets and always runs
/// at least one droplet per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBudget {
    pub per_tick: Duration,
}

impl TimeBudget {
    pub const DESKTOP: Duration = Duration::from_millis(16);
    pub const MOBILE: Duration = Duration::from_millis(8);

    pub fn new(per_tick: Duration) -> Self {
        Self { per_tick }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    pub fn for_tier(tier: DeviceTier) -> Self {
        match tier {
            DeviceTier::Desktop => Self::new(Self::DESKTOP),
            DeviceTier::Mobile => Self::new(Self::MOBILE),
        }
    }

    #[inline]
    pub fn is_exhausted(&self, elapsed: Duration) -> bool {
        elapsed >= self.per_tick
    }
}

impl Default for TimeBudget {
    fn default() -> Self {
        Self::for_tier(DeviceTier::default())
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub budget: TimeBudget,
}

impl SchedulerConfig {
    pub fn for_tier(tier: DeviceTier) -> Self {
        Self {
            budget: TimeBudget::for_tier(tier),
        }
    }
}
