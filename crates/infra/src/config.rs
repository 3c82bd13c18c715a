//! Runtime configuration for the circulation service.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use shelf_circulation::{CirculationRules, DailyRateFine, LoanPolicy};

use crate::command_dispatcher::DEFAULT_MAX_ATTEMPTS;

/// Circulation service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CirculationConfig {
    pub loan_policy: LoanPolicy,
    pub fines: DailyRateFine,
    /// Bound on load → decide → append attempts per command.
    pub max_dispatch_attempts: u32,
    /// How often the background overdue sweep runs.
    pub sweep_interval: Duration,
}

impl Default for CirculationConfig {
    fn default() -> Self {
        Self {
            loan_policy: LoanPolicy::default(),
            fines: DailyRateFine::default(),
            max_dispatch_attempts: DEFAULT_MAX_ATTEMPTS,
            sweep_interval: Duration::from_secs(3600),
        }
    }
}

impl CirculationConfig {
    pub fn with_loan_policy(mut self, loan_policy: LoanPolicy) -> Self {
        self.loan_policy = loan_policy;
        self
    }

    pub fn with_fines(mut self, fines: DailyRateFine) -> Self {
        self.fines = fines;
        self
    }

    pub fn with_max_dispatch_attempts(mut self, attempts: u32) -> Self {
        self.max_dispatch_attempts = attempts.max(1);
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Read `SHELF_*` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys keep their defaults;
    /// unparsable values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let policy = &mut config.loan_policy;

        read(&lookup, "SHELF_MAX_LOAN_DAYS", &mut policy.max_loan_days);
        read(&lookup, "SHELF_RENEWAL_DAYS", &mut policy.renewal_days);
        read(&lookup, "SHELF_MAX_RENEWALS", &mut policy.max_renewals);
        read(&lookup, "SHELF_LOW_STOCK_THRESHOLD", &mut policy.low_stock_threshold);

        read(&lookup, "SHELF_FINE_PER_DAY", &mut config.fines.per_day);
        read(&lookup, "SHELF_FINE_GRACE_DAYS", &mut config.fines.grace_days);
        if let Some(cap) = parse::<u64>(&lookup, "SHELF_FINE_CAP") {
            config.fines.cap = Some(cap);
        }

        read(&lookup, "SHELF_MAX_DISPATCH_ATTEMPTS", &mut config.max_dispatch_attempts);
        config.max_dispatch_attempts = config.max_dispatch_attempts.max(1);

        if let Some(secs) = parse::<u64>(&lookup, "SHELF_SWEEP_INTERVAL_SECS") {
            config.sweep_interval = Duration::from_secs(secs);
        }

        config
    }

    /// Rules handed to every circulation aggregate.
    pub fn rules(&self) -> CirculationRules {
        CirculationRules::new(self.loan_policy, self.fines)
    }
}

fn read<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    if let Some(value) = parse(lookup, key) {
        *slot = value;
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring invalid configuration value");
            None
        }
    }
}
