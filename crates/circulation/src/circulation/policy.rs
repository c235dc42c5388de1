use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::limits::LoanLimitGuard;
use super::penalty::PenaltyCalculator;

/// Tunable circulation rules, loaded from the environment by `AppConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CirculationPolicy {
    pub penalty_rate: u64,
    pub max_active_loans: usize,
    pub due_soon_days: i64,
    pub recent_return_days: i64,
    pub default_loan_days: i64,
    pub id_retry_attempts: u32,
}

impl CirculationPolicy {
    /// Upper bound accepted for any day-count setting.
    pub const MAX_WINDOW_DAYS: i64 = 3650;

    pub const fn penalty_calculator(&self) -> PenaltyCalculator {
        PenaltyCalculator::new(self.penalty_rate)
    }

    pub const fn limit_guard(&self) -> LoanLimitGuard {
        LoanLimitGuard::new(self.max_active_loans)
    }
}

impl Default for CirculationPolicy {
    fn default() -> Self {
        Self {
            penalty_rate: PenaltyCalculator::DEFAULT_RATE,
            max_active_loans: LoanLimitGuard::DEFAULT_LIMIT,
            due_soon_days: 2,
            recent_return_days: 7,
            default_loan_days: 7,
            id_retry_attempts: 3,
        }
    }
}

/// `date` moved by `days`, or `None` when the result leaves chrono's calendar.
pub fn shift_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    Duration::try_days(days).and_then(|delta| date.checked_add_signed(delta))
}
