use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::LoanRecord;

/// Flat per-day charge for late returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyCalculator {
    rate_per_day: u64,
}

impl PenaltyCalculator {
    pub const DEFAULT_RATE: u64 = 10;

    pub const fn new(rate_per_day: u64) -> Self {
        Self { rate_per_day }
    }

    pub const fn rate_per_day(&self) -> u64 {
        self.rate_per_day
    }

    /// Whole calendar days between `due_date` and `evaluation_date`, zero when not late.
    pub fn days_late(due_date: NaiveDate, evaluation_date: NaiveDate) -> u64 {
        if evaluation_date <= due_date {
            return 0;
        }
        u64::try_from((evaluation_date - due_date).num_days()).unwrap_or(0)
    }

    pub fn compute(&self, due_date: NaiveDate, evaluation_date: NaiveDate) -> u64 {
        Self::days_late(due_date, evaluation_date).saturating_mul(self.rate_per_day)
    }

    /// Live estimate for active loans, the frozen amount for returned ones.
    pub fn assess(&self, record: &LoanRecord, as_of: NaiveDate) -> u64 {
        match record.return_date {
            Some(_) => record.penalty,
            None => self.compute(record.due_date, as_of),
        }
    }
}

impl Default for PenaltyCalculator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RATE)
    }
}
