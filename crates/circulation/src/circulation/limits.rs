use serde::Serialize;

use super::domain::StudentNo;
use super::repository::{LoanStore, RepositoryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Eligibility {
    Eligible { active: usize, remaining: usize },
    LimitExceeded { active: usize, limit: usize },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible { .. })
    }
}

/// Caps concurrently active loans per student.
///
/// [`LoanLimitGuard::check_eligible`] is the fast-fail pre-check; the store's
/// `insert_active_loan` enforces the same limit atomically at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanLimitGuard {
    max_active: usize,
}

impl LoanLimitGuard {
    pub const DEFAULT_LIMIT: usize = 3;

    pub const fn new(max_active: usize) -> Self {
        Self { max_active }
    }

    pub const fn max_active(&self) -> usize {
        self.max_active
    }

    pub fn evaluate(&self, active: usize) -> Eligibility {
        if active >= self.max_active {
            Eligibility::LimitExceeded {
                active,
                limit: self.max_active,
            }
        } else {
            Eligibility::Eligible {
                active,
                remaining: self.max_active - active,
            }
        }
    }

    pub fn check_eligible<S>(
        &self,
        store: &S,
        student_no: &StudentNo,
    ) -> Result<Eligibility, RepositoryError>
    where
        S: LoanStore + ?Sized,
    {
        let active = store.count_active_loans(student_no)?;
        Ok(self.evaluate(active))
    }
}

impl Default for LoanLimitGuard {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT)
    }
}
