use std::sync::Arc;

use super::domain::{Student, StudentNo};
use super::error::CirculationError;
use super::repository::{LoanStore, StudentStore};

/// Borrower lookup plus the loan counts used by the limit guard and reporting.
pub struct StudentDirectory<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for StudentDirectory<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S> StudentDirectory<S>
where
    S: StudentStore + LoanStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn resolve(&self, student_no: &StudentNo) -> Result<Student, CirculationError> {
        self.store
            .find_student(student_no)?
            .ok_or_else(|| CirculationError::StudentNotFound(student_no.clone()))
    }

    pub fn register(&self, student: Student) -> Result<Student, CirculationError> {
        Ok(self.store.insert_student(student)?)
    }

    pub fn count_active_loans(&self, student_no: &StudentNo) -> Result<usize, CirculationError> {
        Ok(self.store.count_active_loans(student_no)?)
    }

    pub fn count_total_loans(&self, student_no: &StudentNo) -> Result<usize, CirculationError> {
        Ok(self.store.count_total_loans(student_no)?)
    }
}
