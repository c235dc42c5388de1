use std::sync::Arc;

use chrono::NaiveDate;

use super::domain::{Book, Identifier, LoanId, LoanRecord, RequestContext, Student, StudentNo};
use super::error::{CirculationError, LedgerOutcome};
use super::ledger::{CheckoutRequest, CirculationLedger, DeletedLoan};
use super::notifications::{NotificationBuckets, NotificationClassifier};
use super::policy::{shift_days, CirculationPolicy};
use super::repository::{AuditLog, LibraryStore, Notifier};

/// Facade exposing the circulation operations to the HTTP and CLI layers.
pub struct CirculationService<S, N, A> {
    ledger: CirculationLedger<S, N, A>,
    classifier: NotificationClassifier<S>,
}

impl<S, N, A> CirculationService<S, N, A>
where
    S: LibraryStore + 'static,
    N: Notifier + 'static,
    A: AuditLog + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, audit: Arc<A>, policy: CirculationPolicy) -> Self {
        let classifier = NotificationClassifier::new(store.clone(), &policy);
        let ledger = CirculationLedger::new(store, notifier, audit, policy);
        Self { ledger, classifier }
    }

    pub fn from_parts(
        ledger: CirculationLedger<S, N, A>,
        classifier: NotificationClassifier<S>,
    ) -> Self {
        Self { ledger, classifier }
    }

    pub fn ledger(&self) -> &CirculationLedger<S, N, A> {
        &self.ledger
    }

    pub fn classifier(&self) -> &NotificationClassifier<S> {
        &self.classifier
    }

    /// Due date falls back to the policy's default loan period.
    pub fn default_due_date(&self, borrow_date: NaiveDate) -> Result<NaiveDate, CirculationError> {
        let days = self.ledger.policy().default_loan_days;
        shift_days(borrow_date, days).ok_or(CirculationError::DateOutOfRange {
            date: borrow_date,
            days,
        })
    }

    pub fn checkout_book(
        &self,
        ctx: &RequestContext,
        book_identifier: Identifier,
        student_no: StudentNo,
        borrow_date: NaiveDate,
        due_date: Option<NaiveDate>,
    ) -> Result<LedgerOutcome<LoanRecord>, CirculationError> {
        let due_date = match due_date {
            Some(due_date) => due_date,
            None => self.default_due_date(borrow_date)?,
        };
        self.ledger.checkout(
            ctx,
            CheckoutRequest {
                book_identifier,
                student_no,
                borrow_date,
                due_date,
            },
        )
    }

    pub fn return_book(
        &self,
        ctx: &RequestContext,
        loan_id: &LoanId,
        return_date: NaiveDate,
    ) -> Result<LedgerOutcome<LoanRecord>, CirculationError> {
        self.ledger.return_loan(ctx, loan_id, return_date)
    }

    pub fn delete_loan(
        &self,
        ctx: &RequestContext,
        loan_id: &LoanId,
        allow_active_deletion: bool,
    ) -> Result<LedgerOutcome<DeletedLoan>, CirculationError> {
        self.ledger.delete_loan(ctx, loan_id, allow_active_deletion)
    }

    pub fn clear_history(
        &self,
        ctx: &RequestContext,
        loan_id: &LoanId,
    ) -> Result<LoanRecord, CirculationError> {
        self.ledger.clear_history(ctx, loan_id)
    }

    pub fn compute_live_penalty(
        &self,
        loan_id: &LoanId,
        as_of: NaiveDate,
    ) -> Result<u64, CirculationError> {
        self.ledger.live_penalty(loan_id, as_of)
    }

    pub fn classify_notifications(
        &self,
        as_of: NaiveDate,
    ) -> Result<NotificationBuckets, CirculationError> {
        self.classifier.classify(as_of)
    }

    pub fn loan(&self, loan_id: &LoanId) -> Result<LoanRecord, CirculationError> {
        self.ledger.get(loan_id)
    }

    pub fn find_book(&self, raw: &str) -> Result<Book, CirculationError> {
        self.ledger.catalog().resolve_raw(raw)
    }

    pub fn find_student(&self, student_no: &StudentNo) -> Result<Student, CirculationError> {
        self.ledger.directory().resolve(student_no)
    }
}
