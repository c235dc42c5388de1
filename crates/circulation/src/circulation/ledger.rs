use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::catalog::BookCatalog;
use super::domain::{
    Identifier, LoanId, LoanRecord, LoanState, RequestContext, Student, StudentNo,
};
use super::error::{CirculationError, LedgerOutcome, LedgerWarning};
use super::ids::{DatePrefixedIdGenerator, LoanIdGenerator};
use super::limits::{Eligibility, LoanLimitGuard};
use super::penalty::PenaltyCalculator;
use super::policy::CirculationPolicy;
use super::repository::{
    AuditEvent, AuditLog, DeleteScope, LibraryStore, LoanFilter, LoanSort, LoanUpdate, Notice,
    NoticeKind, Notifier, RepositoryError,
};
use super::students::StudentDirectory;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub book_identifier: Identifier,
    pub student_no: StudentNo,
    pub borrow_date: NaiveDate,
    pub due_date: NaiveDate,
}

/// What a deletion did to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedLoan {
    pub record: LoanRecord,
    pub stock_restored: bool,
}

/// Loan lifecycle owner: checkout, return, and administrative deletion.
pub struct CirculationLedger<S, N, A> {
    store: Arc<S>,
    catalog: BookCatalog<S>,
    directory: StudentDirectory<S>,
    guard: LoanLimitGuard,
    penalties: PenaltyCalculator,
    ids: Arc<dyn LoanIdGenerator>,
    notifier: Arc<N>,
    audit: Arc<A>,
    policy: CirculationPolicy,
}

impl<S, N, A> CirculationLedger<S, N, A>
where
    S: LibraryStore + 'static,
    N: Notifier + 'static,
    A: AuditLog + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, audit: Arc<A>, policy: CirculationPolicy) -> Self {
        Self::with_id_generator(
            store,
            notifier,
            audit,
            policy,
            Arc::new(DatePrefixedIdGenerator),
        )
    }

    pub fn with_id_generator(
        store: Arc<S>,
        notifier: Arc<N>,
        audit: Arc<A>,
        policy: CirculationPolicy,
        ids: Arc<dyn LoanIdGenerator>,
    ) -> Self {
        Self {
            catalog: BookCatalog::new(store.clone()),
            directory: StudentDirectory::new(store.clone()),
            guard: policy.limit_guard(),
            penalties: policy.penalty_calculator(),
            store,
            ids,
            notifier,
            audit,
            policy,
        }
    }

    pub fn catalog(&self) -> &BookCatalog<S> {
        &self.catalog
    }

    pub fn directory(&self) -> &StudentDirectory<S> {
        &self.directory
    }

    pub fn policy(&self) -> &CirculationPolicy {
        &self.policy
    }

    pub fn penalties(&self) -> PenaltyCalculator {
        self.penalties
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Check a book out to a student.
    ///
    /// Nothing is written when resolution or eligibility fails. The stock
    /// decrement happens before the insert and is compensated if the insert is
    /// rejected, so a failed checkout never leaves a unit missing.
    pub fn checkout(
        &self,
        ctx: &RequestContext,
        request: CheckoutRequest,
    ) -> Result<LedgerOutcome<LoanRecord>, CirculationError> {
        let CheckoutRequest {
            book_identifier,
            student_no,
            borrow_date,
            due_date,
        } = request;

        if due_date < borrow_date {
            return Err(CirculationError::InvalidDueDate {
                borrow_date,
                due_date,
            });
        }

        let book = self.catalog.resolve(&book_identifier)?;
        if !book.is_available() {
            return Err(CirculationError::BookUnavailable(book.identifier));
        }
        let student = self.directory.resolve(&student_no)?;

        if let Eligibility::LimitExceeded { active, limit } =
            self.guard.check_eligible(self.store.as_ref(), &student_no)?
        {
            return Err(CirculationError::LimitExceeded {
                student_no,
                active,
                limit,
            });
        }

        self.catalog.decrement_stock(&book.identifier)?;

        let inserted =
            self.insert_with_fresh_id(&book.identifier, &student_no, borrow_date, due_date);
        let record = match inserted {
            Ok(record) => record,
            Err(err) => {
                self.compensate_stock(&book.identifier);
                return Err(match err {
                    RepositoryError::LimitReached { active } => CirculationError::LimitExceeded {
                        student_no,
                        active,
                        limit: self.guard.max_active(),
                    },
                    other => other.into(),
                });
            }
        };

        info!(
            actor = %ctx.actor,
            loan_id = %record.loan_id,
            book = %record.book_identifier,
            student = %record.student_no,
            due = %record.due_date,
            "book checked out"
        );
        self.audit.record(AuditEvent {
            event_type: "loan.checkout",
            actor: ctx.actor.clone(),
            description: format!(
                "{} borrowed '{}' ({}) until {}",
                record.student_no, book.title, record.book_identifier, record.due_date
            ),
        });

        let mut outcome = LedgerOutcome::new(record);
        let notice = Notice::new(NoticeKind::CheckoutReceipt, outcome.value.loan_id.clone())
            .with_detail("title", &book.title)
            .with_detail("student_name", student.full_name())
            .with_detail("borrow_date", outcome.value.borrow_date)
            .with_detail("due_date", outcome.value.due_date);
        self.notify(&student, &notice, &mut outcome);

        Ok(outcome)
    }

    fn insert_with_fresh_id(
        &self,
        book_identifier: &Identifier,
        student_no: &StudentNo,
        borrow_date: NaiveDate,
        due_date: NaiveDate,
    ) -> Result<LoanRecord, RepositoryError> {
        let mut attempt = 0;
        loop {
            let record = LoanRecord {
                loan_id: self.ids.next_id(),
                book_identifier: book_identifier.clone(),
                student_no: student_no.clone(),
                borrow_date,
                due_date,
                return_date: None,
                penalty: 0,
                created_at: Utc::now(),
            };

            match self
                .store
                .insert_active_loan(record, self.policy.max_active_loans)
            {
                Err(RepositoryError::Conflict) if attempt < self.policy.id_retry_attempts => {
                    attempt += 1;
                    warn!(attempt, "loan id collision, retrying with a fresh id");
                }
                other => return other,
            }
        }
    }

    fn compensate_stock(&self, identifier: &Identifier) {
        if let Err(err) = self.catalog.increment_stock(identifier) {
            error!(book = %identifier, error = %err, "failed to restore stock after rejected checkout");
        }
    }

    /// Close an active loan, freezing its penalty and restoring one unit of stock.
    pub fn return_loan(
        &self,
        ctx: &RequestContext,
        loan_id: &LoanId,
        return_date: NaiveDate,
    ) -> Result<LedgerOutcome<LoanRecord>, CirculationError> {
        let record = self.fetch(loan_id)?;
        if !record.is_active() {
            return Err(CirculationError::AlreadyReturned(loan_id.clone()));
        }
        if return_date < record.borrow_date {
            return Err(CirculationError::InvalidReturnDate {
                borrow_date: record.borrow_date,
                return_date,
            });
        }

        let penalty = self.penalties.compute(record.due_date, return_date);
        let updated = self
            .store
            .update_loan(
                loan_id,
                LoanUpdate {
                    return_date,
                    penalty,
                },
            )
            .map_err(|err| self.map_loan_error(loan_id, err))?;

        let mut outcome = LedgerOutcome::new(updated);
        let identifier = outcome.value.book_identifier.clone();
        self.restore_stock(&identifier, &mut outcome);

        info!(
            actor = %ctx.actor,
            loan_id = %loan_id,
            returned = %return_date,
            penalty,
            "book returned"
        );
        self.audit.record(AuditEvent {
            event_type: "loan.return",
            actor: ctx.actor.clone(),
            description: format!(
                "{} returned {} on {} (penalty {})",
                outcome.value.student_no, outcome.value.book_identifier, return_date, penalty
            ),
        });

        // The return is saved; receipt problems only become warnings from here.
        let student_no = outcome.value.student_no.clone();
        match self.store.find_student(&student_no) {
            Ok(Some(student)) => {
                let notice = Notice::new(NoticeKind::ReturnReceipt, loan_id.clone())
                    .with_detail("book", &outcome.value.book_identifier)
                    .with_detail("student_name", student.full_name())
                    .with_detail("due_date", outcome.value.due_date)
                    .with_detail("return_date", return_date)
                    .with_detail("penalty", penalty);
                self.notify(&student, &notice, &mut outcome);
            }
            Ok(None) => {
                warn!(student = %student_no, "return receipt skipped, student missing");
                outcome.warn(LedgerWarning::MissingRecipient { student_no });
            }
            Err(err) => {
                warn!(student = %student_no, error = %err, "return receipt skipped, student lookup failed");
                outcome.warn(LedgerWarning::RecipientUnavailable {
                    student_no,
                    reason: err.to_string(),
                });
            }
        }

        Ok(outcome)
    }

    /// Administrative deletion.
    ///
    /// Deleting an active loan requires `allow_active_deletion` and puts the
    /// borrowed unit back on the shelf. Deleting a returned loan leaves stock
    /// alone since the unit came back at return time. With the flag set a
    /// returned loan is deleted as well rather than rejected as `AlreadyReturned`.
    pub fn delete_loan(
        &self,
        ctx: &RequestContext,
        loan_id: &LoanId,
        allow_active_deletion: bool,
    ) -> Result<LedgerOutcome<DeletedLoan>, CirculationError> {
        let record = self.fetch(loan_id)?;
        if record.is_active() && !allow_active_deletion {
            return Err(CirculationError::StillActive(loan_id.clone()));
        }

        let scope = if allow_active_deletion {
            DeleteScope::AnyState
        } else {
            DeleteScope::ReturnedOnly
        };
        let removed = self
            .store
            .delete_loan(loan_id, scope)
            .map_err(|err| self.map_loan_error(loan_id, err))?;

        let was_active = removed.is_active();
        let mut outcome = LedgerOutcome::new(DeletedLoan {
            record: removed,
            stock_restored: false,
        });
        if was_active {
            let identifier = outcome.value.record.book_identifier.clone();
            outcome.value.stock_restored = self.restore_stock(&identifier, &mut outcome);
        }

        info!(
            actor = %ctx.actor,
            loan_id = %loan_id,
            was_active,
            stock_restored = outcome.value.stock_restored,
            "loan deleted"
        );
        self.audit.record(AuditEvent {
            event_type: "loan.delete",
            actor: ctx.actor.clone(),
            description: format!(
                "deleted {} loan {} for {}",
                if was_active { "active" } else { "returned" },
                loan_id,
                outcome.value.record.student_no
            ),
        });

        Ok(outcome)
    }

    /// Prune a returned loan from history. Never touches stock.
    pub fn clear_history(
        &self,
        ctx: &RequestContext,
        loan_id: &LoanId,
    ) -> Result<LoanRecord, CirculationError> {
        let removed = self
            .store
            .delete_loan(loan_id, DeleteScope::ReturnedOnly)
            .map_err(|err| self.map_loan_error(loan_id, err))?;

        info!(actor = %ctx.actor, loan_id = %loan_id, "loan history cleared");
        self.audit.record(AuditEvent {
            event_type: "loan.clear_history",
            actor: ctx.actor.clone(),
            description: format!("cleared returned loan {loan_id}"),
        });

        Ok(removed)
    }

    /// Live penalty for active loans; the frozen amount once returned.
    pub fn live_penalty(&self, loan_id: &LoanId, as_of: NaiveDate) -> Result<u64, CirculationError> {
        let record = self.fetch(loan_id)?;
        Ok(self.penalties.assess(&record, as_of))
    }

    pub fn get(&self, loan_id: &LoanId) -> Result<LoanRecord, CirculationError> {
        self.fetch(loan_id)
    }

    pub fn loans_for_student(
        &self,
        student_no: &StudentNo,
        state: Option<LoanState>,
    ) -> Result<Vec<LoanRecord>, CirculationError> {
        let filter = LoanFilter {
            state,
            ..LoanFilter::for_student(student_no.clone())
        };
        Ok(self.store.query_loans(&filter, LoanSort::CreatedAtAsc)?)
    }

    fn fetch(&self, loan_id: &LoanId) -> Result<LoanRecord, CirculationError> {
        self.store
            .find_loan(loan_id)?
            .ok_or_else(|| CirculationError::LoanNotFound(loan_id.clone()))
    }

    fn map_loan_error(&self, loan_id: &LoanId, err: RepositoryError) -> CirculationError {
        match err {
            RepositoryError::NotFound => CirculationError::LoanNotFound(loan_id.clone()),
            RepositoryError::StateMismatch {
                actual: LoanState::Returned,
            } => CirculationError::AlreadyReturned(loan_id.clone()),
            RepositoryError::StateMismatch {
                actual: LoanState::Active,
            } => CirculationError::StillActive(loan_id.clone()),
            other => other.into(),
        }
    }

    /// Puts one unit back under the frozen identifier. A vanished book is a
    /// warning, not a failure: the loan change has already been written.
    /// Put one unit back after a committed return or delete. Failures become
    /// warnings since the loan change is already saved.
    fn restore_stock<T>(&self, identifier: &Identifier, outcome: &mut LedgerOutcome<T>) -> bool {
        match self.catalog.increment_stock(identifier) {
            Ok(_) => true,
            Err(CirculationError::BookNotFound(_)) => {
                warn!(book = %identifier, "stale book reference, stock not restored");
                outcome.warn(LedgerWarning::StaleReference {
                    book_identifier: identifier.clone(),
                });
                false
            }
            Err(err) => {
                error!(book = %identifier, error = %err, "stock not restored after loan change");
                outcome.warn(LedgerWarning::StockNotRestored {
                    book_identifier: identifier.clone(),
                    reason: err.to_string(),
                });
                false
            }
        }
    }

    fn notify<T>(&self, student: &Student, notice: &Notice, outcome: &mut LedgerOutcome<T>) {
        if let Err(err) = self.notifier.send(&student.email, notice) {
            warn!(
                template = notice.kind.template(),
                destination = %student.email,
                error = %err,
                "notification failed"
            );
            outcome.warn(LedgerWarning::NotificationFailed {
                destination: student.email.clone(),
                reason: err.to_string(),
            });
        }
    }
}
