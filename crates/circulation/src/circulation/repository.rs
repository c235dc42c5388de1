use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{Book, Identifier, LoanId, LoanRecord, LoanState, Student, StudentNo};

/// Catalog storage. Stock changes must be atomic conditional updates.
pub trait CatalogStore: Send + Sync {
    fn find_book(&self, identifier: &Identifier) -> Result<Option<Book>, RepositoryError>;
    fn insert_book(&self, book: Book) -> Result<Book, RepositoryError>;
    /// Applies `delta` to the book's quantity and returns the new quantity.
    ///
    /// A decrement that would take the quantity below zero fails with
    /// [`RepositoryError::OutOfStock`] and leaves the record untouched.
    fn adjust_stock(&self, identifier: &Identifier, delta: i32) -> Result<u32, RepositoryError>;
}

pub trait StudentStore: Send + Sync {
    fn find_student(&self, student_no: &StudentNo) -> Result<Option<Student>, RepositoryError>;
    fn insert_student(&self, student: Student) -> Result<Student, RepositoryError>;
}

/// Loan storage. Every write is a single conditional operation so concurrent
/// handlers can't push a student past the limit or close a loan twice.
pub trait LoanStore: Send + Sync {
    fn count_active_loans(&self, student_no: &StudentNo) -> Result<usize, RepositoryError>;
    fn count_total_loans(&self, student_no: &StudentNo) -> Result<usize, RepositoryError>;
    /// Inserts the record only while the student holds fewer than `max_active`
    /// active loans. Duplicate ids fail with [`RepositoryError::Conflict`].
    fn insert_active_loan(
        &self,
        record: LoanRecord,
        max_active: usize,
    ) -> Result<LoanRecord, RepositoryError>;
    fn find_loan(&self, loan_id: &LoanId) -> Result<Option<LoanRecord>, RepositoryError>;
    /// Closes an active loan. Fails with [`RepositoryError::StateMismatch`] when
    /// the loan was already returned.
    fn update_loan(&self, loan_id: &LoanId, update: LoanUpdate)
        -> Result<LoanRecord, RepositoryError>;
    /// Removes the loan and hands back the removed row.
    fn delete_loan(&self, loan_id: &LoanId, scope: DeleteScope)
        -> Result<LoanRecord, RepositoryError>;
    fn query_loans(
        &self,
        filter: &LoanFilter,
        sort: LoanSort,
    ) -> Result<Vec<LoanRecord>, RepositoryError>;
}

/// Everything the ledger needs from a single logical store.
pub trait LibraryStore: CatalogStore + StudentStore + LoanStore {}

impl<T> LibraryStore for T where T: CatalogStore + StudentStore + LoanStore {}

/// Fields written when a loan is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanUpdate {
    pub return_date: NaiveDate,
    pub penalty: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteScope {
    AnyState,
    /// History pruning: rejects loans that are still active.
    ReturnedOnly,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoanFilter {
    pub student_no: Option<StudentNo>,
    pub book_identifier: Option<Identifier>,
    pub state: Option<LoanState>,
}

impl LoanFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn active() -> Self {
        Self {
            state: Some(LoanState::Active),
            ..Self::default()
        }
    }

    pub fn for_student(student_no: StudentNo) -> Self {
        Self {
            student_no: Some(student_no),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &LoanRecord) -> bool {
        self.student_no
            .as_ref()
            .map_or(true, |no| &record.student_no == no)
            && self
                .book_identifier
                .as_ref()
                .map_or(true, |id| &record.book_identifier == id)
            && self.state.map_or(true, |state| record.state() == state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoanSort {
    #[default]
    CreatedAtAsc,
    DueDateAsc,
    ReturnDateDesc,
}

impl LoanSort {
    pub fn apply(self, records: &mut [LoanRecord]) {
        match self {
            LoanSort::CreatedAtAsc => records.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.loan_id.cmp(&b.loan_id))
            }),
            LoanSort::DueDateAsc => records.sort_by(|a, b| {
                a.due_date
                    .cmp(&b.due_date)
                    .then_with(|| a.loan_id.cmp(&b.loan_id))
            }),
            LoanSort::ReturnDateDesc => records.sort_by(|a, b| {
                b.return_date
                    .cmp(&a.return_date)
                    .then_with(|| a.loan_id.cmp(&b.loan_id))
            }),
        }
    }
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("no stock left to decrement")]
    OutOfStock,
    #[error("active loan limit reached ({active} active)")]
    LimitReached { active: usize },
    #[error("loan is {}", .actual.label())]
    StateMismatch { actual: LoanState },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound receipt and reminder hook (e-mail or similar transport).
pub trait Notifier: Send + Sync {
    fn send(&self, destination: &str, notice: &Notice) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    CheckoutReceipt,
    ReturnReceipt,
    DueSoonReminder,
    OverdueReminder,
}

impl NoticeKind {
    pub const fn template(self) -> &'static str {
        match self {
            Self::CheckoutReceipt => "checkout_receipt",
            Self::ReturnReceipt => "return_receipt",
            Self::DueSoonReminder => "due_soon_reminder",
            Self::OverdueReminder => "overdue_reminder",
        }
    }
}

/// Structured payload handed to the notifier; rendering is the transport's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub loan_id: LoanId,
    pub details: BTreeMap<String, String>,
}

impl Notice {
    pub fn new(kind: NoticeKind, loan_id: LoanId) -> Self {
        Self {
            kind,
            loan_id,
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("invalid destination address '{0}'")]
    InvalidDestination(String),
}

/// Fire-and-forget activity log.
pub trait AuditLog: Send + Sync {
    fn record(&self, event: AuditEvent);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub event_type: &'static str,
    pub actor: String,
    pub description: String,
}
