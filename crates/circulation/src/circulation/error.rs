use chrono::NaiveDate;
use serde::Serialize;

use super::domain::{Identifier, LoanId, StudentNo};
use super::repository::RepositoryError;

/// Caller-visible circulation failures. None of these are fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum CirculationError {
    #[error("book {0} not found")]
    BookNotFound(Identifier),
    #[error("student {0} not found")]
    StudentNotFound(StudentNo),
    #[error("loan {0} not found")]
    LoanNotFound(LoanId),
    #[error("book {0} has no copies on the shelf")]
    BookUnavailable(Identifier),
    #[error("student {student_no} already holds {active} of {limit} allowed loans")]
    LimitExceeded {
        student_no: StudentNo,
        active: usize,
        limit: usize,
    },
    #[error("loan {0} has already been returned")]
    AlreadyReturned(LoanId),
    #[error("loan {0} is still active")]
    StillActive(LoanId),
    #[error("identifier '{0}' matches neither an ISBN nor an accession number")]
    InvalidIdentifier(String),
    #[error("due date {due_date} precedes borrow date {borrow_date}")]
    InvalidDueDate {
        borrow_date: NaiveDate,
        due_date: NaiveDate,
    },
    #[error("return date {return_date} precedes borrow date {borrow_date}")]
    InvalidReturnDate {
        borrow_date: NaiveDate,
        return_date: NaiveDate,
    },
    #[error("{date} plus {days} days falls outside the supported calendar")]
    DateOutOfRange { date: NaiveDate, days: i64 },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Non-fatal conditions attached to an otherwise successful ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerWarning {
    /// The frozen identifier no longer resolves, so no stock was restored.
    StaleReference { book_identifier: Identifier },
    NotificationFailed { destination: String, reason: String },
    /// The student record is gone, so no receipt could be addressed.
    MissingRecipient { student_no: StudentNo },
    /// The student lookup for the receipt failed after the change was saved.
    RecipientUnavailable { student_no: StudentNo, reason: String },
    /// Stock could not be restored after the loan change was saved.
    StockNotRestored {
        book_identifier: Identifier,
        reason: String,
    },
}

impl LedgerWarning {
    pub fn message(&self) -> String {
        match self {
            LedgerWarning::StaleReference { book_identifier } => format!(
                "book {book_identifier} no longer exists; stock was not restored"
            ),
            LedgerWarning::NotificationFailed {
                destination,
                reason,
            } => format!("notification to {destination} failed: {reason}"),
            LedgerWarning::MissingRecipient { student_no } => {
                format!("student {student_no} not found; receipt not sent")
            }
            LedgerWarning::RecipientUnavailable { student_no, reason } => {
                format!("student {student_no} could not be loaded ({reason}); receipt not sent")
            }
            LedgerWarning::StockNotRestored {
                book_identifier,
                reason,
            } => format!("stock for {book_identifier} was not restored: {reason}"),
        }
    }
}

/// Result of a ledger mutation plus any warnings it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerOutcome<T> {
    pub value: T,
    pub warnings: Vec<LedgerWarning>,
}

impl<T> LedgerOutcome<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn warn(&mut self, warning: LedgerWarning) {
        self.warnings.push(warning);
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
