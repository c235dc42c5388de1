//! Circulation and penalty engine.
//!
//! Checkout resolves the book and student, checks the borrowing limit, takes a
//! unit of stock and inserts the loan through the store's conditional insert.
//! Returns freeze the penalty and restore stock under the identifier recorded
//! at checkout. Classification is a read-only sweep.

pub mod catalog;
pub mod domain;
pub mod error;
pub mod ids;
pub mod import;
pub mod ledger;
pub mod limits;
pub mod memory;
pub mod notifications;
pub mod penalty;
pub mod policy;
pub mod repository;
pub mod router;
pub mod service;
pub mod students;

#[cfg(test)]
mod tests;

pub use catalog::BookCatalog;
pub use domain::{
    Book, BookStatus, Identifier, LoanId, LoanRecord, LoanState, RequestContext, Student,
    StudentNo,
};
pub use error::{CirculationError, LedgerOutcome, LedgerWarning};
pub use ids::{DatePrefixedIdGenerator, LoanIdGenerator};
pub use import::{CatalogImportError, CatalogImporter, LoanHistoryEntry};
pub use ledger::{CheckoutRequest, CirculationLedger, DeletedLoan};
pub use limits::{Eligibility, LoanLimitGuard};
pub use memory::InMemoryLibrary;
pub use notifications::{
    dispatch_reminders, DispatchSummary, DueSoonEntry, LoanContext, NotificationBuckets,
    NotificationClassifier, OverdueEntry, ReturnedEntry,
};
pub use penalty::PenaltyCalculator;
pub use policy::CirculationPolicy;
pub use repository::{
    AuditEvent, AuditLog, CatalogStore, DeleteScope, LibraryStore, LoanFilter, LoanSort,
    LoanStore, LoanUpdate, Notice, NoticeKind, Notifier, NotifyError, RepositoryError,
    StudentStore,
};
pub use router::circulation_router;
pub use service::CirculationService;
pub use students::StudentDirectory;
