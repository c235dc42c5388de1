use chrono::NaiveDate;
use circulation::circulation::{
    AuditEvent, AuditLog, BookCatalog, CatalogImporter, CirculationPolicy, CirculationService,
    InMemoryLibrary, LoanHistoryEntry, Notice, Notifier, NotifyError, RequestContext,
    StudentDirectory,
};
use circulation::error::AppError;
use metrics_exporter_prometheus::PrometheusHandle;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type LibraryService = CirculationService<InMemoryLibrary, OutboxNotifier, TracingAuditLog>;

/// Keeps every notice in memory and logs it; delivery is left to a mail relay.
#[derive(Default, Clone)]
pub(crate) struct OutboxNotifier {
    outbox: Arc<Mutex<Vec<(String, Notice)>>>,
}

impl Notifier for OutboxNotifier {
    fn send(&self, destination: &str, notice: &Notice) -> Result<(), NotifyError> {
        if !destination.contains('@') {
            return Err(NotifyError::InvalidDestination(destination.to_string()));
        }
        let mut guard = self
            .outbox
            .lock()
            .map_err(|_| NotifyError::Transport("outbox mutex poisoned".to_string()))?;
        info!(
            template = notice.kind.template(),
            loan_id = %notice.loan_id,
            destination,
            "notice queued"
        );
        guard.push((destination.to_string(), notice.clone()));
        Ok(())
    }
}

impl OutboxNotifier {
    pub(crate) fn queued(&self) -> Vec<(String, Notice)> {
        self.outbox
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

/// Activity log sink backed by `tracing`.
#[derive(Default, Clone, Copy)]
pub(crate) struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn record(&self, event: AuditEvent) {
        info!(
            target: "audit",
            event_type = event.event_type,
            actor = %event.actor,
            "{}",
            event.description
        );
    }
}

const SAMPLE_BOOKS: &str = "\
ISBN,Accession Number,Title,Quantity,Status
9780262033848,,Introduction to Algorithms,2,On Shelf
9780131103627,,The C Programming Language,1,On Shelf
9780201633610,,Design Patterns,1,On Shelf
,ACC-1999-014,Florante at Laura,1,On Shelf
,ACC-2003-101,Noli Me Tangere,3,On Shelf
";

const SAMPLE_STUDENTS: &str = "\
Student No,Email,First Name,Last Name,Program,Contact Number,Address
2021-00123,maria.santos@example.edu,Maria,Santos,BSCS,,
2022-00456,jose.rizal@example.edu,Jose,Rizal,BSIT,,
";

/// Builds the in-memory library from CSV exports, falling back to the bundled sample data.
pub(crate) fn seed_library(
    books_csv: Option<&Path>,
    students_csv: Option<&Path>,
) -> Result<Arc<InMemoryLibrary>, AppError> {
    let store = Arc::new(InMemoryLibrary::new());

    let books = match books_csv {
        Some(path) => CatalogImporter::books_from_path(path)?,
        None => CatalogImporter::books_from_reader(Cursor::new(SAMPLE_BOOKS))?,
    };
    let students = match students_csv {
        Some(path) => CatalogImporter::students_from_path(path)?,
        None => CatalogImporter::students_from_reader(Cursor::new(SAMPLE_STUDENTS))?,
    };

    let catalog = BookCatalog::new(store.clone());
    let directory = StudentDirectory::new(store.clone());
    let (book_count, student_count) = (books.len(), students.len());
    for book in books {
        catalog.register(book)?;
    }
    for student in students {
        directory.register(student)?;
    }

    info!(books = book_count, students = student_count, "library seeded");
    Ok(store)
}

pub(crate) fn build_service(
    store: Arc<InMemoryLibrary>,
    notifier: OutboxNotifier,
    policy: CirculationPolicy,
) -> LibraryService {
    CirculationService::new(store, Arc::new(notifier), Arc::new(TracingAuditLog), policy)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReplaySummary {
    pub(crate) replayed: usize,
    pub(crate) rejected: usize,
}

/// Replays a circulation history export through the ledger in row order.
/// Rows the ledger refuses are logged and counted, not fatal.
pub(crate) fn replay_history(
    service: &LibraryService,
    history: Vec<LoanHistoryEntry>,
) -> ReplaySummary {
    let ctx = RequestContext::new("history-import");
    let mut summary = ReplaySummary::default();

    for entry in history {
        let result = service.find_book(&entry.book).and_then(|book| {
            let loan = service
                .checkout_book(
                    &ctx,
                    book.identifier,
                    entry.student_no.clone(),
                    entry.borrow_date,
                    Some(entry.due_date),
                )?
                .value;
            if let Some(returned) = entry.return_date {
                service.return_book(&ctx, &loan.loan_id, returned)?;
            }
            Ok(loan)
        });

        match result {
            Ok(_) => summary.replayed += 1,
            Err(err) => {
                warn!(line = entry.line, error = %err, "history row rejected");
                summary.rejected += 1;
            }
        }
    }

    summary
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
