use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::circulation::domain::{
    Book, BookStatus, Identifier, LoanId, LoanRecord, RequestContext, Student, StudentNo,
};
use crate::circulation::ids::LoanIdGenerator;
use crate::circulation::memory::InMemoryLibrary;
use crate::circulation::repository::{
    AuditEvent, AuditLog, CatalogStore, DeleteScope, LoanFilter, LoanSort, LoanStore, LoanUpdate,
    Notice, Notifier, NotifyError, RepositoryError, StudentStore,
};
use crate::circulation::{CirculationLedger, CirculationPolicy, CirculationService};

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn ctx() -> RequestContext {
    RequestContext::new("librarian@test")
}

pub(super) fn isbn_b1() -> Identifier {
    Identifier::isbn("9780262033848")
}

pub(super) fn isbn_b2() -> Identifier {
    Identifier::isbn("9780131103627")
}

pub(super) fn isbn_b3() -> Identifier {
    Identifier::isbn("9780201633610")
}

pub(super) fn accession_b4() -> Identifier {
    Identifier::accession("ACC-1999-014")
}

pub(super) fn s1() -> StudentNo {
    StudentNo("2021-00123".to_string())
}

pub(super) fn s2() -> StudentNo {
    StudentNo("2022-00456".to_string())
}

pub(super) fn book(identifier: Identifier, title: &str, quantity: u32) -> Book {
    Book {
        identifier,
        title: title.to_string(),
        thumbnail_url: None,
        quantity,
        status: BookStatus::OnShelf,
    }
}

pub(super) fn student(student_no: StudentNo, first_name: &str, email: &str) -> Student {
    Student {
        student_no,
        email: email.to_string(),
        first_name: first_name.to_string(),
        last_name: "Santos".to_string(),
        program: "BSCS".to_string(),
        contact_number: None,
        address: None,
    }
}

/// B1 has two copies, the rest one each; S1 and S2 start without loans.
pub(super) fn seeded_store() -> Arc<InMemoryLibrary> {
    let store = Arc::new(InMemoryLibrary::new());
    for book in [
        book(isbn_b1(), "Introduction to Algorithms", 2),
        book(isbn_b2(), "The C Programming Language", 1),
        book(isbn_b3(), "Design Patterns", 1),
        book(accession_b4(), "Florante at Laura", 1),
    ] {
        store.insert_book(book).expect("seed book");
    }
    store
        .insert_student(student(s1(), "Maria", "maria@example.edu"))
        .expect("seed student");
    store
        .insert_student(student(s2(), "Jose", "jose@example.edu"))
        .expect("seed student");
    store
}

pub(super) fn quantity(store: &InMemoryLibrary, identifier: &Identifier) -> u32 {
    store
        .find_book(identifier)
        .expect("lookup")
        .expect("book present")
        .quantity
}

#[derive(Default)]
pub(super) struct MemoryNotifier {
    sent: Mutex<Vec<(String, Notice)>>,
    failing: AtomicBool,
}

impl MemoryNotifier {
    pub(super) fn failing() -> Self {
        let notifier = Self::default();
        notifier.failing.store(true, Ordering::SeqCst);
        notifier
    }

    pub(super) fn sent(&self) -> Vec<(String, Notice)> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

impl Notifier for MemoryNotifier {
    fn send(&self, destination: &str, notice: &Notice) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("smtp relay offline".to_string()));
        }
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push((destination.to_string(), notice.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemoryAudit {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAudit {
    pub(super) fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit mutex poisoned").clone()
    }
}

impl AuditLog for MemoryAudit {
    fn record(&self, event: AuditEvent) {
        self.events.lock().expect("audit mutex poisoned").push(event);
    }
}

/// Hands out a scripted id sequence, then falls back to numbered ids.
#[derive(Default)]
pub(super) struct ScriptedIds {
    queue: Mutex<VecDeque<String>>,
    counter: Mutex<u32>,
}

impl ScriptedIds {
    pub(super) fn new(ids: &[&str]) -> Self {
        Self {
            queue: Mutex::new(ids.iter().map(|id| id.to_string()).collect()),
            counter: Mutex::new(0),
        }
    }
}

impl LoanIdGenerator for ScriptedIds {
    fn next_id(&self) -> LoanId {
        if let Some(id) = self.queue.lock().expect("id mutex poisoned").pop_front() {
            return LoanId(id);
        }
        let mut counter = self.counter.lock().expect("id mutex poisoned");
        *counter += 1;
        LoanId(format!("240101{:05x}", *counter))
    }
}

pub(super) type TestLedger = CirculationLedger<InMemoryLibrary, MemoryNotifier, MemoryAudit>;
pub(super) type TestService = CirculationService<InMemoryLibrary, MemoryNotifier, MemoryAudit>;

pub(super) fn build_ledger() -> (
    TestLedger,
    Arc<InMemoryLibrary>,
    Arc<MemoryNotifier>,
    Arc<MemoryAudit>,
) {
    let store = seeded_store();
    let notifier = Arc::new(MemoryNotifier::default());
    let audit = Arc::new(MemoryAudit::default());
    let ledger = CirculationLedger::new(
        store.clone(),
        notifier.clone(),
        audit.clone(),
        CirculationPolicy::default(),
    );
    (ledger, store, notifier, audit)
}

pub(super) fn build_service() -> (Arc<TestService>, Arc<InMemoryLibrary>) {
    let store = seeded_store();
    let service = CirculationService::new(
        store.clone(),
        Arc::new(MemoryNotifier::default()),
        Arc::new(MemoryAudit::default()),
        CirculationPolicy::default(),
    );
    (Arc::new(service), store)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Wraps the in-memory store so student lookups or restocking can be made to
/// fail once a loan already exists.
pub(super) struct FlakyStore {
    inner: Arc<InMemoryLibrary>,
    fail_student_lookup: AtomicBool,
    fail_restock: AtomicBool,
}

impl FlakyStore {
    pub(super) fn new(inner: Arc<InMemoryLibrary>) -> Self {
        Self {
            inner,
            fail_student_lookup: AtomicBool::new(false),
            fail_restock: AtomicBool::new(false),
        }
    }

    pub(super) fn break_student_lookup(&self) {
        self.fail_student_lookup.store(true, Ordering::SeqCst);
    }

    pub(super) fn break_restock(&self) {
        self.fail_restock.store(true, Ordering::SeqCst);
    }
}

impl CatalogStore for FlakyStore {
    fn find_book(&self, identifier: &Identifier) -> Result<Option<Book>, RepositoryError> {
        self.inner.find_book(identifier)
    }

    fn insert_book(&self, book: Book) -> Result<Book, RepositoryError> {
        self.inner.insert_book(book)
    }

    fn adjust_stock(&self, identifier: &Identifier, delta: i32) -> Result<u32, RepositoryError> {
        if delta > 0 && self.fail_restock.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("catalog offline".to_string()));
        }
        self.inner.adjust_stock(identifier, delta)
    }
}

impl StudentStore for FlakyStore {
    fn find_student(&self, student_no: &StudentNo) -> Result<Option<Student>, RepositoryError> {
        if self.fail_student_lookup.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("directory offline".to_string()));
        }
        self.inner.find_student(student_no)
    }

    fn insert_student(&self, student: Student) -> Result<Student, RepositoryError> {
        self.inner.insert_student(student)
    }
}

impl LoanStore for FlakyStore {
    fn count_active_loans(&self, student_no: &StudentNo) -> Result<usize, RepositoryError> {
        self.inner.count_active_loans(student_no)
    }

    fn count_total_loans(&self, student_no: &StudentNo) -> Result<usize, RepositoryError> {
        self.inner.count_total_loans(student_no)
    }

    fn insert_active_loan(
        &self,
        record: LoanRecord,
        max_active: usize,
    ) -> Result<LoanRecord, RepositoryError> {
        self.inner.insert_active_loan(record, max_active)
    }

    fn find_loan(&self, loan_id: &LoanId) -> Result<Option<LoanRecord>, RepositoryError> {
        self.inner.find_loan(loan_id)
    }

    fn update_loan(
        &self,
        loan_id: &LoanId,
        update: LoanUpdate,
    ) -> Result<LoanRecord, RepositoryError> {
        self.inner.update_loan(loan_id, update)
    }

    fn delete_loan(
        &self,
        loan_id: &LoanId,
        scope: DeleteScope,
    ) -> Result<LoanRecord, RepositoryError> {
        self.inner.delete_loan(loan_id, scope)
    }

    fn query_loans(
        &self,
        filter: &LoanFilter,
        sort: LoanSort,
    ) -> Result<Vec<LoanRecord>, RepositoryError> {
        self.inner.query_loans(filter, sort)
    }
}

pub(super) type FlakyLedger = CirculationLedger<FlakyStore, MemoryNotifier, MemoryAudit>;

pub(super) fn build_flaky_ledger() -> (FlakyLedger, Arc<FlakyStore>, Arc<InMemoryLibrary>) {
    let inner = seeded_store();
    let store = Arc::new(FlakyStore::new(inner.clone()));
    let ledger = CirculationLedger::new(
        store.clone(),
        Arc::new(MemoryNotifier::default()),
        Arc::new(MemoryAudit::default()),
        CirculationPolicy::default(),
    );
    (ledger, store, inner)
}
