use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use super::domain::{Identifier, LoanId, LoanRecord, Student, StudentNo};
use super::error::CirculationError;
use super::penalty::PenaltyCalculator;
use super::policy::{shift_days, CirculationPolicy};
use super::repository::{LibraryStore, LoanFilter, LoanSort, Notice, NoticeKind, Notifier};

/// Book and borrower details joined onto a loan. Either side may be gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanContext {
    pub loan_id: LoanId,
    pub book_identifier: Identifier,
    pub book_title: Option<String>,
    pub thumbnail_url: Option<String>,
    pub student_no: StudentNo,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
    pub borrow_date: NaiveDate,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DueSoonEntry {
    #[serde(flatten)]
    pub loan: LoanContext,
    /// Zero means due today.
    pub days_left: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverdueEntry {
    #[serde(flatten)]
    pub loan: LoanContext,
    pub days_overdue: i64,
    /// Live estimate as of the classification date.
    pub penalty: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReturnedEntry {
    #[serde(flatten)]
    pub loan: LoanContext,
    pub return_date: NaiveDate,
    pub late: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_late: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub penalty: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationBuckets {
    pub due_soon: Vec<DueSoonEntry>,
    pub overdue: Vec<OverdueEntry>,
    pub recently_returned: Vec<ReturnedEntry>,
}

impl NotificationBuckets {
    pub fn is_empty(&self) -> bool {
        self.due_soon.is_empty() && self.overdue.is_empty() && self.recently_returned.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Read-only sweep that sorts loans into alerting buckets.
pub struct NotificationClassifier<S> {
    store: Arc<S>,
    penalties: PenaltyCalculator,
    due_soon_days: i64,
    recent_return_days: i64,
}

impl<S> NotificationClassifier<S>
where
    S: LibraryStore + 'static,
{
    pub fn new(store: Arc<S>, policy: &CirculationPolicy) -> Self {
        Self {
            store,
            penalties: policy.penalty_calculator(),
            due_soon_days: policy.due_soon_days,
            recent_return_days: policy.recent_return_days,
        }
    }

    pub fn classify(&self, as_of: NaiveDate) -> Result<NotificationBuckets, CirculationError> {
        let loans = self
            .store
            .query_loans(&LoanFilter::all(), LoanSort::DueDateAsc)?;
        // Windows that run off the calendar are clamped to its edges.
        let due_soon_until = shift_days(as_of, self.due_soon_days).unwrap_or(NaiveDate::MAX);
        let returned_since =
            shift_days(as_of, self.recent_return_days.saturating_neg()).unwrap_or(NaiveDate::MIN);

        let mut joiner = Joiner::new(self.store.as_ref());
        let mut buckets = NotificationBuckets::default();

        for record in &loans {
            match record.return_date {
                None if record.due_date < as_of => {
                    buckets.overdue.push(OverdueEntry {
                        loan: joiner.context(record)?,
                        days_overdue: (as_of - record.due_date).num_days(),
                        penalty: self.penalties.compute(record.due_date, as_of),
                    });
                }
                None if record.due_date <= due_soon_until => {
                    buckets.due_soon.push(DueSoonEntry {
                        loan: joiner.context(record)?,
                        days_left: (record.due_date - as_of).num_days(),
                    });
                }
                None => {}
                Some(returned) if returned >= returned_since => {
                    let late = returned > record.due_date;
                    buckets.recently_returned.push(ReturnedEntry {
                        loan: joiner.context(record)?,
                        return_date: returned,
                        late,
                        days_late: late.then(|| (returned - record.due_date).num_days()),
                        penalty: late.then_some(record.penalty),
                    });
                }
                Some(_) => {}
            }
        }

        buckets.recently_returned.sort_by(|a, b| {
            b.return_date
                .cmp(&a.return_date)
                .then_with(|| a.loan.loan_id.cmp(&b.loan.loan_id))
        });

        debug!(
            %as_of,
            due_soon = buckets.due_soon.len(),
            overdue = buckets.overdue.len(),
            recently_returned = buckets.recently_returned.len(),
            "loans classified"
        );

        Ok(buckets)
    }
}

/// Sends due-soon and overdue reminders for an already computed classification.
///
/// Transport failures are counted and logged; nothing here writes to the ledger.
pub fn dispatch_reminders<N>(buckets: &NotificationBuckets, notifier: &N) -> DispatchSummary
where
    N: Notifier + ?Sized,
{
    let mut summary = DispatchSummary::default();

    let due_soon = buckets.due_soon.iter().map(|entry| {
        let notice = reminder(NoticeKind::DueSoonReminder, &entry.loan)
            .with_detail("days_left", entry.days_left);
        (&entry.loan, notice)
    });
    let overdue = buckets.overdue.iter().map(|entry| {
        let notice = reminder(NoticeKind::OverdueReminder, &entry.loan)
            .with_detail("days_overdue", entry.days_overdue)
            .with_detail("penalty", entry.penalty);
        (&entry.loan, notice)
    });

    for (loan, notice) in due_soon.chain(overdue) {
        let Some(destination) = loan.student_email.as_deref() else {
            summary.skipped += 1;
            continue;
        };
        match notifier.send(destination, &notice) {
            Ok(()) => summary.sent += 1,
            Err(err) => {
                warn!(
                    loan_id = %loan.loan_id,
                    template = notice.kind.template(),
                    error = %err,
                    "reminder delivery failed"
                );
                summary.failed += 1;
            }
        }
    }

    summary
}

fn reminder(kind: NoticeKind, loan: &LoanContext) -> Notice {
    let mut notice =
        Notice::new(kind, loan.loan_id.clone()).with_detail("due_date", loan.due_date);
    if let Some(title) = &loan.book_title {
        notice = notice.with_detail("title", title);
    }
    if let Some(name) = &loan.student_name {
        notice = notice.with_detail("student_name", name);
    }
    notice
}

/// Memoizes book and student lookups for the duration of one sweep.
struct Joiner<'a, S: ?Sized> {
    store: &'a S,
    books: HashMap<Identifier, Option<(String, Option<String>)>>,
    students: HashMap<StudentNo, Option<Student>>,
}

impl<'a, S> Joiner<'a, S>
where
    S: LibraryStore + ?Sized,
{
    fn new(store: &'a S) -> Self {
        Self {
            store,
            books: HashMap::new(),
            students: HashMap::new(),
        }
    }

    fn context(&mut self, record: &LoanRecord) -> Result<LoanContext, CirculationError> {
        if !self.books.contains_key(&record.book_identifier) {
            let book = self
                .store
                .find_book(&record.book_identifier)?
                .map(|book| (book.title, book.thumbnail_url));
            self.books.insert(record.book_identifier.clone(), book);
        }
        if !self.students.contains_key(&record.student_no) {
            let student = self.store.find_student(&record.student_no)?;
            self.students.insert(record.student_no.clone(), student);
        }

        let book = self.books.get(&record.book_identifier).cloned().flatten();
        let student = self.students.get(&record.student_no).cloned().flatten();
        let (book_title, thumbnail_url) = match book {
            Some((title, thumbnail)) => (Some(title), thumbnail),
            None => (None, None),
        };

        Ok(LoanContext {
            loan_id: record.loan_id.clone(),
            book_identifier: record.book_identifier.clone(),
            book_title,
            thumbnail_url,
            student_no: record.student_no.clone(),
            student_name: student.as_ref().map(Student::full_name),
            student_email: student.map(|student| student.email),
            borrow_date: record.borrow_date,
            due_date: record.due_date,
        })
    }
}
