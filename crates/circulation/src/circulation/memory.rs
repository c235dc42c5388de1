use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{Book, Identifier, LoanId, LoanRecord, LoanState, Student, StudentNo};
use super::repository::{
    CatalogStore, DeleteScope, LoanFilter, LoanSort, LoanStore, LoanUpdate, RepositoryError,
    StudentStore,
};

#[derive(Debug, Default)]
struct Tables {
    books: HashMap<Identifier, Book>,
    students: HashMap<StudentNo, Student>,
    loans: HashMap<LoanId, LoanRecord>,
}

impl Tables {
    fn active_loans(&self, student_no: &StudentNo) -> usize {
        self.loans
            .values()
            .filter(|loan| &loan.student_no == student_no && loan.is_active())
            .count()
    }
}

/// Single-lock in-memory store. Each trait call is one critical section, which
/// makes the conditional writes atomic with respect to concurrent callers.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLibrary {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }

    pub fn books(&self) -> Result<Vec<Book>, RepositoryError> {
        let tables = self.lock()?;
        let mut books: Vec<Book> = tables.books.values().cloned().collect();
        books.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(books)
    }

    /// Replaces a catalog entry wholesale, or removes it when `book` is `None`.
    pub fn replace_book(
        &self,
        identifier: &Identifier,
        book: Option<Book>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        tables.books.remove(identifier);
        if let Some(book) = book {
            tables.books.insert(book.identifier.clone(), book);
        }
        Ok(())
    }

    pub fn remove_student(&self, student_no: &StudentNo) -> Result<(), RepositoryError> {
        self.lock()?.students.remove(student_no);
        Ok(())
    }
}

impl CatalogStore for InMemoryLibrary {
    fn find_book(&self, identifier: &Identifier) -> Result<Option<Book>, RepositoryError> {
        if identifier.is_blank() {
            return Ok(None);
        }
        Ok(self.lock()?.books.get(identifier).cloned())
    }

    fn insert_book(&self, book: Book) -> Result<Book, RepositoryError> {
        let mut tables = self.lock()?;
        if tables.books.contains_key(&book.identifier) {
            return Err(RepositoryError::Conflict);
        }
        tables.books.insert(book.identifier.clone(), book.clone());
        Ok(book)
    }

    fn adjust_stock(&self, identifier: &Identifier, delta: i32) -> Result<u32, RepositoryError> {
        let mut tables = self.lock()?;
        let book = tables
            .books
            .get_mut(identifier)
            .ok_or(RepositoryError::NotFound)?;
        let next = i64::from(book.quantity) + i64::from(delta);
        if next < 0 {
            return Err(RepositoryError::OutOfStock);
        }
        book.quantity = u32::try_from(next).unwrap_or(u32::MAX);
        Ok(book.quantity)
    }
}

impl StudentStore for InMemoryLibrary {
    fn find_student(&self, student_no: &StudentNo) -> Result<Option<Student>, RepositoryError> {
        Ok(self.lock()?.students.get(student_no).cloned())
    }

    fn insert_student(&self, student: Student) -> Result<Student, RepositoryError> {
        let mut tables = self.lock()?;
        if tables.students.contains_key(&student.student_no) {
            return Err(RepositoryError::Conflict);
        }
        tables
            .students
            .insert(student.student_no.clone(), student.clone());
        Ok(student)
    }
}

impl LoanStore for InMemoryLibrary {
    fn count_active_loans(&self, student_no: &StudentNo) -> Result<usize, RepositoryError> {
        Ok(self.lock()?.active_loans(student_no))
    }

    fn count_total_loans(&self, student_no: &StudentNo) -> Result<usize, RepositoryError> {
        let tables = self.lock()?;
        Ok(tables
            .loans
            .values()
            .filter(|loan| &loan.student_no == student_no)
            .count())
    }

    fn insert_active_loan(
        &self,
        record: LoanRecord,
        max_active: usize,
    ) -> Result<LoanRecord, RepositoryError> {
        let mut tables = self.lock()?;
        if tables.loans.contains_key(&record.loan_id) {
            return Err(RepositoryError::Conflict);
        }
        let active = tables.active_loans(&record.student_no);
        if active >= max_active {
            return Err(RepositoryError::LimitReached { active });
        }
        tables.loans.insert(record.loan_id.clone(), record.clone());
        Ok(record)
    }

    fn find_loan(&self, loan_id: &LoanId) -> Result<Option<LoanRecord>, RepositoryError> {
        Ok(self.lock()?.loans.get(loan_id).cloned())
    }

    fn update_loan(
        &self,
        loan_id: &LoanId,
        update: LoanUpdate,
    ) -> Result<LoanRecord, RepositoryError> {
        let mut tables = self.lock()?;
        let loan = tables
            .loans
            .get_mut(loan_id)
            .ok_or(RepositoryError::NotFound)?;
        if !loan.is_active() {
            return Err(RepositoryError::StateMismatch {
                actual: LoanState::Returned,
            });
        }
        loan.return_date = Some(update.return_date);
        loan.penalty = update.penalty;
        Ok(loan.clone())
    }

    fn delete_loan(
        &self,
        loan_id: &LoanId,
        scope: DeleteScope,
    ) -> Result<LoanRecord, RepositoryError> {
        let mut tables = self.lock()?;
        let loan = tables.loans.get(loan_id).ok_or(RepositoryError::NotFound)?;
        if scope == DeleteScope::ReturnedOnly && loan.is_active() {
            return Err(RepositoryError::StateMismatch {
                actual: LoanState::Active,
            });
        }
        tables.loans.remove(loan_id).ok_or(RepositoryError::NotFound)
    }

    fn query_loans(
        &self,
        filter: &LoanFilter,
        sort: LoanSort,
    ) -> Result<Vec<LoanRecord>, RepositoryError> {
        let tables = self.lock()?;
        let mut loans: Vec<LoanRecord> = tables
            .loans
            .values()
            .filter(|loan| filter.matches(loan))
            .cloned()
            .collect();
        drop(tables);
        sort.apply(&mut loans);
        Ok(loans)
    }
}
