use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

use super::domain::{Book, BookStatus, Identifier, Student, StudentNo};

#[derive(Debug)]
pub enum CatalogImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Row { line: u64, reason: String },
}

impl std::fmt::Display for CatalogImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogImportError::Io(err) => write!(f, "failed to read catalog export: {}", err),
            CatalogImportError::Csv(err) => write!(f, "invalid catalog CSV data: {}", err),
            CatalogImportError::Row { line, reason } => {
                write!(f, "invalid catalog row at line {}: {}", line, reason)
            }
        }
    }
}

impl std::error::Error for CatalogImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogImportError::Io(err) => Some(err),
            CatalogImportError::Csv(err) => Some(err),
            CatalogImportError::Row { .. } => None,
        }
    }
}

impl From<std::io::Error> for CatalogImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for CatalogImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Reads book and student seed data from spreadsheet-style CSV exports.
pub struct CatalogImporter;

impl CatalogImporter {
    pub fn books_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<Book>, CatalogImportError> {
        let file = std::fs::File::open(path)?;
        Self::books_from_reader(file)
    }

    /// Expects `ISBN`, `Accession Number`, `Title`, `Quantity` and optional
    /// `Status` / `Thumbnail` columns. Exactly one identifier column must be set.
    pub fn books_from_reader<R: Read>(reader: R) -> Result<Vec<Book>, CatalogImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut books = Vec::new();

        for (index, row) in csv_reader.deserialize::<BookRow>().enumerate() {
            let row = row?;
            let line = index as u64 + 2;
            let identifier = match (row.isbn, row.accession_number) {
                (Some(isbn), None) => Identifier::Isbn(isbn),
                (None, Some(accession)) => Identifier::Accession(accession),
                (Some(_), Some(_)) => {
                    return Err(CatalogImportError::Row {
                        line,
                        reason: "both ISBN and accession number are set".to_string(),
                    })
                }
                (None, None) => {
                    return Err(CatalogImportError::Row {
                        line,
                        reason: "missing ISBN or accession number".to_string(),
                    })
                }
            };
            let status = match row.status.as_deref() {
                None => BookStatus::OnShelf,
                Some(label) => BookStatus::from_label(label).ok_or_else(|| {
                    CatalogImportError::Row {
                        line,
                        reason: format!("unknown status '{label}'"),
                    }
                })?,
            };

            books.push(Book {
                identifier,
                title: row.title,
                thumbnail_url: row.thumbnail,
                quantity: row.quantity,
                status,
            });
        }

        Ok(books)
    }

    pub fn students_from_path<P: AsRef<Path>>(
        path: P,
    ) -> Result<Vec<Student>, CatalogImportError> {
        let file = std::fs::File::open(path)?;
        Self::students_from_reader(file)
    }

    pub fn students_from_reader<R: Read>(reader: R) -> Result<Vec<Student>, CatalogImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut students = Vec::new();

        for row in csv_reader.deserialize::<StudentRow>() {
            let row = row?;
            students.push(Student {
                student_no: StudentNo(row.student_no),
                email: row.email,
                first_name: row.first_name,
                last_name: row.last_name,
                program: row.program,
                contact_number: row.contact_number,
                address: row.address,
            });
        }

        Ok(students)
    }

    pub fn loans_from_path<P: AsRef<Path>>(
        path: P,
    ) -> Result<Vec<LoanHistoryEntry>, CatalogImportError> {
        let file = std::fs::File::open(path)?;
        Self::loans_from_reader(file)
    }

    /// Circulation history export: `Book`, `Student No`, `Borrow Date`,
    /// `Due Date` and an optional `Return Date`, one row per loan.
    pub fn loans_from_reader<R: Read>(
        reader: R,
    ) -> Result<Vec<LoanHistoryEntry>, CatalogImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut loans = Vec::new();

        for (index, row) in csv_reader.deserialize::<LoanRow>().enumerate() {
            let row = row?;
            let line = index as u64 + 2;
            let return_date = match row.return_date.as_deref() {
                None => None,
                Some(raw) => Some(parse_row_date(raw, line, "Return Date")?),
            };
            loans.push(LoanHistoryEntry {
                line,
                book: row.book,
                student_no: StudentNo(row.student_no),
                borrow_date: parse_row_date(&row.borrow_date, line, "Borrow Date")?,
                due_date: parse_row_date(&row.due_date, line, "Due Date")?,
                return_date,
            });
        }

        Ok(loans)
    }
}

/// One historical loan to be replayed through the ledger. `book` is raw
/// input and resolves by ISBN first, then accession number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanHistoryEntry {
    pub line: u64,
    pub book: String,
    pub student_no: StudentNo,
    pub borrow_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
}

fn parse_row_date(raw: &str, line: u64, column: &str) -> Result<NaiveDate, CatalogImportError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|err| CatalogImportError::Row {
        line,
        reason: format!("{column} '{raw}' is not YYYY-MM-DD ({err})"),
    })
}

#[derive(Debug, Deserialize)]
struct BookRow {
    #[serde(rename = "ISBN", default, deserialize_with = "empty_string_as_none")]
    isbn: Option<String>,
    #[serde(
        rename = "Accession Number",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    accession_number: Option<String>,
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Quantity")]
    quantity: u32,
    #[serde(rename = "Status", default, deserialize_with = "empty_string_as_none")]
    status: Option<String>,
    #[serde(
        rename = "Thumbnail",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    thumbnail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StudentRow {
    #[serde(rename = "Student No")]
    student_no: String,
    #[serde(rename = "Email")]
    email: String,
    #[serde(rename = "First Name")]
    first_name: String,
    #[serde(rename = "Last Name")]
    last_name: String,
    #[serde(rename = "Program")]
    program: String,
    #[serde(
        rename = "Contact Number",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    contact_number: Option<String>,
    #[serde(rename = "Address", default, deserialize_with = "empty_string_as_none")]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoanRow {
    #[serde(rename = "Book")]
    book: String,
    #[serde(rename = "Student No")]
    student_no: String,
    #[serde(rename = "Borrow Date")]
    borrow_date: String,
    #[serde(rename = "Due Date")]
    due_date: String,
    #[serde(
        rename = "Return Date",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    return_date: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
