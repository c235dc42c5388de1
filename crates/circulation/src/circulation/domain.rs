use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Physical item identifier. A book is catalogued under exactly one scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "scheme", content = "value", rename_all = "snake_case")]
pub enum Identifier {
    Isbn(String),
    Accession(String),
}

impl Identifier {
    pub fn isbn(value: impl Into<String>) -> Self {
        Self::Isbn(value.into())
    }

    pub fn accession(value: impl Into<String>) -> Self {
        Self::Accession(value.into())
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Isbn(value) | Self::Accession(value) => value,
        }
    }

    pub const fn scheme_label(&self) -> &'static str {
        match self {
            Self::Isbn(_) => "isbn",
            Self::Accession(_) => "accession",
        }
    }

    /// Blank identifiers never resolve, so two absent values can't match each other.
    pub fn is_blank(&self) -> bool {
        self.value().trim().is_empty()
    }

    /// Trimmed copy used as the lookup key.
    pub fn normalized(&self) -> Self {
        match self {
            Self::Isbn(value) => Self::Isbn(value.trim().to_string()),
            Self::Accession(value) => Self::Accession(value.trim().to_string()),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme_label(), self.value())
    }
}

/// Stored shelf status. Advisory only; see [`Book::effective_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    OnShelf,
    OnLoan,
    Damaged,
    Lost,
    InRepair,
    Unavailable,
}

impl BookStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::OnShelf => "On Shelf",
            Self::OnLoan => "On Loan",
            Self::Damaged => "Damaged",
            Self::Lost => "Lost",
            Self::InRepair => "In Repair",
            Self::Unavailable => "Unavailable",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        let normalized: String = value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "onshelf" | "available" => Some(Self::OnShelf),
            "onloan" => Some(Self::OnLoan),
            "damaged" => Some(Self::Damaged),
            "lost" => Some(Self::Lost),
            "inrepair" => Some(Self::InRepair),
            "unavailable" => Some(Self::Unavailable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub identifier: Identifier,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub quantity: u32,
    pub status: BookStatus,
}

impl Book {
    pub fn is_available(&self) -> bool {
        self.quantity >= 1
    }

    /// Status as shown to patrons: an empty shelf reads as unavailable whatever is stored.
    pub fn effective_status(&self) -> BookStatus {
        if self.is_available() {
            self.status
        } else {
            BookStatus::Unavailable
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StudentNo(pub String);

impl fmt::Display for StudentNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub student_no: StudentNo,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub program: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoanId(pub String);

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state. Overdue is derived by the classifier, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanState {
    Active,
    Returned,
}

impl LoanState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Returned => "returned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRecord {
    pub loan_id: LoanId,
    /// Copy of the book identifier at checkout; later catalog edits don't touch it.
    pub book_identifier: Identifier,
    pub student_no: StudentNo,
    pub borrow_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub penalty: u64,
    pub created_at: DateTime<Utc>,
}

impl LoanRecord {
    pub fn state(&self) -> LoanState {
        if self.return_date.is_some() {
            LoanState::Returned
        } else {
            LoanState::Active
        }
    }

    pub fn is_active(&self) -> bool {
        self.return_date.is_none()
    }
}

/// Explicit per-request caller information threaded into every ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            request_id: None,
        }
    }

    pub fn system() -> Self {
        Self::new("system")
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::system()
    }
}
