use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{Identifier, LoanId, LoanRecord, LoanState, RequestContext, StudentNo};
use super::error::{CirculationError, LedgerOutcome};
use super::repository::{AuditLog, LibraryStore, Notifier, RepositoryError};
use super::service::CirculationService;

pub const ACTOR_HEADER: &str = "x-actor";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Router builder exposing the circulation endpoints.
pub fn circulation_router<S, N, A>(service: Arc<CirculationService<S, N, A>>) -> Router
where
    S: LibraryStore + 'static,
    N: Notifier + 'static,
    A: AuditLog + 'static,
{
    Router::new()
        .route("/api/v1/loans", post(checkout_handler::<S, N, A>))
        .route(
            "/api/v1/loans/:loan_id",
            get(loan_handler::<S, N, A>).delete(delete_handler::<S, N, A>),
        )
        .route(
            "/api/v1/loans/:loan_id/return",
            post(return_handler::<S, N, A>),
        )
        .route(
            "/api/v1/loans/:loan_id/history",
            delete(clear_history_handler::<S, N, A>),
        )
        .route(
            "/api/v1/loans/:loan_id/penalty",
            get(penalty_handler::<S, N, A>),
        )
        .route(
            "/api/v1/notifications",
            get(notifications_handler::<S, N, A>),
        )
        .route(
            "/api/v1/books/:identifier",
            get(book_handler::<S, N, A>),
        )
        .route(
            "/api/v1/students/:student_no",
            get(student_handler::<S, N, A>),
        )
        .with_state(service)
}

/// Either a typed identifier (`{"scheme": "isbn", "value": "..."}`) or free text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BookReference {
    Typed(Identifier),
    Raw(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutBody {
    pub book: BookReference,
    pub student_no: String,
    #[serde(default)]
    pub borrow_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReturnBody {
    #[serde(default)]
    pub return_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub allow_active: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AsOfParams {
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

/// Loan payload returned by the API, with any non-fatal warnings.
#[derive(Debug, Clone, Serialize)]
pub struct LoanView {
    #[serde(flatten)]
    pub loan: LoanRecord,
    pub state: LoanState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl LoanView {
    fn from_record(loan: LoanRecord) -> Self {
        Self {
            state: loan.state(),
            loan,
            warnings: Vec::new(),
        }
    }

    fn from_outcome(outcome: LedgerOutcome<LoanRecord>) -> Self {
        let warnings = outcome.warnings.iter().map(|w| w.message()).collect();
        Self {
            warnings,
            ..Self::from_record(outcome.value)
        }
    }
}

pub fn request_context(headers: &HeaderMap) -> RequestContext {
    let actor = headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("anonymous");
    let ctx = RequestContext::new(actor);
    match headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        Some(request_id) => ctx.with_request_id(request_id),
        None => ctx,
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn error_status(error: &CirculationError) -> StatusCode {
    match error {
        CirculationError::BookNotFound(_)
        | CirculationError::StudentNotFound(_)
        | CirculationError::LoanNotFound(_)
        | CirculationError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        CirculationError::BookUnavailable(_)
        | CirculationError::LimitExceeded { .. }
        | CirculationError::AlreadyReturned(_)
        | CirculationError::StillActive(_)
        | CirculationError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        CirculationError::InvalidIdentifier(_)
        | CirculationError::InvalidDueDate { .. }
        | CirculationError::InvalidReturnDate { .. }
        | CirculationError::DateOutOfRange { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CirculationError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: CirculationError) -> Response {
    let status = error_status(&error);
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn checkout_handler<S, N, A>(
    State(service): State<Arc<CirculationService<S, N, A>>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<CheckoutBody>,
) -> Response
where
    S: LibraryStore + 'static,
    N: Notifier + 'static,
    A: AuditLog + 'static,
{
    let ctx = request_context(&headers);
    let identifier = match body.book {
        BookReference::Typed(identifier) => identifier,
        BookReference::Raw(raw) => match service.find_book(&raw) {
            Ok(book) => book.identifier,
            Err(error) => return error_response(error),
        },
    };
    let borrow_date = body.borrow_date.unwrap_or_else(today);

    match service.checkout_book(
        &ctx,
        identifier,
        StudentNo(body.student_no),
        borrow_date,
        body.due_date,
    ) {
        Ok(outcome) => (
            StatusCode::CREATED,
            axum::Json(LoanView::from_outcome(outcome)),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn return_handler<S, N, A>(
    State(service): State<Arc<CirculationService<S, N, A>>>,
    headers: HeaderMap,
    Path(loan_id): Path<String>,
    body: Option<axum::Json<ReturnBody>>,
) -> Response
where
    S: LibraryStore + 'static,
    N: Notifier + 'static,
    A: AuditLog + 'static,
{
    let ctx = request_context(&headers);
    let return_date = body
        .and_then(|axum::Json(body)| body.return_date)
        .unwrap_or_else(today);

    match service.return_book(&ctx, &LoanId(loan_id), return_date) {
        Ok(outcome) => (StatusCode::OK, axum::Json(LoanView::from_outcome(outcome))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn loan_handler<S, N, A>(
    State(service): State<Arc<CirculationService<S, N, A>>>,
    Path(loan_id): Path<String>,
) -> Response
where
    S: LibraryStore + 'static,
    N: Notifier + 'static,
    A: AuditLog + 'static,
{
    match service.loan(&LoanId(loan_id)) {
        Ok(record) => (StatusCode::OK, axum::Json(LoanView::from_record(record))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn delete_handler<S, N, A>(
    State(service): State<Arc<CirculationService<S, N, A>>>,
    headers: HeaderMap,
    Path(loan_id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Response
where
    S: LibraryStore + 'static,
    N: Notifier + 'static,
    A: AuditLog + 'static,
{
    let ctx = request_context(&headers);
    match service.delete_loan(&ctx, &LoanId(loan_id), params.allow_active) {
        Ok(outcome) => {
            let warnings: Vec<String> = outcome.warnings.iter().map(|w| w.message()).collect();
            let payload = json!({
                "loan_id": outcome.value.record.loan_id,
                "stock_restored": outcome.value.stock_restored,
                "warnings": warnings,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn clear_history_handler<S, N, A>(
    State(service): State<Arc<CirculationService<S, N, A>>>,
    headers: HeaderMap,
    Path(loan_id): Path<String>,
) -> Response
where
    S: LibraryStore + 'static,
    N: Notifier + 'static,
    A: AuditLog + 'static,
{
    let ctx = request_context(&headers);
    match service.clear_history(&ctx, &LoanId(loan_id)) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn penalty_handler<S, N, A>(
    State(service): State<Arc<CirculationService<S, N, A>>>,
    Path(loan_id): Path<String>,
    Query(params): Query<AsOfParams>,
) -> Response
where
    S: LibraryStore + 'static,
    N: Notifier + 'static,
    A: AuditLog + 'static,
{
    let as_of = params.as_of.unwrap_or_else(today);
    let loan_id = LoanId(loan_id);
    match service.compute_live_penalty(&loan_id, as_of) {
        Ok(penalty) => {
            let payload = json!({
                "loan_id": loan_id,
                "as_of": as_of,
                "penalty": penalty,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn notifications_handler<S, N, A>(
    State(service): State<Arc<CirculationService<S, N, A>>>,
    Query(params): Query<AsOfParams>,
) -> Response
where
    S: LibraryStore + 'static,
    N: Notifier + 'static,
    A: AuditLog + 'static,
{
    let as_of = params.as_of.unwrap_or_else(today);
    match service.classify_notifications(as_of) {
        Ok(buckets) => (StatusCode::OK, axum::Json(buckets)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn book_handler<S, N, A>(
    State(service): State<Arc<CirculationService<S, N, A>>>,
    Path(identifier): Path<String>,
) -> Response
where
    S: LibraryStore + 'static,
    N: Notifier + 'static,
    A: AuditLog + 'static,
{
    match service.find_book(&identifier) {
        Ok(book) => {
            let payload = json!({
                "identifier": book.identifier,
                "title": book.title,
                "thumbnail_url": book.thumbnail_url,
                "quantity": book.quantity,
                "status": book.effective_status().label(),
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn student_handler<S, N, A>(
    State(service): State<Arc<CirculationService<S, N, A>>>,
    Path(student_no): Path<String>,
) -> Response
where
    S: LibraryStore + 'static,
    N: Notifier + 'static,
    A: AuditLog + 'static,
{
    let student_no = StudentNo(student_no);
    let directory = service.ledger().directory();
    let result = service.find_student(&student_no).and_then(|student| {
        let active = directory.count_active_loans(&student_no)?;
        let total = directory.count_total_loans(&student_no)?;
        Ok((student, active, total))
    });

    match result {
        Ok((student, active, total)) => {
            let payload = json!({
                "student": student,
                "active_loans": active,
                "total_loans": total,
                "max_active_loans": service.ledger().policy().max_active_loans,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}
