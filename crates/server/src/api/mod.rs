//! JSON API for associates, reviewers, the order desk and administrators.
//!
//! - `POST /api/v1/auth/login`
//! - `/api/v1/associates/{aid}/quotes[/{qid}[/submit]]` associate-owned drafts
//! - `/api/v1/review/quotes[/{qid}[/sanction]]` review queue
//! - `/api/v1/orders/quotes[/{qid}/process]` purchase-order desk
//! - `/api/v1/admin/quotes`, `/api/v1/admin/associates[/{id}]`
//! - `GET /api/v1/customers/{id}`

mod admin;
mod auth;
mod customers;
mod orders;
mod quotes;
mod review;

use std::sync::Arc;

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use quotedesk_core::audit::AuditContext;
use quotedesk_core::domain::quote::QuoteStatus;
use quotedesk_core::errors::{ApplicationError, DomainError, ErrorKind};
use quotedesk_core::services::{AssociateService, Notified, QuoteService, SettlementOrchestrator};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    pub quotes: Arc<QuoteService>,
    pub orders: Arc<SettlementOrchestrator>,
    pub associates: Arc<AssociateService>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub correlation_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub success: bool,
    pub error_kind: String,
    pub message: String,
    pub correlation_id: String,
}

pub type ApiFailure = (StatusCode, Json<ApiError>);
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiFailure>;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/auth/login", post(auth::login))
        .route(
            "/api/v1/associates/{associate_id}/quotes",
            get(quotes::list_quotes).post(quotes::create_quote),
        )
        .route(
            "/api/v1/associates/{associate_id}/quotes/{quote_id}",
            get(quotes::get_quote).put(quotes::edit_quote).delete(quotes::delete_quote),
        )
        .route(
            "/api/v1/associates/{associate_id}/quotes/{quote_id}/submit",
            post(quotes::submit_quote),
        )
        .route("/api/v1/review/quotes", get(review::list_queue))
        .route("/api/v1/review/quotes/{quote_id}", axum::routing::put(review::edit_quote))
        .route("/api/v1/review/quotes/{quote_id}/sanction", post(review::sanction_quote))
        .route("/api/v1/orders/quotes", get(orders::list_sanctioned))
        .route("/api/v1/orders/quotes/{quote_id}/process", post(orders::process_order))
        .route("/api/v1/admin/quotes", get(admin::search_quotes))
        .route(
            "/api/v1/admin/associates",
            get(admin::list_associates).post(admin::create_associate),
        )
        .route(
            "/api/v1/admin/associates/{associate_id}",
            get(admin::get_associate)
                .put(admin::update_associate)
                .delete(admin::delete_associate),
        )
        .route("/api/v1/customers/{customer_id}", get(customers::get_customer))
        .with_state(state)
}

/// Uses the caller's `x-correlation-id` when present so a request can be traced end to end.
pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub fn audit_context(correlation_id: &str, actor: impl Into<String>) -> AuditContext {
    AuditContext::new(None, correlation_id, actor)
}

pub fn respond<T>(data: T, correlation_id: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse { success: true, data, warning: None, correlation_id })
}

/// Committed results whose follow-up mail failed still succeed, with a warning attached.
pub fn respond_notified<T>(notified: Notified<T>, correlation_id: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        warning: notified.notification.warning(),
        data: notified.value,
        correlation_id,
    })
}

pub fn api_error(error: ApplicationError, correlation_id: &str) -> ApiFailure {
    let interface = error.clone().into_interface(correlation_id);
    let status =
        StatusCode::from_u16(interface.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if interface.kind() == ErrorKind::Internal {
        error!(
            event_name = "api.request_failed",
            correlation_id = %correlation_id,
            error_kind = interface.kind().as_str(),
            error = %error,
            "request failed with an internal error"
        );
    } else {
        warn!(
            event_name = "api.request_rejected",
            correlation_id = %correlation_id,
            error_kind = interface.kind().as_str(),
            status = status.as_u16(),
            error = %error,
            "request rejected"
        );
    }

    (
        status,
        Json(ApiError {
            success: false,
            error_kind: interface.kind().as_str().to_string(),
            message: interface.public_message(),
            correlation_id: correlation_id.to_string(),
        }),
    )
}

/// Unwraps a JSON body, reporting malformed input in the same shape as every other error.
pub fn json_body<T>(
    payload: Result<Json<T>, JsonRejection>,
    correlation_id: &str,
) -> Result<T, ApiFailure> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        api_error(
            DomainError::Validation(format!("malformed request body: {}", rejection.body_text()))
                .into(),
            correlation_id,
        )
    })
}

/// Comma-separated status list. Unknown names, `finalized` included, are validation errors.
pub fn parse_statuses(raw: Option<&str>) -> Result<Vec<QuoteStatus>, ApplicationError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            QuoteStatus::parse(value).ok_or_else(|| {
                ApplicationError::from(DomainError::Validation(format!(
                    "unknown quote status `{value}`"
                )))
            })
        })
        .collect()
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates. A bare date used as an upper bound
/// covers the whole day.
pub fn parse_time_bound(
    field: &str,
    value: &str,
    end_of_day: bool,
) -> Result<DateTime<Utc>, ApplicationError> {
    let value = value.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    let invalid = || {
        ApplicationError::from(DomainError::Validation(format!(
            "`{field}` must be an RFC 3339 timestamp or a YYYY-MM-DD date"
        )))
    };
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid())?;
    let naive: Option<NaiveDateTime> = if end_of_day {
        date.and_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    naive.map(|naive| Utc.from_utc_datetime(&naive)).ok_or_else(invalid)
}
