use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::HeaderMap,
    Json,
};
use quotedesk_core::domain::quote::{Quote, QuoteId};
use quotedesk_core::errors::DomainError;
use quotedesk_core::lifecycle::QuoteEdit;
use quotedesk_core::ports::QuoteFilter;
use serde::Deserialize;

use super::{
    api_error, audit_context, correlation_id, json_body, parse_statuses, respond,
    respond_notified, ApiResult, ApiState,
};

const REVIEWER: &str = "reviewer";

#[derive(Debug, Default, Deserialize)]
pub struct ReviewQuery {
    pub status: Option<String>,
}

/// Submitted and unresolved quotes, optionally narrowed to one of the two.
pub async fn list_queue(
    State(state): State<ApiState>,
    Query(query): Query<ReviewQuery>,
    headers: HeaderMap,
) -> ApiResult<Vec<Quote>> {
    let correlation_id = correlation_id(&headers);
    let statuses = parse_statuses(query.status.as_deref())
        .map_err(|error| api_error(error, &correlation_id))?;

    if let Some(outside) = statuses.iter().find(|status| !status.is_under_review()) {
        return Err(api_error(
            DomainError::Validation(format!("`{outside}` quotes are not in the review queue"))
                .into(),
            &correlation_id,
        ));
    }

    let quotes = if statuses.is_empty() {
        state.quotes.review_queue().await
    } else {
        state.quotes.search(&QuoteFilter::with_statuses(&statuses)).await
    }
    .map_err(|error| api_error(error, &correlation_id))?;
    Ok(respond(quotes, correlation_id))
}

pub async fn edit_quote(
    State(state): State<ApiState>,
    Path(quote_id): Path<QuoteId>,
    headers: HeaderMap,
    payload: Result<Json<QuoteEdit>, JsonRejection>,
) -> ApiResult<Quote> {
    let correlation_id = correlation_id(&headers);
    let edit = json_body(payload, &correlation_id)?;
    let ctx = audit_context(&correlation_id, REVIEWER);

    let quote = state
        .quotes
        .edit_under_review(&ctx, quote_id, edit)
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok(respond(quote, correlation_id))
}

pub async fn sanction_quote(
    State(state): State<ApiState>,
    Path(quote_id): Path<QuoteId>,
    headers: HeaderMap,
) -> ApiResult<Quote> {
    let correlation_id = correlation_id(&headers);
    let ctx = audit_context(&correlation_id, REVIEWER);

    let sanctioned = state
        .quotes
        .sanction(&ctx, quote_id)
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok(respond_notified(sanctioned, correlation_id))
}
