use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    Json,
};
use quotedesk_core::domain::quote::{Quote, QuoteId, QuoteStatus};
use quotedesk_core::ports::QuoteFilter;
use quotedesk_core::services::PurchaseOrder;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{
    api_error, audit_context, correlation_id, json_body, respond, respond_notified, ApiResult,
    ApiState,
};

#[derive(Debug, Deserialize)]
pub struct ProcessOrderRequest {
    #[serde(default)]
    pub final_discount: Decimal,
}

/// Quotes ready to be turned into purchase orders.
pub async fn list_sanctioned(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<Vec<Quote>> {
    let correlation_id = correlation_id(&headers);
    let quotes = state
        .quotes
        .search(&QuoteFilter::with_statuses(&[QuoteStatus::Sanctioned]))
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok(respond(quotes, correlation_id))
}

pub async fn process_order(
    State(state): State<ApiState>,
    Path(quote_id): Path<QuoteId>,
    headers: HeaderMap,
    payload: Result<Json<ProcessOrderRequest>, JsonRejection>,
) -> ApiResult<PurchaseOrder> {
    let correlation_id = correlation_id(&headers);
    let request = json_body(payload, &correlation_id)?;
    let ctx = audit_context(&correlation_id, "orders-desk");

    let order = state
        .orders
        .process_order(&ctx, quote_id, request.final_discount)
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok(respond_notified(order, correlation_id))
}
