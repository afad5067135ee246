use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use quotedesk_core::domain::associate::AssociateId;
use quotedesk_core::domain::quote::{Quote, QuoteId};
use quotedesk_core::lifecycle::{QuoteDraft, QuoteEdit};
use serde::Serialize;

use super::{
    api_error, audit_context, correlation_id, json_body, respond, ApiFailure, ApiResponse,
    ApiResult, ApiState,
};

#[derive(Debug, Serialize)]
pub struct DeletedQuote {
    pub quote_id: QuoteId,
}

fn actor(associate_id: AssociateId) -> String {
    format!("associate:{associate_id}")
}

pub async fn list_quotes(
    State(state): State<ApiState>,
    Path(associate_id): Path<AssociateId>,
    headers: HeaderMap,
) -> ApiResult<Vec<Quote>> {
    let correlation_id = correlation_id(&headers);
    let quotes = state
        .quotes
        .list_for_associate(associate_id)
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok(respond(quotes, correlation_id))
}

pub async fn create_quote(
    State(state): State<ApiState>,
    Path(associate_id): Path<AssociateId>,
    headers: HeaderMap,
    payload: Result<Json<QuoteDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Quote>>), ApiFailure> {
    let correlation_id = correlation_id(&headers);
    let draft = json_body(payload, &correlation_id)?;
    let ctx = audit_context(&correlation_id, actor(associate_id));

    let quote = state
        .quotes
        .create(&ctx, associate_id, draft)
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok((StatusCode::CREATED, respond(quote, correlation_id)))
}

pub async fn get_quote(
    State(state): State<ApiState>,
    Path((associate_id, quote_id)): Path<(AssociateId, QuoteId)>,
    headers: HeaderMap,
) -> ApiResult<Quote> {
    let correlation_id = correlation_id(&headers);
    let quote = state
        .quotes
        .find_for_associate(associate_id, quote_id)
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok(respond(quote, correlation_id))
}

pub async fn edit_quote(
    State(state): State<ApiState>,
    Path((associate_id, quote_id)): Path<(AssociateId, QuoteId)>,
    headers: HeaderMap,
    payload: Result<Json<QuoteEdit>, JsonRejection>,
) -> ApiResult<Quote> {
    let correlation_id = correlation_id(&headers);
    let edit = json_body(payload, &correlation_id)?;
    let ctx = audit_context(&correlation_id, actor(associate_id));

    let quote = state
        .quotes
        .edit_draft(&ctx, associate_id, quote_id, edit)
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok(respond(quote, correlation_id))
}

pub async fn delete_quote(
    State(state): State<ApiState>,
    Path((associate_id, quote_id)): Path<(AssociateId, QuoteId)>,
    headers: HeaderMap,
) -> ApiResult<DeletedQuote> {
    let correlation_id = correlation_id(&headers);
    let ctx = audit_context(&correlation_id, actor(associate_id));

    state
        .quotes
        .delete(&ctx, associate_id, quote_id)
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok(respond(DeletedQuote { quote_id }, correlation_id))
}

pub async fn submit_quote(
    State(state): State<ApiState>,
    Path((associate_id, quote_id)): Path<(AssociateId, QuoteId)>,
    headers: HeaderMap,
) -> ApiResult<Quote> {
    let correlation_id = correlation_id(&headers);
    let ctx = audit_context(&correlation_id, actor(associate_id));

    let quote = state
        .quotes
        .submit(&ctx, associate_id, quote_id)
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok(respond(quote, correlation_id))
}
