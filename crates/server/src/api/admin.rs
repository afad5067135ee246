use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use quotedesk_core::domain::associate::{Associate, AssociateId, AssociateProfile, NewAssociate};
use quotedesk_core::domain::customer::CustomerId;
use quotedesk_core::domain::quote::Quote;
use quotedesk_core::errors::ApplicationError;
use quotedesk_core::ports::QuoteFilter;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use super::{
    api_error, correlation_id, json_body, parse_statuses, parse_time_bound, respond, ApiFailure,
    ApiResponse, ApiResult, ApiState,
};

#[derive(Debug, Default, Deserialize)]
pub struct AdminQuoteQuery {
    pub status: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub associate_id: Option<i64>,
    pub customer_id: Option<i64>,
}

impl AdminQuoteQuery {
    fn into_filter(self) -> Result<QuoteFilter, ApplicationError> {
        Ok(QuoteFilter {
            statuses: parse_statuses(self.status.as_deref())?,
            associate_id: self.associate_id.map(AssociateId),
            customer_id: self.customer_id.map(CustomerId),
            created_from: self
                .from
                .as_deref()
                .map(|value| parse_time_bound("from", value, false))
                .transpose()?,
            created_to: self
                .to
                .as_deref()
                .map(|value| parse_time_bound("to", value, true))
                .transpose()?,
        })
    }
}

#[derive(Deserialize)]
pub struct CreateAssociateRequest {
    pub name: String,
    pub login: String,
    pub credential: String,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Default, Deserialize)]
pub struct UpdateAssociateRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub credential: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeletedAssociate {
    pub associate_id: AssociateId,
}

pub async fn search_quotes(
    State(state): State<ApiState>,
    Query(query): Query<AdminQuoteQuery>,
    headers: HeaderMap,
) -> ApiResult<Vec<Quote>> {
    let correlation_id = correlation_id(&headers);
    let filter = query.into_filter().map_err(|error| api_error(error, &correlation_id))?;

    let quotes =
        state.quotes.search(&filter).await.map_err(|error| api_error(error, &correlation_id))?;
    Ok(respond(quotes, correlation_id))
}

pub async fn list_associates(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<Vec<Associate>> {
    let correlation_id = correlation_id(&headers);
    let associates =
        state.associates.list().await.map_err(|error| api_error(error, &correlation_id))?;
    Ok(respond(associates, correlation_id))
}

pub async fn get_associate(
    State(state): State<ApiState>,
    Path(associate_id): Path<AssociateId>,
    headers: HeaderMap,
) -> ApiResult<Associate> {
    let correlation_id = correlation_id(&headers);
    let associate = state
        .associates
        .find(associate_id)
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok(respond(associate, correlation_id))
}

pub async fn create_associate(
    State(state): State<ApiState>,
    headers: HeaderMap,
    payload: Result<Json<CreateAssociateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Associate>>), ApiFailure> {
    let correlation_id = correlation_id(&headers);
    let request = json_body(payload, &correlation_id)?;

    let associate = state
        .associates
        .create(NewAssociate {
            name: request.name,
            login: request.login,
            credential: SecretString::from(request.credential),
            address: request.address,
        })
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok((StatusCode::CREATED, respond(associate, correlation_id)))
}

pub async fn update_associate(
    State(state): State<ApiState>,
    Path(associate_id): Path<AssociateId>,
    headers: HeaderMap,
    payload: Result<Json<UpdateAssociateRequest>, JsonRejection>,
) -> ApiResult<Associate> {
    let correlation_id = correlation_id(&headers);
    let request = json_body(payload, &correlation_id)?;

    let associate = state
        .associates
        .update(
            associate_id,
            AssociateProfile {
                name: request.name,
                address: request.address,
                credential: request.credential.map(SecretString::from),
            },
        )
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok(respond(associate, correlation_id))
}

/// Refused with 409 while the associate still owns quotes.
pub async fn delete_associate(
    State(state): State<ApiState>,
    Path(associate_id): Path<AssociateId>,
    headers: HeaderMap,
) -> ApiResult<DeletedAssociate> {
    let correlation_id = correlation_id(&headers);
    state
        .associates
        .delete(associate_id)
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok(respond(DeletedAssociate { associate_id }, correlation_id))
}
