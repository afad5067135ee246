use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use quotedesk_core::domain::associate::Associate;
use secrecy::SecretString;
use serde::Deserialize;

use super::{api_error, correlation_id, json_body, respond, ApiResult, ApiState};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub credential: String,
}

pub async fn login(
    State(state): State<ApiState>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Associate> {
    let correlation_id = correlation_id(&headers);
    let request = json_body(payload, &correlation_id)?;
    let credential = SecretString::from(request.credential);

    let associate = state
        .associates
        .login(&request.login, &credential)
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok(respond(associate, correlation_id))
}
