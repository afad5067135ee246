use axum::{
    extract::{Path, State},
    http::HeaderMap,
};
use quotedesk_core::domain::customer::{Customer, CustomerId};

use super::{api_error, correlation_id, respond, ApiResult, ApiState};

pub async fn get_customer(
    State(state): State<ApiState>,
    Path(customer_id): Path<CustomerId>,
    headers: HeaderMap,
) -> ApiResult<Customer> {
    let correlation_id = correlation_id(&headers);
    let customer = state
        .quotes
        .customer(customer_id)
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok(respond(customer, correlation_id))
}
