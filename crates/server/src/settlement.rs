//! HTTP adapter for the external purchase-order system.

use std::time::Duration;

use async_trait::async_trait;
use quotedesk_core::config::SettlementConfig;
use quotedesk_core::domain::settlement::{OrderRequest, SettlementReply};
use quotedesk_core::ports::{GatewayError, SettlementGateway};
use reqwest::Client;
use tracing::{info, warn};

pub struct HttpSettlementGateway {
    client: Client,
    endpoint: String,
    timeout_secs: u64,
}

impl HttpSettlementGateway {
    pub fn new(config: &SettlementConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| GatewayError::Transport(error.to_string()))?;
        Ok(Self { client, endpoint: config.endpoint.clone(), timeout_secs: config.timeout_secs })
    }
}

#[async_trait]
impl SettlementGateway for HttpSettlementGateway {
    async fn submit(&self, request: &OrderRequest) -> Result<SettlementReply, GatewayError> {
        info!(
            event_name = "settlement.request_sent",
            order_reference = %request.order,
            endpoint = %self.endpoint,
            "submitting purchase order"
        );

        let response =
            self.client.post(&self.endpoint).json(request).send().await.map_err(|error| {
                if error.is_timeout() {
                    GatewayError::Timeout(self.timeout_secs)
                } else {
                    GatewayError::Transport(error.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                event_name = "settlement.http_status",
                order_reference = %request.order,
                status = status.as_u16(),
                "settlement system answered with an error status"
            );
            return Err(GatewayError::Status { status: status.as_u16() });
        }

        response
            .json::<SettlementReply>()
            .await
            .map_err(|error| GatewayError::Decode(error.to_string()))
    }
}
