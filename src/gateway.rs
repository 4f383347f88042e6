use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};
use utoipa::ToSchema;

use crate::config::GatewayConfig;
use crate::errors::ServiceError;

/// Open payment session: the client is redirected to `redirect_url` and the
/// gateway later reports settlement against `reference` via webhook.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GatewaySession {
    pub redirect_url: String,
    pub reference: String,
}

/// Outbound adapter to the external payment provider. Settlement itself is
/// not implemented here; this only opens sessions.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn open_session(
        &self,
        email: &str,
        amount_minor_units: i64,
        reference: &str,
        metadata: serde_json::Value,
    ) -> Result<GatewaySession, ServiceError>;
}

#[derive(Serialize)]
struct InitializeRequest<'a> {
    email: &'a str,
    amount: i64,
    reference: &'a str,
    metadata: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
}

#[derive(Deserialize)]
struct InitializeResponse {
    status: bool,
    message: Option<String>,
    data: Option<InitializeData>,
}

#[derive(Deserialize)]
struct InitializeData {
    authorization_url: String,
    reference: String,
}

/// Paystack-style HTTP implementation: POST /transaction/initialize with
/// bearer secret key.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
    callback_url: Option<String>,
}

impl HttpPaymentGateway {
    pub fn new(client: reqwest::Client, config: &GatewayConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            callback_url: config.callback_url.clone(),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, metadata), fields(reference = %reference, amount = %amount_minor_units))]
    async fn open_session(
        &self,
        email: &str,
        amount_minor_units: i64,
        reference: &str,
        metadata: serde_json::Value,
    ) -> Result<GatewaySession, ServiceError> {
        let body = InitializeRequest {
            email,
            amount: amount_minor_units,
            reference,
            metadata,
            callback_url: self.callback_url.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "gateway session call failed");
                ServiceError::GatewayFailure(format!("gateway unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(ServiceError::GatewayFailure(format!(
                "gateway returned {}",
                response.status()
            )));
        }

        let parsed: InitializeResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayFailure(format!("invalid gateway response: {}", e)))?;

        match parsed.data {
            Some(data) if parsed.status => Ok(GatewaySession {
                redirect_url: data.authorization_url,
                reference: data.reference,
            }),
            _ => Err(ServiceError::GatewayFailure(
                parsed
                    .message
                    .unwrap_or_else(|| "session not created".to_string()),
            )),
        }
    }
}
