use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::entities::order;
use crate::errors::ServiceError;

/// Best-effort delivery of a human-readable message to an operator channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel_id: &str, message: &str) -> Result<(), ServiceError>;
}

/// Posts messages to the configured operator channel relay (bot endpoint).
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpNotifier {
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, channel_id: &str, message: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "channel_id": channel_id, "text": message }))
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "notification relay returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Fire-and-forget dispatch with bounded retry. The triggering request never
/// blocks on or fails because of a notification; after the attempt cap the
/// message is dropped and logged.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    channel_id: String,
    max_attempts: u32,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, channel_id: String, max_attempts: u32) -> Self {
        Self {
            notifier,
            channel_id,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn dispatch(&self, message: String) {
        let dispatcher = self.clone();

        tokio::spawn(async move {
            for attempt in 1..=dispatcher.max_attempts {
                match dispatcher
                    .notifier
                    .send(&dispatcher.channel_id, &message)
                    .await
                {
                    Ok(()) => return,
                    Err(e) => {
                        warn!(
                            error = %e,
                            attempt,
                            max_attempts = dispatcher.max_attempts,
                            "notification delivery failed"
                        );
                    }
                }

                // Exponential backoff: 1s, 2s, 4s, ...
                if attempt < dispatcher.max_attempts {
                    let backoff = Duration::from_secs(2_u64.pow(attempt - 1));
                    tokio::time::sleep(backoff).await;
                }
            }

            error!(
                max_attempts = dispatcher.max_attempts,
                "notification dropped after retry cap"
            );
        });
    }
}

pub fn new_order_message(order: &order::Model) -> String {
    let code = order
        .pickup_code
        .as_deref()
        .or(order.delivery_code.as_deref())
        .unwrap_or("-");
    format!(
        "New order {} ({}) for {} — total {} minor units, payment {}. Code: {}",
        order.order_reference,
        order.delivery_method,
        order.customer_name,
        order.total_amount,
        order.payment_status,
        code,
    )
}

pub fn payment_confirmed_message(order: &order::Model) -> String {
    format!(
        "Payment confirmed for order {} — {} minor units from {}. Now preparing.",
        order.order_reference, order.total_amount, order.customer_name,
    )
}

pub fn payment_failed_message(order: &order::Model, reason: Option<&str>) -> String {
    format!(
        "Payment FAILED for order {} — {} minor units. Reason: {}",
        order.order_reference,
        order.total_amount,
        reason.unwrap_or("not given"),
    )
}
