use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{OrderStatus, PaymentDetail, PaymentStatus};
use crate::services::notifications::{
    new_order_message, payment_confirmed_message, payment_failed_message, NotificationDispatcher,
};
use crate::services::order_assembly::AssembledOrder;
use crate::services::orders::{OrderRecord, OrderStore};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Inbound gateway event. Webhook delivery is at-least-once, never
/// exactly-once; everything downstream must tolerate duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub event: String,
    pub data: GatewayEventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEventData {
    pub reference: String,
    #[serde(default)]
    pub amount: i64,
    pub customer: Option<GatewayCustomer>,
    pub paid_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    /// Opaque session metadata: the assembled order in the gateway flow, or
    /// an `order_id` echo from integrations that key on the internal id.
    pub metadata: Option<serde_json::Value>,
    pub gateway_response: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayCustomer {
    pub email: Option<String>,
}

/// How an authenticated event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    /// At-least-once redelivery of an already-settled event; logged, no
    /// re-notification.
    Duplicate,
    /// Acknowledged without order-state change (payout events, undecodable
    /// payloads, failed charges for orders that were never materialized, and
    /// internal failures the gateway cannot fix by retrying).
    Ignored,
}

pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Authenticates and de-duplicates inbound gateway callbacks, then applies
/// confirmed events to order state.
///
/// Error policy: signature mismatch and materialization transaction aborts
/// propagate to the transport (401 / 5xx, the latter safe for gateway retry);
/// every other internal failure is swallowed and logged so the gateway does
/// not retry-storm on errors it cannot fix.
pub struct WebhookGuard {
    secret: String,
    store: Arc<dyn OrderStore>,
    notifications: NotificationDispatcher,
    events: EventSender,
}

impl WebhookGuard {
    pub fn new(
        secret: String,
        store: Arc<dyn OrderStore>,
        notifications: NotificationDispatcher,
        events: EventSender,
    ) -> Self {
        Self {
            secret,
            store,
            notifications,
            events,
        }
    }

    #[instrument(skip(self, body, signature))]
    pub async fn process(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, ServiceError> {
        let signature = signature
            .ok_or_else(|| ServiceError::Unauthorized("missing webhook signature".to_string()))?;
        let expected = compute_signature(&self.secret, body);
        if !constant_time_eq(&expected, signature) {
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }

        let event: GatewayEvent = match serde_json::from_slice(body) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "undecodable webhook payload dropped");
                return Ok(WebhookOutcome::Ignored);
            }
        };

        match event.event.as_str() {
            "charge.success" => self.on_charge_success(event.data).await,
            // Failed charges only annotate order state; no failure here is
            // fixable by a gateway retry, so everything gets acknowledged.
            "charge.failed" => match self.on_charge_failed(event.data).await {
                Ok(outcome) => Ok(outcome),
                Err(e) => {
                    warn!(error = %e, "charge.failed processing failed, acknowledged");
                    Ok(WebhookOutcome::Ignored)
                }
            },
            "transfer.success" | "transfer.failed" => {
                // Payout-side events: acknowledged, no order state involved.
                info!(event = %event.event, reference = %event.data.reference, "payout event logged");
                Ok(WebhookOutcome::Ignored)
            }
            other => {
                info!(event = %other, "unhandled webhook event kind");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    /// Both lookups are deliberate: integrations surface either the session
    /// reference or the internal order id, depending on how they were wired.
    async fn locate(&self, data: &GatewayEventData) -> Result<Option<OrderRecord>, ServiceError> {
        if let Some(record) = self.store.find_by_reference(&data.reference).await? {
            return Ok(Some(record));
        }

        let embedded_id = data
            .metadata
            .as_ref()
            .and_then(|m| m.get("order_id"))
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());
        if let Some(id) = embedded_id {
            return self.store.find_by_id(id).await;
        }

        Ok(None)
    }

    /// Success settlement is the one path where an error may propagate to the
    /// transport, and only from the materialization transaction: nothing was
    /// committed, so the gateway can safely redeliver. Every other internal
    /// failure is acknowledged; a retry storm cannot fix a broken read.
    async fn on_charge_success(
        &self,
        data: GatewayEventData,
    ) -> Result<WebhookOutcome, ServiceError> {
        let located = match self.locate(&data).await {
            Ok(located) => located,
            Err(e) => {
                warn!(reference = %data.reference, error = %e, "charge.success lookup failed, acknowledged");
                return Ok(WebhookOutcome::Ignored);
            }
        };

        if let Some(record) = located {
            return match self.confirm_existing(record, &data).await {
                Ok(outcome) => Ok(outcome),
                Err(e) => {
                    warn!(reference = %data.reference, error = %e, "charge.success settlement failed, acknowledged");
                    Ok(WebhookOutcome::Ignored)
                }
            };
        }

        // Gateway flow: the order exists only as session metadata until now.
        let Some(metadata) = data.metadata.clone() else {
            warn!(reference = %data.reference, "charge.success without metadata, nothing to materialize");
            return Ok(WebhookOutcome::Ignored);
        };
        let draft: AssembledOrder = match serde_json::from_value(metadata) {
            Ok(draft) => draft,
            Err(e) => {
                warn!(reference = %data.reference, error = %e, "charge.success metadata undecodable, dropped");
                return Ok(WebhookOutcome::Ignored);
            }
        };

        let detail = self.gateway_detail(&data, true);
        match self
            .store
            .transactional_insert(&draft, &data.reference, &detail)
            .await
        {
            Ok(record) => {
                if let Err(e) = self.events.send(Event::OrderCreated(record.order.id)).await {
                    warn!(error = %e, "failed to publish order created event");
                }
                // Dispatched outside the transaction boundary: a notification
                // failure can never roll back a committed payment.
                self.notifications.dispatch(new_order_message(&record.order));
                Ok(WebhookOutcome::Processed)
            }
            Err(ServiceError::DuplicateReference(_)) => {
                // A concurrent replay materialized this order first.
                info!(reference = %data.reference, "order already materialized by a concurrent delivery");
                Ok(WebhookOutcome::Duplicate)
            }
            // Transaction aborts propagate: nothing was committed, so the
            // gateway may retry the whole event safely.
            Err(e) => Err(e),
        }
    }

    async fn confirm_existing(
        &self,
        record: OrderRecord,
        data: &GatewayEventData,
    ) -> Result<WebhookOutcome, ServiceError> {
        if record.order.payment_status == PaymentStatus::Success.to_string() {
            info!(
                reference = %data.reference,
                order_reference = %record.order.order_reference,
                "duplicate charge.success delivery ignored"
            );
            return Ok(WebhookOutcome::Duplicate);
        }

        let detail = self.gateway_detail(data, true);
        let won = self
            .store
            .conditional_update_payment_status(
                record.order.id,
                PaymentStatus::Pending,
                PaymentStatus::Success,
                Some(&detail),
                None,
            )
            .await?;

        if !won {
            info!(reference = %data.reference, "charge.success lost the transition race, treating as duplicate");
            return Ok(WebhookOutcome::Duplicate);
        }

        let updated = self
            .store
            .update_status(record.order.id, OrderStatus::Preparing)
            .await?;
        if let Err(e) = self.events.send(Event::PaymentConfirmed(updated.order.id)).await {
            warn!(error = %e, "failed to publish payment confirmed event");
        }
        self.notifications
            .dispatch(payment_confirmed_message(&updated.order));
        Ok(WebhookOutcome::Processed)
    }

    async fn on_charge_failed(
        &self,
        data: GatewayEventData,
    ) -> Result<WebhookOutcome, ServiceError> {
        let Some(record) = self.locate(&data).await? else {
            info!(reference = %data.reference, "charge.failed for an order never materialized, dropped");
            return Ok(WebhookOutcome::Ignored);
        };

        let detail = self.gateway_detail(&data, false);
        let won = self
            .store
            .conditional_update_payment_status(
                record.order.id,
                PaymentStatus::Pending,
                PaymentStatus::Failed,
                Some(&detail),
                None,
            )
            .await?;

        if !won {
            info!(
                reference = %data.reference,
                "charge.failed ignored: order already settled"
            );
            return Ok(WebhookOutcome::Ignored);
        }

        if let Err(e) = self.events.send(Event::PaymentFailed(record.order.id)).await {
            warn!(error = %e, "failed to publish payment failed event");
        }
        self.notifications.dispatch(payment_failed_message(
            &record.order,
            data.gateway_response.as_deref(),
        ));

        Ok(WebhookOutcome::Processed)
    }

    fn gateway_detail(&self, data: &GatewayEventData, success: bool) -> PaymentDetail {
        PaymentDetail {
            method: "gateway".to_string(),
            amount: data.amount,
            customer_email: data.customer.as_ref().and_then(|c| c.email.clone()),
            gateway_response: data.gateway_response.clone(),
            failure_reason: if success {
                None
            } else {
                data.gateway_response.clone()
            },
            paid_at: if success {
                data.paid_at.or_else(|| Some(Utc::now()))
            } else {
                None
            },
            failed_at: if success { None } else { data.failed_at.or_else(|| Some(Utc::now())) },
        }
    }
}
