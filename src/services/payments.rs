use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::config::BankDetails;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::PaymentGateway;
use crate::models::{OrderStatus, PaymentDetail, PaymentFlow, PaymentStatus};
use crate::services::notifications::{
    new_order_message, payment_confirmed_message, NotificationDispatcher,
};
use crate::services::order_assembly::{CreateOrderRequest, OrderAssembler};
use crate::services::orders::{OrderResponse, OrderStore};

/// Static transfer details returned to manual-flow customers together with
/// the priced order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentInstructions {
    pub bank_name: String,
    pub account_name: String,
    pub account_number: String,
    pub amount_due: i64,
    pub reference: String,
    pub note: String,
}

/// Result of checkout, by settlement variant.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "flow", rename_all = "lowercase")]
pub enum CheckoutOutcome {
    /// Order persisted, awaiting out-of-band transfer and staff confirmation.
    Manual {
        order: OrderResponse,
        instructions: PaymentInstructions,
    },
    /// Gateway session opened; nothing persisted until a confirmed webhook.
    Gateway {
        redirect_url: String,
        reference: String,
    },
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct VerifyPaymentRequest {
    /// Reference to the uploaded receipt (object storage key or URL).
    #[validate(length(min = 1, message = "Receipt reference is required"))]
    pub receipt_reference: String,
}

/// Owns the order's payment-status transition across the two settlement
/// variants. The variant is deployment configuration; both are never active
/// for the same order.
pub struct PaymentFlowCoordinator {
    flow: PaymentFlow,
    assembler: OrderAssembler,
    store: Arc<dyn OrderStore>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    notifications: NotificationDispatcher,
    events: EventSender,
    bank: BankDetails,
}

impl PaymentFlowCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        flow: PaymentFlow,
        assembler: OrderAssembler,
        store: Arc<dyn OrderStore>,
        gateway: Option<Arc<dyn PaymentGateway>>,
        notifications: NotificationDispatcher,
        events: EventSender,
        bank: BankDetails,
    ) -> Self {
        Self {
            flow,
            assembler,
            store,
            gateway,
            notifications,
            events,
            bank,
        }
    }

    /// Assembles and settles a cart according to the deployment's flow
    /// variant. Manual: persist pending/pending and hand back transfer
    /// instructions. Gateway: open a session carrying the assembled order as
    /// opaque metadata; persistence waits for the confirmed webhook.
    #[instrument(skip(self, request), fields(customer_email = %request.customer_email))]
    pub async fn checkout(&self, request: CreateOrderRequest) -> Result<CheckoutOutcome, ServiceError> {
        let draft = self.assembler.assemble(&request).await?;

        match self.flow {
            PaymentFlow::Manual => {
                let record = self.store.insert(&draft).await?;
                info!(order_reference = %record.order.order_reference, "manual-flow order created");

                if let Err(e) = self.events.send(Event::OrderCreated(record.order.id)).await {
                    warn!(error = %e, "failed to publish order created event");
                }
                self.notifications.dispatch(new_order_message(&record.order));

                let instructions = PaymentInstructions {
                    bank_name: self.bank.bank_name.clone(),
                    account_name: self.bank.account_name.clone(),
                    account_number: self.bank.account_number.clone(),
                    amount_due: record.order.total_amount,
                    reference: record.order.payment_reference.clone(),
                    note: format!(
                        "Transfer {} minor units and quote reference {}",
                        record.order.total_amount, record.order.payment_reference
                    ),
                };

                Ok(CheckoutOutcome::Manual {
                    order: record.into(),
                    instructions,
                })
            }
            PaymentFlow::Gateway => {
                let gateway = self.gateway.as_ref().ok_or_else(|| {
                    ServiceError::GatewayFailure("payment gateway not configured".to_string())
                })?;

                let metadata = serde_json::to_value(&draft)?;
                let session = gateway
                    .open_session(
                        &draft.customer_email,
                        draft.total_amount,
                        &draft.order_reference,
                        metadata,
                    )
                    .await?;

                info!(reference = %session.reference, "gateway session opened");
                Ok(CheckoutOutcome::Gateway {
                    redirect_url: session.redirect_url,
                    reference: session.reference,
                })
            }
        }
    }

    /// Staff confirmation of a manual transfer: pending -> success payment,
    /// pending -> preparing status, paid_at stamped, receipt stored. A second
    /// call on the same order fails with `AlreadyProcessed` so staff don't
    /// double-notify.
    #[instrument(skip(self, receipt_reference), fields(order_id = %order_id))]
    pub async fn verify_payment(
        &self,
        order_id: Uuid,
        receipt_reference: String,
    ) -> Result<OrderResponse, ServiceError> {
        let record = self
            .store
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_id)))?;

        if record.order.payment_status == PaymentStatus::Success.to_string() {
            return Err(ServiceError::AlreadyProcessed(format!(
                "order {} payment already confirmed",
                record.order.order_reference
            )));
        }
        if record.order.payment_status == PaymentStatus::Failed.to_string() {
            return Err(ServiceError::AlreadyProcessed(format!(
                "order {} payment already settled as failed",
                record.order.order_reference
            )));
        }

        let detail = PaymentDetail::manual(
            record.order.total_amount,
            Some(record.order.customer_email.clone()),
            Utc::now(),
        );

        let won = self
            .store
            .conditional_update_payment_status(
                order_id,
                PaymentStatus::Pending,
                PaymentStatus::Success,
                Some(&detail),
                Some(&receipt_reference),
            )
            .await?;

        if !won {
            // A concurrent confirmation or webhook settled this order between
            // the read above and the transition attempt.
            return Err(ServiceError::AlreadyProcessed(format!(
                "order {} payment already settled",
                record.order.order_reference
            )));
        }

        let updated = self.store.update_status(order_id, OrderStatus::Preparing).await?;

        if let Err(e) = self.events.send(Event::PaymentConfirmed(order_id)).await {
            warn!(error = %e, "failed to publish payment confirmed event");
        }
        self.notifications
            .dispatch(payment_confirmed_message(&updated.order));

        Ok(updated.into())
    }
}
