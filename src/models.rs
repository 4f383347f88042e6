use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

/// Fulfillment status, set by staff. Transitions are intentionally
/// unconstrained between these four values so staff corrections stay possible.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Preparing,
    Delivered,
    Cancelled,
}

/// Payment status, owned exclusively by the payment flow coordinator and the
/// webhook ingestion guard. `Pending -> Success` is a one-way door.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    Delivery,
    Pickup,
}

/// Settlement variant, chosen per deployment. Never both for the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentFlow {
    Manual,
    Gateway,
}

/// Structured snapshot of how an order was settled (or failed to settle),
/// stored alongside the order for reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDetail {
    pub method: String,
    pub amount: i64,
    pub customer_email: Option<String>,
    pub gateway_response: Option<String>,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl PaymentDetail {
    pub fn manual(amount: i64, customer_email: Option<String>, paid_at: DateTime<Utc>) -> Self {
        Self {
            method: "manual_transfer".to_string(),
            amount,
            customer_email,
            gateway_response: None,
            failure_reason: None,
            paid_at: Some(paid_at),
            failed_at: None,
        }
    }
}
