use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServiceError;
use crate::models::DeliveryMethod;
use crate::services::catalog::{CartItem, CatalogResolver, LineItem};
use crate::services::delivery_fee::FeeSchedule;
use crate::services::verification_code::CodeIssuer;

/// Upper bound on a client-supplied routing distance. Anything past this is
/// garbage input, not a deliverable address.
const MAX_DELIVERY_DISTANCE_KM: f64 = 500.0;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CartItemRequest {
    #[validate(length(min = 1, message = "Product reference is required"))]
    pub product: String,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: u32,
    #[serde(default)]
    pub proteins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub customer_name: String,
    #[validate(email(message = "A valid customer email is required"))]
    pub customer_email: String,
    pub customer_phone: Option<String>,

    pub delivery_method: DeliveryMethod,
    /// Required for delivery; ignored and overwritten for pickup.
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Supplied by the delivery-routing collaborator; required for delivery.
    pub distance_km: Option<f64>,

    #[validate(length(min = 1, message = "Cart must contain at least one item"))]
    pub items: Vec<CartItemRequest>,

    /// Optional caller-supplied verification code, used verbatim.
    pub verification_code: Option<String>,
}

/// Composed, priced, referenced order aggregate. Not yet persisted: the
/// manual flow inserts it immediately, the gateway flow embeds it as opaque
/// session metadata until a confirmed webhook materializes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledOrder {
    pub order_reference: String,
    pub payment_reference: String,

    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,

    pub delivery_method: DeliveryMethod,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub distance_km: Option<f64>,
    pub delivery_fee: i64,

    pub pickup_code: Option<String>,
    pub delivery_code: Option<String>,

    pub line_items: Vec<LineItem>,
    pub total_amount: i64,
}

/// Composes the catalog resolver, fee calculator and code issuer into an
/// order aggregate, assigning the order reference exactly once.
pub struct OrderAssembler {
    resolver: CatalogResolver,
    fees: FeeSchedule,
    codes: CodeIssuer,
    pickup_address: String,
}

impl OrderAssembler {
    pub fn new(
        resolver: CatalogResolver,
        fees: FeeSchedule,
        codes: CodeIssuer,
        pickup_address: String,
    ) -> Self {
        Self {
            resolver,
            fees,
            codes,
            pickup_address,
        }
    }

    #[instrument(skip(self, request), fields(customer_email = %request.customer_email))]
    pub async fn assemble(&self, request: &CreateOrderRequest) -> Result<AssembledOrder, ServiceError> {
        request.validate()?;
        for item in &request.items {
            item.validate()?;
        }

        let cart: Vec<CartItem> = request
            .items
            .iter()
            .map(|item| CartItem {
                product: item.product.clone(),
                quantity: item.quantity,
                proteins: item.proteins.clone(),
            })
            .collect();

        let line_items = self.resolver.resolve(&cart).await?;

        // Pickup orders always carry the store address; the client-supplied
        // one is deliberately overwritten.
        let (address, delivery_fee, distance_km) = match request.delivery_method {
            DeliveryMethod::Pickup => (self.pickup_address.clone(), 0, None),
            DeliveryMethod::Delivery => {
                let address = request
                    .address
                    .as_deref()
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| {
                        ServiceError::ValidationError(
                            "Delivery orders require an address".to_string(),
                        )
                    })?
                    .to_string();
                let distance = request.distance_km.ok_or_else(|| {
                    ServiceError::ValidationError(
                        "Delivery orders require a distance".to_string(),
                    )
                })?;
                if !distance.is_finite() || distance < 0.0 {
                    return Err(ServiceError::ValidationError(
                        "Delivery distance must be a non-negative number".to_string(),
                    ));
                }
                if distance > MAX_DELIVERY_DISTANCE_KM {
                    return Err(ServiceError::ValidationError(format!(
                        "Delivery distance exceeds the {} km service range",
                        MAX_DELIVERY_DISTANCE_KM
                    )));
                }
                (address, self.fees.fee(distance), Some(distance))
            }
        };

        let issued = self
            .codes
            .issue(request.delivery_method, request.verification_code.as_deref());

        let subtotal: i64 = line_items.iter().map(LineItem::line_total).sum();
        let total_amount = subtotal + delivery_fee;

        let order_reference = generate_order_reference();
        let payment_reference = derive_payment_reference(&order_reference);

        Ok(AssembledOrder {
            order_reference,
            payment_reference,
            customer_name: request.customer_name.clone(),
            customer_email: request.customer_email.clone(),
            customer_phone: request.customer_phone.clone(),
            delivery_method: request.delivery_method,
            address,
            latitude: request.latitude,
            longitude: request.longitude,
            distance_km,
            delivery_fee,
            pickup_code: issued.pickup_code,
            delivery_code: issued.delivery_code,
            line_items,
            total_amount,
        })
    }
}

/// Time component plus random suffix. Collision-free in practice; the store's
/// uniqueness constraint turns a generator collision into a
/// `DuplicateReference` failure rather than a silent overwrite.
fn generate_order_reference() -> String {
    let stamp = Utc::now().format("%y%m%d%H%M%S");
    let suffix: u16 = rand::thread_rng().gen();
    format!("ORD-{}-{:04X}", stamp, suffix)
}

fn derive_payment_reference(order_reference: &str) -> String {
    format!("{}-PAY", order_reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::{CatalogEntry, CatalogReader};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct StaticCatalog;

    #[async_trait]
    impl CatalogReader for StaticCatalog {
        async fn find_products_by_ids(
            &self,
            ids: &[String],
        ) -> Result<Vec<CatalogEntry>, ServiceError> {
            Ok([("rice", "Jollof Rice", 4500i64)]
                .iter()
                .filter(|(id, _, _)| ids.iter().any(|i| i == id))
                .map(|(id, name, price)| CatalogEntry {
                    id: id.to_string(),
                    name: name.to_string(),
                    price: *price,
                })
                .collect())
        }

        async fn find_proteins_by_ids(
            &self,
            ids: &[String],
        ) -> Result<Vec<CatalogEntry>, ServiceError> {
            Ok([("chicken", "Grilled Chicken", 3500i64)]
                .iter()
                .filter(|(id, _, _)| ids.iter().any(|i| i == id))
                .map(|(id, name, price)| CatalogEntry {
                    id: id.to_string(),
                    name: name.to_string(),
                    price: *price,
                })
                .collect())
        }
    }

    fn assembler() -> OrderAssembler {
        OrderAssembler::new(
            CatalogResolver::new(Arc::new(StaticCatalog)),
            FeeSchedule::default(),
            CodeIssuer::new("CHOW"),
            "12 Allen Avenue, Ikeja".to_string(),
        )
    }

    fn pickup_request() -> CreateOrderRequest {
        CreateOrderRequest {
            customer_name: "Ada".to_string(),
            customer_email: "ada@example.com".to_string(),
            customer_phone: None,
            delivery_method: DeliveryMethod::Pickup,
            address: Some("somewhere else entirely".to_string()),
            latitude: None,
            longitude: None,
            distance_km: None,
            items: vec![CartItemRequest {
                product: "rice".to_string(),
                quantity: 2,
                proteins: vec!["chicken".to_string()],
            }],
            verification_code: None,
        }
    }

    #[tokio::test]
    async fn pickup_order_is_priced_and_normalized() {
        let order = assembler().assemble(&pickup_request()).await.unwrap();

        // (4500 + 3500) * 2, no delivery fee for pickup
        assert_eq!(order.total_amount, 16000);
        assert_eq!(order.delivery_fee, 0);
        assert_eq!(order.address, "12 Allen Avenue, Ikeja");
        assert!(order.pickup_code.is_some());
        assert!(order.delivery_code.is_none());
        assert!(order.order_reference.starts_with("ORD-"));
        assert_eq!(
            order.payment_reference,
            format!("{}-PAY", order.order_reference)
        );
    }

    #[tokio::test]
    async fn delivery_order_adds_the_fee() {
        let mut request = pickup_request();
        request.delivery_method = DeliveryMethod::Delivery;
        request.address = Some("4 Marina Road".to_string());
        request.distance_km = Some(5.0);

        let order = assembler().assemble(&request).await.unwrap();

        // fee = 400 + ceil(5 - 2) * 200 = 1000
        assert_eq!(order.delivery_fee, 1000);
        assert_eq!(order.total_amount, 16000 + 1000);
        assert_eq!(order.address, "4 Marina Road");
        assert!(order.delivery_code.is_some());
        assert!(order.pickup_code.is_none());
    }

    #[tokio::test]
    async fn delivery_without_distance_is_rejected() {
        let mut request = pickup_request();
        request.delivery_method = DeliveryMethod::Delivery;
        request.address = Some("4 Marina Road".to_string());
        request.distance_km = None;

        let err = assembler().assemble(&request).await.unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn delivery_distance_outside_service_range_is_rejected() {
        let mut request = pickup_request();
        request.delivery_method = DeliveryMethod::Delivery;
        request.address = Some("4 Marina Road".to_string());
        request.distance_km = Some(1e18);

        let err = assembler().assemble(&request).await.unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn unknown_product_fails_assembly_entirely() {
        let mut request = pickup_request();
        request.items[0].product = "shawarma".to_string();

        let err = assembler().assemble(&request).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn supplied_verification_code_is_kept() {
        let mut request = pickup_request();
        request.verification_code = Some("UI-SESSION-7".to_string());

        let order = assembler().assemble(&request).await.unwrap();
        assert_eq!(order.pickup_code.as_deref(), Some("UI-SESSION-7"));
    }

    #[test]
    fn references_carry_time_component_and_suffix() {
        let reference = generate_order_reference();
        assert!(reference.starts_with("ORD-"));
        let parts: Vec<&str> = reference.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].len(), 12);
        assert_eq!(parts[2].len(), 4);
    }
}
