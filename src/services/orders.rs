use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{order, order_item};
use crate::errors::ServiceError;
use crate::models::{OrderStatus, PaymentDetail, PaymentStatus};
use crate::services::order_assembly::AssembledOrder;

/// Persisted order header together with its line items.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub product_reference: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub total_price: i64,
    #[schema(value_type = Object)]
    pub proteins: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_reference: String,
    pub payment_reference: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub delivery_method: String,
    pub address: String,
    pub distance_km: Option<f64>,
    pub delivery_fee: i64,
    pub total_amount: i64,
    pub pickup_code: Option<String>,
    pub delivery_code: Option<String>,
    pub status: String,
    pub payment_status: String,
    pub gateway_reference: Option<String>,
    pub receipt_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub items: Vec<OrderItemResponse>,
}

impl From<OrderRecord> for OrderResponse {
    fn from(record: OrderRecord) -> Self {
        let OrderRecord { order, items } = record;
        Self {
            id: order.id,
            order_reference: order.order_reference,
            payment_reference: order.payment_reference,
            customer_name: order.customer_name,
            customer_email: order.customer_email,
            customer_phone: order.customer_phone,
            delivery_method: order.delivery_method,
            address: order.address,
            distance_km: order.distance_km,
            delivery_fee: order.delivery_fee,
            total_amount: order.total_amount,
            pickup_code: order.pickup_code,
            delivery_code: order.delivery_code,
            status: order.status,
            payment_status: order.payment_status,
            gateway_reference: order.gateway_reference,
            receipt_reference: order.receipt_reference,
            paid_at: order.paid_at,
            is_archived: order.is_archived,
            created_at: order.created_at,
            updated_at: order.updated_at,
            items: items
                .into_iter()
                .map(|item| OrderItemResponse {
                    product_reference: item.product_reference,
                    name: item.name,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    total_price: item.total_price,
                    proteins: item.proteins,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Durable order persistence. The uniqueness constraint on the order
/// reference and the compare-and-swap payment-status update are the two
/// concurrency primitives the rest of the core relies on.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a manual-flow order in pending/pending. Fails with
    /// `DuplicateReference` instead of overwriting.
    async fn insert(&self, draft: &AssembledOrder) -> Result<OrderRecord, ServiceError>;

    /// Materializes a gateway-settled order atomically: header and all line
    /// items commit together or not at all. The order lands already paid.
    async fn transactional_insert(
        &self,
        draft: &AssembledOrder,
        gateway_reference: &str,
        detail: &PaymentDetail,
    ) -> Result<OrderRecord, ServiceError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderRecord>, ServiceError>;

    /// Looks up by order reference or gateway reference. Different gateway
    /// integrations surface the reference differently; both are checked.
    async fn find_by_reference(&self, reference: &str) -> Result<Option<OrderRecord>, ServiceError>;

    /// Compare-and-swap payment-status transition. Returns false when the
    /// order was not in the expected status; detail, paid_at and receipt are
    /// written only by the winner.
    async fn conditional_update_payment_status(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        next: PaymentStatus,
        detail: Option<&PaymentDetail>,
        receipt_reference: Option<&str>,
    ) -> Result<bool, ServiceError>;

    /// Staff fulfillment-status edit. Deliberately permissive between the
    /// four states; never touches payment status.
    async fn update_status(&self, id: Uuid, status: OrderStatus) -> Result<OrderRecord, ServiceError>;

    async fn set_archived(&self, id: Uuid, archived: bool) -> Result<OrderRecord, ServiceError>;

    async fn list_active(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderRecord>, u64), ServiceError>;
}

pub struct SeaOrmOrderStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmOrderStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn map_insert_err(err: DbErr, reference: &str) -> ServiceError {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => ServiceError::DuplicateReference(
                format!("order reference '{}' already exists", reference),
            ),
            _ => ServiceError::DatabaseError(err),
        }
    }

    fn order_active_model(
        draft: &AssembledOrder,
        id: Uuid,
        status: OrderStatus,
        payment_status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> order::ActiveModel {
        order::ActiveModel {
            id: Set(id),
            order_reference: Set(draft.order_reference.clone()),
            payment_reference: Set(draft.payment_reference.clone()),
            customer_name: Set(draft.customer_name.clone()),
            customer_email: Set(draft.customer_email.clone()),
            customer_phone: Set(draft.customer_phone.clone()),
            delivery_method: Set(draft.delivery_method.to_string()),
            address: Set(draft.address.clone()),
            latitude: Set(draft.latitude),
            longitude: Set(draft.longitude),
            distance_km: Set(draft.distance_km),
            delivery_fee: Set(draft.delivery_fee),
            total_amount: Set(draft.total_amount),
            pickup_code: Set(draft.pickup_code.clone()),
            delivery_code: Set(draft.delivery_code.clone()),
            status: Set(status.to_string()),
            payment_status: Set(payment_status.to_string()),
            gateway_reference: Set(None),
            payment_detail: Set(None),
            receipt_reference: Set(None),
            paid_at: Set(None),
            is_archived: Set(false),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
    }

    fn item_active_models(
        draft: &AssembledOrder,
        order_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<order_item::ActiveModel>, ServiceError> {
        draft
            .line_items
            .iter()
            .map(|line| {
                Ok(order_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order_id),
                    product_reference: Set(line.product_reference.clone()),
                    name: Set(line.name.clone()),
                    quantity: Set(line.quantity as i32),
                    unit_price: Set(line.unit_price),
                    total_price: Set(line.line_total()),
                    proteins: Set(serde_json::to_value(&line.proteins)?),
                    created_at: Set(now),
                })
            })
            .collect()
    }

    async fn load_items(&self, order: &order::Model) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(order.find_related(order_item::Entity).all(&*self.db).await?)
    }
}

#[async_trait]
impl OrderStore for SeaOrmOrderStore {
    #[instrument(skip(self, draft), fields(order_reference = %draft.order_reference))]
    async fn insert(&self, draft: &AssembledOrder) -> Result<OrderRecord, ServiceError> {
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let txn = self.db.begin().await?;

        let order_model =
            Self::order_active_model(draft, order_id, OrderStatus::Pending, PaymentStatus::Pending, now)
                .insert(&txn)
                .await
                .map_err(|e| Self::map_insert_err(e, &draft.order_reference))?;

        let mut items = Vec::with_capacity(draft.line_items.len());
        for item in Self::item_active_models(draft, order_id, now)? {
            items.push(item.insert(&txn).await?);
        }

        txn.commit().await?;

        info!(order_id = %order_id, "order persisted awaiting payment");
        Ok(OrderRecord {
            order: order_model,
            items,
        })
    }

    #[instrument(skip(self, draft, detail), fields(order_reference = %draft.order_reference))]
    async fn transactional_insert(
        &self,
        draft: &AssembledOrder,
        gateway_reference: &str,
        detail: &PaymentDetail,
    ) -> Result<OrderRecord, ServiceError> {
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let txn = self.db.begin().await?;

        let mut active = Self::order_active_model(
            draft,
            order_id,
            OrderStatus::Preparing,
            PaymentStatus::Success,
            now,
        );
        active.gateway_reference = Set(Some(gateway_reference.to_string()));
        active.payment_detail = Set(Some(serde_json::to_value(detail)?));
        active.paid_at = Set(detail.paid_at.or(Some(now)));

        let order_model = active
            .insert(&txn)
            .await
            .map_err(|e| Self::map_insert_err(e, &draft.order_reference))?;

        let mut items = Vec::with_capacity(draft.line_items.len());
        for item in Self::item_active_models(draft, order_id, now)? {
            items.push(item.insert(&txn).await?);
        }

        // Any failure above aborts the transaction on drop; nothing partial
        // ever lands.
        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "order materialization commit failed");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, "gateway order materialized");
        Ok(OrderRecord {
            order: order_model,
            items,
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderRecord>, ServiceError> {
        let Some(order_model) = order::Entity::find_by_id(id).one(&*self.db).await? else {
            return Ok(None);
        };
        let items = self.load_items(&order_model).await?;
        Ok(Some(OrderRecord {
            order: order_model,
            items,
        }))
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<OrderRecord>, ServiceError> {
        let Some(order_model) = order::Entity::find()
            .filter(
                Condition::any()
                    .add(order::Column::OrderReference.eq(reference))
                    .add(order::Column::GatewayReference.eq(reference)),
            )
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };
        let items = self.load_items(&order_model).await?;
        Ok(Some(OrderRecord {
            order: order_model,
            items,
        }))
    }

    #[instrument(skip(self, detail), fields(order_id = %id, expected = %expected, next = %next))]
    async fn conditional_update_payment_status(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        next: PaymentStatus,
        detail: Option<&PaymentDetail>,
        receipt_reference: Option<&str>,
    ) -> Result<bool, ServiceError> {
        let now = Utc::now();

        let result = order::Entity::update_many()
            .col_expr(order::Column::PaymentStatus, Expr::value(next.to_string()))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .filter(order::Column::Id.eq(id))
            .filter(order::Column::PaymentStatus.eq(expected.to_string()))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Ok(false);
        }

        // Only the CAS winner reaches this point, so the detail write cannot
        // race another transition.
        if detail.is_some() || receipt_reference.is_some() {
            let Some(model) = order::Entity::find_by_id(id).one(&*self.db).await? else {
                return Err(ServiceError::NotFound(format!("order {} not found", id)));
            };
            let mut active: order::ActiveModel = model.into();
            if let Some(detail) = detail {
                active.payment_detail = Set(Some(serde_json::to_value(detail)?));
                if let Some(paid_at) = detail.paid_at {
                    active.paid_at = Set(Some(paid_at));
                }
            }
            if let Some(receipt) = receipt_reference {
                active.receipt_reference = Set(Some(receipt.to_string()));
            }
            active.updated_at = Set(Some(now));
            active.update(&*self.db).await?;
        }

        Ok(true)
    }

    #[instrument(skip(self), fields(order_id = %id, status = %status))]
    async fn update_status(&self, id: Uuid, status: OrderStatus) -> Result<OrderRecord, ServiceError> {
        let Some(model) = order::Entity::find_by_id(id).one(&*self.db).await? else {
            return Err(ServiceError::NotFound(format!("order {} not found", id)));
        };

        let mut active: order::ActiveModel = model.into();
        active.status = Set(status.to_string());
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;

        let items = self.load_items(&updated).await?;
        Ok(OrderRecord {
            order: updated,
            items,
        })
    }

    #[instrument(skip(self), fields(order_id = %id, archived = %archived))]
    async fn set_archived(&self, id: Uuid, archived: bool) -> Result<OrderRecord, ServiceError> {
        let Some(model) = order::Entity::find_by_id(id).one(&*self.db).await? else {
            return Err(ServiceError::NotFound(format!("order {} not found", id)));
        };

        let mut active: order::ActiveModel = model.into();
        active.is_archived = Set(archived);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;

        let items = self.load_items(&updated).await?;
        Ok(OrderRecord {
            order: updated,
            items,
        })
    }

    async fn list_active(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderRecord>, u64), ServiceError> {
        let paginator = order::Entity::find()
            .filter(order::Column::IsArchived.eq(false))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.max(1) - 1).await?;

        let mut records = Vec::with_capacity(orders.len());
        for order_model in orders {
            let items = self.load_items(&order_model).await?;
            records.push(OrderRecord {
                order: order_model,
                items,
            });
        }

        Ok((records, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeliveryMethod;
    use crate::services::catalog::LineItem;

    fn draft() -> AssembledOrder {
        AssembledOrder {
            order_reference: "ORD-250101120000-AB12".to_string(),
            payment_reference: "ORD-250101120000-AB12-PAY".to_string(),
            customer_name: "Ada".to_string(),
            customer_email: "ada@example.com".to_string(),
            customer_phone: None,
            delivery_method: DeliveryMethod::Pickup,
            address: "12 Allen Avenue, Ikeja".to_string(),
            latitude: None,
            longitude: None,
            distance_km: None,
            delivery_fee: 0,
            pickup_code: Some("CHOW-P-0042".to_string()),
            delivery_code: None,
            line_items: vec![LineItem {
                product_reference: "rice".to_string(),
                name: "Jollof Rice".to_string(),
                quantity: 2,
                unit_price: 8000,
                proteins: vec![],
            }],
            total_amount: 16000,
        }
    }

    #[test]
    fn active_model_snapshot_matches_the_draft() {
        let d = draft();
        let now = Utc::now();
        let id = Uuid::new_v4();
        let active = SeaOrmOrderStore::order_active_model(
            &d,
            id,
            OrderStatus::Pending,
            PaymentStatus::Pending,
            now,
        );

        assert_eq!(active.order_reference.as_ref(), &d.order_reference);
        assert_eq!(active.total_amount.as_ref(), &16000);
        assert_eq!(active.status.as_ref().as_str(), "pending");
        assert_eq!(active.payment_status.as_ref().as_str(), "pending");
        assert_eq!(active.is_archived.as_ref(), &false);
    }

    #[test]
    fn item_models_freeze_line_totals() {
        let d = draft();
        let items =
            SeaOrmOrderStore::item_active_models(&d, Uuid::new_v4(), Utc::now()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].unit_price.as_ref(), &8000);
        assert_eq!(items[0].total_price.as_ref(), &16000);
    }
}
