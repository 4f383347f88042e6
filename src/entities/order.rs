use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Central order aggregate. `order_reference` is externally stable, globally
/// unique and immutable; the store's uniqueness constraint on it is the
/// primitive that prevents double-creation races.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub order_reference: String,
    pub payment_reference: String,

    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,

    pub delivery_method: String,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub distance_km: Option<f64>,

    /// Minor currency units. 0 for pickup orders.
    pub delivery_fee: i64,
    /// Frozen at assembly: sum of line totals plus delivery fee.
    pub total_amount: i64,

    pub pickup_code: Option<String>,
    pub delivery_code: Option<String>,

    pub status: String,
    pub payment_status: String,

    pub gateway_reference: Option<String>,
    pub payment_detail: Option<Json>,
    pub receipt_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,

    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(now);
            }
        }

        if let ActiveValue::NotSet = active_model.updated_at {
            active_model.updated_at = Set(Some(now));
        }

        Ok(active_model)
    }
}
