//! In-memory doubles for the ordering core's external collaborators.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

use chopnow_api::entities::{order, order_item};
use chopnow_api::errors::ServiceError;
use chopnow_api::events::EventSender;
use chopnow_api::gateway::{GatewaySession, PaymentGateway};
use chopnow_api::models::{OrderStatus, PaymentDetail, PaymentStatus};
use chopnow_api::services::catalog::{CatalogEntry, CatalogReader};
use chopnow_api::services::notifications::{NotificationDispatcher, Notifier};
use chopnow_api::services::order_assembly::AssembledOrder;
use chopnow_api::services::orders::{OrderRecord, OrderStore};

/// Fixed two-product, one-protein menu used across the flow tests.
pub struct StaticCatalog;

#[async_trait]
impl CatalogReader for StaticCatalog {
    async fn find_products_by_ids(&self, ids: &[String]) -> Result<Vec<CatalogEntry>, ServiceError> {
        Ok([
            ("rice", "Jollof Rice", 4500i64),
            ("beans", "Ewa Agoyin", 3000i64),
        ]
        .iter()
        .filter(|(id, _, _)| ids.iter().any(|i| i == id))
        .map(|(id, name, price)| CatalogEntry {
            id: id.to_string(),
            name: name.to_string(),
            price: *price,
        })
        .collect())
    }

    async fn find_proteins_by_ids(&self, ids: &[String]) -> Result<Vec<CatalogEntry>, ServiceError> {
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

/// Counting notifier. Always succeeds; records every message.
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(Vec::new()),
        })
    }

    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, _channel_id: &str, message: &str) -> Result<(), ServiceError> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// Waits until the recorded notification count stops changing (or a deadline
/// passes). Dispatch is fire-and-forget, so tests poll rather than join.
pub async fn settle_notifications(notifier: &RecordingNotifier) -> usize {
    let mut last = notifier.count();
    for _ in 0..100 {
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let now = notifier.count();
        if now == last {
            break;
        }
        last = now;
    }
    notifier.count()
}

/// Session-recording gateway double.
pub struct RecordingGateway {
    pub sessions: Mutex<Vec<(String, i64, serde_json::Value)>>,
}

impl RecordingGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn open_session(
        &self,
        _email: &str,
        amount_minor_units: i64,
        reference: &str,
        metadata: serde_json::Value,
    ) -> Result<GatewaySession, ServiceError> {
        self.sessions
            .lock()
            .unwrap()
            .push((reference.to_string(), amount_minor_units, metadata));
        Ok(GatewaySession {
            redirect_url: format!("https://pay.example/{}", reference),
            reference: reference.to_string(),
        })
    }
}

/// In-memory Order Store honoring the reference-uniqueness constraint and
/// compare-and-swap payment transitions.
pub struct InMemoryOrderStore {
    orders: Mutex<HashMap<Uuid, OrderRecord>>,
    pub inserts: AtomicU32,
}

impl InMemoryOrderStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            orders: Mutex::new(HashMap::new()),
            inserts: AtomicU32::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.orders.lock().unwrap().len()
    }

    fn build_record(
        draft: &AssembledOrder,
        status: OrderStatus,
        payment_status: PaymentStatus,
        gateway_reference: Option<&str>,
        detail: Option<&PaymentDetail>,
    ) -> Result<OrderRecord, ServiceError> {
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let items = draft
            .line_items
            .iter()
            .map(|line| {
                Ok(order_item::Model {
                    id: Uuid::new_v4(),
                    order_id,
                    product_reference: line.product_reference.clone(),
                    name: line.name.clone(),
                    quantity: line.quantity as i32,
                    unit_price: line.unit_price,
                    total_price: line.line_total(),
                    proteins: serde_json::to_value(&line.proteins)?,
                    created_at: now,
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        Ok(OrderRecord {
            order: order::Model {
                id: order_id,
                order_reference: draft.order_reference.clone(),
                payment_reference: draft.payment_reference.clone(),
                customer_name: draft.customer_name.clone(),
                customer_email: draft.customer_email.clone(),
                customer_phone: draft.customer_phone.clone(),
                delivery_method: draft.delivery_method.to_string(),
                address: draft.address.clone(),
                latitude: draft.latitude,
                longitude: draft.longitude,
                distance_km: draft.distance_km,
                delivery_fee: draft.delivery_fee,
                total_amount: draft.total_amount,
                pickup_code: draft.pickup_code.clone(),
                delivery_code: draft.delivery_code.clone(),
                status: status.to_string(),
                payment_status: payment_status.to_string(),
                gateway_reference: gateway_reference.map(str::to_string),
                payment_detail: detail
                    .map(serde_json::to_value)
                    .transpose()
                    .map_err(ServiceError::from)?,
                receipt_reference: None,
                paid_at: detail.and_then(|d| d.paid_at),
                is_archived: false,
                created_at: now,
                updated_at: Some(now),
            },
            items,
        })
    }

    fn check_unique(&self, reference: &str) -> Result<(), ServiceError> {
        let orders = self.orders.lock().unwrap();
        if orders
            .values()
            .any(|r| r.order.order_reference == reference)
        {
            return Err(ServiceError::DuplicateReference(format!(
                "order reference '{}' already exists",
                reference
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, draft: &AssembledOrder) -> Result<OrderRecord, ServiceError> {
        self.check_unique(&draft.order_reference)?;
        let record = Self::build_record(
            draft,
            OrderStatus::Pending,
            PaymentStatus::Pending,
            None,
            None,
        )?;
        self.orders
            .lock()
            .unwrap()
            .insert(record.order.id, record.clone());
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn transactional_insert(
        &self,
        draft: &AssembledOrder,
        gateway_reference: &str,
        detail: &PaymentDetail,
    ) -> Result<OrderRecord, ServiceError> {
        self.check_unique(&draft.order_reference)?;
        let record = Self::build_record(
            draft,
            OrderStatus::Preparing,
            PaymentStatus::Success,
            Some(gateway_reference),
            Some(detail),
        )?;
        self.orders
            .lock()
            .unwrap()
            .insert(record.order.id, record.clone());
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderRecord>, ServiceError> {
        Ok(self.orders.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<OrderRecord>, ServiceError> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .values()
            .find(|r| {
                r.order.order_reference == reference
                    || r.order.gateway_reference.as_deref() == Some(reference)
            })
            .cloned())
    }

    async fn conditional_update_payment_status(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        next: PaymentStatus,
        detail: Option<&PaymentDetail>,
        receipt_reference: Option<&str>,
    ) -> Result<bool, ServiceError> {
        let mut orders = self.orders.lock().unwrap();
        let Some(record) = orders.get_mut(&id) else {
            return Ok(false);
        };
        if record.order.payment_status != expected.to_string() {
            return Ok(false);
        }
        record.order.payment_status = next.to_string();
        if let Some(detail) = detail {
            record.order.payment_detail = Some(serde_json::to_value(detail)?);
            if let Some(paid_at) = detail.paid_at {
                record.order.paid_at = Some(paid_at);
            }
        }
        if let Some(receipt) = receipt_reference {
            record.order.receipt_reference = Some(receipt.to_string());
        }
        record.order.updated_at = Some(Utc::now());
        Ok(true)
    }

    async fn update_status(&self, id: Uuid, status: OrderStatus) -> Result<OrderRecord, ServiceError> {
        let mut orders = self.orders.lock().unwrap();
        let record = orders
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", id)))?;
        record.order.status = status.to_string();
        record.order.updated_at = Some(Utc::now());
        Ok(record.clone())
    }

    async fn set_archived(&self, id: Uuid, archived: bool) -> Result<OrderRecord, ServiceError> {
        let mut orders = self.orders.lock().unwrap();
        let record = orders
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", id)))?;
        record.order.is_archived = archived;
        record.order.updated_at = Some(Utc::now());
        Ok(record.clone())
    }

    async fn list_active(
        &self,
        _page: u64,
        _per_page: u64,
    ) -> Result<(Vec<OrderRecord>, u64), ServiceError> {
        let orders = self.orders.lock().unwrap();
        let active: Vec<OrderRecord> = orders
            .values()
            .filter(|r| !r.order.is_archived)
            .cloned()
            .collect();
        let total = active.len() as u64;
        Ok((active, total))
    }
}

/// Event channel whose receiver is simply drained in the background.
pub fn event_sender() -> EventSender {
    let (tx, mut rx) = mpsc::channel(64);
    tokio::spawn(async move { while rx.recv().await.is_some() {} });
    EventSender::new(tx)
}

pub fn dispatcher(notifier: Arc<RecordingNotifier>) -> NotificationDispatcher {
    NotificationDispatcher::new(notifier, "ops-channel".to_string(), 1)
}
