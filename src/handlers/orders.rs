use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::events::Event;
use crate::models::OrderStatus;
use crate::services::order_assembly::CreateOrderRequest;
use crate::services::orders::{OrderListResponse, OrderResponse};
use crate::services::payments::VerifyPaymentRequest;
use crate::{ApiResponse, AppState, ListQuery};

/// Resolve an order identifier that may be a UUID or an order reference.
async fn resolve_order(state: &AppState, id: &str) -> Result<OrderResponse, ServiceError> {
    if let Ok(uuid) = Uuid::parse_str(id) {
        if let Some(record) = state.store.find_by_id(uuid).await? {
            return Ok(record.into());
        }
    }
    if let Some(record) = state.store.find_by_reference(id).await? {
        return Ok(record.into());
    }
    Err(ServiceError::NotFound(format!("order {} not found", id)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created (manual) or gateway session opened"),
        (status = 400, description = "Invalid cart or duplicate reference", body = crate::errors::ErrorResponse),
        (status = 404, description = "Referenced product not in catalog", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway session could not be opened", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.payments.checkout(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(outcome))))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = String, Path, description = "Order id or order reference")),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = resolve_order(&state, &id).await?;
    Ok(Json(ApiResponse::ok(order)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(
        ("page" = u64, Query, description = "1-based page number"),
        ("limit" = u64, Query, description = "Page size")
    ),
    responses((status = 200, description = "Active (non-archived) orders")),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (records, total) = state.store.list_active(query.page, query.limit).await?;
    let response = OrderListResponse {
        orders: records.into_iter().map(Into::into).collect(),
        total,
        page: query.page,
        per_page: query.limit,
    };
    Ok(Json(ApiResponse::ok(response)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/verify-payment",
    request_body = VerifyPaymentRequest,
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Payment confirmed", body = OrderResponse),
        (status = 400, description = "Payment already confirmed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    request
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
    let order = state
        .payments
        .verify_payment(id, request.receipt_reference)
        .await?;
    Ok(Json(ApiResponse::ok(order)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

/// Staff-only fulfillment edit. Any of the four states may follow any other;
/// payment status is never mutable through this path.
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    request_body = UpdateStatusRequest,
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Status updated", body = OrderResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let before = state
        .store
        .find_by_id(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", id)))?;
    let old_status = before.order.status.clone();

    let updated = state.store.update_status(id, request.status).await?;

    if let Err(e) = state
        .event_sender
        .send(Event::OrderStatusChanged {
            order_id: id,
            old_status,
            new_status: updated.order.status.clone(),
        })
        .await
    {
        warn!(error = %e, "failed to publish status change event");
    }

    Ok(Json(ApiResponse::ok(OrderResponse::from(updated))))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ArchiveRequest {
    pub archived: bool,
}

/// Rolls an order off (or back onto) the active view. History is never
/// deleted.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/archive",
    request_body = ArchiveRequest,
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Archive flag updated", body = OrderResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn set_archived(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ArchiveRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state.store.set_archived(id, request.archived).await?;

    if let Err(e) = state
        .event_sender
        .send(Event::OrderArchived {
            order_id: id,
            archived: request.archived,
        })
        .await
    {
        warn!(error = %e, "failed to publish archive event");
    }

    Ok(Json(ApiResponse::ok(OrderResponse::from(updated))))
}
