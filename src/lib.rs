//! ChopNow API Library
//!
//! Order assembly and payment reconciliation core for a food-ordering
//! storefront: carts become priced, uniquely-referenced orders, settled
//! through either a manual bank-transfer flow or a gateway webhook flow.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod migrator;
pub mod models;
pub mod services;
pub mod webhooks;

use axum::{
    routing::{get, post, put},
    Router,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use services::orders::OrderStore;
use services::payments::PaymentFlowCoordinator;
use webhooks::WebhookGuard;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub store: Arc<dyn OrderStore>,
    pub payments: Arc<PaymentFlowCoordinator>,
    pub webhooks: Arc<WebhookGuard>,
}

/// Common query parameters for list endpoints.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

/// Uniform success envelope.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }
}

/// Builds the HTTP router over the shared state.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/v1/orders",
            post(handlers::orders::create_order).get(handlers::orders::list_orders),
        )
        .route("/api/v1/orders/:id", get(handlers::orders::get_order))
        .route(
            "/api/v1/orders/:id/verify-payment",
            post(handlers::orders::verify_payment),
        )
        .route(
            "/api/v1/orders/:id/status",
            put(handlers::orders::update_status),
        )
        .route(
            "/api/v1/orders/:id/archive",
            post(handlers::orders::set_archived),
        )
        .route(
            "/api/v1/payments/webhook",
            post(handlers::payment_webhooks::payment_webhook),
        )
        .with_state(state)
}
