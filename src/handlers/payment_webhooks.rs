use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::error;

use crate::errors::ServiceError;
use crate::webhooks::SIGNATURE_HEADER;
use crate::AppState;

/// Inbound gateway callback. Unauthenticated traffic gets 401; internal
/// failures the gateway cannot fix are swallowed (200) by the guard itself,
/// so any error reaching this point is either a signature failure or a
/// materialization abort that is safe for the gateway to retry.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Event accepted"),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 500, description = "Materialization aborted; event may be retried", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match state.webhooks.process(&body, signature).await {
        Ok(_) => (StatusCode::OK, "ok").into_response(),
        Err(err @ ServiceError::Unauthorized(_)) => err.into_response(),
        Err(err) => {
            error!(error = %err, "webhook processing failed; gateway may retry");
            err.into_response()
        }
    }
}
