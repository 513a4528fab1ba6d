use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{api::state::AppState, error::AppError, gateways::PaymentGateway};
use std::sync::Arc;

pub async fn midtrans(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    match state.midtrans.clone() {
        Some(gateway) => handle(state, gateway, headers, body).await,
        None => gateway_disabled("midtrans"),
    }
}

pub async fn xendit(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    match state.xendit.clone() {
        Some(gateway) => handle(state, gateway, headers, body).await,
        None => gateway_disabled("xendit"),
    }
}

/// Shared webhook policy. 200 means accepted-and-processed or safely
/// ignored, 401 means verification failed (nothing touched), 400 means the
/// payload itself was unreadable, 500 asks the gateway to redeliver.
async fn handle(
    state: AppState,
    gateway: Arc<dyn PaymentGateway>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let notification = match gateway.verify(&body, &headers).await {
        Ok(notification) => notification,
        // Authenticated but carrying a reference we can never decode:
        // acknowledge so the gateway stops retrying, and log it.
        Err(AppError::MalformedReference(msg)) => {
            tracing::warn!(gateway = gateway.name(), "Ignoring webhook: {}", msg);
            return (StatusCode::OK, Json(json!({ "status": "ignored" }))).into_response();
        }
        Err(e) => return e.into_response(),
    };

    match state.service_context.reconciler.reconcile(notification).await {
        Ok(outcome) => {
            tracing::info!(gateway = gateway.name(), "Reconciled: {:?}", outcome);
            (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

fn gateway_disabled(name: &str) -> Response {
    tracing::warn!("Webhook received for disabled gateway {}", name);
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "gateway not configured" })),
    )
        .into_response()
}
