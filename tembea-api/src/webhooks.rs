use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};
use tembea_payments::callbacks::{
    AirtelCallback, CardWebhook, MpesaCallback, MtnMomoCallback, PaypalWebhook,
};
use tembea_payments::{CallbackEvent, ReconcileOutcome};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/mpesa", post(handle_mpesa))
        .route("/mtn-momo", post(handle_mtn_momo))
        .route("/airtel-money", post(handle_airtel_money))
        .route("/paypal", post(handle_paypal))
        .route("/card", post(handle_card))
}

/// POST /v1/webhooks/mpesa
/// Daraja expects its own acknowledgement shape
async fn handle_mpesa(
    State(state): State<AppState>,
    Json(payload): Json<MpesaCallback>,
) -> Result<Json<Value>, AppError> {
    let result = reconcile(&state, "mpesa", payload.into_event()).await?;
    Ok(Json(json!({
        "ResultCode": 0,
        "ResultDesc": "Accepted",
        "result": result,
    })))
}

/// POST /v1/webhooks/mtn-momo
async fn handle_mtn_momo(
    State(state): State<AppState>,
    Json(payload): Json<MtnMomoCallback>,
) -> Result<Json<Value>, AppError> {
    let result = reconcile(&state, "mtn_momo", payload.into_event()).await?;
    Ok(acknowledge(result))
}

/// POST /v1/webhooks/airtel-money
async fn handle_airtel_money(
    State(state): State<AppState>,
    Json(payload): Json<AirtelCallback>,
) -> Result<Json<Value>, AppError> {
    let result = reconcile(&state, "airtel_money", payload.into_event()).await?;
    Ok(acknowledge(result))
}

/// POST /v1/webhooks/paypal
async fn handle_paypal(
    State(state): State<AppState>,
    Json(payload): Json<PaypalWebhook>,
) -> Result<Json<Value>, AppError> {
    tracing::info!("Received PayPal webhook: {}", payload.event_type);
    let result = reconcile(&state, "paypal", payload.into_event()).await?;
    Ok(acknowledge(result))
}

/// POST /v1/webhooks/card
async fn handle_card(
    State(state): State<AppState>,
    Json(payload): Json<CardWebhook>,
) -> Result<Json<Value>, AppError> {
    tracing::info!("Received card webhook: {} for session {}", payload.type_, payload.data.object.id);
    let result = reconcile(&state, "card", payload.into_event()).await?;
    Ok(acknowledge(result))
}

fn acknowledge(result: &'static str) -> Json<Value> {
    Json(json!({ "received": true, "result": result }))
}

/// Providers get a 200 for every well-formed payload, including ones we drop,
/// so they stop retrying.
async fn reconcile(
    state: &AppState,
    provider: &str,
    event: Option<CallbackEvent>,
) -> Result<&'static str, AppError> {
    let Some(event) = event else {
        tracing::debug!("Ignoring {} callback without a terminal outcome", provider);
        return Ok("ignored");
    };

    match state.reconciler.reconcile(event).await? {
        ReconcileOutcome::Applied(payment) => {
            state.publish(&payment);
            Ok("applied")
        }
        ReconcileOutcome::Duplicate(_) => Ok("duplicate"),
        ReconcileOutcome::Unmatched => Ok("unmatched"),
    }
}
