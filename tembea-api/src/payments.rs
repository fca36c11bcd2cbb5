use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tembea_core::{CapabilityCatalog, InitiateRequest, MethodInfo, Payment};
use tembea_payments::{InitiationResponse, ReconcileOutcome};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::{customer_auth_middleware, CustomerClaims};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct MethodsQuery {
    pub country: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MethodsResponse {
    pub country: Option<String>,
    pub methods: Vec<MethodInfo>,
}

/// Method and currency arrive as plain strings so an unknown method is
/// reported as unsupported rather than as a malformed body.
#[derive(Debug, Deserialize)]
pub struct InitiatePaymentRequest {
    pub booking_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub method: String,
    pub phone_number: Option<String>,
    pub card_token: Option<String>,
    pub country: Option<String>,
}

impl InitiatePaymentRequest {
    fn into_domain(self) -> Result<InitiateRequest, AppError> {
        Ok(InitiateRequest {
            method: self.method.parse()?,
            currency: self.currency.parse()?,
            booking_id: self.booking_id,
            amount: self.amount,
            phone_number: self.phone_number,
            card_token: self.card_token,
            country: self.country,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct SimulateFailureRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SimulationResponse {
    pub applied: bool,
    pub payment: Payment,
}

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/initiate", post(initiate_payment))
        .route("/verify/{id}", get(verify_payment))
        .route("/mine", get(list_my_payments))
        .route("/booking/{booking_id}", get(list_booking_payments))
        .route("/{id}", get(get_payment))
        .route("/{id}/refund", post(refund_payment))
        .route("/{id}/simulate/complete", post(simulate_completion))
        .route("/{id}/simulate/fail", post(simulate_failure))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            customer_auth_middleware,
        ));

    Router::new()
        .route("/methods", get(list_methods))
        .merge(protected)
}

/// GET /v1/payments/methods?country=KE
async fn list_methods(
    State(state): State<AppState>,
    Query(query): Query<MethodsQuery>,
) -> Json<MethodsResponse> {
    let country = query
        .country
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty());

    let methods = state
        .engine
        .catalog()
        .methods_for_country(country.as_deref())
        .into_iter()
        .map(CapabilityCatalog::info_for_method)
        .collect();

    Json(MethodsResponse { country, methods })
}

/// POST /v1/payments/initiate
async fn initiate_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Json(req): Json<InitiatePaymentRequest>,
) -> Result<Json<InitiationResponse>, AppError> {
    let request = req.into_domain()?;
    let response = state.engine.initiate(request, &claims.sub).await?;

    // Direct card charges complete during initiation
    if let Some(payment) = state.engine.get(response.payment_id).await {
        state.publish(&payment);
    }

    Ok(Json(response))
}

/// GET /v1/payments/verify/{id}
async fn verify_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Payment>, AppError> {
    Ok(Json(owned_payment(&state, &claims, id).await?))
}

/// GET /v1/payments/{id}
async fn get_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Payment>, AppError> {
    Ok(Json(owned_payment(&state, &claims, id).await?))
}

/// GET /v1/payments/booking/{booking_id}
/// Only the caller's own payments for the booking.
async fn list_booking_payments(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(booking_id): Path<String>,
) -> Json<Vec<Payment>> {
    let payments = state
        .engine
        .list_by_booking(&booking_id)
        .await
        .into_iter()
        .filter(|p| p.user_id == claims.sub)
        .collect();
    Json(payments)
}

/// GET /v1/payments/mine
async fn list_my_payments(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
) -> Json<Vec<Payment>> {
    Json(state.engine.list_by_user(&claims.sub).await)
}

/// POST /v1/payments/{id}/refund
async fn refund_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(id): Path<Uuid>,
    Json(req): Json<RefundRequest>,
) -> Result<Json<Payment>, AppError> {
    owned_payment(&state, &claims, id).await?;
    let payment = state.engine.refund(id, &req.reason).await?;
    state.publish(&payment);
    Ok(Json(payment))
}

/// POST /v1/payments/{id}/simulate/complete
async fn simulate_completion(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<SimulationResponse>, AppError> {
    ensure_simulation(&state)?;
    owned_payment(&state, &claims, id).await?;
    let outcome = state.reconciler.simulate_completion(id).await?;
    simulation_response(&state, outcome)
}

/// POST /v1/payments/{id}/simulate/fail
async fn simulate_failure(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(id): Path<Uuid>,
    Json(req): Json<SimulateFailureRequest>,
) -> Result<Json<SimulationResponse>, AppError> {
    ensure_simulation(&state)?;
    owned_payment(&state, &claims, id).await?;
    let outcome = state.reconciler.simulate_failure(id, req.reason).await?;
    simulation_response(&state, outcome)
}

/// Another user's payment is reported as missing, so ids reveal nothing.
async fn owned_payment(
    state: &AppState,
    claims: &CustomerClaims,
    id: Uuid,
) -> Result<Payment, AppError> {
    match state.engine.get(id).await {
        Some(payment) if payment.user_id == claims.sub => Ok(payment),
        Some(_) => {
            tracing::warn!("User {} asked for payment {} owned by someone else", claims.sub, id);
            Err(AppError::NotFoundError(format!("Payment not found: {}", id)))
        }
        None => Err(AppError::NotFoundError(format!("Payment not found: {}", id))),
    }
}

fn ensure_simulation(state: &AppState) -> Result<(), AppError> {
    if state.simulation_enabled {
        Ok(())
    } else {
        Err(AppError::NotFoundError("Not found".to_string()))
    }
}

fn simulation_response(
    state: &AppState,
    outcome: ReconcileOutcome,
) -> Result<Json<SimulationResponse>, AppError> {
    match outcome {
        ReconcileOutcome::Applied(payment) => {
            state.publish(&payment);
            Ok(Json(SimulationResponse { applied: true, payment }))
        }
        ReconcileOutcome::Duplicate(payment) => {
            Ok(Json(SimulationResponse { applied: false, payment }))
        }
        // Simulations resolve by id, so there is always a match
        ReconcileOutcome::Unmatched => Err(AppError::InternalServerError(
            "Simulation did not resolve a payment".to_string(),
        )),
    }
}
