use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use rust_decimal_macros::dec;
use tembea_api::middleware::CustomerClaims;
use tembea_api::state::{AppState, AuthConfig};
use tembea_api::app;
use tembea_core::{CapabilityCatalog, Currency, RateTable};
use tembea_payments::{AdapterRegistry, LifecycleEngine};
use tembea_store::app_config::ProvidersConfig;
use tembea_store::Ledger;

const SECRET: &str = "integration-test-secret";

fn test_state(simulation_enabled: bool) -> AppState {
    let rates = Arc::new(RateTable::new(Currency::Usd, Utc::now()).with_rate(Currency::Kes, dec!(129.50)));
    let engine = LifecycleEngine::new(
        Ledger::new(),
        AdapterRegistry::simulated(&ProvidersConfig::default(), rates, Duration::hours(24)),
        CapabilityCatalog::default(),
    );
    AppState::new(
        Arc::new(engine),
        AuthConfig {
            secret: SECRET.to_string(),
            expiration: 3600,
        },
        simulation_enabled,
    )
}

fn token_for(user_id: &str, role: &str) -> String {
    let claims = CustomerClaims {
        sub: user_id.to_string(),
        email: Some(format!("{}@example.com", user_id)),
        role: role.to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = app(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn mpesa_body() -> Value {
    json!({
        "booking_id": "booking-42",
        "amount": "1500",
        "currency": "KES",
        "method": "mpesa",
        "phone_number": "0712345678",
        "country": "KE"
    })
}

fn mpesa_callback(checkout_request_id: &str, receipt: &str) -> Value {
    json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": checkout_request_id,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [{ "Name": "MpesaReceiptNumber", "Value": receipt }]
                }
            }
        }
    })
}

#[tokio::test]
async fn test_methods_for_country_without_auth() {
    let state = test_state(true);

    let (status, body) = send(&state, get("/v1/payments/methods?country=ke", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["country"], "KE");
    assert_eq!(body["methods"][0]["method"], "mpesa");
    assert_eq!(body["methods"][0]["required_inputs"][0], "phone_number");

    let (_, body) = send(&state, get("/v1/payments/methods", None)).await;
    let methods: Vec<&str> = body["methods"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["method"].as_str().unwrap())
        .collect();
    assert_eq!(methods, vec!["paypal", "visa", "mastercard"]);
}

#[tokio::test]
async fn test_payment_routes_require_token() {
    let state = test_state(true);

    let (status, body) = send(&state, post("/v1/payments/initiate", None, mpesa_body())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = send(&state, get("/v1/payments/mine", Some("not-a-jwt"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let admin = token_for("ops-1", "ADMIN");
    let (status, _) = send(&state, get("/v1/payments/mine", Some(&admin))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_mpesa_flow_with_callback() {
    let state = test_state(true);
    let mut events = state.events.subscribe();
    let token = token_for("user-1", "CUSTOMER");

    let (status, body) = send(&state, post("/v1/payments/initiate", Some(&token), mpesa_body())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PROCESSING");
    assert_eq!(body["expires_in_seconds"], 60);
    assert!(body["instructions"].as_str().unwrap().contains("254712345678"));
    let id = body["payment_id"].as_str().unwrap().to_string();
    let reference = body["provider_reference"].as_str().unwrap().to_string();

    let (status, ack) = send(
        &state,
        post("/v1/webhooks/mpesa", None, mpesa_callback(&reference, "NLJ7RT61SV")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["ResultCode"], 0);
    assert_eq!(ack["result"], "applied");

    let (status, payment) = send(&state, get(&format!("/v1/payments/{}", id), Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payment["status"], "COMPLETED");
    assert_eq!(payment["provider_transaction_id"], "NLJ7RT61SV");
    assert_eq!(payment["phone_number"], "254712345678");

    let event = events.recv().await.unwrap();
    assert_eq!(event.payment_id.to_string(), id);
    assert_eq!(event.status, "COMPLETED");

    // Providers retry; the second delivery changes nothing
    let (status, ack) = send(
        &state,
        post("/v1/webhooks/mpesa", None, mpesa_callback(&reference, "OTHER")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["result"], "duplicate");

    let (_, payment) = send(&state, get(&format!("/v1/payments/verify/{}", id), Some(&token))).await;
    assert_eq!(payment["provider_transaction_id"], "NLJ7RT61SV");
}

#[tokio::test]
async fn test_unknown_callback_reference_acknowledged() {
    let state = test_state(true);

    let (status, ack) = send(
        &state,
        post("/v1/webhooks/mpesa", None, mpesa_callback("ws_CO_unknown", "X")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["result"], "unmatched");

    let (status, ack) = send(
        &state,
        post(
            "/v1/webhooks/paypal",
            None,
            json!({ "event_type": "CHECKOUT.ORDER.APPROVED", "resource": { "id": "5O190127TN364715T" } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["result"], "ignored");
}

#[tokio::test]
async fn test_initiate_validation_errors() {
    let state = test_state(true);
    let token = token_for("user-1", "CUSTOMER");

    let mut body = mpesa_body();
    body["phone_number"] = Value::Null;
    let (status, error) = send(&state, post("/v1/payments/initiate", Some(&token), body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["error"].as_str().unwrap().contains("phone_number"));

    let mut body = mpesa_body();
    body["method"] = json!("bitcoin");
    let (status, _) = send(&state, post("/v1/payments/initiate", Some(&token), body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let mut body = mpesa_body();
    body["country"] = json!("UG");
    let (status, _) = send(&state, post("/v1/payments/initiate", Some(&token), body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, mine) = send(&state, get("/v1/payments/mine", Some(&token))).await;
    assert!(mine.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_paypal_redirect_uses_sandbox_host() {
    let state = test_state(true);
    let token = token_for("user-1", "CUSTOMER");

    let (status, body) = send(
        &state,
        post(
            "/v1/payments/initiate",
            Some(&token),
            json!({ "booking_id": "booking-9", "amount": 50, "currency": "USD", "method": "paypal" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PENDING_REDIRECT");
    assert_eq!(body["expires_in_seconds"], 3600);
    assert!(body["checkout_url"]
        .as_str()
        .unwrap()
        .starts_with("https://www.sandbox.paypal.com/"));
}

#[tokio::test]
async fn test_refund_rules() {
    let state = test_state(true);
    let token = token_for("user-1", "CUSTOMER");

    let (_, body) = send(&state, post("/v1/payments/initiate", Some(&token), mpesa_body())).await;
    let id = body["payment_id"].as_str().unwrap().to_string();

    let (status, error) = send(
        &state,
        post(&format!("/v1/payments/{}/refund", id), Some(&token), json!({ "reason": "changed plans" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(error["error"].as_str().unwrap().contains("COMPLETED"));

    let (status, _) = send(
        &state,
        post(&format!("/v1/payments/{}/simulate/complete", id), Some(&token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &state,
        post(&format!("/v1/payments/{}/refund", id), Some(&token), json!({ "reason": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, payment) = send(
        &state,
        post(&format!("/v1/payments/{}/refund", id), Some(&token), json!({ "reason": "changed plans" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payment["status"], "REFUNDED");
    assert_eq!(payment["metadata"]["refund_reason"], "changed plans");
}

#[tokio::test]
async fn test_simulated_failure_and_listing() {
    let state = test_state(true);
    let token = token_for("user-1", "CUSTOMER");
    let other = token_for("user-2", "CUSTOMER");

    let (_, body) = send(&state, post("/v1/payments/initiate", Some(&token), mpesa_body())).await;
    let id = body["payment_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &state,
        post(
            &format!("/v1/payments/{}/simulate/fail", id),
            Some(&token),
            json!({ "reason": "Insufficient funds" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], true);
    assert_eq!(body["payment"]["status"], "FAILED");
    assert_eq!(body["payment"]["failure_reason"], "Insufficient funds");

    let (_, mine) = send(&state, get("/v1/payments/mine", Some(&token))).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
    let (_, theirs) = send(&state, get("/v1/payments/mine", Some(&other))).await;
    assert!(theirs.as_array().unwrap().is_empty());

    let (_, by_booking) = send(&state, get("/v1/payments/booking/booking-42", Some(&token))).await;
    assert_eq!(by_booking.as_array().unwrap().len(), 1);
    let (status, by_booking) =
        send(&state, get("/v1/payments/booking/booking-42", Some(&other))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(by_booking.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_other_users_payment_is_hidden() {
    let state = test_state(true);
    let owner = token_for("alice", "CUSTOMER");
    let intruder = token_for("mallory", "CUSTOMER");

    let (_, body) = send(&state, post("/v1/payments/initiate", Some(&owner), mpesa_body())).await;
    let id = body["payment_id"].as_str().unwrap().to_string();

    // The intruder cannot settle it on the owner's behalf
    let (status, _) = send(
        &state,
        post(&format!("/v1/payments/{}/simulate/complete", id), Some(&intruder), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &state,
        post(&format!("/v1/payments/{}/simulate/complete", id), Some(&owner), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    for uri in [format!("/v1/payments/{}", id), format!("/v1/payments/verify/{}", id)] {
        let (status, _) = send(&state, get(&uri, Some(&intruder))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    let (status, _) = send(
        &state,
        post(&format!("/v1/payments/{}/refund", id), Some(&intruder), json!({ "reason": "mine now" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, payment) = send(&state, get(&format!("/v1/payments/{}", id), Some(&owner))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payment["status"], "COMPLETED");
    assert_eq!(payment["user_id"], "alice");
}

#[tokio::test]
async fn test_simulation_disabled_and_unknown_payment() {
    let state = test_state(false);
    let token = token_for("user-1", "CUSTOMER");

    let (_, body) = send(&state, post("/v1/payments/initiate", Some(&token), mpesa_body())).await;
    let id = body["payment_id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &state,
        post(&format!("/v1/payments/{}/simulate/complete", id), Some(&token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let missing = uuid::Uuid::new_v4();
    let (status, _) = send(&state, get(&format!("/v1/payments/{}", missing), Some(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&state, get(&format!("/v1/payments/verify/{}", missing), Some(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
