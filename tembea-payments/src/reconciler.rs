use std::sync::Arc;
use std::time::Duration;
use tembea_core::{ConfirmOutcome, Payment, PaymentError, PaymentResult};
use uuid::Uuid;

use crate::callbacks::CallbackEvent;
use crate::engine::LifecycleEngine;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The outcome moved the payment into a terminal state
    Applied(Payment),
    /// The payment was already terminal; nothing changed
    Duplicate(Payment),
    /// No payment carries this reference for this provider
    Unmatched,
}

const LOOKUP_ATTEMPTS: u32 = 3;
const LOOKUP_BACKOFF: Duration = Duration::from_millis(50);

/// Turns provider callbacks (and simulated ones) into engine confirmations.
///
/// Providers retry webhooks freely, so a callback for a payment that already
/// reached a terminal state is acknowledged as a duplicate instead of being
/// reported as an error.
///
/// A provider can call back as soon as its gateway has answered, before the
/// engine has recorded the returned reference. Unknown references are
/// therefore looked up a few times, `LOOKUP_BACKOFF` apart, before the
/// callback is dropped as unmatched.
pub struct CallbackReconciler {
    engine: Arc<LifecycleEngine>,
    lookup_attempts: u32,
    lookup_backoff: Duration,
}

impl CallbackReconciler {
    pub fn new(engine: Arc<LifecycleEngine>) -> Self {
        Self {
            engine,
            lookup_attempts: LOOKUP_ATTEMPTS,
            lookup_backoff: LOOKUP_BACKOFF,
        }
    }

    pub fn with_lookup_grace(mut self, attempts: u32, backoff: Duration) -> Self {
        self.lookup_attempts = attempts.max(1);
        self.lookup_backoff = backoff;
        self
    }

    pub async fn reconcile(&self, event: CallbackEvent) -> PaymentResult<ReconcileOutcome> {
        let payment = match self.find_payment(&event.correlation_key).await {
            Some(payment) => payment,
            None => {
                tracing::warn!(
                    "Dropping {} callback for unknown reference {}",
                    event.family,
                    event.correlation_key
                );
                return Ok(ReconcileOutcome::Unmatched);
            }
        };

        if payment.method.family() != event.family {
            tracing::warn!(
                "Dropping {} callback for reference {}: payment {} belongs to {}",
                event.family,
                event.correlation_key,
                payment.id,
                payment.method.family()
            );
            return Ok(ReconcileOutcome::Unmatched);
        }

        self.apply(payment.id, &event.outcome).await
    }

    pub async fn simulate_completion(&self, id: Uuid) -> PaymentResult<ReconcileOutcome> {
        let payment = self.engine.verify(id).await?;
        tracing::info!("Simulating completion of payment {}", payment.id);

        let outcome = ConfirmOutcome::Success {
            provider_transaction_id: Some(format!("SIM{}", Uuid::new_v4().simple())),
        };
        self.apply(payment.id, &outcome).await
    }

    pub async fn simulate_failure(
        &self,
        id: Uuid,
        reason: Option<String>,
    ) -> PaymentResult<ReconcileOutcome> {
        let payment = self.engine.verify(id).await?;
        tracing::info!("Simulating failure of payment {}", payment.id);

        let outcome = ConfirmOutcome::Failure {
            reason: reason.or_else(|| Some("Simulated failure".to_string())),
        };
        self.apply(payment.id, &outcome).await
    }

    async fn find_payment(&self, reference: &str) -> Option<Payment> {
        for attempt in 1..=self.lookup_attempts {
            if let Some(payment) = self.engine.find_by_reference(reference).await {
                return Some(payment);
            }
            if attempt < self.lookup_attempts {
                tokio::time::sleep(self.lookup_backoff).await;
            }
        }
        None
    }

    async fn apply(&self, id: Uuid, outcome: &ConfirmOutcome) -> PaymentResult<ReconcileOutcome> {
        match self.engine.confirm(id, outcome).await {
            Ok(payment) => Ok(ReconcileOutcome::Applied(payment)),
            Err(PaymentError::InvalidTransition { found, .. }) if found.is_terminal() => {
                let payment = self.engine.verify(id).await?;
                tracing::info!(
                    "Ignoring repeated outcome for payment {}: already {}",
                    id,
                    found
                );
                Ok(ReconcileOutcome::Duplicate(payment))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterRegistry;
    use crate::callbacks::{AirtelCallback, CardWebhook, MtnMomoCallback, PaypalWebhook};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use tembea_core::{
        CapabilityCatalog, Currency, InitiateRequest, InitiationResult, PaymentMethod,
        PaymentStatus, ProviderFamily, ProviderOutcome, RateTable,
    };
    use tembea_store::app_config::ProvidersConfig;
    use tembea_store::Ledger;

    fn engine_on(ledger: Ledger) -> Arc<LifecycleEngine> {
        let rates = Arc::new(RateTable::new(Currency::Usd, Utc::now()));
        Arc::new(LifecycleEngine::new(
            ledger,
            AdapterRegistry::simulated(&ProvidersConfig::default(), rates, chrono::Duration::hours(24)),
            CapabilityCatalog::default(),
        ))
    }

    fn reconciler() -> (Arc<LifecycleEngine>, CallbackReconciler) {
        let engine = engine_on(Ledger::new());
        (engine.clone(), CallbackReconciler::new(engine))
    }

    fn request(method: PaymentMethod, currency: Currency, amount: Decimal, phone: Option<&str>) -> InitiateRequest {
        InitiateRequest {
            booking_id: "booking-7".to_string(),
            amount,
            currency,
            method,
            phone_number: phone.map(str::to_string),
            card_token: None,
            country: None,
        }
    }

    async fn initiate(engine: &LifecycleEngine, request: InitiateRequest) -> (Uuid, String) {
        let response = engine.initiate(request, "user-1").await.unwrap();
        (response.payment_id, response.provider_reference.unwrap())
    }

    async fn mpesa_payment(engine: &LifecycleEngine) -> (Uuid, String) {
        let mut request = request(
            PaymentMethod::Mpesa,
            Currency::Kes,
            dec!(2500),
            Some("+254 712 345 678"),
        );
        request.country = Some("KE".to_string());
        initiate(engine, request).await
    }

    fn event(family: ProviderFamily, key: &str, txn: &str) -> CallbackEvent {
        CallbackEvent {
            family,
            correlation_key: key.to_string(),
            outcome: ConfirmOutcome::Success {
                provider_transaction_id: Some(txn.to_string()),
            },
        }
    }

    fn failure(family: ProviderFamily, key: &str, reason: &str) -> CallbackEvent {
        CallbackEvent {
            family,
            correlation_key: key.to_string(),
            outcome: ConfirmOutcome::Failure {
                reason: Some(reason.to_string()),
            },
        }
    }

    #[tokio::test]
    async fn test_callback_completes_payment() {
        let (engine, reconciler) = reconciler();
        let (id, reference) = mpesa_payment(&engine).await;

        let outcome = reconciler
            .reconcile(event(ProviderFamily::Mpesa, &reference, "NLJ7RT61SV"))
            .await
            .unwrap();

        match outcome {
            ReconcileOutcome::Applied(payment) => {
                assert_eq!(payment.id, id);
                assert_eq!(payment.status, PaymentStatus::Completed);
                assert_eq!(payment.provider_transaction_id.as_deref(), Some("NLJ7RT61SV"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_repeated_callback_is_duplicate() {
        let (engine, reconciler) = reconciler();
        let (id, reference) = mpesa_payment(&engine).await;

        reconciler
            .reconcile(event(ProviderFamily::Mpesa, &reference, "FIRST"))
            .await
            .unwrap();
        let first = engine.verify(id).await.unwrap();

        let second = reconciler
            .reconcile(event(ProviderFamily::Mpesa, &reference, "SECOND"))
            .await
            .unwrap();

        match second {
            ReconcileOutcome::Duplicate(payment) => {
                assert_eq!(payment.provider_transaction_id.as_deref(), Some("FIRST"));
                assert_eq!(payment.completed_at, first.completed_at);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(engine.verify(id).await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_success_after_failure_is_duplicate() {
        let (engine, reconciler) = reconciler();
        let (id, reference) = mpesa_payment(&engine).await;

        reconciler
            .reconcile(failure(ProviderFamily::Mpesa, &reference, "Request cancelled by user"))
            .await
            .unwrap();
        let failed = engine.verify(id).await.unwrap();

        let late = reconciler
            .reconcile(event(ProviderFamily::Mpesa, &reference, "NLJ7RT61SV"))
            .await
            .unwrap();

        assert!(matches!(late, ReconcileOutcome::Duplicate(_)));
        let payment = engine.verify(id).await.unwrap();
        assert_eq!(payment, failed);
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.failure_reason.as_deref(), Some("Request cancelled by user"));
        assert!(payment.provider_transaction_id.is_none());
        assert!(payment.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_each_provider_payload_reconciles() {
        let (engine, reconciler) = reconciler();

        let (mtn_id, mtn_ref) = initiate(
            &engine,
            request(PaymentMethod::MtnMomo, Currency::Ugx, dec!(50000), Some("+256772123456")),
        )
        .await;
        assert!(Uuid::parse_str(&mtn_ref).is_ok());
        let mtn: MtnMomoCallback = serde_json::from_value(json!({
            "referenceId": mtn_ref,
            "status": "SUCCESSFUL",
            "financialTransactionId": "363440463"
        }))
        .unwrap();

        let (airtel_id, airtel_ref) = initiate(
            &engine,
            request(PaymentMethod::AirtelMoney, Currency::Rwf, dec!(20000), Some("0788123456")),
        )
        .await;
        assert!(airtel_ref.starts_with("AIR"));
        let airtel: AirtelCallback = serde_json::from_value(json!({
            "transaction": { "id": airtel_ref, "status_code": "TF", "message": "Insufficient funds" }
        }))
        .unwrap();

        let (paypal_id, order_id) = initiate(
            &engine,
            request(PaymentMethod::Paypal, Currency::Usd, dec!(50), None),
        )
        .await;
        assert_eq!(order_id.len(), 17);
        let paypal: PaypalWebhook = serde_json::from_value(json!({
            "event_type": "PAYMENT.CAPTURE.COMPLETED",
            "resource": {
                "id": "2GG279541U471931P",
                "supplementary_data": { "related_ids": { "order_id": order_id } }
            }
        }))
        .unwrap();

        let (card_id, session_id) = initiate(
            &engine,
            request(PaymentMethod::Visa, Currency::Usd, dec!(120), None),
        )
        .await;
        assert!(session_id.starts_with("cs_test_"));
        let card: CardWebhook = serde_json::from_value(json!({
            "type": "checkout.session.completed",
            "data": { "object": { "id": session_id, "payment_intent": "pi_123", "payment_status": "paid" } }
        }))
        .unwrap();

        let events = [
            mtn.into_event(),
            airtel.into_event(),
            paypal.into_event(),
            card.into_event(),
        ];
        for event in events {
            let outcome = reconciler.reconcile(event.unwrap()).await.unwrap();
            assert!(matches!(outcome, ReconcileOutcome::Applied(_)));
        }

        let mtn = engine.verify(mtn_id).await.unwrap();
        assert_eq!(mtn.status, PaymentStatus::Completed);
        assert_eq!(mtn.provider_transaction_id.as_deref(), Some("363440463"));

        let airtel = engine.verify(airtel_id).await.unwrap();
        assert_eq!(airtel.status, PaymentStatus::Failed);
        assert_eq!(airtel.failure_reason.as_deref(), Some("Insufficient funds"));

        let paypal = engine.verify(paypal_id).await.unwrap();
        assert_eq!(paypal.status, PaymentStatus::Completed);
        assert_eq!(paypal.provider_transaction_id.as_deref(), Some("2GG279541U471931P"));

        let card = engine.verify(card_id).await.unwrap();
        assert_eq!(card.status, PaymentStatus::Completed);
        assert_eq!(card.provider_transaction_id.as_deref(), Some("pi_123"));
    }

    #[tokio::test]
    async fn test_unpaid_checkout_settles_through_async_event() {
        let (engine, reconciler) = reconciler();
        let (id, session_id) = initiate(
            &engine,
            request(PaymentMethod::Visa, Currency::Usd, dec!(120), None),
        )
        .await;

        let completed: CardWebhook = serde_json::from_value(json!({
            "type": "checkout.session.completed",
            "data": { "object": { "id": &session_id, "payment_status": "unpaid" } }
        }))
        .unwrap();
        assert!(completed.into_event().is_none());
        assert_eq!(engine.verify(id).await.unwrap().status, PaymentStatus::PendingRedirect);

        let failed: CardWebhook = serde_json::from_value(json!({
            "type": "checkout.session.async_payment_failed",
            "data": { "object": { "id": &session_id } }
        }))
        .unwrap();
        let outcome = reconciler.reconcile(failed.into_event().unwrap()).await.unwrap();

        match outcome {
            ReconcileOutcome::Applied(payment) => {
                assert_eq!(payment.status, PaymentStatus::Failed);
                assert_eq!(payment.failure_reason.as_deref(), Some("Card payment failed"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_callback_racing_initiation_is_matched() {
        let ledger = Ledger::new();
        let engine = engine_on(ledger.clone());
        let reconciler = Arc::new(
            CallbackReconciler::new(engine.clone()).with_lookup_grace(5, Duration::from_millis(20)),
        );

        let request = request(PaymentMethod::Mpesa, Currency::Kes, dec!(2500), Some("0712345678"));
        let payment = Payment::new(&request, "user-1");
        let id = payment.id;
        ledger.insert(payment).await.unwrap();

        let pending = {
            let reconciler = reconciler.clone();
            tokio::spawn(async move {
                reconciler
                    .reconcile(event(ProviderFamily::Mpesa, "ws_CO_early", "NLJ7RT61SV"))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        ledger
            .update(id, |p| {
                p.apply_initiation(&InitiationResult::new(ProviderOutcome::Processing, "ws_CO_early", 60))
            })
            .await
            .unwrap();

        let outcome = pending.await.unwrap().unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Applied(ref p) if p.id == id));
        assert_eq!(engine.verify(id).await.unwrap().status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_unknown_reference_and_wrong_provider_unmatched() {
        let (engine, reconciler) = reconciler();
        let reconciler = reconciler.with_lookup_grace(2, Duration::from_millis(1));
        let (id, reference) = mpesa_payment(&engine).await;

        let unknown = reconciler
            .reconcile(event(ProviderFamily::Mpesa, "ws_CO_unknown", "X"))
            .await
            .unwrap();
        assert_eq!(unknown, ReconcileOutcome::Unmatched);

        let mismatched = reconciler
            .reconcile(event(ProviderFamily::Paypal, &reference, "X"))
            .await
            .unwrap();
        assert_eq!(mismatched, ReconcileOutcome::Unmatched);
        assert_eq!(engine.verify(id).await.unwrap().status, PaymentStatus::Processing);
    }

    #[tokio::test]
    async fn test_simulated_outcomes() {
        let (engine, reconciler) = reconciler();

        let (id, _) = mpesa_payment(&engine).await;
        let outcome = reconciler.simulate_completion(id).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Applied(ref p) if p.status == PaymentStatus::Completed));

        let (id, _) = mpesa_payment(&engine).await;
        let outcome = reconciler
            .simulate_failure(id, Some("Insufficient funds".to_string()))
            .await
            .unwrap();
        match outcome {
            ReconcileOutcome::Applied(payment) => {
                assert_eq!(payment.status, PaymentStatus::Failed);
                assert_eq!(payment.failure_reason.as_deref(), Some("Insufficient funds"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        assert!(matches!(
            reconciler.simulate_completion(id).await.unwrap(),
            ReconcileOutcome::Duplicate(_)
        ));
        assert!(matches!(
            reconciler.simulate_completion(Uuid::new_v4()).await,
            Err(PaymentError::NotFound(_))
        ));
    }
}
