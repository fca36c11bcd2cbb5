use chrono::{DateTime, Utc};
use serde::Serialize;
use tembea_core::{
    CapabilityCatalog, ConfirmOutcome, InitiateRequest, Payment, PaymentError, PaymentResult,
    PaymentStatus,
};
use tembea_store::Ledger;
use uuid::Uuid;

use crate::adapters::AdapterRegistry;

/// What the payer's client needs to continue the flow.
#[derive(Debug, Clone, Serialize)]
pub struct InitiationResponse {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    pub provider_reference: Option<String>,
    pub instructions: Option<String>,
    pub checkout_url: Option<String>,
    pub expires_in_seconds: u64,
}

/// Owns every payment state transition.
///
/// Transitions run inside [`Ledger::update`], so each check-and-set is atomic
/// per payment. Provider calls happen between two ledger writes and never
/// while the ledger lock is held.
pub struct LifecycleEngine {
    ledger: Ledger,
    adapters: AdapterRegistry,
    catalog: CapabilityCatalog,
}

impl LifecycleEngine {
    pub fn new(ledger: Ledger, adapters: AdapterRegistry, catalog: CapabilityCatalog) -> Self {
        Self {
            ledger,
            adapters,
            catalog,
        }
    }

    pub fn catalog(&self) -> &CapabilityCatalog {
        &self.catalog
    }

    /// Create a payment and hand it to the method's provider.
    ///
    /// Nothing is persisted until the request has passed validation, the
    /// country check, adapter lookup and the adapter's own prechecks. Once the
    /// record exists it is never removed: a later error fails it and is
    /// returned to the caller.
    pub async fn initiate(
        &self,
        request: InitiateRequest,
        user_id: &str,
    ) -> PaymentResult<InitiationResponse> {
        request.validate()?;

        if let Some(country) = request.country.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            if !self.catalog.is_enabled(country, request.method) {
                return Err(PaymentError::UnsupportedMethod(format!(
                    "{} is not available in {}",
                    request.method,
                    country.to_ascii_uppercase()
                )));
            }
        }

        let adapter = self.adapters.get(request.method)?;
        adapter.precheck(&request)?;

        let payment = Payment::new(&request, user_id);
        let payment_id = payment.id;
        self.ledger.insert(payment.clone()).await?;

        tracing::info!(
            "Payment {} created for booking {} ({} {} via {})",
            payment_id,
            payment.booking_id,
            payment.currency,
            payment.amount,
            payment.method
        );

        let result = match adapter.initiate(&payment, &request).await {
            Ok(result) => result,
            Err(e) => return Err(self.fail_initiation(payment_id, e).await),
        };

        let updated = match self
            .ledger
            .update(payment_id, |p| p.apply_initiation(&result))
            .await
        {
            Ok(updated) => updated,
            Err(e) => return Err(self.fail_initiation(payment_id, e).await),
        };

        tracing::info!(
            "Payment {} → {} (provider {}, reference {})",
            payment_id,
            updated.status,
            adapter.provider_name(),
            result.provider_reference
        );

        Ok(InitiationResponse {
            payment_id,
            status: updated.status,
            provider_reference: updated.provider_reference,
            instructions: result.instructions,
            checkout_url: result.checkout_url,
            expires_in_seconds: result.expires_in_seconds,
        })
    }

    /// Move a payment that could not be initiated to `Failed` and hand the
    /// original error back.
    async fn fail_initiation(&self, payment_id: Uuid, error: PaymentError) -> PaymentError {
        let reason = match &error {
            PaymentError::Provider { message, .. } => message.clone(),
            other => other.to_string(),
        };

        if let Err(e) = self
            .ledger
            .update(payment_id, |p| p.fail_initiation(&reason))
            .await
        {
            tracing::error!("Could not fail payment {}: {}", payment_id, e);
        }
        tracing::warn!("Payment {} failed at initiation: {}", payment_id, reason);
        error
    }

    /// Apply a terminal provider signal. Strict: a payment that is not
    /// awaiting confirmation yields `InvalidTransition`.
    pub async fn confirm(&self, id: Uuid, outcome: &ConfirmOutcome) -> PaymentResult<Payment> {
        let payment = self.ledger.update(id, |p| p.confirm(outcome)).await?;

        match &payment.status {
            PaymentStatus::Completed => tracing::info!(
                "Payment {} completed (transaction {})",
                id,
                payment.provider_transaction_id.as_deref().unwrap_or("-")
            ),
            status => tracing::info!(
                "Payment {} → {}: {}",
                id,
                status,
                payment.failure_reason.as_deref().unwrap_or("-")
            ),
        }
        Ok(payment)
    }

    pub async fn verify(&self, id: Uuid) -> PaymentResult<Payment> {
        self.ledger.get(id).await.ok_or(PaymentError::NotFound(id))
    }

    pub async fn refund(&self, id: Uuid, reason: &str) -> PaymentResult<Payment> {
        let payment = self.ledger.update(id, |p| p.refund(reason)).await?;
        tracing::info!("Payment {} refunded: {}", id, reason.trim());
        Ok(payment)
    }

    pub async fn get(&self, id: Uuid) -> Option<Payment> {
        self.ledger.get(id).await
    }

    pub async fn list_by_booking(&self, booking_id: &str) -> Vec<Payment> {
        self.ledger.list_by_booking(booking_id).await
    }

    pub async fn list_by_user(&self, user_id: &str) -> Vec<Payment> {
        self.ledger.list_by_user(user_id).await
    }

    pub async fn find_by_reference(&self, reference: &str) -> Option<Payment> {
        self.ledger.find_by_reference(reference).await
    }

    /// Fail every payment still awaiting the payer after its window closed.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Vec<Payment> {
        let mut expired = Vec::new();

        for id in self.ledger.expired_ids(now).await {
            match self.ledger.update(id, |p| p.expire(now)).await {
                Ok(payment) => {
                    tracing::info!("Payment {} expired after {:?}", id, payment.expires_at);
                    expired.push(payment);
                }
                // A callback landed between the scan and the update
                Err(e) => tracing::debug!("Skipping expiry of {}: {}", id, e),
            }
        }

        expired
    }
}
