use async_trait::async_trait;
use std::sync::Arc;
use tembea_core::{
    InitiateRequest, InitiationResult, Payment, PaymentMethod, PaymentResult, ProviderAdapter,
    ProviderFamily, ProviderOutcome,
};
use tembea_shared::Masked;

use super::provider_error;
use crate::gateway::CardGateway;

/// Card payments for one brand: hosted checkout by default, direct charge
/// when the payer has a stored card token.
pub struct CardAdapter {
    brand: PaymentMethod,
    checkout_base_url: String,
    expiry_seconds: u64,
    gateway: Arc<dyn CardGateway>,
}

impl CardAdapter {
    pub fn new(
        brand: PaymentMethod,
        checkout_base_url: &str,
        expiry_seconds: u64,
        gateway: Arc<dyn CardGateway>,
    ) -> Self {
        Self {
            brand,
            checkout_base_url: checkout_base_url.trim_end_matches('/').to_string(),
            expiry_seconds,
            gateway,
        }
    }

    async fn charge(&self, payment: &Payment, token: &str) -> PaymentResult<InitiationResult> {
        tracing::info!(
            "Charging stored {} card {} for payment {}",
            self.brand,
            Masked(token),
            payment.id
        );

        let charge = self
            .gateway
            .charge(token, self.brand, payment.amount, payment.currency, &payment.id.to_string())
            .await
            .map_err(|e| provider_error(ProviderFamily::Card, e))?;

        Ok(InitiationResult::new(
            ProviderOutcome::Charged {
                transaction_id: charge.charge_id.clone(),
                card_brand: charge.card_brand,
            },
            &charge.charge_id,
            0,
        ))
    }

    async fn checkout(&self, payment: &Payment) -> PaymentResult<InitiationResult> {
        let session_id = self
            .gateway
            .create_checkout_session(self.brand, payment.amount, payment.currency, &payment.id.to_string())
            .await
            .map_err(|e| provider_error(ProviderFamily::Card, e))?;

        tracing::info!("Created {} checkout session {} for payment {}", self.brand, session_id, payment.id);

        let mut result =
            InitiationResult::new(ProviderOutcome::PendingRedirect, &session_id, self.expiry_seconds);
        result.checkout_url = Some(format!("{}/{}", self.checkout_base_url, session_id));
        Ok(result)
    }
}

#[async_trait]
impl ProviderAdapter for CardAdapter {
    fn provider_name(&self) -> &'static str {
        "card"
    }

    async fn initiate(
        &self,
        payment: &Payment,
        request: &InitiateRequest,
    ) -> PaymentResult<InitiationResult> {
        match request.card_token() {
            Some(token) => self.charge(payment, token).await,
            None => self.checkout(payment).await,
        }
    }
}
