use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tembea_core::{
    InitiateRequest, InitiationResult, Payment, PaymentResult, ProviderAdapter, ProviderFamily,
    ProviderOutcome, RateTable,
};

use super::provider_error;
use crate::gateway::WalletGateway;

/// PayPal-style redirect checkout. Orders are always created in the rate
/// table's base currency.
pub struct WalletAdapter {
    base_url: String,
    expiry_seconds: u64,
    rates: Arc<RateTable>,
    max_rate_age: Duration,
    gateway: Arc<dyn WalletGateway>,
}

impl WalletAdapter {
    pub fn new(
        base_url: &str,
        expiry_seconds: u64,
        rates: Arc<RateTable>,
        max_rate_age: Duration,
        gateway: Arc<dyn WalletGateway>,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            expiry_seconds,
            rates,
            max_rate_age,
            gateway,
        }
    }

    fn checkout_url(&self, order_id: &str) -> String {
        format!("{}/checkoutnow?token={}", self.base_url, order_id)
    }
}

#[async_trait]
impl ProviderAdapter for WalletAdapter {
    fn provider_name(&self) -> &'static str {
        "paypal"
    }

    fn precheck(&self, request: &InitiateRequest) -> PaymentResult<()> {
        self.rates
            .convert(request.amount, request.currency, self.rates.base())
            .map(|_| ())
    }

    async fn initiate(
        &self,
        payment: &Payment,
        _request: &InitiateRequest,
    ) -> PaymentResult<InitiationResult> {
        if self.rates.is_stale(Utc::now(), self.max_rate_age) {
            tracing::warn!(
                "Exchange rates as of {} are older than {} hours",
                self.rates.as_of(),
                self.max_rate_age.num_hours()
            );
        }

        let settlement_currency = self.rates.base();
        let settlement_amount =
            self.rates
                .convert(payment.amount, payment.currency, settlement_currency)?;

        let order_id = self
            .gateway
            .create_order(settlement_amount, settlement_currency, &payment.id.to_string())
            .await
            .map_err(|e| provider_error(ProviderFamily::Paypal, e))?;

        tracing::info!(
            "Created wallet order {} for payment {} ({} {} → {} {})",
            order_id,
            payment.id,
            payment.currency,
            payment.amount,
            settlement_currency,
            settlement_amount
        );

        let mut result =
            InitiationResult::new(ProviderOutcome::PendingRedirect, &order_id, self.expiry_seconds);
        result.checkout_url = Some(self.checkout_url(&order_id));
        result.metadata.insert(
            "settlement_amount".to_string(),
            serde_json::json!(settlement_amount.to_string()),
        );
        result.metadata.insert(
            "settlement_currency".to_string(),
            serde_json::json!(settlement_currency.code()),
        );
        result.metadata.insert(
            "rates_as_of".to_string(),
            serde_json::json!(self.rates.as_of().to_rfc3339()),
        );
        Ok(result)
    }
}
