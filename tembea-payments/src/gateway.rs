//! Provider gateway seams.
//!
//! Each adapter family talks to its upstream through one of these traits. The
//! `Simulated*` implementations return provider-shaped references without any
//! network traffic; production wiring swaps in HTTP clients.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tembea_core::{Currency, PaymentMethod, ProviderFamily};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Request rejected: {0}")]
    Rejected(String),
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct PushRequest {
    pub phone_number: String,
    pub amount: Decimal,
    pub currency: Currency,
    /// Our payment id, echoed back by providers that support it
    pub account_reference: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardCharge {
    pub charge_id: String,
    pub card_brand: String,
}

#[async_trait]
pub trait MobileMoneyGateway: Send + Sync {
    /// Send a PIN prompt to the payer's handset; returns the provider reference
    async fn request_push(&self, request: &PushRequest) -> Result<String, GatewayError>;
}

#[async_trait]
pub trait WalletGateway: Send + Sync {
    /// Create a checkout order; returns the provider order id
    async fn create_order(
        &self,
        amount: Decimal,
        currency: Currency,
        reference: &str,
    ) -> Result<String, GatewayError>;
}

#[async_trait]
pub trait CardGateway: Send + Sync {
    /// Create a hosted checkout session; returns the session id
    async fn create_checkout_session(
        &self,
        brand: PaymentMethod,
        amount: Decimal,
        currency: Currency,
        reference: &str,
    ) -> Result<String, GatewayError>;

    /// Charge a stored card token synchronously
    async fn charge(
        &self,
        token: &str,
        brand: PaymentMethod,
        amount: Decimal,
        currency: Currency,
        reference: &str,
    ) -> Result<CardCharge, GatewayError>;
}

fn short_id(len: usize) -> String {
    Uuid::new_v4().simple().to_string()[..len].to_uppercase()
}

// ============================================================================
// Simulated gateways
// ============================================================================

pub struct SimulatedMobileMoneyGateway {
    family: ProviderFamily,
}

impl SimulatedMobileMoneyGateway {
    pub fn new(family: ProviderFamily) -> Self {
        Self { family }
    }
}

#[async_trait]
impl MobileMoneyGateway for SimulatedMobileMoneyGateway {
    async fn request_push(&self, request: &PushRequest) -> Result<String, GatewayError> {
        tracing::debug!(
            "Simulated {} push for {} {} (account {})",
            self.family,
            request.currency,
            request.amount,
            request.account_reference
        );

        let reference = match self.family {
            ProviderFamily::Mpesa => format!(
                "ws_CO_{}{}",
                chrono::Utc::now().format("%d%m%Y%H%M%S"),
                short_id(6)
            ),
            ProviderFamily::AirtelMoney => format!("AIR{}", short_id(12)),
            // MTN MoMo correlates on the X-Reference-Id we generate
            _ => Uuid::new_v4().to_string(),
        };
        Ok(reference)
    }
}

#[derive(Default)]
pub struct SimulatedWalletGateway;

#[async_trait]
impl WalletGateway for SimulatedWalletGateway {
    async fn create_order(
        &self,
        amount: Decimal,
        currency: Currency,
        reference: &str,
    ) -> Result<String, GatewayError> {
        tracing::debug!("Simulated wallet order for {} {} ({})", currency, amount, reference);
        Ok(short_id(17))
    }
}

#[derive(Default)]
pub struct SimulatedCardGateway;

#[async_trait]
impl CardGateway for SimulatedCardGateway {
    async fn create_checkout_session(
        &self,
        brand: PaymentMethod,
        amount: Decimal,
        currency: Currency,
        reference: &str,
    ) -> Result<String, GatewayError> {
        tracing::debug!(
            "Simulated {} checkout session for {} {} ({})",
            brand,
            currency,
            amount,
            reference
        );
        Ok(format!("cs_test_{}", Uuid::new_v4().simple()))
    }

    async fn charge(
        &self,
        token: &str,
        brand: PaymentMethod,
        amount: Decimal,
        currency: Currency,
        reference: &str,
    ) -> Result<CardCharge, GatewayError> {
        // Test tokens mirror the usual processor conventions
        if token.contains("declined") {
            return Err(GatewayError::Rejected("Your card was declined".to_string()));
        }

        tracing::debug!("Simulated {} charge of {} {} ({})", brand, currency, amount, reference);
        Ok(CardCharge {
            charge_id: format!("ch_{}", Uuid::new_v4().simple()),
            card_brand: brand.as_str().to_string(),
        })
    }
}
