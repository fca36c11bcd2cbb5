use async_trait::async_trait;

use crate::payment::{InitiateRequest, Payment};
use crate::PaymentResult;

/// Sub-state an adapter asks the lifecycle engine to apply after initiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    /// Push prompt sent; waiting for the payer to approve on their handset.
    Processing,
    /// Waiting for the payer to finish a hosted checkout.
    PendingRedirect,
    /// Charged synchronously against a stored card token.
    Charged {
        transaction_id: String,
        card_brand: String,
    },
}

#[derive(Debug, Clone)]
pub struct InitiationResult {
    pub outcome: ProviderOutcome,
    pub provider_reference: String,
    pub instructions: Option<String>,
    pub checkout_url: Option<String>,
    pub expires_in_seconds: u64,
    /// Normalized phone number, for mobile money.
    pub phone_number: Option<String>,
    /// Extra fields merged into the payment's metadata.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl InitiationResult {
    pub fn new(outcome: ProviderOutcome, provider_reference: &str, expires_in_seconds: u64) -> Self {
        Self {
            outcome,
            provider_reference: provider_reference.to_string(),
            instructions: None,
            checkout_url: None,
            expires_in_seconds,
            phone_number: None,
            metadata: serde_json::Map::new(),
        }
    }
}

/// One implementation per payment-method family. Adapters talk to their
/// provider gateway and describe the result; they never mutate the ledger.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Name used in logs and provider errors
    fn provider_name(&self) -> &'static str;

    /// Request checks that need no provider call. The engine runs these before
    /// a payment is created, so a rejected request leaves nothing behind.
    fn precheck(&self, _request: &InitiateRequest) -> PaymentResult<()> {
        Ok(())
    }

    /// Start collecting funds for a freshly created `Pending` payment
    async fn initiate(
        &self,
        payment: &Payment,
        request: &InitiateRequest,
    ) -> PaymentResult<InitiationResult>;
}
