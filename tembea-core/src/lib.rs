pub mod catalog;
pub mod normalize;
pub mod payment;
pub mod provider;

pub use catalog::{CapabilityCatalog, MethodCategory, MethodInfo};
pub use normalize::{normalize_phone, RateTable};
pub use payment::{
    ConfirmOutcome, Currency, InitiateRequest, Payment, PaymentMethod, PaymentStatus,
    ProviderFamily,
};
pub use provider::{InitiationResult, ProviderAdapter, ProviderOutcome};

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),
    #[error("Unsupported payment method: {0}")]
    UnsupportedMethod(String),
    #[error("Payment not found: {0}")]
    NotFound(Uuid),
    #[error("Cannot {action} payment in state {found}: expected {expected}")]
    InvalidTransition {
        action: String,
        expected: String,
        found: PaymentStatus,
    },
    #[error("Provider {provider} failed: {message}")]
    Provider { provider: String, message: String },
}

impl PaymentError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PaymentError::Validation(_) | PaymentError::MissingRequiredField(_)
        )
    }

    pub(crate) fn transition(action: &str, expected: &str, found: PaymentStatus) -> Self {
        PaymentError::InvalidTransition {
            action: action.to_string(),
            expected: expected.to_string(),
            found,
        }
    }
}

pub type PaymentResult<T> = Result<T, PaymentError>;
