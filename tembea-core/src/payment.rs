use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::provider::{InitiationResult, ProviderOutcome};
use crate::{PaymentError, PaymentResult};

// ============================================================================
// Closed enumerations
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Kes,
    Ugx,
    Rwf,
    Cdf,
}

impl Currency {
    pub const ALL: [Currency; 5] = [
        Currency::Usd,
        Currency::Kes,
        Currency::Ugx,
        Currency::Rwf,
        Currency::Cdf,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Kes => "KES",
            Currency::Ugx => "UGX",
            Currency::Rwf => "RWF",
            Currency::Cdf => "CDF",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::ALL
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PaymentError::Validation(format!("Unknown currency: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Mpesa,
    MtnMomo,
    AirtelMoney,
    Paypal,
    Visa,
    Mastercard,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 6] = [
        PaymentMethod::Mpesa,
        PaymentMethod::MtnMomo,
        PaymentMethod::AirtelMoney,
        PaymentMethod::Paypal,
        PaymentMethod::Visa,
        PaymentMethod::Mastercard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Mpesa => "mpesa",
            PaymentMethod::MtnMomo => "mtn_momo",
            PaymentMethod::AirtelMoney => "airtel_money",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::Visa => "visa",
            PaymentMethod::Mastercard => "mastercard",
        }
    }

    pub fn is_mobile_money(&self) -> bool {
        matches!(
            self,
            PaymentMethod::Mpesa | PaymentMethod::MtnMomo | PaymentMethod::AirtelMoney
        )
    }

    /// The provider that sends callbacks for this method.
    pub fn family(&self) -> ProviderFamily {
        match self {
            PaymentMethod::Mpesa => ProviderFamily::Mpesa,
            PaymentMethod::MtnMomo => ProviderFamily::MtnMomo,
            PaymentMethod::AirtelMoney => ProviderFamily::AirtelMoney,
            PaymentMethod::Paypal => ProviderFamily::Paypal,
            PaymentMethod::Visa | PaymentMethod::Mastercard => ProviderFamily::Card,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PaymentError::UnsupportedMethod(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFamily {
    Mpesa,
    MtnMomo,
    AirtelMoney,
    Paypal,
    Card,
}

impl fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderFamily::Mpesa => "mpesa",
            ProviderFamily::MtnMomo => "mtn_momo",
            ProviderFamily::AirtelMoney => "airtel_money",
            ProviderFamily::Paypal => "paypal",
            ProviderFamily::Card => "card",
        };
        f.write_str(name)
    }
}

/// Payment status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    PendingRedirect,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::PendingRedirect => "PENDING_REDIRECT",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    /// Waiting on the payer (PIN prompt or redirect checkout).
    pub fn is_awaiting_confirmation(&self) -> bool {
        matches!(self, PaymentStatus::Processing | PaymentStatus::PendingRedirect)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed | PaymentStatus::Failed | PaymentStatus::Refunded
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Requests and outcomes
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateRequest {
    pub booking_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub method: PaymentMethod,
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Stored card token; when present the card adapter charges directly.
    #[serde(default)]
    pub card_token: Option<String>,
    /// ISO-3166 alpha-2 country the payer is paying from, if known.
    #[serde(default)]
    pub country: Option<String>,
}

impl InitiateRequest {
    /// Field-level checks that do not depend on the catalog or adapters.
    pub fn validate(&self) -> PaymentResult<()> {
        if self.booking_id.trim().is_empty() {
            return Err(PaymentError::Validation(
                "booking_id must not be empty".to_string(),
            ));
        }

        if self.amount <= Decimal::ZERO {
            return Err(PaymentError::Validation(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }

        if self.method.is_mobile_money() && self.phone().is_none() {
            return Err(PaymentError::MissingRequiredField("phone_number".to_string()));
        }

        Ok(())
    }

    /// Phone number with blank input treated as absent.
    pub fn phone(&self) -> Option<&str> {
        self.phone_number
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    pub fn card_token(&self) -> Option<&str> {
        self.card_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Terminal signal from a provider callback, a verify poll or a simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConfirmOutcome {
    Success {
        provider_transaction_id: Option<String>,
    },
    Failure {
        reason: Option<String>,
    },
}

const DEFAULT_FAILURE_REASON: &str = "Payment declined by provider";
pub const EXPIRED_REASON: &str = "expired";

// ============================================================================
// Payment
// ============================================================================

/// A payment intent and its settlement record. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: String,
    pub user_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub phone_number: Option<String>,
    pub provider_reference: Option<String>,
    pub provider_transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub card_brand: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn new(request: &InitiateRequest, user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            booking_id: request.booking_id.trim().to_string(),
            user_id: user_id.to_string(),
            amount: request.amount,
            currency: request.currency,
            method: request.method,
            status: PaymentStatus::Pending,
            phone_number: request.phone().map(str::to_string),
            provider_reference: None,
            provider_transaction_id: None,
            failure_reason: None,
            card_brand: None,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
            completed_at: None,
            expires_at: None,
        }
    }

    /// Transition: Pending → Processing | PendingRedirect | Completed (direct charge)
    pub fn apply_initiation(&mut self, result: &InitiationResult) -> PaymentResult<()> {
        if self.status != PaymentStatus::Pending {
            return Err(PaymentError::transition("initiate", "PENDING", self.status));
        }

        let now = Utc::now();
        let expires_at = match result.outcome {
            ProviderOutcome::Processing | ProviderOutcome::PendingRedirect => {
                Some(deadline(now, result.expires_in_seconds)?)
            }
            ProviderOutcome::Charged { .. } => None,
        };

        self.provider_reference = Some(result.provider_reference.clone());
        if let Some(phone) = &result.phone_number {
            self.phone_number = Some(phone.clone());
        }
        for (key, value) in &result.metadata {
            self.set_metadata(key, value.clone());
        }

        match &result.outcome {
            ProviderOutcome::Processing => {
                self.status = PaymentStatus::Processing;
                self.expires_at = expires_at;
            }
            ProviderOutcome::PendingRedirect => {
                self.status = PaymentStatus::PendingRedirect;
                self.expires_at = expires_at;
            }
            ProviderOutcome::Charged {
                transaction_id,
                card_brand,
            } => {
                self.status = PaymentStatus::Completed;
                self.provider_transaction_id = Some(transaction_id.clone());
                self.card_brand = Some(card_brand.clone());
                self.completed_at = Some(now);
            }
        }

        self.updated_at = now;
        Ok(())
    }

    /// Transition: Pending → Failed when the provider rejected the initiation
    pub fn fail_initiation(&mut self, reason: &str) -> PaymentResult<()> {
        if self.status != PaymentStatus::Pending {
            return Err(PaymentError::transition("fail", "PENDING", self.status));
        }

        self.status = PaymentStatus::Failed;
        self.failure_reason = Some(reason.to_string());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transition: Processing | PendingRedirect → Completed | Failed
    pub fn confirm(&mut self, outcome: &ConfirmOutcome) -> PaymentResult<()> {
        if !self.status.is_awaiting_confirmation() {
            return Err(PaymentError::transition(
                "confirm",
                "PROCESSING or PENDING_REDIRECT",
                self.status,
            ));
        }

        let now = Utc::now();
        match outcome {
            ConfirmOutcome::Success {
                provider_transaction_id,
            } => {
                let txn = provider_transaction_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("txn_{}", Uuid::new_v4().simple()));
                self.status = PaymentStatus::Completed;
                self.provider_transaction_id = Some(txn);
                self.completed_at = Some(now);
            }
            ConfirmOutcome::Failure { reason } => {
                let reason = reason
                    .as_deref()
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .unwrap_or(DEFAULT_FAILURE_REASON);
                self.status = PaymentStatus::Failed;
                self.failure_reason = Some(reason.to_string());
            }
        }

        self.updated_at = now;
        Ok(())
    }

    /// Transition: Completed → Refunded. The completion record is kept.
    pub fn refund(&mut self, reason: &str) -> PaymentResult<()> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(PaymentError::Validation(
                "refund reason must not be empty".to_string(),
            ));
        }

        if self.status != PaymentStatus::Completed {
            return Err(PaymentError::transition("refund", "COMPLETED", self.status));
        }

        let now = Utc::now();
        self.status = PaymentStatus::Refunded;
        self.set_metadata("refund_reason", serde_json::json!(reason));
        self.set_metadata("refunded_at", serde_json::json!(now.to_rfc3339()));
        self.updated_at = now;
        Ok(())
    }

    /// Transition: Processing | PendingRedirect → Failed once the advised window has passed
    pub fn expire(&mut self, now: DateTime<Utc>) -> PaymentResult<()> {
        if !self.is_expired(now) {
            return Err(PaymentError::transition(
                "expire",
                "PROCESSING or PENDING_REDIRECT past expires_at",
                self.status,
            ));
        }

        self.confirm(&ConfirmOutcome::Failure {
            reason: Some(EXPIRED_REASON.to_string()),
        })
    }

    /// Awaiting the payer past the advised window.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status.is_awaiting_confirmation()
            && self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    fn set_metadata(&mut self, key: &str, value: serde_json::Value) {
        if !self.metadata.is_object() {
            self.metadata = serde_json::json!({});
        }
        if let Some(map) = self.metadata.as_object_mut() {
            map.insert(key.to_string(), value);
        }
    }
}

/// `now` plus an expiry window, rejecting windows chrono cannot represent.
fn deadline(now: DateTime<Utc>, seconds: u64) -> PaymentResult<DateTime<Utc>> {
    i64::try_from(seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|window| now.checked_add_signed(window))
        .ok_or_else(|| {
            PaymentError::Validation(format!("expiry of {} seconds is out of range", seconds))
        })
}
