use async_trait::async_trait;
use std::sync::Arc;
use tembea_core::{
    normalize_phone, InitiateRequest, InitiationResult, Payment, PaymentError, PaymentMethod,
    PaymentResult, ProviderAdapter, ProviderOutcome,
};
use tembea_shared::Masked;

use super::provider_error;
use crate::gateway::{MobileMoneyGateway, PushRequest};

/// What distinguishes one mobile-money rail from another.
#[derive(Debug, Clone)]
pub struct MobileMoneyProfile {
    pub method: PaymentMethod,
    pub provider_name: &'static str,
    pub calling_code: &'static str,
    pub expiry_seconds: u64,
}

impl MobileMoneyProfile {
    /// Safaricom M-Pesa STK push, Kenya
    pub fn mpesa(expiry_seconds: u64) -> Self {
        Self {
            method: PaymentMethod::Mpesa,
            provider_name: "mpesa",
            calling_code: "254",
            expiry_seconds,
        }
    }

    /// MTN MoMo request-to-pay, Uganda
    pub fn mtn_momo(expiry_seconds: u64) -> Self {
        Self {
            method: PaymentMethod::MtnMomo,
            provider_name: "mtn_momo",
            calling_code: "256",
            expiry_seconds,
        }
    }

    /// Airtel Money USSD push, Rwanda
    pub fn airtel_money(expiry_seconds: u64) -> Self {
        Self {
            method: PaymentMethod::AirtelMoney,
            provider_name: "airtel_money",
            calling_code: "250",
            expiry_seconds,
        }
    }

    fn instructions(&self, merchant: &str, payment: &Payment, phone: &str) -> String {
        let amount = format!("{} {}", payment.currency, payment.amount);
        match self.method {
            PaymentMethod::Mpesa => format!(
                "An M-Pesa request for {} has been sent to {}. Enter your M-Pesa PIN to pay {} within {} seconds.",
                amount, phone, merchant, self.expiry_seconds
            ),
            PaymentMethod::MtnMomo => format!(
                "Approve the MTN MoMo request for {} sent to {}. If no prompt appears, dial *165# and check approvals. The request expires in {} seconds.",
                amount, phone, self.expiry_seconds
            ),
            _ => format!(
                "Enter your Airtel Money PIN on {} to pay {} to {}. The request expires in {} seconds.",
                phone, amount, merchant, self.expiry_seconds
            ),
        }
    }
}

pub struct MobileMoneyAdapter {
    profile: MobileMoneyProfile,
    merchant_name: String,
    gateway: Arc<dyn MobileMoneyGateway>,
}

impl MobileMoneyAdapter {
    pub fn new(
        profile: MobileMoneyProfile,
        merchant_name: &str,
        gateway: Arc<dyn MobileMoneyGateway>,
    ) -> Self {
        Self {
            profile,
            merchant_name: merchant_name.to_string(),
            gateway,
        }
    }

    fn payer_phone(&self, request: &InitiateRequest) -> PaymentResult<String> {
        let raw = request
            .phone()
            .ok_or_else(|| PaymentError::MissingRequiredField("phone_number".to_string()))?;
        normalize_phone(raw, self.profile.calling_code)
    }
}

#[async_trait]
impl ProviderAdapter for MobileMoneyAdapter {
    fn provider_name(&self) -> &'static str {
        self.profile.provider_name
    }

    fn precheck(&self, request: &InitiateRequest) -> PaymentResult<()> {
        self.payer_phone(request).map(|_| ())
    }

    async fn initiate(
        &self,
        payment: &Payment,
        request: &InitiateRequest,
    ) -> PaymentResult<InitiationResult> {
        let phone = self.payer_phone(request)?;

        tracing::info!(
            "Requesting {} push for payment {} to {}",
            self.profile.provider_name,
            payment.id,
            Masked(&phone)
        );

        let push = PushRequest {
            phone_number: phone.clone(),
            amount: payment.amount,
            currency: payment.currency,
            account_reference: payment.id.to_string(),
            description: format!("Booking {}", payment.booking_id),
        };
        let reference = self
            .gateway
            .request_push(&push)
            .await
            .map_err(|e| provider_error(self.profile.method.family(), e))?;

        let mut result =
            InitiationResult::new(ProviderOutcome::Processing, &reference, self.profile.expiry_seconds);
        result.instructions = Some(self.profile.instructions(&self.merchant_name, payment, &phone));
        result.phone_number = Some(phone);
        Ok(result)
    }
}
