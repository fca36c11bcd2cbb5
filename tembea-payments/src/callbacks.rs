//! Provider callback payloads.
//!
//! Each provider posts its own JSON shape. They are all reduced to a
//! [`CallbackEvent`]: which provider sent it, the reference we stored at
//! initiation, and the terminal outcome. Events that carry no outcome
//! (intermediate notifications) convert to `None`.

use serde::Deserialize;
use serde_json::Value;
use tembea_core::{ConfirmOutcome, ProviderFamily};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
    pub family: ProviderFamily,
    /// Matches `Payment::provider_reference`
    pub correlation_key: String,
    pub outcome: ConfirmOutcome,
}

impl CallbackEvent {
    fn success(family: ProviderFamily, key: &str, transaction_id: Option<String>) -> Self {
        Self {
            family,
            correlation_key: key.to_string(),
            outcome: ConfirmOutcome::Success {
                provider_transaction_id: transaction_id,
            },
        }
    }

    fn failure(family: ProviderFamily, key: &str, reason: Option<String>) -> Self {
        Self {
            family,
            correlation_key: key.to_string(),
            outcome: ConfirmOutcome::Failure { reason },
        }
    }
}

// ============================================================================
// M-Pesa STK push result
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct MpesaCallback {
    #[serde(rename = "Body")]
    pub body: MpesaBody,
}

#[derive(Debug, Deserialize)]
pub struct MpesaBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    pub result_code: i64,
    #[serde(default)]
    pub result_desc: Option<String>,
    #[serde(default)]
    pub callback_metadata: Option<StkMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct StkMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<StkItem>,
}

#[derive(Debug, Deserialize)]
pub struct StkItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<Value>,
}

impl MpesaCallback {
    pub fn into_event(self) -> Option<CallbackEvent> {
        let stk = self.body.stk_callback;

        if stk.result_code == 0 {
            let receipt = stk
                .callback_metadata
                .into_iter()
                .flat_map(|m| m.items)
                .find(|item| item.name == "MpesaReceiptNumber")
                .and_then(|item| item.value)
                .and_then(|v| value_to_string(&v));
            Some(CallbackEvent::success(ProviderFamily::Mpesa, &stk.checkout_request_id, receipt))
        } else {
            Some(CallbackEvent::failure(
                ProviderFamily::Mpesa,
                &stk.checkout_request_id,
                stk.result_desc,
            ))
        }
    }
}

// ============================================================================
// MTN MoMo request-to-pay
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MtnMomoCallback {
    pub reference_id: String,
    pub status: String,
    #[serde(default)]
    pub financial_transaction_id: Option<String>,
    /// A string or an object with `code` and `message`, depending on API version
    #[serde(default)]
    pub reason: Option<Value>,
}

impl MtnMomoCallback {
    pub fn into_event(self) -> Option<CallbackEvent> {
        match self.status.to_ascii_uppercase().as_str() {
            "SUCCESSFUL" => Some(CallbackEvent::success(
                ProviderFamily::MtnMomo,
                &self.reference_id,
                self.financial_transaction_id,
            )),
            "FAILED" | "REJECTED" | "TIMEOUT" => {
                let reason = self
                    .reason
                    .as_ref()
                    .and_then(|r| r.get("message").and_then(value_to_string).or_else(|| value_to_string(r)))
                    .or_else(|| Some(format!("MTN MoMo status {}", self.status)));
                Some(CallbackEvent::failure(ProviderFamily::MtnMomo, &self.reference_id, reason))
            }
            // PENDING and anything unknown
            _ => None,
        }
    }
}

// ============================================================================
// Airtel Money collection
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AirtelCallback {
    pub transaction: AirtelTransaction,
}

#[derive(Debug, Deserialize)]
pub struct AirtelTransaction {
    pub id: String,
    pub status_code: String,
    #[serde(default)]
    pub airtel_money_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl AirtelCallback {
    pub fn into_event(self) -> Option<CallbackEvent> {
        let tx = self.transaction;
        match tx.status_code.as_str() {
            "TS" => Some(CallbackEvent::success(ProviderFamily::AirtelMoney, &tx.id, tx.airtel_money_id)),
            "TF" => Some(CallbackEvent::failure(ProviderFamily::AirtelMoney, &tx.id, tx.message)),
            _ => None,
        }
    }
}

// ============================================================================
// PayPal webhooks
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PaypalWebhook {
    #[serde(default)]
    pub id: Option<String>,
    pub event_type: String,
    pub resource: PaypalResource,
}

#[derive(Debug, Deserialize)]
pub struct PaypalResource {
    pub id: String,
    #[serde(default)]
    pub supplementary_data: Option<Value>,
}

impl PaypalResource {
    /// Capture events reference the order through supplementary data.
    fn order_id(&self) -> Option<String> {
        self.supplementary_data
            .as_ref()?
            .pointer("/related_ids/order_id")
            .and_then(value_to_string)
    }
}

impl PaypalWebhook {
    pub fn into_event(self) -> Option<CallbackEvent> {
        let resource = self.resource;
        match self.event_type.as_str() {
            "CHECKOUT.ORDER.COMPLETED" => {
                Some(CallbackEvent::success(ProviderFamily::Paypal, &resource.id, None))
            }
            "PAYMENT.CAPTURE.COMPLETED" => {
                let order_id = resource.order_id()?;
                Some(CallbackEvent::success(ProviderFamily::Paypal, &order_id, Some(resource.id)))
            }
            "PAYMENT.CAPTURE.DENIED" => {
                let order_id = resource.order_id()?;
                Some(CallbackEvent::failure(
                    ProviderFamily::Paypal,
                    &order_id,
                    Some("Capture denied".to_string()),
                ))
            }
            "CHECKOUT.ORDER.VOIDED" => Some(CallbackEvent::failure(
                ProviderFamily::Paypal,
                &resource.id,
                Some("Order voided".to_string()),
            )),
            _ => None,
        }
    }
}

// ============================================================================
// Hosted card checkout
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CardWebhook {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: CardWebhookData,
}

#[derive(Debug, Deserialize)]
pub struct CardWebhookData {
    pub object: CheckoutSessionObject,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    /// `paid`, `unpaid` or `no_payment_required`
    #[serde(default)]
    pub payment_status: Option<String>,
}

impl CheckoutSessionObject {
    fn is_settled(&self) -> bool {
        matches!(
            self.payment_status.as_deref(),
            Some("paid") | Some("no_payment_required")
        )
    }
}

impl CardWebhook {
    pub fn into_event(self) -> Option<CallbackEvent> {
        let session = self.data.object;
        match self.type_.as_str() {
            // Delayed methods complete unpaid and settle through an async event
            "checkout.session.completed" if !session.is_settled() => None,
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => Some(
                CallbackEvent::success(ProviderFamily::Card, &session.id, session.payment_intent),
            ),
            "checkout.session.async_payment_failed" => Some(CallbackEvent::failure(
                ProviderFamily::Card,
                &session.id,
                Some("Card payment failed".to_string()),
            )),
            "checkout.session.expired" => Some(CallbackEvent::failure(
                ProviderFamily::Card,
                &session.id,
                Some("Checkout session expired".to_string()),
            )),
            _ => None,
        }
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
