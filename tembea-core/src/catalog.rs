use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::payment::PaymentMethod;

/// Offered when the payer's country is unknown or has no table entry.
pub const DEFAULT_METHODS: [PaymentMethod; 3] = [
    PaymentMethod::Paypal,
    PaymentMethod::Visa,
    PaymentMethod::Mastercard,
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MethodCategory {
    MobileMoney,
    Wallet,
    Card,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MethodInfo {
    pub method: PaymentMethod,
    pub name: String,
    pub description: String,
    pub category: MethodCategory,
    /// Request fields the payer must supply for this method
    pub required_inputs: Vec<String>,
}

/// Country → ordered payment methods. Order is display priority.
#[derive(Debug, Clone)]
pub struct CapabilityCatalog {
    countries: HashMap<String, Vec<PaymentMethod>>,
}

impl CapabilityCatalog {
    pub fn new(countries: HashMap<String, Vec<PaymentMethod>>) -> Self {
        let countries = countries
            .into_iter()
            .map(|(code, methods)| (code.trim().to_ascii_uppercase(), methods))
            .collect();
        Self { countries }
    }

    pub fn methods_for_country(&self, country: Option<&str>) -> Vec<PaymentMethod> {
        country
            .map(|c| c.trim().to_ascii_uppercase())
            .and_then(|c| self.countries.get(&c))
            .cloned()
            .unwrap_or_else(|| DEFAULT_METHODS.to_vec())
    }

    pub fn is_enabled(&self, country: &str, method: PaymentMethod) -> bool {
        self.methods_for_country(Some(country)).contains(&method)
    }

    pub fn info_for_method(method: PaymentMethod) -> MethodInfo {
        let (name, description, category) = match method {
            PaymentMethod::Mpesa => (
                "M-Pesa",
                "Pay with Safaricom M-Pesa. You will receive a prompt on your phone.",
                MethodCategory::MobileMoney,
            ),
            PaymentMethod::MtnMomo => (
                "MTN Mobile Money",
                "Pay with MTN MoMo. Approve the request on your phone.",
                MethodCategory::MobileMoney,
            ),
            PaymentMethod::AirtelMoney => (
                "Airtel Money",
                "Pay with Airtel Money. Enter your PIN when prompted.",
                MethodCategory::MobileMoney,
            ),
            PaymentMethod::Paypal => (
                "PayPal",
                "Pay securely with your PayPal account.",
                MethodCategory::Wallet,
            ),
            PaymentMethod::Visa => (
                "Visa",
                "Pay with your Visa credit or debit card.",
                MethodCategory::Card,
            ),
            PaymentMethod::Mastercard => (
                "Mastercard",
                "Pay with your Mastercard credit or debit card.",
                MethodCategory::Card,
            ),
        };

        let required_inputs = if method.is_mobile_money() {
            vec!["phone_number".to_string()]
        } else {
            Vec::new()
        };

        MethodInfo {
            method,
            name: name.to_string(),
            description: description.to_string(),
            category,
            required_inputs,
        }
    }
}

impl Default for CapabilityCatalog {
    fn default() -> Self {
        use PaymentMethod::*;

        let mut countries = HashMap::new();
        countries.insert("KE".to_string(), vec![Mpesa, Visa, Mastercard, Paypal]);
        countries.insert("UG".to_string(), vec![MtnMomo, Visa, Mastercard, Paypal]);
        countries.insert("RW".to_string(), vec![AirtelMoney, Visa, Mastercard, Paypal]);
        countries.insert("CD".to_string(), vec![Visa, Mastercard, Paypal]);
        Self::new(countries)
    }
}
