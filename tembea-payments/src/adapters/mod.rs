pub mod card;
pub mod mobile_money;
pub mod wallet;

pub use card::CardAdapter;
pub use mobile_money::{MobileMoneyAdapter, MobileMoneyProfile};
pub use wallet::WalletAdapter;

use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tembea_core::{PaymentError, PaymentMethod, PaymentResult, ProviderAdapter, ProviderFamily, RateTable};
use tembea_store::app_config::ProvidersConfig;

use crate::gateway::{
    GatewayError, SimulatedCardGateway, SimulatedMobileMoneyGateway, SimulatedWalletGateway,
};

/// Maps each payment method to the adapter that runs its flow.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<PaymentMethod, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, method: PaymentMethod, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(method, adapter);
        self
    }

    pub fn get(&self, method: PaymentMethod) -> PaymentResult<Arc<dyn ProviderAdapter>> {
        self.adapters
            .get(&method)
            .cloned()
            .ok_or_else(|| PaymentError::UnsupportedMethod(format!("{} has no adapter", method)))
    }

    pub fn methods(&self) -> Vec<PaymentMethod> {
        PaymentMethod::ALL
            .into_iter()
            .filter(|m| self.adapters.contains_key(m))
            .collect()
    }

    /// All six methods wired to in-process simulated gateways.
    pub fn simulated(
        providers: &ProvidersConfig,
        rates: Arc<RateTable>,
        max_rate_age: Duration,
    ) -> Self {
        let mm = &providers.mobile_money;
        let mobile_money = |profile: MobileMoneyProfile| -> Arc<dyn ProviderAdapter> {
            let gateway = Arc::new(SimulatedMobileMoneyGateway::new(profile.method.family()));
            Arc::new(MobileMoneyAdapter::new(profile, &mm.merchant_name, gateway))
        };

        let wallet = WalletAdapter::new(
            providers.wallet.base_url(providers.environment),
            providers.wallet.expiry_seconds,
            rates,
            max_rate_age,
            Arc::new(SimulatedWalletGateway),
        );

        let card_gateway = Arc::new(SimulatedCardGateway);
        let card = |brand: PaymentMethod| -> Arc<dyn ProviderAdapter> {
            Arc::new(CardAdapter::new(
                brand,
                &providers.card.checkout_base_url,
                providers.card.expiry_seconds,
                card_gateway.clone(),
            ))
        };

        Self::new()
            .register(PaymentMethod::Mpesa, mobile_money(MobileMoneyProfile::mpesa(mm.mpesa_expiry_seconds)))
            .register(PaymentMethod::MtnMomo, mobile_money(MobileMoneyProfile::mtn_momo(mm.mtn_momo_expiry_seconds)))
            .register(
                PaymentMethod::AirtelMoney,
                mobile_money(MobileMoneyProfile::airtel_money(mm.airtel_money_expiry_seconds)),
            )
            .register(PaymentMethod::Paypal, Arc::new(wallet))
            .register(PaymentMethod::Visa, card(PaymentMethod::Visa))
            .register(PaymentMethod::Mastercard, card(PaymentMethod::Mastercard))
    }
}

pub(crate) fn provider_error(family: ProviderFamily, err: GatewayError) -> PaymentError {
    tracing::error!("Gateway call to {} failed: {}", family, err);
    PaymentError::Provider {
        provider: family.to_string(),
        message: err.to_string(),
    }
}
