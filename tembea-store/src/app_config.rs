use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use tembea_core::{
    CapabilityCatalog, Currency, PaymentError, PaymentMethod, PaymentResult, RateTable,
};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    pub rates: RatesConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PaymentsConfig {
    /// Expose the simulate endpoints (environments without live providers).
    pub simulation_enabled: bool,
    /// How often stale attempts are failed; 0 disables the sweeper.
    pub sweep_interval_seconds: u64,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            simulation_enabled: true,
            sweep_interval_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderEnvironment {
    #[default]
    Sandbox,
    Production,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub environment: ProviderEnvironment,
    pub mobile_money: MobileMoneyConfig,
    pub wallet: WalletConfig,
    pub card: CardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MobileMoneyConfig {
    /// Name shown on the payer's handset prompt
    pub merchant_name: String,
    pub mpesa_expiry_seconds: u64,
    pub mtn_momo_expiry_seconds: u64,
    pub airtel_money_expiry_seconds: u64,
}

impl Default for MobileMoneyConfig {
    fn default() -> Self {
        Self {
            merchant_name: "Tembea".to_string(),
            mpesa_expiry_seconds: 60,
            mtn_momo_expiry_seconds: 90,
            airtel_money_expiry_seconds: 120,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WalletConfig {
    pub sandbox_base_url: String,
    pub production_base_url: String,
    pub expiry_seconds: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            sandbox_base_url: "https://www.sandbox.paypal.com".to_string(),
            production_base_url: "https://www.paypal.com".to_string(),
            expiry_seconds: 3600,
        }
    }
}

impl WalletConfig {
    pub fn base_url(&self, environment: ProviderEnvironment) -> &str {
        match environment {
            ProviderEnvironment::Sandbox => &self.sandbox_base_url,
            ProviderEnvironment::Production => &self.production_base_url,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CardConfig {
    pub checkout_base_url: String,
    pub expiry_seconds: u64,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            checkout_base_url: "https://checkout.stripe.com/c/pay".to_string(),
            expiry_seconds: 1800,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RatesConfig {
    #[serde(default = "default_base_currency")]
    pub base: Currency,
    pub as_of: DateTime<Utc>,
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: i64,
    /// Currency code → units per one unit of `base`
    pub table: HashMap<String, Decimal>,
}

fn default_base_currency() -> Currency {
    Currency::Usd
}

fn default_max_age_hours() -> i64 {
    24
}

impl RatesConfig {
    pub fn rate_table(&self) -> PaymentResult<RateTable> {
        let mut table = RateTable::new(self.base, self.as_of);
        for (code, rate) in &self.table {
            let currency: Currency = code.parse()?;
            table = table.with_rate(currency, *rate);
        }
        Ok(table)
    }

    pub fn max_age(&self) -> PaymentResult<chrono::Duration> {
        chrono::Duration::try_hours(self.max_age_hours)
            .filter(|age| *age >= chrono::Duration::zero())
            .ok_or_else(|| {
                PaymentError::Validation(format!(
                    "rates.max_age_hours {} is out of range",
                    self.max_age_hours
                ))
            })
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CatalogConfig {
    /// Replaces the built-in country table when non-empty
    #[serde(default)]
    pub countries: HashMap<String, Vec<PaymentMethod>>,
}

impl CatalogConfig {
    pub fn catalog(&self) -> CapabilityCatalog {
        if self.countries.is_empty() {
            CapabilityCatalog::default()
        } else {
            CapabilityCatalog::new(self.countries.clone())
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        tracing::debug!("Loading configuration for run mode {}", run_mode);

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. TEMBEA_PROVIDERS__ENVIRONMENT=production
            .add_source(config::Environment::with_prefix("TEMBEA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
