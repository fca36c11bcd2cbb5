use std::sync::Arc;
use tembea_core::{Payment, PaymentResult};
use tembea_payments::{AdapterRegistry, CallbackReconciler, LifecycleEngine};
use tembea_shared::PaymentEvent;
use tembea_store::{Config, Ledger};
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LifecycleEngine>,
    pub reconciler: Arc<CallbackReconciler>,
    pub events: broadcast::Sender<PaymentEvent>,
    pub auth: AuthConfig,
    /// Gates the `/simulate/*` routes
    pub simulation_enabled: bool,
}

impl AppState {
    pub fn new(engine: Arc<LifecycleEngine>, auth: AuthConfig, simulation_enabled: bool) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            reconciler: Arc::new(CallbackReconciler::new(engine.clone())),
            engine,
            events,
            auth,
            simulation_enabled,
        }
    }

    pub fn from_config(config: &Config) -> PaymentResult<Self> {
        let rates = Arc::new(config.rates.rate_table()?);
        let adapters = AdapterRegistry::simulated(&config.providers, rates, config.rates.max_age()?);
        let engine = LifecycleEngine::new(Ledger::new(), adapters, config.catalog.catalog());

        Ok(Self::new(
            Arc::new(engine),
            AuthConfig {
                secret: config.auth.jwt_secret.clone(),
                expiration: config.auth.jwt_expiration_seconds,
            },
            config.payments.simulation_enabled,
        ))
    }

    /// Hand terminal transitions to the notification worker.
    pub fn publish(&self, payment: &Payment) {
        if !payment.status.is_terminal() {
            return;
        }

        let event = PaymentEvent {
            payment_id: payment.id,
            booking_id: payment.booking_id.clone(),
            user_id: payment.user_id.clone(),
            status: payment.status.to_string(),
            method: payment.method.to_string(),
            occurred_at: payment.updated_at,
        };

        // No subscribers just means nobody is listening yet
        if self.events.send(event).is_err() {
            tracing::debug!("No notification listener for payment {}", payment.id);
        }
    }
}
