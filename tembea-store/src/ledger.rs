use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tembea_core::{Payment, PaymentError, PaymentResult};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct LedgerState {
    payments: HashMap<Uuid, Payment>,
    /// provider_reference → payment id, for callback correlation
    by_reference: HashMap<String, Uuid>,
}

/// Authoritative in-memory store of payment records.
///
/// One `RwLock` guards both the records and the reference index. Reads share
/// the lock; every mutation goes through [`Ledger::update`], which runs its
/// check-and-transition closure under the write lock, so competing writers on
/// the same payment are serialized and only the first legal transition lands.
/// Callers must not hold the lock across provider I/O: `update` never awaits
/// anything but the lock itself.
#[derive(Default, Clone)]
pub struct Ledger {
    state: Arc<RwLock<LedgerState>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, payment: Payment) -> PaymentResult<()> {
        let mut state = self.state.write().await;
        if state.payments.contains_key(&payment.id) {
            return Err(PaymentError::Validation(format!(
                "payment {} already exists",
                payment.id
            )));
        }
        if let Some(reference) = &payment.provider_reference {
            state.by_reference.insert(reference.clone(), payment.id);
        }
        state.payments.insert(payment.id, payment);
        Ok(())
    }

    /// Apply `mutate` to a working copy of the record and commit it only if
    /// the closure succeeds. A failed transition leaves the record untouched.
    pub async fn update<F>(&self, id: Uuid, mutate: F) -> PaymentResult<Payment>
    where
        F: FnOnce(&mut Payment) -> PaymentResult<()>,
    {
        let mut state = self.state.write().await;
        let current = state.payments.get(&id).ok_or(PaymentError::NotFound(id))?;

        let mut next = current.clone();
        mutate(&mut next)?;

        if let Some(reference) = &next.provider_reference {
            state.by_reference.insert(reference.clone(), id);
        }
        state.payments.insert(id, next.clone());
        Ok(next)
    }

    pub async fn get(&self, id: Uuid) -> Option<Payment> {
        self.state.read().await.payments.get(&id).cloned()
    }

    pub async fn find_by_reference(&self, reference: &str) -> Option<Payment> {
        let state = self.state.read().await;
        state
            .by_reference
            .get(reference)
            .and_then(|id| state.payments.get(id))
            .cloned()
    }

    pub async fn list_by_booking(&self, booking_id: &str) -> Vec<Payment> {
        self.collect(|p| p.booking_id == booking_id).await
    }

    pub async fn list_by_user(&self, user_id: &str) -> Vec<Payment> {
        self.collect(|p| p.user_id == user_id).await
    }

    /// Ids of payments still awaiting the payer past their advised window.
    pub async fn expired_ids(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        self.collect(|p| p.is_expired(now))
            .await
            .into_iter()
            .map(|p| p.id)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.payments.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn collect<P>(&self, predicate: P) -> Vec<Payment>
    where
        P: Fn(&Payment) -> bool,
    {
        let state = self.state.read().await;
        let mut payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| predicate(p))
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        payments
    }
}
