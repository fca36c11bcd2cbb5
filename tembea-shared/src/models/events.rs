use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Published by the API whenever it observes a payment reaching a terminal state.
/// Consumers (e.g. the notification worker) hand these to the email collaborator.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct PaymentEvent {
    pub payment_id: Uuid,
    pub booking_id: String,
    pub user_id: String,
    pub status: String,
    pub method: String,
    pub occurred_at: DateTime<Utc>,
}
