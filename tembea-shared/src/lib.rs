pub mod models;
pub mod pii;

pub use models::events::PaymentEvent;
pub use pii::Masked;
