use chrono::Utc;
use tembea_shared::PaymentEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Fails payments whose PIN prompt or checkout window has closed.
pub async fn start_expiry_sweeper(state: AppState, every: Duration) {
    let mut ticker = interval(every);
    info!("Expiry sweeper started, running every {:?}", every);

    loop {
        ticker.tick().await;

        let expired = state.engine.expire_stale(Utc::now()).await;
        if expired.is_empty() {
            debug!("Expiry sweep found nothing to expire");
            continue;
        }

        info!("Expired {} stale payment(s)", expired.len());
        for payment in &expired {
            state.publish(payment);
        }
    }
}

/// Hands terminal payment events to the email collaborator.
pub async fn start_notification_worker(mut rx: broadcast::Receiver<PaymentEvent>) {
    info!("Notification worker started, listening to payment events...");

    loop {
        match rx.recv().await {
            Ok(event) => notify(&event),
            Err(RecvError::Lagged(skipped)) => {
                warn!("Notification worker lagged, {} event(s) skipped", skipped)
            }
            Err(RecvError::Closed) => {
                info!("Payment event channel closed, notification worker stopping");
                break;
            }
        }
    }
}

fn notify(event: &PaymentEvent) {
    info!(
        "Queued {} notification for user {} (payment {}, booking {}, via {})",
        event.status, event.user_id, event.payment_id, event.booking_id, event.method
    );
}
