use crate::domain::notification::{NotificationKind, PaymentNotification};
use crate::domain::ports::Notifier;
use crate::error::Result;
use async_trait::async_trait;
use tracing::info;

/// Hands notifications to the log; stands in for the user-notification
/// service, which lives outside this crate.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: PaymentNotification) -> Result<()> {
        match &notification.kind {
            NotificationKind::PaymentSucceeded { amount } => info!(
                user_id = %notification.user_id,
                appointment_id = %notification.appointment_id,
                service = %notification.service_name,
                date = %notification.date,
                %amount,
                "notification: payment succeeded"
            ),
            NotificationKind::ManualPaymentRejected { reason } => info!(
                user_id = %notification.user_id,
                appointment_id = %notification.appointment_id,
                service = %notification.service_name,
                reason = ?reason,
                "notification: manual payment rejected"
            ),
        }
        Ok(())
    }
}
