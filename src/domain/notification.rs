use super::appointment::{AppointmentId, UserId};
use super::money::Amount;
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    PaymentSucceeded { amount: Amount },
    /// The reason is forwarded exactly as the administrator typed it.
    ManualPaymentRejected { reason: Option<String> },
}

/// A user-facing event handed to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentNotification {
    pub user_id: UserId,
    pub appointment_id: AppointmentId,
    pub service_name: String,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub kind: NotificationKind,
}
