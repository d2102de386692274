use super::appointment::UserId;
use super::money::Amount;
use super::phone::Msisdn;
use super::receipt::ReceiptCode;
use chrono::{DateTime, Utc};
use std::fmt;

/// Details of a payment the gateway reports as successful. Fields other than
/// the receipt may be missing from a status query response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessfulPayment {
    pub receipt: ReceiptCode,
    pub amount: Option<Amount>,
    pub phone: Option<Msisdn>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Outcome of a push request, decoded once at the gateway boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    Succeeded(SuccessfulPayment),
    UserCancelled { code: String, description: String },
    TimedOut { code: String, description: String },
    OtherFailure { code: String, description: String },
    StillPending,
}

impl GatewayOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayOutcome::Succeeded(_) => "succeeded",
            GatewayOutcome::UserCancelled { .. } => "user_cancelled",
            GatewayOutcome::TimedOut { .. } => "timed_out",
            GatewayOutcome::OtherFailure { .. } => "other_failure",
            GatewayOutcome::StillPending => "still_pending",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    Webhook,
    Poll,
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventSource::Webhook => f.write_str("webhook"),
            EventSource::Poll => f.write_str("poll"),
        }
    }
}

/// A decoded webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCallback {
    pub gateway_request_id: String,
    pub correlation_id: Option<String>,
    pub outcome: GatewayOutcome,
}

/// Everything that can move an appointment's payment state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    /// The gateway accepted a new push request.
    PushAccepted {
        gateway_request_id: String,
        correlation_id: String,
        phone: Msisdn,
    },
    /// The gateway reported the outcome of a push, by webhook or poll.
    GatewayReport {
        gateway_request_id: String,
        outcome: GatewayOutcome,
        source: EventSource,
    },
    ManualClaim {
        receipt: ReceiptCode,
        claimant: UserId,
    },
    AdminApproved {
        admin: UserId,
    },
    AdminRejected {
        admin: UserId,
        reason: Option<String>,
    },
    /// Gives up on pushes initiated at or before `cutoff`.
    Expire { cutoff: DateTime<Utc> },
}

impl PaymentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PaymentEvent::PushAccepted { .. } => "push_accepted",
            PaymentEvent::GatewayReport { .. } => "gateway_report",
            PaymentEvent::ManualClaim { .. } => "manual_claim",
            PaymentEvent::AdminApproved { .. } => "admin_approved",
            PaymentEvent::AdminRejected { .. } => "admin_rejected",
            PaymentEvent::Expire { .. } => "expire",
        }
    }

    /// Where a gateway report came from.
    pub fn source(&self) -> Option<EventSource> {
        match self {
            PaymentEvent::GatewayReport { source, .. } => Some(*source),
            _ => None,
        }
    }

    /// The user behind a manual event: the claimant or the reviewing admin.
    pub fn actor(&self) -> Option<UserId> {
        match self {
            PaymentEvent::ManualClaim { claimant, .. } => Some(*claimant),
            PaymentEvent::AdminApproved { admin } | PaymentEvent::AdminRejected { admin, .. } => {
                Some(*admin)
            }
            _ => None,
        }
    }
}
