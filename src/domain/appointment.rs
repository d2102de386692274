use super::money::{Amount, AmountMismatch};
use super::phone::Msisdn;
use super::receipt::ReceiptCode;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppointmentId(pub u64);

impl fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Initiated,
    PendingVerification,
    Completed,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Initiated => "initiated",
            PaymentStatus::PendingVerification => "pending_verification",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    /// Whether `self -> next` is an edge of the payment state machine.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending | Initiated | Failed | Cancelled, Initiated)
                | (Initiated, Completed | Failed | Cancelled)
                | (Pending | Initiated | Failed | Cancelled, PendingVerification)
                | (PendingVerification, Completed | Failed)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    #[default]
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

/// A receipt code submitted by hand, awaiting an administrator's decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualClaim {
    pub amount: Amount,
    pub phone: Msisdn,
    pub submitted_at: DateTime<Utc>,
    pub submitted_by: UserId,
}

/// Result code and description last reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayResult {
    pub code: String,
    pub description: String,
}

/// Payment fields of an appointment. Only the reconciliation engine writes them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaymentState {
    pub status: PaymentStatus,
    pub gateway_request_id: Option<String>,
    pub correlation_id: Option<String>,
    pub payment_phone: Option<Msisdn>,
    pub initiated_at: Option<DateTime<Utc>>,
    pub receipt: Option<ReceiptCode>,
    pub amount_paid: Option<Amount>,
    pub paid_phone: Option<Msisdn>,
    pub paid_at: Option<DateTime<Utc>>,
    pub claim: Option<ManualClaim>,
    pub last_result: Option<GatewayResult>,
    pub rejection_reason: Option<String>,
    /// Administrator who approved or rejected the last manual claim.
    #[serde(default)]
    pub reviewed_by: Option<UserId>,
    pub amount_mismatch: Option<AmountMismatch>,
}

impl PaymentState {
    /// A receipt is held exactly while the payment is completed or under review.
    pub fn receipt_invariant_holds(&self) -> bool {
        let holds_receipt = matches!(
            self.status,
            PaymentStatus::Completed | PaymentStatus::PendingVerification
        );
        holds_receipt == self.receipt.is_some()
    }
}

/// The booking collaborator's view of an appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub user_id: UserId,
    pub customer_phone: Msisdn,
    pub service_name: String,
    pub service_price: Amount,
    pub date: NaiveDate,
    pub booking_status: BookingStatus,
    pub payment: PaymentState,
    /// Bumped on every write; stores reject writes carrying a stale version.
    pub version: u64,
}

impl Appointment {
    pub fn new(
        id: AppointmentId,
        user_id: UserId,
        customer_phone: Msisdn,
        service_name: impl Into<String>,
        service_price: Amount,
        date: NaiveDate,
    ) -> Self {
        Self {
            id,
            user_id,
            customer_phone,
            service_name: service_name.into(),
            service_price,
            date,
            booking_status: BookingStatus::Pending,
            payment: PaymentState::default(),
            version: 0,
        }
    }

    /// Reference sent to the gateway so statements can be traced back.
    pub fn account_reference(&self) -> String {
        format!("APT{}", self.id)
    }

    pub fn payment_description(&self) -> String {
        format!("Payment for {}", self.service_name)
    }

    /// Phone to charge when the caller does not name one.
    pub fn default_payment_phone(&self) -> &Msisdn {
        self.payment
            .payment_phone
            .as_ref()
            .unwrap_or(&self.customer_phone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PaymentStatus::*;

    #[test]
    fn test_completed_is_a_sink() {
        for next in [
            Pending,
            Initiated,
            PendingVerification,
            Completed,
            Failed,
            Cancelled,
        ] {
            assert!(!Completed.can_transition_to(next), "completed -> {next}");
        }
    }

    #[test]
    fn test_review_only_resolves_to_completed_or_failed() {
        assert!(PendingVerification.can_transition_to(Completed));
        assert!(PendingVerification.can_transition_to(Failed));
        assert!(!PendingVerification.can_transition_to(Cancelled));
        assert!(!PendingVerification.can_transition_to(Initiated));
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        assert!(!Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Initiated));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&PendingVerification).unwrap();
        assert_eq!(json, "\"pending_verification\"");
    }

    #[test]
    fn test_default_state_satisfies_receipt_invariant() {
        assert!(PaymentState::default().receipt_invariant_holds());
    }
}
