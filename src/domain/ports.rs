use super::appointment::{Appointment, AppointmentId, PaymentStatus, UserId};
use super::event::GatewayOutcome;
use super::ledger::{LedgerEntry, LedgerInsert, NewLedgerEntry};
use super::money::Amount;
use super::notification::PaymentNotification;
use super::phone::Msisdn;
use super::receipt::ReceiptCode;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Booking collaborator: the appointments whose payment fields the engine owns.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Adds an appointment; existing ids are left untouched and reported as `false`.
    async fn insert(&self, appointment: Appointment) -> Result<bool>;
    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>>;
    async fn find_by_gateway_request(&self, gateway_request_id: &str)
    -> Result<Option<Appointment>>;
    async fn find_by_receipt(&self, receipt: &ReceiptCode) -> Result<Option<AppointmentId>>;
    async fn list_by_payment_status(&self, status: PaymentStatus) -> Result<Vec<Appointment>>;
    /// Writes payment state and booking status in one step.
    ///
    /// Fails with `ConcurrentModification` unless the stored version equals
    /// `appointment.version`, and with `DuplicateReceipt` if another
    /// appointment already holds the receipt. The stored version is bumped.
    async fn save(&self, appointment: Appointment) -> Result<Appointment>;
}

/// Append-only payment ledger. Implementations enforce receipt uniqueness
/// themselves; callers never pre-check.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn insert(&self, entry: NewLedgerEntry) -> Result<LedgerInsert>;
    async fn find_by_receipt(&self, receipt: &ReceiptCode) -> Result<Option<LedgerEntry>>;
    async fn entries_for_appointment(&self, id: AppointmentId) -> Result<Vec<LedgerEntry>>;
    async fn all_entries(&self) -> Result<Vec<LedgerEntry>>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: PaymentNotification) -> Result<()>;
}

/// Identity collaborator predicates about the current caller.
pub trait IdentityProvider: Send + Sync {
    fn is_admin(&self, caller: UserId) -> bool;

    fn is_owner(&self, caller: UserId, appointment: &Appointment) -> bool {
        appointment.user_id == caller
    }
}

/// Parameters of a push-payment prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    pub phone: Msisdn,
    pub amount: Amount,
    pub reference: String,
    pub description: String,
}

/// The gateway's acknowledgement of a push request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushAccepted {
    pub gateway_request_id: String,
    pub correlation_id: String,
    pub customer_message: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate_push(&self, request: &PushRequest) -> Result<PushAccepted>;
    async fn query_status(&self, gateway_request_id: &str) -> Result<GatewayOutcome>;
}

pub type AppointmentStoreRef = Arc<dyn AppointmentStore>;
pub type LedgerRef = Arc<dyn Ledger>;
pub type NotifierRef = Arc<dyn Notifier>;
pub type IdentityRef = Arc<dyn IdentityProvider>;
pub type GatewayRef = Arc<dyn PaymentGateway>;
