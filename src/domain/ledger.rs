use super::appointment::{AppointmentId, UserId};
use super::money::Amount;
use super::phone::Msisdn;
use super::receipt::ReceiptCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Completed,
    Failed,
    Cancelled,
}

/// How the money reached the shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentSource {
    Push,
    Manual,
}

/// A ledger row as requested by the engine, before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub user_id: UserId,
    pub appointment_id: Option<AppointmentId>,
    pub receipt: Option<ReceiptCode>,
    pub gateway_request_id: Option<String>,
    pub phone: Msisdn,
    pub amount: Amount,
    pub status: LedgerStatus,
    pub source: PaymentSource,
    pub result_code: Option<String>,
    pub result_description: Option<String>,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// An immutable ledger row.
///
/// Completed rows carry the receipt that makes them unique; failed and
/// cancelled rows are receipt-less audit records of a push attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: UserId,
    /// Kept as a plain reference so the row outlives the appointment.
    pub appointment_id: Option<AppointmentId>,
    pub receipt: Option<ReceiptCode>,
    pub gateway_request_id: Option<String>,
    pub phone: Msisdn,
    pub amount: Amount,
    pub status: LedgerStatus,
    pub source: PaymentSource,
    pub result_code: Option<String>,
    pub result_description: Option<String>,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl NewLedgerEntry {
    pub fn into_entry(self, id: Uuid) -> LedgerEntry {
        LedgerEntry {
            id,
            user_id: self.user_id,
            appointment_id: self.appointment_id,
            receipt: self.receipt,
            gateway_request_id: self.gateway_request_id,
            phone: self.phone,
            amount: self.amount,
            status: self.status,
            source: self.source,
            result_code: self.result_code,
            result_description: self.result_description,
            initiated_at: self.initiated_at,
            completed_at: self.completed_at,
        }
    }
}

/// Outcome of appending to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerInsert {
    Inserted(LedgerEntry),
    /// The receipt is already recorded; carries the existing row.
    ReceiptExists(LedgerEntry),
}
