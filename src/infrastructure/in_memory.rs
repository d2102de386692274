use crate::domain::appointment::{Appointment, AppointmentId, PaymentStatus, UserId};
use crate::domain::ledger::{LedgerEntry, LedgerInsert, NewLedgerEntry};
use crate::domain::notification::PaymentNotification;
use crate::domain::ports::{AppointmentStore, IdentityProvider, Ledger, Notifier};
use crate::domain::receipt::ReceiptCode;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct AppointmentTables {
    appointments: HashMap<AppointmentId, Appointment>,
    by_gateway_request: HashMap<String, AppointmentId>,
    by_receipt: HashMap<ReceiptCode, AppointmentId>,
}

/// A thread-safe in-memory appointment store.
///
/// Secondary indexes on gateway request id and receipt are kept under the
/// same lock as the rows, so the version check and the receipt uniqueness
/// check happen atomically with the write.
#[derive(Default, Clone)]
pub struct InMemoryAppointmentStore {
    tables: Arc<RwLock<AppointmentTables>>,
}

impl InMemoryAppointmentStore {
    /// Creates a new, empty in-memory appointment store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn insert(&self, appointment: Appointment) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.appointments.contains_key(&appointment.id) {
            return Ok(false);
        }
        if let Some(request_id) = &appointment.payment.gateway_request_id {
            tables
                .by_gateway_request
                .insert(request_id.clone(), appointment.id);
        }
        if let Some(receipt) = &appointment.payment.receipt {
            tables.by_receipt.insert(receipt.clone(), appointment.id);
        }
        tables.appointments.insert(appointment.id, appointment);
        Ok(true)
    }

    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>> {
        let tables = self.tables.read().await;
        Ok(tables.appointments.get(&id).cloned())
    }

    async fn find_by_gateway_request(
        &self,
        gateway_request_id: &str,
    ) -> Result<Option<Appointment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_gateway_request
            .get(gateway_request_id)
            .and_then(|id| tables.appointments.get(id))
            .cloned())
    }

    async fn find_by_receipt(&self, receipt: &ReceiptCode) -> Result<Option<AppointmentId>> {
        let tables = self.tables.read().await;
        Ok(tables.by_receipt.get(receipt).copied())
    }

    async fn list_by_payment_status(&self, status: PaymentStatus) -> Result<Vec<Appointment>> {
        let tables = self.tables.read().await;
        let mut matching: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|a| a.payment.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|a| a.id);
        Ok(matching)
    }

    async fn save(&self, mut appointment: Appointment) -> Result<Appointment> {
        let mut tables = self.tables.write().await;
        let previous = tables
            .appointments
            .get(&appointment.id)
            .cloned()
            .ok_or_else(|| PaymentError::NotFound(format!("Appointment {}", appointment.id)))?;

        if previous.version != appointment.version {
            return Err(PaymentError::ConcurrentModification(appointment.id));
        }
        if let Some(receipt) = &appointment.payment.receipt
            && let Some(holder) = tables.by_receipt.get(receipt)
            && *holder != appointment.id
        {
            return Err(PaymentError::DuplicateReceipt(receipt.to_string()));
        }

        if let Some(old) = &previous.payment.gateway_request_id {
            tables.by_gateway_request.remove(old);
        }
        if let Some(old) = &previous.payment.receipt {
            tables.by_receipt.remove(old);
        }
        if let Some(request_id) = &appointment.payment.gateway_request_id {
            tables
                .by_gateway_request
                .insert(request_id.clone(), appointment.id);
        }
        if let Some(receipt) = &appointment.payment.receipt {
            tables.by_receipt.insert(receipt.clone(), appointment.id);
        }

        appointment.version += 1;
        tables
            .appointments
            .insert(appointment.id, appointment.clone());
        Ok(appointment)
    }
}

#[derive(Default)]
struct LedgerTables {
    entries: Vec<LedgerEntry>,
    by_receipt: HashMap<ReceiptCode, usize>,
}

/// A thread-safe in-memory ledger with a unique index on receipt codes.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    tables: Arc<RwLock<LedgerTables>>,
}

impl InMemoryLedger {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn insert(&self, entry: NewLedgerEntry) -> Result<LedgerInsert> {
        let mut tables = self.tables.write().await;
        if let Some(receipt) = &entry.receipt
            && let Some(&index) = tables.by_receipt.get(receipt)
        {
            return Ok(LedgerInsert::ReceiptExists(tables.entries[index].clone()));
        }

        let entry = entry.into_entry(Uuid::new_v4());
        if let Some(receipt) = &entry.receipt {
            let index = tables.entries.len();
            tables.by_receipt.insert(receipt.clone(), index);
        }
        tables.entries.push(entry.clone());
        Ok(LedgerInsert::Inserted(entry))
    }

    async fn find_by_receipt(&self, receipt: &ReceiptCode) -> Result<Option<LedgerEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_receipt
            .get(receipt)
            .map(|&index| tables.entries[index].clone()))
    }

    async fn entries_for_appointment(&self, id: AppointmentId) -> Result<Vec<LedgerEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .entries
            .iter()
            .filter(|e| e.appointment_id == Some(id))
            .cloned()
            .collect())
    }

    async fn all_entries(&self) -> Result<Vec<LedgerEntry>> {
        let tables = self.tables.read().await;
        Ok(tables.entries.clone())
    }
}

/// Collects notifications instead of delivering them.
#[derive(Default, Clone)]
pub struct InMemoryNotifier {
    sent: Arc<RwLock<Vec<PaymentNotification>>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<PaymentNotification> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, notification: PaymentNotification) -> Result<()> {
        self.sent.write().await.push(notification);
        Ok(())
    }
}

/// Identity provider backed by a fixed set of administrator ids.
#[derive(Debug, Default, Clone)]
pub struct StaticIdentity {
    admins: HashSet<UserId>,
}

impl StaticIdentity {
    pub fn new(admins: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }
}

impl IdentityProvider for StaticIdentity {
    fn is_admin(&self, caller: UserId) -> bool {
        self.admins.contains(&caller)
    }
}
