use crate::domain::appointment::{Appointment, AppointmentId, PaymentStatus};
use crate::domain::event::PaymentEvent;
use crate::domain::ledger::LedgerInsert;
use crate::domain::ports::{AppointmentStoreRef, LedgerRef, NotifierRef};
use crate::domain::receipt::ReceiptCode;
use crate::domain::reconcile::{
    Decision, DiscardReason, ReceiptLookup, Transition, decide, receipt_in_play,
};
use crate::error::{PaymentError, Result};
use chrono::Utc;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::field::display;
use tracing::{debug, error, info, warn};

/// What `apply` did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Transitioned {
        from: PaymentStatus,
        appointment: Appointment,
    },
    Discarded {
        reason: DiscardReason,
        appointment: Appointment,
    },
}

impl Applied {
    pub fn appointment(&self) -> &Appointment {
        match self {
            Applied::Transitioned { appointment, .. } | Applied::Discarded { appointment, .. } => {
                appointment
            }
        }
    }

    pub fn into_appointment(self) -> Appointment {
        match self {
            Applied::Transitioned { appointment, .. } | Applied::Discarded { appointment, .. } => {
                appointment
            }
        }
    }

    pub fn is_transition(&self) -> bool {
        matches!(self, Applied::Transitioned { .. })
    }
}

/// Async mutexes created on demand per key and dropped once nobody holds or
/// waits on them.
struct KeyedLocks<K: Eq + Hash> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    async fn acquire(&self, key: K) -> KeyedGuard<'_, K> {
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            locks: &self.locks,
            key,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Releases the key on drop, including when the holding future is cancelled.
struct KeyedGuard<'a, K: Eq + Hash> {
    locks: &'a DashMap<K, Arc<Mutex<()>>>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash> Drop for KeyedGuard<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// The only writer of appointment payment state.
///
/// `apply` serializes events per appointment, and events that put a receipt
/// in play are further serialized per receipt, so the receipt lookup, the
/// ledger insert and the state write happen as one step within the process.
/// Appointment locks are always taken before receipt locks. The stores'
/// unique receipt indexes back this up across processes.
pub struct ReconciliationEngine {
    appointments: AppointmentStoreRef,
    ledger: LedgerRef,
    notifier: NotifierRef,
    appointment_locks: KeyedLocks<AppointmentId>,
    receipt_locks: KeyedLocks<ReceiptCode>,
}

impl ReconciliationEngine {
    /// Creates a new `ReconciliationEngine`.
    ///
    /// # Arguments
    ///
    /// * `appointments` - The booking collaborator's appointment store.
    /// * `ledger` - The payment ledger.
    /// * `notifier` - Receives one notification per completion or rejection.
    pub fn new(
        appointments: AppointmentStoreRef,
        ledger: LedgerRef,
        notifier: NotifierRef,
    ) -> Self {
        Self {
            appointments,
            ledger,
            notifier,
            appointment_locks: KeyedLocks::new(),
            receipt_locks: KeyedLocks::new(),
        }
    }

    /// Applies one event to one appointment.
    ///
    /// Rejections (`IllegalTransition`, `DuplicateReceipt`, `AlreadyTerminal`)
    /// leave the stored state untouched.
    pub async fn apply(&self, id: AppointmentId, event: PaymentEvent) -> Result<Applied> {
        let _appointment_guard = self.appointment_locks.acquire(id).await;
        self.apply_locked(id, &event).await
    }

    async fn apply_locked(&self, id: AppointmentId, event: &PaymentEvent) -> Result<Applied> {
        let appointment = self
            .appointments
            .get(id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("Appointment {id}")))?;
        let _receipt_guard = match receipt_in_play(&appointment, event) {
            Some(receipt) => Some(self.receipt_locks.acquire(receipt.clone()).await),
            None => None,
        };
        let lookup = self.lookup_receipt(&appointment, event).await?;

        let decision = decide(&appointment, event, &lookup, Utc::now()).inspect_err(|err| {
            warn!(
                appointment_id = %id,
                status = %appointment.payment.status,
                event = event.name(),
                source = event.source().map(display),
                actor = event.actor().map(display),
                error = %err,
                "reconcile: event rejected"
            );
        })?;

        match decision {
            Decision::Discard(reason) => {
                debug!(
                    appointment_id = %id,
                    status = %appointment.payment.status,
                    event = event.name(),
                    ?reason,
                    "reconcile: event discarded"
                );
                Ok(Applied::Discarded {
                    reason,
                    appointment,
                })
            }
            Decision::Apply(transition) => self.commit(appointment, *transition, event).await,
        }
    }

    async fn lookup_receipt(
        &self,
        appointment: &Appointment,
        event: &PaymentEvent,
    ) -> Result<ReceiptLookup> {
        let Some(receipt) = receipt_in_play(appointment, event) else {
            return Ok(ReceiptLookup::default());
        };
        let ledger_entry = self.ledger.find_by_receipt(receipt).await?;
        let claimed_by = self
            .appointments
            .find_by_receipt(receipt)
            .await?
            .filter(|holder| *holder != appointment.id);
        Ok(ReceiptLookup {
            ledger_entry,
            claimed_by,
        })
    }

    /// Ledger first, then the appointment, then the notification. A lost
    /// ledger race aborts before anything else is written.
    async fn commit(
        &self,
        appointment: Appointment,
        transition: Transition,
        event: &PaymentEvent,
    ) -> Result<Applied> {
        let id = appointment.id;
        let from = appointment.payment.status;
        let Transition {
            payment,
            booking_status,
            ledger_entry,
            notification,
        } = transition;

        if let Some(entry) = ledger_entry {
            let receipt = entry.receipt.clone();
            match self.ledger.insert(entry).await? {
                LedgerInsert::Inserted(row) => {
                    info!(
                        appointment_id = %id,
                        ledger_id = %row.id,
                        receipt = ?row.receipt.as_ref().map(|r| r.as_str()),
                        status = ?row.status,
                        "reconcile: ledger entry recorded"
                    );
                }
                LedgerInsert::ReceiptExists(existing) if existing.appointment_id == Some(id) => {
                    info!(
                        appointment_id = %id,
                        ledger_id = %existing.id,
                        "reconcile: receipt already recorded for this appointment, discarding"
                    );
                    return Ok(Applied::Discarded {
                        reason: DiscardReason::DuplicateDelivery,
                        appointment,
                    });
                }
                LedgerInsert::ReceiptExists(existing) => {
                    let receipt = receipt.map(String::from).unwrap_or_default();
                    warn!(
                        appointment_id = %id,
                        %receipt,
                        holder = ?existing.appointment_id,
                        "reconcile: receipt recorded for another appointment"
                    );
                    return Err(PaymentError::DuplicateReceipt(receipt));
                }
            }
        }

        let mut updated = appointment;
        updated.payment = payment;
        updated.booking_status = booking_status;
        debug_assert!(updated.payment.receipt_invariant_holds());

        let saved = self.appointments.save(updated).await.inspect_err(|err| {
            error!(
                appointment_id = %id,
                event = event.name(),
                error = %err,
                "reconcile: failed to persist payment state"
            );
        })?;

        info!(
            appointment_id = %id,
            from = %from,
            to = %saved.payment.status,
            event = event.name(),
            source = event.source().map(display),
            actor = event.actor().map(display),
            "reconcile: transition applied"
        );
        if saved.payment.status == PaymentStatus::Completed
            && let Some(mismatch) = &saved.payment.amount_mismatch
        {
            warn!(
                appointment_id = %id,
                expected = %mismatch.expected,
                paid = %mismatch.paid,
                underpaid = mismatch.is_underpayment(),
                "reconcile: paid amount differs from service price"
            );
        }

        if let Some(notification) = notification
            && let Err(err) = self.notifier.notify(notification).await
        {
            error!(appointment_id = %id, error = %err, "reconcile: failed to send notification");
        }

        Ok(Applied::Transitioned {
            from,
            appointment: saved,
        })
    }
}
