use super::engine::ReconciliationEngine;
use super::{ensure_admin, ensure_owner_or_admin, load};
use crate::domain::appointment::{Appointment, AppointmentId, PaymentStatus, UserId};
use crate::domain::event::PaymentEvent;
use crate::domain::ports::{AppointmentStoreRef, IdentityRef};
use crate::domain::receipt::ReceiptCode;
use crate::error::Result;
use std::sync::Arc;
use tracing::info;

/// Manual receipt claims and their administrator review.
pub struct VerificationService {
    engine: Arc<ReconciliationEngine>,
    appointments: AppointmentStoreRef,
    identity: IdentityRef,
}

impl VerificationService {
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        appointments: AppointmentStoreRef,
        identity: IdentityRef,
    ) -> Self {
        Self {
            engine,
            appointments,
            identity,
        }
    }

    /// Records a receipt the customer says they paid with out of band.
    pub async fn claim(
        &self,
        caller: UserId,
        id: AppointmentId,
        raw_receipt: &str,
    ) -> Result<Appointment> {
        let appointment = load(&self.appointments, id).await?;
        ensure_owner_or_admin(self.identity.as_ref(), caller, &appointment)?;
        let receipt = ReceiptCode::parse_claim(raw_receipt)?;

        let applied = self
            .engine
            .apply(
                id,
                PaymentEvent::ManualClaim {
                    receipt,
                    claimant: caller,
                },
            )
            .await?;
        info!(
            appointment_id = %id,
            claimant = %caller,
            "verification: receipt submitted for review"
        );
        Ok(applied.into_appointment())
    }

    pub async fn approve(&self, caller: UserId, id: AppointmentId) -> Result<Appointment> {
        ensure_admin(self.identity.as_ref(), caller)?;
        let applied = self
            .engine
            .apply(id, PaymentEvent::AdminApproved { admin: caller })
            .await?;
        info!(appointment_id = %id, admin = %caller, "verification: claim approved");
        Ok(applied.into_appointment())
    }

    pub async fn reject(
        &self,
        caller: UserId,
        id: AppointmentId,
        reason: Option<String>,
    ) -> Result<Appointment> {
        ensure_admin(self.identity.as_ref(), caller)?;
        let applied = self
            .engine
            .apply(id, PaymentEvent::AdminRejected { admin: caller, reason })
            .await?;
        info!(appointment_id = %id, admin = %caller, "verification: claim rejected");
        Ok(applied.into_appointment())
    }

    /// Appointments waiting for an administrator, oldest id first.
    pub async fn queue(&self, caller: UserId) -> Result<Vec<Appointment>> {
        ensure_admin(self.identity.as_ref(), caller)?;
        let mut pending = self
            .appointments
            .list_by_payment_status(PaymentStatus::PendingVerification)
            .await?;
        pending.sort_by_key(|a| a.id);
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Amount;
    use crate::domain::phone::Msisdn;
    use crate::domain::ports::AppointmentStore;
    use crate::error::PaymentError;
    use crate::infrastructure::in_memory::{
        InMemoryAppointmentStore, InMemoryLedger, InMemoryNotifier, StaticIdentity,
    };
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    const ADMIN: UserId = UserId(1);
    const OWNER: UserId = UserId(7);

    async fn service() -> VerificationService {
        let appointments = InMemoryAppointmentStore::new();
        appointments
            .insert(Appointment::new(
                AppointmentId(1),
                OWNER,
                Msisdn::parse("0712345678").unwrap(),
                "Pedicure",
                Amount::new(dec!(30)).unwrap(),
                NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            ))
            .await
            .unwrap();
        let engine = Arc::new(ReconciliationEngine::new(
            Arc::new(appointments.clone()),
            Arc::new(InMemoryLedger::new()),
            Arc::new(InMemoryNotifier::new()),
        ));
        VerificationService::new(
            engine,
            Arc::new(appointments),
            Arc::new(StaticIdentity::new([ADMIN])),
        )
    }

    #[tokio::test]
    async fn test_claim_normalizes_receipt() {
        let service = service().await;
        let claimed = service
            .claim(OWNER, AppointmentId(1), "  sh12xy34za ")
            .await
            .unwrap();
        assert_eq!(claimed.payment.status, PaymentStatus::PendingVerification);
        assert_eq!(claimed.payment.receipt.unwrap().as_str(), "SH12XY34ZA");
    }

    #[tokio::test]
    async fn test_claim_rejects_bad_format_and_strangers() {
        let service = service().await;
        assert!(matches!(
            service.claim(OWNER, AppointmentId(1), "SHORT12").await,
            Err(PaymentError::InvalidReceiptFormat(_))
        ));
        assert!(matches!(
            service.claim(UserId(99), AppointmentId(1), "SH12XY34ZA").await,
            Err(PaymentError::Unauthorized)
        ));
        assert!(matches!(
            service.claim(OWNER, AppointmentId(2), "SH12XY34ZA").await,
            Err(PaymentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_only_admins_review() {
        let service = service().await;
        service.claim(OWNER, AppointmentId(1), "SH12XY34ZA").await.unwrap();

        assert!(matches!(
            service.approve(OWNER, AppointmentId(1)).await,
            Err(PaymentError::Unauthorized)
        ));
        assert!(matches!(
            service.queue(OWNER).await,
            Err(PaymentError::Unauthorized)
        ));

        let queue = service.queue(ADMIN).await.unwrap();
        assert_eq!(queue.len(), 1);

        let approved = service.approve(ADMIN, AppointmentId(1)).await.unwrap();
        assert_eq!(approved.payment.status, PaymentStatus::Completed);
        assert!(service.queue(ADMIN).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reject_records_reason() {
        let service = service().await;
        service.claim(OWNER, AppointmentId(1), "SH12XY34ZA").await.unwrap();

        let rejected = service
            .reject(ADMIN, AppointmentId(1), Some("No such transaction".to_string()))
            .await
            .unwrap();
        assert_eq!(rejected.payment.status, PaymentStatus::Failed);
        assert!(rejected.payment.receipt.is_none());
        assert_eq!(rejected.payment.reviewed_by, Some(ADMIN));
        assert_eq!(
            rejected.payment.rejection_reason.as_deref(),
            Some("No such transaction")
        );
    }
}
