//! Application layer: the reconciliation engine and the services that feed
//! it events from the three payment sources (webhook, poll, manual claim).
//!
//! All state changes go through [`engine::ReconciliationEngine::apply`];
//! the services only authorize callers and talk to the gateway.

pub mod engine;
pub mod payments;
pub mod verification;

use crate::domain::appointment::{Appointment, AppointmentId, UserId};
use crate::domain::ports::{AppointmentStoreRef, IdentityProvider};
use crate::error::{PaymentError, Result};

async fn load(appointments: &AppointmentStoreRef, id: AppointmentId) -> Result<Appointment> {
    appointments
        .get(id)
        .await?
        .ok_or_else(|| PaymentError::NotFound(format!("Appointment {id}")))
}

fn ensure_owner_or_admin(
    identity: &dyn IdentityProvider,
    caller: UserId,
    appointment: &Appointment,
) -> Result<()> {
    if identity.is_owner(caller, appointment) || identity.is_admin(caller) {
        Ok(())
    } else {
        Err(PaymentError::Unauthorized)
    }
}

fn ensure_admin(identity: &dyn IdentityProvider, caller: UserId) -> Result<()> {
    if identity.is_admin(caller) {
        Ok(())
    } else {
        Err(PaymentError::Unauthorized)
    }
}
