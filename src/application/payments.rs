use super::engine::{Applied, ReconciliationEngine};
use super::{ensure_owner_or_admin, load};
use crate::domain::appointment::{Appointment, AppointmentId, PaymentStatus, UserId};
use crate::domain::event::{EventSource, GatewayCallback, PaymentEvent};
use crate::domain::phone::Msisdn;
use crate::domain::ports::{AppointmentStoreRef, GatewayRef, IdentityRef, PushRequest};
use crate::error::{PaymentError, Result};
use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a successful push initiation.
#[derive(Debug, Clone)]
pub struct Initiated {
    pub appointment: Appointment,
    pub customer_message: Option<String>,
}

/// Drives the gateway-facing payment sources: push initiation, status polls,
/// webhook deliveries and the expiry sweep. Gateway calls happen outside the
/// engine's per-appointment lock.
pub struct PaymentService {
    engine: Arc<ReconciliationEngine>,
    appointments: AppointmentStoreRef,
    gateway: GatewayRef,
    identity: IdentityRef,
}

impl PaymentService {
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        appointments: AppointmentStoreRef,
        gateway: GatewayRef,
        identity: IdentityRef,
    ) -> Self {
        Self {
            engine,
            appointments,
            gateway,
            identity,
        }
    }

    /// Sends a push prompt for the appointment's service price.
    ///
    /// `phone` overrides the customer's phone on file.
    pub async fn initiate(
        &self,
        caller: UserId,
        id: AppointmentId,
        phone: Option<&str>,
    ) -> Result<Initiated> {
        let appointment = load(&self.appointments, id).await?;
        ensure_owner_or_admin(self.identity.as_ref(), caller, &appointment)?;
        match appointment.payment.status {
            PaymentStatus::Completed => return Err(PaymentError::AlreadyTerminal(id)),
            PaymentStatus::PendingVerification => {
                return Err(PaymentError::IllegalTransition {
                    from: PaymentStatus::PendingVerification,
                    event: "push_accepted",
                });
            }
            _ => {}
        }

        let phone = match phone {
            Some(raw) => Msisdn::parse(raw)?,
            None => appointment.customer_phone.clone(),
        };
        appointment.service_price.whole_units()?;
        let request = PushRequest {
            phone: phone.clone(),
            amount: appointment.service_price,
            reference: appointment.account_reference(),
            description: appointment.payment_description(),
        };
        let accepted = self.gateway.initiate_push(&request).await.inspect_err(|err| {
            warn!(appointment_id = %id, error = %err, "payments: push initiation failed");
        })?;
        info!(
            appointment_id = %id,
            gateway_request_id = %accepted.gateway_request_id,
            "payments: push accepted by gateway"
        );

        let applied = self
            .engine
            .apply(
                id,
                PaymentEvent::PushAccepted {
                    gateway_request_id: accepted.gateway_request_id,
                    correlation_id: accepted.correlation_id,
                    phone,
                },
            )
            .await?;
        Ok(Initiated {
            appointment: applied.into_appointment(),
            customer_message: accepted.customer_message,
        })
    }

    /// Returns the current payment state, asking the gateway first when a
    /// push is still outstanding.
    ///
    /// Gateway failures are logged and the state is returned unchanged.
    pub async fn poll(&self, caller: UserId, id: AppointmentId) -> Result<Appointment> {
        let appointment = load(&self.appointments, id).await?;
        ensure_owner_or_admin(self.identity.as_ref(), caller, &appointment)?;
        if appointment.payment.status != PaymentStatus::Initiated {
            return Ok(appointment);
        }
        let Some(gateway_request_id) = appointment.payment.gateway_request_id.clone() else {
            return Ok(appointment);
        };

        let outcome = match self.gateway.query_status(&gateway_request_id).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    appointment_id = %id,
                    %gateway_request_id,
                    transient = err.is_transient_gateway_error(),
                    error = %err,
                    "payments: status query failed, payment stays initiated"
                );
                return Ok(appointment);
            }
        };

        let applied = self
            .engine
            .apply(
                id,
                PaymentEvent::GatewayReport {
                    gateway_request_id,
                    outcome,
                    source: EventSource::Poll,
                },
            )
            .await?;
        Ok(applied.into_appointment())
    }

    /// Applies a webhook delivery. Deliveries for unknown request ids are
    /// acknowledged and dropped.
    pub async fn handle_callback(&self, callback: GatewayCallback) -> Result<Option<Applied>> {
        let Some(appointment) = self
            .appointments
            .find_by_gateway_request(&callback.gateway_request_id)
            .await?
        else {
            warn!(
                gateway_request_id = %callback.gateway_request_id,
                outcome = callback.outcome.kind(),
                "payments: callback for unknown request, discarding"
            );
            return Ok(None);
        };

        info!(
            appointment_id = %appointment.id,
            gateway_request_id = %callback.gateway_request_id,
            outcome = callback.outcome.kind(),
            "payments: callback received"
        );
        let applied = self
            .engine
            .apply(
                appointment.id,
                PaymentEvent::GatewayReport {
                    gateway_request_id: callback.gateway_request_id,
                    outcome: callback.outcome,
                    source: EventSource::Webhook,
                },
            )
            .await?;
        Ok(Some(applied))
    }

    /// Fails every push initiated more than `grace` ago that never got an
    /// outcome. Returns how many payments were expired.
    pub async fn expire_stale(&self, grace: TimeDelta) -> Result<usize> {
        let cutoff = Utc::now() - grace;
        let initiated = self
            .appointments
            .list_by_payment_status(PaymentStatus::Initiated)
            .await?;

        let mut expired = 0;
        for appointment in initiated {
            match self
                .engine
                .apply(appointment.id, PaymentEvent::Expire { cutoff })
                .await
            {
                Ok(applied) if applied.is_transition() => expired += 1,
                Ok(_) => {}
                Err(err) => warn!(
                    appointment_id = %appointment.id,
                    error = %err,
                    "payments: failed to expire payment"
                ),
            }
        }
        if expired > 0 {
            info!(expired, %cutoff, "payments: expired stale pushes");
        }
        Ok(expired)
    }
}
