//! Pure decision logic of the payment state machine.
//!
//! [`decide`] maps the current appointment, an incoming event and what the
//! stores know about the receipt involved to either a discard or a complete
//! transition. It performs no I/O; the application engine does the locking,
//! lookups and writes around it.

use super::appointment::{
    Appointment, AppointmentId, BookingStatus, GatewayResult, ManualClaim, PaymentState,
    PaymentStatus,
};
use super::event::{GatewayOutcome, PaymentEvent, SuccessfulPayment};
use super::ledger::{LedgerEntry, LedgerStatus, NewLedgerEntry, PaymentSource};
use super::money::AmountMismatch;
use super::notification::{NotificationKind, PaymentNotification};
use super::receipt::ReceiptCode;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};

/// Result code the gateway uses for a successful payment.
pub const SUCCESS_RESULT_CODE: &str = "0";
/// Result code recorded when the expiry sweep gives up on a push.
pub const EXPIRED_RESULT_CODE: &str = "EXPIRED";

/// What the stores know about the receipt an event refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiptLookup {
    /// Ledger row already holding the receipt, if any.
    pub ledger_entry: Option<LedgerEntry>,
    /// Another appointment currently holding the receipt.
    pub claimed_by: Option<AppointmentId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The same outcome was already applied.
    DuplicateDelivery,
    /// The event refers to an older push or arrived after the payment moved on.
    StaleEvent,
    /// The gateway has no outcome yet.
    StillPending,
}

/// Everything the engine must persist for one accepted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub payment: PaymentState,
    pub booking_status: BookingStatus,
    pub ledger_entry: Option<NewLedgerEntry>,
    pub notification: Option<PaymentNotification>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Apply(Box<Transition>),
    Discard(DiscardReason),
}

/// The receipt whose global uniqueness the event depends on.
pub fn receipt_in_play<'a>(
    appointment: &'a Appointment,
    event: &'a PaymentEvent,
) -> Option<&'a ReceiptCode> {
    match event {
        PaymentEvent::GatewayReport {
            outcome: GatewayOutcome::Succeeded(payment),
            ..
        } => Some(&payment.receipt),
        PaymentEvent::ManualClaim { receipt, .. } => Some(receipt),
        PaymentEvent::AdminApproved { .. } => appointment.payment.receipt.as_ref(),
        _ => None,
    }
}

pub fn decide(
    appointment: &Appointment,
    event: &PaymentEvent,
    lookup: &ReceiptLookup,
    now: DateTime<Utc>,
) -> Result<Decision> {
    let current = &appointment.payment;
    match event {
        PaymentEvent::PushAccepted {
            gateway_request_id,
            correlation_id,
            phone,
        } => {
            reject_if_settled(appointment, event)?;
            let payment = PaymentState {
                status: PaymentStatus::Initiated,
                gateway_request_id: Some(gateway_request_id.clone()),
                correlation_id: Some(correlation_id.clone()),
                payment_phone: Some(phone.clone()),
                initiated_at: Some(now),
                rejection_reason: current.rejection_reason.clone(),
                ..PaymentState::default()
            };
            Ok(apply(payment, appointment.booking_status, None, None))
        }
        PaymentEvent::GatewayReport {
            gateway_request_id,
            outcome,
            ..
        } => {
            if current.gateway_request_id.as_deref() != Some(gateway_request_id.as_str()) {
                return Ok(Decision::Discard(DiscardReason::StaleEvent));
            }
            match outcome {
                GatewayOutcome::StillPending => Ok(Decision::Discard(DiscardReason::StillPending)),
                GatewayOutcome::Succeeded(payment) => {
                    complete_from_gateway(appointment, event, payment, lookup, now)
                }
                GatewayOutcome::UserCancelled { code, description }
                | GatewayOutcome::TimedOut { code, description } => Ok(close_attempt(
                    appointment,
                    LedgerStatus::Cancelled,
                    code,
                    description,
                    now,
                )),
                GatewayOutcome::OtherFailure { code, description } => Ok(close_attempt(
                    appointment,
                    LedgerStatus::Failed,
                    code,
                    description,
                    now,
                )),
            }
        }
        PaymentEvent::ManualClaim { receipt, claimant } => {
            reject_if_settled(appointment, event)?;
            if lookup.ledger_entry.is_some() || lookup.claimed_by.is_some() {
                return Err(PaymentError::DuplicateReceipt(receipt.to_string()));
            }
            let claim = ManualClaim {
                amount: appointment.service_price,
                phone: appointment.default_payment_phone().clone(),
                submitted_at: now,
                submitted_by: *claimant,
            };
            let payment = PaymentState {
                status: PaymentStatus::PendingVerification,
                receipt: Some(receipt.clone()),
                claim: Some(claim),
                rejection_reason: None,
                reviewed_by: None,
                ..current.clone()
            };
            Ok(apply(payment, appointment.booking_status, None, None))
        }
        PaymentEvent::AdminApproved { .. } => approve(appointment, event, lookup, now),
        PaymentEvent::AdminRejected { admin, reason } => {
            require_review(appointment, event)?;
            let payment = PaymentState {
                status: PaymentStatus::Failed,
                receipt: None,
                claim: None,
                rejection_reason: reason.clone(),
                reviewed_by: Some(*admin),
                ..current.clone()
            };
            let notification = notification(
                appointment,
                NotificationKind::ManualPaymentRejected {
                    reason: reason.clone(),
                },
            );
            Ok(apply(
                payment,
                appointment.booking_status,
                None,
                Some(notification),
            ))
        }
        PaymentEvent::Expire { cutoff } => {
            let initiated_before_cutoff = current.initiated_at.is_none_or(|at| at <= *cutoff);
            if current.status != PaymentStatus::Initiated || !initiated_before_cutoff {
                return Ok(Decision::Discard(DiscardReason::StaleEvent));
            }
            Ok(close_attempt(
                appointment,
                LedgerStatus::Failed,
                EXPIRED_RESULT_CODE,
                "No outcome received before the expiry cutoff",
                now,
            ))
        }
    }
}

fn complete_from_gateway(
    appointment: &Appointment,
    event: &PaymentEvent,
    reported: &SuccessfulPayment,
    lookup: &ReceiptLookup,
    now: DateTime<Utc>,
) -> Result<Decision> {
    let current = &appointment.payment;
    if current.status == PaymentStatus::Completed {
        return if current.receipt.as_ref() == Some(&reported.receipt) {
            Ok(Decision::Discard(DiscardReason::DuplicateDelivery))
        } else {
            Err(PaymentError::AlreadyTerminal(appointment.id))
        };
    }
    ensure_receipt_free(appointment.id, &reported.receipt, lookup)?;
    if current.status != PaymentStatus::Initiated {
        return Err(PaymentError::IllegalTransition {
            from: current.status,
            event: event.name(),
        });
    }

    let amount = reported.amount.unwrap_or(appointment.service_price);
    let phone = reported
        .phone
        .clone()
        .unwrap_or_else(|| appointment.default_payment_phone().clone());
    let paid_at = reported.paid_at.unwrap_or(now);

    let payment = PaymentState {
        status: PaymentStatus::Completed,
        receipt: Some(reported.receipt.clone()),
        amount_paid: Some(amount),
        paid_phone: Some(phone.clone()),
        paid_at: Some(paid_at),
        claim: None,
        amount_mismatch: AmountMismatch::between(appointment.service_price, amount),
        ..current.clone()
    };
    // A row already recorded for this appointment means an earlier attempt
    // died between the ledger insert and the appointment write.
    let ledger_entry = lookup.ledger_entry.is_none().then(|| NewLedgerEntry {
        user_id: appointment.user_id,
        appointment_id: Some(appointment.id),
        receipt: Some(reported.receipt.clone()),
        gateway_request_id: current.gateway_request_id.clone(),
        phone,
        amount,
        status: LedgerStatus::Completed,
        source: PaymentSource::Push,
        result_code: Some(SUCCESS_RESULT_CODE.to_string()),
        result_description: None,
        initiated_at: current.initiated_at.unwrap_or(now),
        completed_at: paid_at,
    });
    let notification = notification(appointment, NotificationKind::PaymentSucceeded { amount });
    Ok(apply(
        payment,
        BookingStatus::Confirmed,
        ledger_entry,
        Some(notification),
    ))
}

fn approve(
    appointment: &Appointment,
    event: &PaymentEvent,
    lookup: &ReceiptLookup,
    now: DateTime<Utc>,
) -> Result<Decision> {
    require_review(appointment, event)?;
    let current = &appointment.payment;
    let (Some(receipt), Some(claim)) = (current.receipt.clone(), current.claim.clone()) else {
        return Err(PaymentError::InternalError(
            format!(
                "appointment {} is pending verification without a claim",
                appointment.id
            )
            .into(),
        ));
    };
    ensure_receipt_free(appointment.id, &receipt, lookup)?;

    let payment = PaymentState {
        status: PaymentStatus::Completed,
        receipt: Some(receipt.clone()),
        amount_paid: Some(claim.amount),
        paid_phone: Some(claim.phone.clone()),
        paid_at: Some(claim.submitted_at),
        claim: None,
        reviewed_by: event.actor(),
        amount_mismatch: AmountMismatch::between(appointment.service_price, claim.amount),
        ..current.clone()
    };
    let ledger_entry = lookup.ledger_entry.is_none().then(|| NewLedgerEntry {
        user_id: appointment.user_id,
        appointment_id: Some(appointment.id),
        receipt: Some(receipt),
        gateway_request_id: None,
        phone: claim.phone.clone(),
        amount: claim.amount,
        status: LedgerStatus::Completed,
        source: PaymentSource::Manual,
        result_code: None,
        result_description: None,
        initiated_at: claim.submitted_at,
        completed_at: now,
    });
    let notification = notification(
        appointment,
        NotificationKind::PaymentSucceeded {
            amount: claim.amount,
        },
    );
    Ok(apply(
        payment,
        BookingStatus::Confirmed,
        ledger_entry,
        Some(notification),
    ))
}

/// Ends an initiated push without payment, leaving a receipt-less audit row.
fn close_attempt(
    appointment: &Appointment,
    outcome: LedgerStatus,
    code: &str,
    description: &str,
    now: DateTime<Utc>,
) -> Decision {
    let current = &appointment.payment;
    if current.status != PaymentStatus::Initiated {
        return Decision::Discard(DiscardReason::StaleEvent);
    }
    let status = match outcome {
        LedgerStatus::Cancelled => PaymentStatus::Cancelled,
        LedgerStatus::Failed | LedgerStatus::Completed => PaymentStatus::Failed,
    };
    let payment = PaymentState {
        status,
        last_result: Some(GatewayResult {
            code: code.to_string(),
            description: description.to_string(),
        }),
        ..current.clone()
    };
    let audit = NewLedgerEntry {
        user_id: appointment.user_id,
        appointment_id: Some(appointment.id),
        receipt: None,
        gateway_request_id: current.gateway_request_id.clone(),
        phone: appointment.default_payment_phone().clone(),
        amount: appointment.service_price,
        status: outcome,
        source: PaymentSource::Push,
        result_code: Some(code.to_string()),
        result_description: Some(description.to_string()),
        initiated_at: current.initiated_at.unwrap_or(now),
        completed_at: now,
    };
    apply(payment, appointment.booking_status, Some(audit), None)
}

fn reject_if_settled(appointment: &Appointment, event: &PaymentEvent) -> Result<()> {
    match appointment.payment.status {
        PaymentStatus::Completed => Err(PaymentError::AlreadyTerminal(appointment.id)),
        PaymentStatus::PendingVerification => Err(PaymentError::IllegalTransition {
            from: PaymentStatus::PendingVerification,
            event: event.name(),
        }),
        _ => Ok(()),
    }
}

fn require_review(appointment: &Appointment, event: &PaymentEvent) -> Result<()> {
    match appointment.payment.status {
        PaymentStatus::PendingVerification => Ok(()),
        PaymentStatus::Completed => Err(PaymentError::AlreadyTerminal(appointment.id)),
        from => Err(PaymentError::IllegalTransition {
            from,
            event: event.name(),
        }),
    }
}

fn ensure_receipt_free(
    appointment_id: AppointmentId,
    receipt: &ReceiptCode,
    lookup: &ReceiptLookup,
) -> Result<()> {
    let recorded_elsewhere = lookup
        .ledger_entry
        .as_ref()
        .is_some_and(|entry| entry.appointment_id != Some(appointment_id));
    if recorded_elsewhere || lookup.claimed_by.is_some() {
        return Err(PaymentError::DuplicateReceipt(receipt.to_string()));
    }
    Ok(())
}

fn notification(appointment: &Appointment, kind: NotificationKind) -> PaymentNotification {
    PaymentNotification {
        user_id: appointment.user_id,
        appointment_id: appointment.id,
        service_name: appointment.service_name.clone(),
        date: appointment.date,
        kind,
    }
}

fn apply(
    payment: PaymentState,
    booking_status: BookingStatus,
    ledger_entry: Option<NewLedgerEntry>,
    notification: Option<PaymentNotification>,
) -> Decision {
    Decision::Apply(Box::new(Transition {
        payment,
        booking_status,
        ledger_entry,
        notification,
    }))
}
