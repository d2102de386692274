use super::AppState;
use crate::domain::appointment::{
    Appointment, AppointmentId, BookingStatus, GatewayResult, ManualClaim, PaymentStatus, UserId,
};
use crate::domain::money::{Amount, AmountMismatch};
use crate::interfaces::http::caller::Caller;
use crate::interfaces::http::error_responses::ApiError;
use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payment view of an appointment returned by every payment endpoint.
#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub appointment_id: AppointmentId,
    pub payment_status: PaymentStatus,
    pub booking_status: BookingStatus,
    pub receipt: Option<String>,
    pub amount_paid: Option<Amount>,
    pub paid_at: Option<DateTime<Utc>>,
    pub amount_mismatch: Option<AmountMismatch>,
    pub last_result: Option<GatewayResult>,
    pub claim: Option<ManualClaim>,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<UserId>,
}

impl From<Appointment> for PaymentStatusResponse {
    fn from(appointment: Appointment) -> Self {
        let payment = appointment.payment;
        Self {
            appointment_id: appointment.id,
            payment_status: payment.status,
            booking_status: appointment.booking_status,
            receipt: payment.receipt.map(String::from),
            amount_paid: payment.amount_paid,
            paid_at: payment.paid_at,
            amount_mismatch: payment.amount_mismatch,
            last_result: payment.last_result,
            claim: payment.claim,
            rejection_reason: payment.rejection_reason,
            reviewed_by: payment.reviewed_by,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InitiateRequest {
    pub appointment_id: AppointmentId,
    pub phone_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InitiateResponse {
    pub gateway_request_id: Option<String>,
    pub customer_message: Option<String>,
    #[serde(flatten)]
    pub status: PaymentStatusResponse,
}

pub async fn initiate(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(request): Json<InitiateRequest>,
) -> Result<Json<InitiateResponse>, ApiError> {
    let initiated = state
        .payments
        .initiate(caller, request.appointment_id, request.phone_number.as_deref())
        .await?;
    Ok(Json(InitiateResponse {
        gateway_request_id: initiated.appointment.payment.gateway_request_id.clone(),
        customer_message: initiated.customer_message,
        status: initiated.appointment.into(),
    }))
}

pub async fn status(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(appointment_id): Path<u64>,
) -> Result<Json<PaymentStatusResponse>, ApiError> {
    let appointment = state
        .payments
        .poll(caller, AppointmentId(appointment_id))
        .await?;
    Ok(Json(appointment.into()))
}
