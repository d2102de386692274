use super::AppState;
use super::payments::PaymentStatusResponse;
use crate::domain::appointment::AppointmentId;
use crate::interfaces::http::caller::Caller;
use crate::interfaces::http::error_responses::ApiError;
use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub appointment_id: AppointmentId,
    pub receipt: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum DecisionRequest {
    Approve,
    Reject { reason: Option<String> },
}

pub async fn claim(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(request): Json<ClaimRequest>,
) -> Result<Json<PaymentStatusResponse>, ApiError> {
    let appointment = state
        .verification
        .claim(caller, request.appointment_id, &request.receipt)
        .await?;
    Ok(Json(appointment.into()))
}

pub async fn decide(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(appointment_id): Path<u64>,
    Json(request): Json<DecisionRequest>,
) -> Result<Json<PaymentStatusResponse>, ApiError> {
    let id = AppointmentId(appointment_id);
    let appointment = match request {
        DecisionRequest::Approve => state.verification.approve(caller, id).await?,
        DecisionRequest::Reject { reason } => state.verification.reject(caller, id, reason).await?,
    };
    Ok(Json(appointment.into()))
}

pub async fn queue(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<PaymentStatusResponse>>, ApiError> {
    let pending = state.verification.queue(caller).await?;
    Ok(Json(pending.into_iter().map(Into::into).collect()))
}
